use crate::cli::{Action, Cli};
use crate::engine::folders::WorkFolders;
use crate::engine::packager::Tarball;
use crate::engine::{BuildOptions, Engine, GitChannel};
use crate::manifest::parsing::ParseDocument;
use crate::manifest::Manifest;
use clap::Parser;
use kdl::KdlDocument;
use std::path::{Path, PathBuf};

mod cli;
mod engine;
mod manifest;
mod utils;

/// Manifest written by the bootstrap action as a starting point.
const STARTER_MANIFEST: &str = r#"product "Forge-GCC" {
    triple "arm-none-eabi"
    version-file "VERSION"
    license-patterns "COPYING*" "LICENSE*"

    target "debian" bits=64

    target "debian" bits=32 {
        image "crossforge/deb32"
        docker-file "docker/deb32.Dockerfile"
    }

    target "win" bits=32 {
        host "i686-w64-mingw32"
        image "crossforge/mingw"
        docker-file "docker/mingw.Dockerfile"
        configure-args "--host={{host}}"
    }

    target "win" bits=64 {
        host "x86_64-w64-mingw32"
        image "crossforge/mingw"
        docker-file "docker/mingw.Dockerfile"
        configure-args "--host={{host}}"
    }

    target "osx" bits=64 {
        host "x86_64-apple-darwin"
        configure-args "--host={{host}}"
    }

    dependency "binutils" {
        fetch {
            url "https://ftp.gnu.org/gnu/binutils/binutils-2.42.tar.xz"
        }
    }

    dependency "gcc" {
        fetch {
            url "https://ftp.gnu.org/gnu/gcc/gcc-13.2.0/gcc-13.2.0.tar.xz"
        }
    }

    dependency "newlib" {
        fetch {
            url "https://sourceware.org/pub/newlib/newlib-4.4.0.20231231.tar.gz"
        }
    }

    stage "binutils" {
        source "binutils"
        configure-args "--target={{triple}}" "--prefix={{prefix}}" \
                       "--disable-nls" "--disable-werror"
        doc-targets "pdf" "install-pdf"
    }

    stage "gcc-stage1" {
        source "gcc"
        configure-args "--target={{triple}}" "--prefix={{prefix}}" \
                       "--enable-languages=c" "--disable-nls" "--disable-threads" \
                       "--disable-libssp" "--disable-shared" "--with-newlib" \
                       "--without-headers"
        multilib-arg "--enable-multilib"
        build-targets "all-gcc"
        install-targets "install-gcc"
    }

    stage "newlib" {
        source "newlib"
        configure-args "--target={{triple}}" "--prefix={{prefix}}" \
                       "--enable-newlib-io-long-long" "--disable-newlib-supplied-syscalls" \
                       "--disable-nls"
    }

    stage "gcc-stage2" {
        source "gcc"
        configure-args "--target={{triple}}" "--prefix={{prefix}}" \
                       "--enable-languages=c,c++" "--disable-nls" "--disable-threads" \
                       "--disable-libssp" "--disable-shared" "--with-newlib"
        multilib-arg "--enable-multilib"
        doc-targets "pdf" "install-pdf"
    }
}
"#;

fn default_manifest_path(cli: &Cli) -> PathBuf {
    cli.manifest
        .clone()
        .unwrap_or_else(|| PathBuf::from("crossforge.kdl"))
}

fn load_manifest(path: &Path) -> anyhow::Result<Manifest> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read manifest {}: {}", path.display(), e))?;

    let kdl_document: KdlDocument = match source.parse() {
        Ok(doc) => doc,
        Err(e) => {
            let report = miette::Error::new(e);
            println!("{:?}", report);
            std::process::exit(1);
        }
    };

    match Manifest::parse_document(&kdl_document, &source, path.to_str()) {
        Ok(manifest) => Ok(manifest),
        Err(report) => {
            println!("{:?}", report);
            std::process::exit(1);
        }
    }
}

async fn bootstrap(cli: &Cli) -> anyhow::Result<()> {
    let path = default_manifest_path(cli);
    if path.exists() {
        anyhow::bail!("{} already exists, not overwriting", path.display());
    }

    tokio::fs::write(&path, STARTER_MANIFEST).await?;

    let version_file = path.with_file_name("VERSION");
    if !version_file.exists() {
        tokio::fs::write(&version_file, "13.2\n").await?;
    }

    let manifest = load_manifest(&path)?;
    let folders = WorkFolders::resolve(&manifest.product.name, cli.work_folder.as_deref());
    folders.create_skeleton().await?;

    println!("wrote {}", path.display());
    println!("work folder: {}", folders.base().display());

    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.action == Action::Bootstrap {
        return bootstrap(&cli).await;
    }

    let manifest_path = default_manifest_path(&cli);
    let manifest = load_manifest(&manifest_path)?;

    let manifest_dir = manifest_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let release = match cli.action {
        Action::Build => engine::release_string(&manifest_dir, &manifest.product)?,
        _ => engine::release_string(&manifest_dir, &manifest.product)
            .unwrap_or_else(|_| "unreleased".to_string()),
    };

    let folders = WorkFolders::resolve(&manifest.product.name, cli.work_folder.as_deref());
    let options = BuildOptions::from_cli(&cli);
    let engine = Engine::new::<Tarball>(folders, options, release, manifest_dir);

    match cli.action {
        Action::Build => {
            engine.preflight(&manifest).await?;
            engine.prepare_engine().await?;
            engine.build(&manifest, &cli.selected_ids()).await?;
        }

        Action::Clean => {
            engine.clean(&manifest, &cli.selected_ids()).await?;
        }

        Action::Cleanall => {
            engine.clean_all().await?;
        }

        Action::Pull => {
            engine.pull(&manifest).await?;
        }

        Action::CheckoutDev => {
            engine.checkout(&manifest, GitChannel::Dev).await?;
        }

        Action::CheckoutStable => {
            engine.checkout(&manifest, GitChannel::Stable).await?;
        }

        Action::BuildImages => {
            engine.build_images(&manifest).await?;
        }

        Action::PreloadImages => {
            engine.preload_images(&manifest).await?;
        }

        Action::Bootstrap => unreachable!(),
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = match err.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                // usage errors exit 1, before anything on disk is
                // touched
                _ => 1,
            };
            std::process::exit(code);
        }
    };

    if let Err(err) = run(cli).await {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}
