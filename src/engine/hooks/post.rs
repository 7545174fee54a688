use crate::engine::build_state::TargetBuild;
use crate::engine::hooks::{Hook, HookTrigger};
use crate::engine::{Engine, Phase};
use crate::manifest::TargetOs;
use crate::utils::elf::ElfHeader;
use crate::utils::FileWalker;
use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};

/// Classifies everything under the target's install tree so the strip
/// and runpath hooks know what to touch.
#[derive(Debug)]
pub struct CollectBinaries;

#[async_trait]
impl Hook for CollectBinaries {
    const PRIORITY: usize = 0;
    const TRIGGER: HookTrigger = HookTrigger::After;
    const PHASE: Phase = Phase::PostProcess;

    async fn run(&self, build: &mut TargetBuild, engine: &Engine) -> anyhow::Result<()> {
        let install = engine.folders.install_for(&build.target_id());
        if !install.is_dir() {
            return Ok(());
        }

        let mut walker = FileWalker::new(&install).await?;

        // the 9th byte guards against stripping empty ar archives,
        // which errors out
        let mut buffer: [u8; 9] = [0; 9];

        while let Some(entry) = walker.next().await? {
            let file_type = entry.file_type().await?;
            if !file_type.is_file() || file_type.is_symlink() {
                continue;
            }

            let path = entry.path();
            let mut file = BufReader::new(File::open(&path).await?);
            if file.read_exact(&mut buffer).await.is_err() {
                continue;
            }

            if &buffer[..8] == b"!<arch>\n" {
                build.static_libs.push(path);
                continue;
            }

            let mut file = BufReader::new(File::open(&path).await?);
            if let Some(elf_header) = ElfHeader::parse(&mut file).await? {
                build.elf_headers.insert(path, elf_header);
            }
        }

        Ok(())
    }
}

/// Strips debug symbols with the target's (possibly cross-prefixed)
/// strip tool, unless `--no-strip` was given.
#[derive(Debug)]
pub struct StripBinaries;

#[async_trait]
impl Hook for StripBinaries {
    const PRIORITY: usize = 50;
    const TRIGGER: HookTrigger = HookTrigger::After;
    const PHASE: Phase = Phase::PostProcess;

    async fn run(&self, build: &mut TargetBuild, engine: &Engine) -> anyhow::Result<()> {
        if !engine.options.strip {
            println!("    strip disabled, keeping symbols");
            return Ok(());
        }

        let install = engine.folders.install_for(&build.target_id());
        let tool = build.target.strip_tool();

        let mut binaries = vec![];
        let mut libraries = vec![];

        for (path, header) in &build.elf_headers {
            if header.machine != 0 && header.is_shared_object() {
                libraries.push(path.to_string_lossy().to_string());
            }

            if header.is_executable() {
                binaries.push(path.to_string_lossy().to_string());
            }
        }

        if !binaries.is_empty() {
            build.env.run(&install, &tool, &binaries).await?;
        }

        if !libraries.is_empty() {
            let mut args = vec!["--strip-unneeded".to_string()];
            args.extend(libraries);
            build.env.run(&install, &tool, &args).await?;
        }

        if !build.static_libs.is_empty() {
            let mut args = vec!["--strip-debug".to_string()];
            args.extend(
                build
                    .static_libs
                    .iter()
                    .map(|p| p.to_string_lossy().to_string()),
            );
            build.env.run(&install, &tool, &args).await?;
        }

        Ok(())
    }
}

/// Rewrites dynamic-linker search paths so the install tree is
/// self-contained: `$ORIGIN`-relative on Linux,
/// `@executable_path`-relative on macOS. Windows ships its DLLs next
/// to the executables and needs no rewrite.
#[derive(Debug)]
pub struct RewriteRunpaths;

#[async_trait]
impl Hook for RewriteRunpaths {
    const PRIORITY: usize = 100;
    const TRIGGER: HookTrigger = HookTrigger::After;
    const PHASE: Phase = Phase::PostProcess;

    async fn run(&self, build: &mut TargetBuild, engine: &Engine) -> anyhow::Result<()> {
        let install = engine.folders.install_for(&build.target_id());

        match build.target.os {
            TargetOs::Win => Ok(()),

            TargetOs::Debian => {
                for (path, header) in &build.elf_headers {
                    if !header.is_executable() && !header.is_shared_object() {
                        continue;
                    }

                    let args = vec![
                        "--set-rpath".to_string(),
                        "$ORIGIN/../lib".to_string(),
                        path.to_string_lossy().to_string(),
                    ];
                    build.env.run(&install, "patchelf", &args).await?;
                }

                Ok(())
            }

            TargetOs::Osx => {
                // Mach-O binaries never land in elf_headers; walk the
                // bin folder instead.
                let bin = install.join("bin");
                if !bin.is_dir() {
                    return Ok(());
                }

                let mut walker = FileWalker::new(&bin).await?;
                while let Some(entry) = walker.next().await? {
                    if !entry.file_type().await?.is_file() {
                        continue;
                    }

                    let args = vec![
                        "-add_rpath".to_string(),
                        "@executable_path/../lib".to_string(),
                        entry.path().to_string_lossy().to_string(),
                    ];
                    build
                        .env
                        .run(&install, "install_name_tool", &args)
                        .await?;
                }

                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::environment::Environment;
    use crate::engine::folders::WorkFolders;
    use crate::engine::packager::Tarball;
    use crate::engine::{BuildOptions, Engine};
    use crate::manifest::{Product, Target};
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::SystemTime;

    fn engine(strip: bool, base: &Path) -> Engine {
        Engine::new::<Tarball>(
            WorkFolders::from_base(base),
            BuildOptions {
                jobs: 1,
                strip,
                pdf: true,
                multilib: true,
                helper_script: None,
                debug: false,
            },
            "13.2-20260830-1200".to_string(),
            PathBuf::from("."),
        )
    }

    fn target() -> Target {
        Target {
            os: TargetOs::Debian,
            bits: 64,
            // the tool this produces does not exist on any host
            cross_prefix: Some("no-such-prefix".to_string()),
            image: None,
            docker_file: None,
            configure_args: vec![],
        }
    }

    async fn elf_executable() -> ElfHeader {
        let mut buf = vec![0u8; 20];
        buf[..4].copy_from_slice(b"\x7FELF");
        buf[4] = 1;
        buf[5] = 1;
        buf[16..18].copy_from_slice(&2u16.to_le_bytes());
        buf[18..20].copy_from_slice(&3u16.to_le_bytes());

        ElfHeader::parse(&mut Cursor::new(buf)).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn no_strip_runs_no_tool_at_all() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(false, dir.path());
        let product = Product::default();
        let target = target();

        let mut elf_headers = HashMap::new();
        elf_headers.insert(PathBuf::from("bin/forge-gcc"), elf_executable().await);

        let mut build = TargetBuild {
            started: SystemTime::now(),
            release: "13.2-20260830-1200".to_string(),
            product: &product,
            target: &target,
            stages: vec![],
            env: Environment::for_target(
                Arc::new(WorkFolders::from_base(dir.path())),
                &engine.options,
                &target,
                None,
            ),
            archives: vec![],
            elf_headers,
            static_libs: vec![],
        };

        // the strip tool cannot be spawned; only the early return can
        // succeed here
        StripBinaries.run(&mut build, &engine).await.unwrap();
    }

    #[tokio::test]
    async fn stripping_uses_the_target_tool() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(true, dir.path());
        let product = Product::default();
        let target = target();

        let mut elf_headers = HashMap::new();
        elf_headers.insert(PathBuf::from("bin/forge-gcc"), elf_executable().await);

        let mut build = TargetBuild {
            started: SystemTime::now(),
            release: "13.2-20260830-1200".to_string(),
            product: &product,
            target: &target,
            stages: vec![],
            env: Environment::for_target(
                Arc::new(WorkFolders::from_base(dir.path())),
                &engine.options,
                &target,
                None,
            ),
            archives: vec![],
            elf_headers,
            static_libs: vec![],
        };

        let err = StripBinaries.run(&mut build, &engine).await.unwrap_err();
        assert!(err.to_string().contains("no-such-prefix-strip"));
    }
}
