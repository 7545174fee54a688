use crate::cli::Cli;
use crate::engine::build_state::TargetBuild;
use crate::engine::environment::Environment;
use crate::engine::extractor::Extractor;
use crate::engine::fetcher::{Channel, Fetcher};
use crate::engine::folders::WorkFolders;
use crate::engine::hooks::{HookTrigger, SORTED_HOOKS};
use crate::engine::packager::{Packager, PackagerBuilder};
use crate::engine::runner::Runner;
use crate::manifest::{
    DependencySource, Manifest, Product, StageSpec, Target, TargetVars, TemplateExpander,
};
use anyhow::{bail, Context as _};
use futures::future::join_all;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

mod build_state;
mod environment;
mod extractor;
mod fetcher;
pub mod folders;
mod hooks;
mod ledger;
pub mod packager;
mod runner;

pub use fetcher::Channel as GitChannel;

/// Flags that tune a run without changing what the manifest describes.
#[derive(Debug)]
pub struct BuildOptions {
    pub jobs: usize,
    pub strip: bool,
    pub pdf: bool,
    pub multilib: bool,
    pub helper_script: Option<PathBuf>,
    pub debug: bool,
}

impl BuildOptions {
    pub fn from_cli(cli: &Cli) -> BuildOptions {
        BuildOptions {
            jobs: cli.jobs.unwrap_or_else(num_cpus::get),
            strip: !cli.no_strip,
            pdf: !cli.no_pdf,
            multilib: !cli.disable_multilib,
            helper_script: cli.helper_script.clone(),
            debug: std::env::var_os("CROSSFORGE_DEBUG").is_some(),
        }
    }
}

/// Pipeline phases, in execution order. Hooks key on these.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Phase {
    Prepare,
    Fetch,
    Extract,
    Build,
    PostProcess,
    Package,
}

impl Phase {
    pub fn phases() -> [Phase; 6] {
        [
            Phase::Prepare,
            Phase::Fetch,
            Phase::Extract,
            Phase::Build,
            Phase::PostProcess,
            Phase::Package,
        ]
    }
}

#[derive(Debug)]
pub struct EngineError {
    errors: Vec<anyhow::Error>,
}

impl std::error::Error for EngineError {}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Encountered {} errors:", self.errors.len())?;
        for err in &self.errors {
            write!(f, "\n\n\t{}", err)?;
        }

        Ok(())
    }
}

#[derive(Debug)]
pub struct Engine {
    fetcher: Fetcher,
    extractor: Extractor,
    runner: Runner,
    packager: Box<dyn Packager>,
    pub folders: Arc<WorkFolders>,
    pub options: Arc<BuildOptions>,
    release: String,
    /// Folder the manifest was loaded from; Dockerfile paths and the
    /// version file resolve against it.
    manifest_dir: PathBuf,
}

impl Engine {
    pub fn new<T: PackagerBuilder>(
        folders: WorkFolders,
        options: BuildOptions,
        release: String,
        manifest_dir: PathBuf,
    ) -> Self {
        let folders = Arc::new(folders);
        let options = Arc::new(options);

        Engine {
            fetcher: Fetcher::new(folders.clone()),
            extractor: Extractor::new(folders.clone()),
            runner: Runner::new(folders.clone(), options.clone()),
            packager: Box::new(T::build(folders.clone())),
            folders,
            options,
            release,
            manifest_dir,
        }
    }

    pub async fn prepare_engine(&self) -> anyhow::Result<()> {
        self.folders.create_skeleton().await
    }

    /// Fails before anything on disk is touched if a required host tool
    /// is missing.
    pub async fn preflight(&self, manifest: &Manifest) -> anyhow::Result<()> {
        require_tool("git").await?;
        require_tool("make").await?;

        if manifest.product.targets.iter().any(|t| t.image.is_some()) {
            require_tool("docker").await?;
        }

        Ok(())
    }

    async fn run_hooks(
        &self,
        build: &mut TargetBuild<'_>,
        phase: Phase,
        trigger: HookTrigger,
    ) -> anyhow::Result<()> {
        for hook in SORTED_HOOKS.iter().copied() {
            if hook.when() == (phase, trigger) {
                println!("    running hook: {:?}", hook);
                hook.trigger(build, self).await?;
            }
        }

        Ok(())
    }

    pub async fn build(&self, manifest: &Manifest, selected: &[&str]) -> anyhow::Result<()> {
        if selected.is_empty() {
            bail!("no targets selected; pass --all or one or more of --win32/--win64/--deb32/--deb64/--osx");
        }

        for id in selected {
            let target = manifest
                .target(id)
                .with_context(|| format!("manifest declares no {} target", id))?;

            println!("building {} for {}", manifest.product.name, id);
            self.build_target(&manifest.product, target).await?;
        }

        Ok(())
    }

    async fn build_target(&self, product: &Product, target: &Target) -> anyhow::Result<()> {
        let target_id = target.id();
        let transcript = self.folders.scripts().join(format!(
            "build-{}-{}.sh",
            target_id,
            chrono::Utc::now().format("%Y%m%d-%H%M%S")
        ));

        let env = Environment::for_target(
            self.folders.clone(),
            &self.options,
            target,
            Some(transcript.clone()),
        );

        let stages = self.plan_stages(product, target)?;

        let mut build = TargetBuild {
            started: SystemTime::now(),
            release: self.release.clone(),
            product,
            target,
            stages,
            env,
            archives: vec![],
            elf_headers: Default::default(),
            static_libs: vec![],
        };

        for phase in Phase::phases() {
            println!("  phase: {:?}", phase);

            self.run_hooks(&mut build, phase, HookTrigger::Before)
                .await?;

            match phase {
                Phase::Prepare => {
                    self.prepare_engine().await?;

                    let build_dir = self.folders.build_for(&target_id);
                    tokio::fs::create_dir_all(&build_dir).await?;
                    tokio::fs::create_dir_all(self.folders.install_for(&target_id)).await?;

                    tokio::fs::write(&transcript, "#!/bin/sh\n").await?;

                    if let Some(script) = &self.options.helper_script {
                        let script = tokio::fs::canonicalize(script)
                            .await
                            .with_context(|| format!("helper script {}", script.display()))?;
                        build.env.ensure_visible(&script)?;
                        build
                            .env
                            .run(&build_dir, &script.to_string_lossy(), &[])
                            .await?;
                    }
                }

                Phase::Fetch => {
                    self.fetch(&mut build).await?;
                }

                Phase::Extract => {
                    for archive in &build.archives {
                        self.extractor.extract(archive).await?;
                    }
                }

                Phase::Build => {
                    self.runner.verify_resumable(&build).await?;
                    self.runner.run_stages(&mut build).await?;
                }

                // post-processing is carried entirely by hooks
                Phase::PostProcess => {}

                Phase::Package => {
                    let artifact = self.packager.build_package(&build).await?;
                    println!("  wrote {}", artifact.display());
                }
            }

            self.run_hooks(&mut build, phase, HookTrigger::After)
                .await?;
        }

        Ok(())
    }

    async fn fetch<'a>(&self, build: &mut TargetBuild<'a>) -> anyhow::Result<()> {
        // git syncs run one at a time; archive downloads in parallel.
        for dep in &build.product.dependencies {
            if let DependencySource::Git(git) = &dep.source {
                self.fetcher.sync_git(dep, git).await?;
            }
        }

        let all_fetch: Vec<_> = join_all(build.product.dependencies.iter().filter_map(|dep| {
            match &dep.source {
                DependencySource::Fetch(source) => Some(self.fetcher.fetch_archive(dep, source)),
                DependencySource::Git(_) => None,
            }
        }))
        .await;

        let mut errors = vec![];
        let mut ok = vec![];

        for item in all_fetch {
            match item {
                Ok(v) => ok.push(v),
                Err(e) => errors.push(e),
            }
        }

        if !errors.is_empty() {
            return Err(EngineError { errors }.into());
        }

        build.archives = ok;

        Ok(())
    }

    /// Per-target stage plans: the shared stage list with the multilib
    /// argument applied, the target's extra configure arguments
    /// appended, and every `{{...}}` placeholder rendered.
    fn plan_stages(&self, product: &Product, target: &Target) -> anyhow::Result<Vec<StageSpec>> {
        let target_id = target.id();
        let mut stages = product.stages.clone();

        for stage in &mut stages {
            if self.options.multilib {
                if let Some(arg) = &stage.multilib_arg {
                    stage.configure_args.push(arg.clone());
                }
            }

            stage
                .configure_args
                .extend(target.configure_args.iter().cloned());
        }

        let vars = TargetVars {
            product: product.name.clone(),
            release: self.release.clone(),
            triple: product.triple.clone(),
            os: target.os.name(),
            bits: target.bits,
            host: target.cross_prefix.clone().unwrap_or_default(),
            prefix: self
                .folders
                .install_for(&target_id)
                .to_string_lossy()
                .to_string(),
            jobs: self.options.jobs,
        };

        TemplateExpander::new(vars)
            .expand(&mut stages)
            .with_context(|| format!("rendering stage plans for {}", target_id))?;

        Ok(stages)
    }

    /// Removes build and install trees for the selected targets (all
    /// of them when none are selected). Sources, cache and output stay.
    pub async fn clean(&self, manifest: &Manifest, selected: &[&str]) -> anyhow::Result<()> {
        let ids: Vec<String> = if selected.is_empty() {
            manifest.product.targets.iter().map(|t| t.id()).collect()
        } else {
            selected.iter().map(|s| s.to_string()).collect()
        };

        for id in ids {
            for dir in [self.folders.build_for(&id), self.folders.install_for(&id)] {
                if dir.is_dir() {
                    println!("removing {}", dir.display());
                    tokio::fs::remove_dir_all(&dir).await?;
                }
            }
        }

        Ok(())
    }

    pub async fn clean_all(&self) -> anyhow::Result<()> {
        for dir in [
            self.folders.build_root(),
            self.folders.install_root(),
            self.folders.sources(),
            self.folders.cache(),
            self.folders.output(),
        ] {
            if dir.is_dir() {
                println!("removing {}", dir.display());
                tokio::fs::remove_dir_all(&dir).await?;
            }
        }

        Ok(())
    }

    /// Brings every git dependency back to its pinned commit.
    pub async fn pull(&self, manifest: &Manifest) -> anyhow::Result<()> {
        for dep in &manifest.product.dependencies {
            if let DependencySource::Git(git) = &dep.source {
                self.fetcher.sync_git(dep, git).await?;
            }
        }

        Ok(())
    }

    pub async fn checkout(&self, manifest: &Manifest, channel: Channel) -> anyhow::Result<()> {
        for dep in &manifest.product.dependencies {
            if let DependencySource::Git(git) = &dep.source {
                if self.fetcher.checkout_channel(dep, git, channel).await? {
                    println!("  {} now on its {:?} branch", dep.name, channel);
                } else {
                    println!("  {} has no {:?} branch, left as is", dep.name, channel);
                }
            }
        }

        Ok(())
    }

    /// Builds every Docker image the manifest declares a Dockerfile
    /// for. The manifest folder is the build context.
    pub async fn build_images(&self, manifest: &Manifest) -> anyhow::Result<()> {
        let env = Environment::host(self.folders.clone(), &self.options);

        for target in &manifest.product.targets {
            let (image, docker_file) = match (&target.image, &target.docker_file) {
                (Some(image), Some(file)) => (image, file),
                _ => continue,
            };

            println!("building image {} ({})", image, docker_file);
            let args = vec![
                "build".to_string(),
                "-f".to_string(),
                self.manifest_dir
                    .join(docker_file)
                    .to_string_lossy()
                    .to_string(),
                "-t".to_string(),
                image.clone(),
                self.manifest_dir.to_string_lossy().to_string(),
            ];
            env.run(&self.manifest_dir, "docker", &args).await?;
        }

        Ok(())
    }

    /// Pulls every Docker image targets reference, so a later build
    /// works offline.
    pub async fn preload_images(&self, manifest: &Manifest) -> anyhow::Result<()> {
        let env = Environment::host(self.folders.clone(), &self.options);

        for target in &manifest.product.targets {
            let image = match &target.image {
                Some(image) => image,
                None => continue,
            };

            println!("pulling image {}", image);
            let args = vec!["pull".to_string(), image.clone()];
            env.run(&self.manifest_dir, "docker", &args).await?;
        }

        Ok(())
    }
}

async fn require_tool(name: &str) -> anyhow::Result<()> {
    let ok = tokio::process::Command::new(name)
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false);

    if !ok {
        bail!("{} is required but not usable on this host", name);
    }

    Ok(())
}

/// Release string stamped into artifact names and BUILD-INFO: the
/// version file's contents plus the UTC build date.
pub fn release_string(manifest_dir: &Path, product: &Product) -> anyhow::Result<String> {
    let path = manifest_dir.join(&product.version_file);
    let version = std::fs::read_to_string(&path)
        .with_context(|| format!("version file {}", path.display()))?;

    Ok(format!(
        "{}-{}",
        version.trim(),
        chrono::Utc::now().format("%Y%m%d-%H%M")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::TargetOs;

    fn product() -> Product {
        Product {
            name: "Forge-GCC".to_string(),
            triple: "arm-none-eabi".to_string(),
            version_file: "VERSION".to_string(),
            license_patterns: vec![],
            targets: vec![],
            dependencies: vec![],
            stages: vec![StageSpec {
                name: "gcc-stage1".to_string(),
                source: "gcc".to_string(),
                configure_args: vec![
                    "--target={{triple}}".to_string(),
                    "--prefix={{prefix}}".to_string(),
                ],
                make_args: vec![],
                build_targets: vec!["all-gcc".to_string()],
                install_targets: vec!["install-gcc".to_string()],
                doc_targets: vec![],
                multilib_arg: Some("--enable-multilib".to_string()),
            }],
        }
    }

    fn target() -> Target {
        Target {
            os: TargetOs::Debian,
            bits: 64,
            cross_prefix: None,
            image: None,
            docker_file: None,
            configure_args: vec!["--with-system-zlib".to_string()],
        }
    }

    fn engine(multilib: bool) -> Engine {
        Engine::new::<packager::Tarball>(
            WorkFolders::from_base("/work/forge"),
            BuildOptions {
                jobs: 4,
                strip: true,
                pdf: true,
                multilib,
                helper_script: None,
                debug: false,
            },
            "12.3-20260830-1200".to_string(),
            PathBuf::from("/src/forge"),
        )
    }

    #[test]
    fn stage_plans_render_templates_and_append_target_args() {
        let stages = engine(true).plan_stages(&product(), &target()).unwrap();

        assert_eq!(
            stages[0].configure_args,
            vec![
                "--target=arm-none-eabi",
                "--prefix=/work/forge/install/deb64",
                "--enable-multilib",
                "--with-system-zlib",
            ]
        );
    }

    #[test]
    fn disable_multilib_drops_the_argument() {
        let stages = engine(false).plan_stages(&product(), &target()).unwrap();

        assert!(!stages[0]
            .configure_args
            .iter()
            .any(|a| a == "--enable-multilib"));
    }

    #[test]
    fn unknown_placeholder_is_an_error() {
        let mut product = product();
        product.stages[0]
            .configure_args
            .push("--with-pkgversion={{nonsense}}".to_string());

        assert!(engine(true).plan_stages(&product, &target()).is_err());
    }

    #[test]
    fn phases_run_build_before_post_processing() {
        let phases = Phase::phases();
        let build = phases.iter().position(|p| *p == Phase::Build).unwrap();
        let post = phases
            .iter()
            .position(|p| *p == Phase::PostProcess)
            .unwrap();
        let package = phases.iter().position(|p| *p == Phase::Package).unwrap();

        assert!(build < post && post < package);
    }

    #[test]
    fn release_string_combines_version_and_date() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("VERSION"), "12.3\n").unwrap();

        let release = release_string(dir.path(), &product()).unwrap();

        assert!(release.starts_with("12.3-"));
        // 12.3-yyyymmdd-HHMM
        assert_eq!(release.len(), "12.3-".len() + 8 + 1 + 4);
    }
}
