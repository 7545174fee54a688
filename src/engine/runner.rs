use crate::engine::build_state::TargetBuild;
use crate::engine::folders::WorkFolders;
use crate::engine::ledger::{StageLedger, StageState};
use crate::engine::BuildOptions;
use anyhow::{bail, Context};
use std::sync::Arc;

/// Drives the strictly ordered, ledger-gated stage pipeline for one
/// target: configure into an out-of-tree build folder, make, optional
/// documentation targets, make install.
#[derive(Debug)]
pub struct Runner {
    folders: Arc<WorkFolders>,
    options: Arc<BuildOptions>,
}

impl Runner {
    pub fn new(folders: Arc<WorkFolders>, options: Arc<BuildOptions>) -> Runner {
        Runner { folders, options }
    }

    pub async fn run_stages(&self, build: &mut TargetBuild<'_>) -> anyhow::Result<()> {
        let target_id = build.target_id();
        let ledger = StageLedger::new(self.folders.stamps_for(&target_id));

        for stage in &build.stages {
            match ledger.state(&stage.name).await? {
                StageState::Complete => {
                    println!("  stage {}: complete, skipping", stage.name);
                    continue;
                }

                StageState::InProgress => {
                    println!(
                        "  stage {}: earlier attempt died mid-stage, restarting",
                        stage.name
                    );
                    let dir = self.folders.stage_dir(&target_id, &stage.name);
                    if dir.is_dir() {
                        tokio::fs::remove_dir_all(&dir).await?;
                    }
                }

                StageState::Pending => {
                    println!("  stage {}: starting", stage.name);
                }
            }

            ledger.begin(&stage.name).await?;

            let stage_dir = self.folders.stage_dir(&target_id, &stage.name);
            tokio::fs::create_dir_all(&stage_dir).await?;

            let dep = build
                .product
                .dependencies
                .iter()
                .find(|d| d.name == stage.source)
                .with_context(|| format!("stage {} names unknown source", stage.name))?;

            let configure = self
                .folders
                .source_tree_for(dep)
                .join("configure")
                .to_string_lossy()
                .to_string();

            build
                .env
                .run(&stage_dir, &configure, &stage.configure_args)
                .await?;

            let mut make_args = vec![format!("-j{}", build.env.jobs)];
            make_args.extend(stage.make_args.iter().cloned());
            make_args.extend(stage.build_targets.iter().cloned());
            build.env.run(&stage_dir, "make", &make_args).await?;

            if self.options.pdf && !stage.doc_targets.is_empty() {
                let mut doc_args = stage.make_args.clone();
                doc_args.extend(stage.doc_targets.iter().cloned());
                build.env.run(&stage_dir, "make", &doc_args).await?;
            }

            let mut install_args = stage.make_args.clone();
            install_args.extend(stage.install_targets.iter().cloned());
            build.env.run(&stage_dir, "make", &install_args).await?;

            ledger.finish(&stage.name).await?;
            println!("  stage {}: done", stage.name);
        }

        Ok(())
    }

    /// Stage plans must reference declared dependencies; parse-time
    /// validation guarantees it, but manifests edited between runs can
    /// still drift from the stamps on disk.
    pub async fn verify_resumable(&self, build: &TargetBuild<'_>) -> anyhow::Result<()> {
        let target_id = build.target_id();
        let ledger = StageLedger::new(self.folders.stamps_for(&target_id));

        let mut gap = false;
        for stage in &build.stages {
            let complete = ledger.state(&stage.name).await? == StageState::Complete;

            if complete && gap {
                bail!(
                    "stage {} is recorded complete but an earlier stage is not; \
                     run `clean` before rebuilding {}",
                    stage.name,
                    target_id
                );
            }

            if !complete {
                gap = true;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::environment::Environment;
    use crate::manifest::{Product, StageSpec, Target, TargetOs};
    use std::time::SystemTime;

    fn options() -> Arc<BuildOptions> {
        Arc::new(BuildOptions {
            jobs: 1,
            strip: true,
            pdf: false,
            multilib: false,
            helper_script: None,
            debug: false,
        })
    }

    fn target() -> Target {
        Target {
            os: TargetOs::Debian,
            bits: 64,
            cross_prefix: None,
            image: None,
            docker_file: None,
            configure_args: vec![],
        }
    }

    fn stage(name: &str) -> StageSpec {
        StageSpec {
            name: name.to_string(),
            source: "binutils".to_string(),
            build_targets: vec!["all".to_string()],
            install_targets: vec!["install".to_string()],
            ..Default::default()
        }
    }

    fn target_build<'a>(
        folders: &Arc<WorkFolders>,
        options: &Arc<BuildOptions>,
        product: &'a Product,
        target: &'a Target,
        stages: Vec<StageSpec>,
    ) -> TargetBuild<'a> {
        TargetBuild {
            started: SystemTime::now(),
            release: "13.2-20260830-1200".to_string(),
            product,
            target,
            stages,
            env: Environment::for_target(folders.clone(), options, target, None),
            archives: vec![],
            elf_headers: Default::default(),
            static_libs: vec![],
        }
    }

    #[tokio::test]
    async fn completed_stages_are_skipped_on_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let folders = Arc::new(WorkFolders::from_base(dir.path()));
        let options = options();
        let runner = Runner::new(folders.clone(), options.clone());

        let ledger = StageLedger::new(folders.stamps_for("deb64"));
        for name in ["binutils", "newlib"] {
            ledger.begin(name).await.unwrap();
            ledger.finish(name).await.unwrap();
        }

        let product = Product::default();
        let target = target();
        let mut build = target_build(
            &folders,
            &options,
            &product,
            &target,
            vec![stage("binutils"), stage("newlib")],
        );

        // no sources or build tools exist under the tempdir; anything
        // but the skip path would fail
        runner.run_stages(&mut build).await.unwrap();
    }

    #[tokio::test]
    async fn complete_record_after_a_gap_refuses_to_resume() {
        let dir = tempfile::tempdir().unwrap();
        let folders = Arc::new(WorkFolders::from_base(dir.path()));
        let options = options();
        let runner = Runner::new(folders.clone(), options.clone());

        // newlib finished but binutils has no record
        let ledger = StageLedger::new(folders.stamps_for("deb64"));
        ledger.begin("newlib").await.unwrap();
        ledger.finish("newlib").await.unwrap();

        let product = Product::default();
        let target = target();
        let build = target_build(
            &folders,
            &options,
            &product,
            &target,
            vec![stage("binutils"), stage("newlib")],
        );

        let err = runner.verify_resumable(&build).await.unwrap_err();
        assert!(err.to_string().contains("run `clean`"));
    }

    #[tokio::test]
    async fn consistent_records_are_resumable() {
        let dir = tempfile::tempdir().unwrap();
        let folders = Arc::new(WorkFolders::from_base(dir.path()));
        let options = options();
        let runner = Runner::new(folders.clone(), options.clone());

        let ledger = StageLedger::new(folders.stamps_for("deb64"));
        ledger.begin("binutils").await.unwrap();
        ledger.finish("binutils").await.unwrap();

        let product = Product::default();
        let target = target();
        let build = target_build(
            &folders,
            &options,
            &product,
            &target,
            vec![stage("binutils"), stage("newlib")],
        );

        runner.verify_resumable(&build).await.unwrap();
    }
}
