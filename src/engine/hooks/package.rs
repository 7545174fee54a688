use crate::engine::build_state::TargetBuild;
use crate::engine::hooks::{Hook, HookTrigger};
use crate::engine::{Engine, Phase};
use crate::utils::FileWalker;
use async_trait::async_trait;
use std::cmp::min;
use std::ffi::CString;
use std::os::unix::prelude::OsStrExt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::UNIX_EPOCH;

/// Gathers each dependency's license texts into the install tree so
/// the shipped archive carries them.
#[derive(Debug)]
pub struct CopyLicenses;

#[async_trait]
impl Hook for CopyLicenses {
    const PRIORITY: usize = 0;
    const TRIGGER: HookTrigger = HookTrigger::Before;
    const PHASE: Phase = Phase::Package;

    async fn run(&self, build: &mut TargetBuild, engine: &Engine) -> anyhow::Result<()> {
        let install = engine.folders.install_for(&build.target_id());
        let doc_root = install.join("share").join("doc");

        for dep in &build.product.dependencies {
            let tree = engine.folders.source_tree_for(dep);
            if !tree.is_dir() {
                continue;
            }

            let dest = doc_root.join(&dep.name);

            for pattern in &build.product.license_patterns {
                let glob = wax::Glob::from_str(pattern)?;
                for item in glob.walk(&tree) {
                    let item = match item {
                        Err(_) => continue,
                        Ok(item) => item,
                    };

                    if !item.file_type().is_file() {
                        continue;
                    }

                    let candidate = item.to_candidate_path();
                    let path = PathBuf::from(candidate.as_ref());
                    if let Some(parent) = path.parent() {
                        tokio::fs::create_dir_all(dest.join(parent)).await?;
                    }

                    tokio::fs::copy(tree.join(&path), dest.join(&path)).await?;
                }

                drop(glob);
            }
        }

        Ok(())
    }
}

/// Drops a BUILD-INFO.txt into the install tree recording what was
/// built, from which pinned sources.
#[derive(Debug)]
pub struct WriteBuildInfo;

#[async_trait]
impl Hook for WriteBuildInfo {
    const PRIORITY: usize = 50;
    const TRIGGER: HookTrigger = HookTrigger::Before;
    const PHASE: Phase = Phase::Package;

    async fn run(&self, build: &mut TargetBuild, engine: &Engine) -> anyhow::Result<()> {
        let install = engine.folders.install_for(&build.target_id());

        let mut info = String::new();
        info.push_str(&format!("Product: {}\n", build.product.name));
        info.push_str(&format!("Release: {}\n", build.release));
        info.push_str(&format!("Triple: {}\n", build.product.triple));
        info.push_str(&format!("Host: {}\n", build.target_id()));

        for dep in &build.product.dependencies {
            use crate::manifest::DependencySource;

            match &dep.source {
                DependencySource::Git(git) => {
                    info.push_str(&format!("Source: {} {} @ {}\n", dep.name, git.url, git.commit));
                }
                DependencySource::Fetch(fetch) => {
                    info.push_str(&format!("Source: {} {}\n", dep.name, fetch.url));
                }
            }
        }

        for stage in &build.stages {
            info.push_str(&format!("Stage: {}\n", stage.name));
        }

        tokio::fs::create_dir_all(&install).await?;
        tokio::fs::write(install.join("BUILD-INFO.txt"), info).await?;

        Ok(())
    }
}

/// Pins every mtime in the install tree to the moment the build
/// started, so two runs over the same sources produce byte-identical
/// archives.
#[derive(Debug)]
pub struct PinTimestamps;

#[async_trait]
impl Hook for PinTimestamps {
    const PRIORITY: usize = 100;
    const TRIGGER: HookTrigger = HookTrigger::Before;
    const PHASE: Phase = Phase::Package;

    async fn run(&self, build: &mut TargetBuild, engine: &Engine) -> anyhow::Result<()> {
        let install = engine.folders.install_for(&build.target_id());

        let duration = build.started.duration_since(UNIX_EPOCH)?;

        let tv = libc::timeval {
            tv_sec: min(duration.as_secs(), libc::time_t::MAX as u64) as libc::time_t,
            tv_usec: duration.subsec_micros() as libc::suseconds_t,
        };

        let mut files = FileWalker::empty(true);
        files.push(&install).await?;

        while let Some(file) = files.next().await? {
            let p = file.path();
            let os_str = p.as_os_str();

            let c_str = CString::new(os_str.as_bytes())?;

            let data = [tv, tv];

            unsafe {
                if libc::lutimes(c_str.as_ptr(), &data as _) != 0 {
                    return Err(std::io::Error::last_os_error().into());
                }
            }
        }

        Ok(())
    }
}
