use crate::engine::folders::WorkFolders;
use crate::engine::BuildOptions;
use crate::manifest::Target;
use anyhow::{bail, Context as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// How commands for a target are executed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ExecMode {
    Native,
    Docker { image: String },
}

/// Spawns external tools for one target, wrapping them in a container
/// when the target declares an image. The work folder is mounted at
/// its host path inside the container so paths stay valid in both
/// modes.
#[derive(Debug)]
pub struct Environment {
    folders: Arc<WorkFolders>,
    exec: ExecMode,
    pub jobs: usize,
    debug: bool,
    transcript: Option<PathBuf>,
}

impl Environment {
    pub fn for_target(
        folders: Arc<WorkFolders>,
        options: &BuildOptions,
        target: &Target,
        transcript: Option<PathBuf>,
    ) -> Environment {
        let exec = match &target.image {
            Some(image) => ExecMode::Docker {
                image: image.clone(),
            },
            None => ExecMode::Native,
        };

        Environment {
            folders,
            exec,
            jobs: options.jobs,
            debug: options.debug,
            transcript,
        }
    }

    /// Host-side environment with no container wrapping, used for git,
    /// docker and packaging commands.
    pub fn host(folders: Arc<WorkFolders>, options: &BuildOptions) -> Environment {
        Environment {
            folders,
            exec: ExecMode::Native,
            jobs: options.jobs,
            debug: options.debug,
            transcript: None,
        }
    }

    pub fn is_containerized(&self) -> bool {
        matches!(self.exec, ExecMode::Docker { .. })
    }

    /// Containerized targets only mount the work folder; a path outside
    /// it does not exist inside the container.
    pub fn ensure_visible(&self, path: &Path) -> anyhow::Result<()> {
        if self.is_containerized() && !path.starts_with(self.folders.base()) {
            bail!(
                "{} is outside the work folder {} and will not be visible inside the build container",
                path.display(),
                self.folders.base().display()
            );
        }

        Ok(())
    }

    /// Full argv for a command, container wrapping included.
    pub fn argv(&self, cwd: &Path, program: &str, args: &[String]) -> Vec<String> {
        match &self.exec {
            ExecMode::Native => {
                let mut argv = vec![program.to_string()];
                argv.extend(args.iter().cloned());
                argv
            }

            ExecMode::Docker { image } => {
                let base = self.folders.base().to_string_lossy();
                let mut argv = vec![
                    "docker".to_string(),
                    "run".to_string(),
                    "--rm".to_string(),
                    "-v".to_string(),
                    format!("{}:{}", base, base),
                    "-w".to_string(),
                    cwd.to_string_lossy().to_string(),
                    image.clone(),
                    program.to_string(),
                ];
                argv.extend(args.iter().cloned());
                argv
            }
        }
    }

    fn command(&self, cwd: &Path, argv: &[String]) -> Command {
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);

        if self.exec == ExecMode::Native {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Runs a command to completion; any non-zero exit aborts the run.
    pub async fn run(&self, cwd: &Path, program: &str, args: &[String]) -> anyhow::Result<()> {
        let argv = self.argv(cwd, program, args);
        let line = match self.exec {
            ExecMode::Native => format!("(cd {} && {})", cwd.display(), argv.join(" ")),
            ExecMode::Docker { .. } => argv.join(" "),
        };

        if let Some(transcript) = &self.transcript {
            let mut f = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(transcript)
                .await?;
            f.write_all(line.as_bytes()).await?;
            f.write_all(b"\n").await?;
        }

        if self.debug {
            println!("    + {}", line);
        }

        let mut proc = self
            .command(cwd, &argv)
            .spawn()
            .with_context(|| format!("failed to spawn {}", program))?;
        let ec = proc.wait().await?;
        if !ec.success() {
            bail!("{} failed ({})", program, ec);
        }

        Ok(())
    }
}
