use crate::engine::folders::WorkFolders;
use crate::manifest::{Dependency, FetchSource, GitSource};
use anyhow::{bail, Context as _};
use hex::ToHex;
use reqwest::Client;
use ring::digest::{Context, SHA256};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

/// Acquires dependency sources: verified archive downloads into the
/// cache, and pinned git checkouts under the sources folder.
#[derive(Debug)]
pub struct Fetcher {
    folders: Arc<WorkFolders>,
    http_client: Client,
}

#[derive(Debug)]
pub struct FetchedArchive<'a> {
    pub dep: &'a Dependency,
    pub source: &'a FetchSource,
    pub path: PathBuf,
}

/// Which branch family a `checkout-*` action switches git dependencies
/// to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Channel {
    Dev,
    Stable,
}

#[derive(Debug)]
pub struct FetchError {
    kind: FetchErrorKind,
    affected: Option<FetchAffected>,
    dependency: String,
    url: String,
}

impl Error for FetchError {}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            FetchErrorKind::VerificationFailed { hashes } => {
                write!(f, "verification failed (")?;
                let mut first = true;
                for FailedHash {
                    algo,
                    found,
                    expected,
                } in hashes
                {
                    if !first {
                        write!(f, ", ")?;
                    }

                    first = false;
                    write!(
                        f,
                        "{} expected {} but found {}",
                        algo,
                        hex::encode(expected),
                        hex::encode(found)
                    )?;
                }
                write!(f, ")")?;
            }
        }

        write!(f, " for {} ({})", self.dependency, self.url)?;

        match &self.affected {
            Some(FetchAffected::Fetched) => {
                write!(f, " with fetched file")?;
            }

            Some(FetchAffected::Cache(p)) => {
                write!(f, " with cached file ({})", p.display())?;
            }
            _ => {}
        }

        Ok(())
    }
}

#[derive(Debug)]
pub struct FailedHash {
    algo: &'static str,
    found: Box<[u8]>,
    expected: Box<[u8]>,
}

#[derive(Debug)]
pub enum FetchAffected {
    Fetched,
    Cache(PathBuf),
}

#[derive(Debug)]
pub enum FetchErrorKind {
    VerificationFailed { hashes: Vec<FailedHash> },
}

pub struct DigestPool {
    pool: Vec<(Context, [u8; 32], &'static str)>,
}

impl DigestPool {
    pub fn from_sha256(expected: Option<[u8; 32]>) -> DigestPool {
        let mut pool = vec![];

        if let Some(sha) = expected {
            pool.push((Context::new(&SHA256), sha, "sha256"));
        }

        DigestPool { pool }
    }

    pub fn update(&mut self, data: &[u8]) {
        for (ctx, _, _) in &mut self.pool {
            ctx.update(data);
        }
    }

    pub fn finish(self) -> Result<(), Vec<FailedHash>> {
        let mut failed_hash = vec![];

        for (ctx, comp, algo) in self.pool {
            let dig = ctx.finish();
            if dig.as_ref() != comp {
                failed_hash.push(FailedHash {
                    algo,
                    found: Box::from(dig.as_ref()),
                    expected: Box::from(&comp[..]),
                });
            }
        }

        if failed_hash.is_empty() {
            Ok(())
        } else {
            Err(failed_hash)
        }
    }
}

impl Fetcher {
    pub fn new(folders: Arc<WorkFolders>) -> Self {
        Fetcher {
            folders,
            http_client: Client::new(),
        }
    }

    /// Cache path for an archive, keyed by the dependency's source
    /// description so a changed url never reuses a stale file.
    pub fn archive_path(&self, dep: &Dependency, source: &FetchSource) -> PathBuf {
        let hash = dep.cache_key();
        let file_name = format!("{}-{}", hash.encode_hex::<String>(), source.file_name);

        self.folders.cache().join(file_name)
    }

    pub async fn fetch_archive<'a>(
        &self,
        dep: &'a Dependency,
        source: &'a FetchSource,
    ) -> anyhow::Result<FetchedArchive<'a>> {
        let path = self.archive_path(dep, source);

        let cached = tokio::fs::metadata(&path)
            .await
            .map(|_| true)
            .or_else(|e| {
                if e.kind() == ErrorKind::NotFound {
                    Ok(false)
                } else {
                    Err(e)
                }
            })?;

        if cached {
            return if let Err(hashes) = self.verify_file(path.as_path(), source.sha256).await? {
                Err(FetchError {
                    kind: FetchErrorKind::VerificationFailed { hashes },
                    affected: Some(FetchAffected::Cache(path)),
                    dependency: dep.name.clone(),
                    url: source.url.clone(),
                }
                .into())
            } else {
                Ok(FetchedArchive { dep, source, path })
            };
        }

        let req = self.http_client.get(&source.url).build()?;
        let mut resp = self.http_client.execute(req).await?.error_for_status()?;

        let mut f = File::create(&path).await?;
        let mut pool = DigestPool::from_sha256(source.sha256);

        while let Some(chunk) = resp.chunk().await? {
            pool.update(&chunk);
            f.write_all(&chunk).await?;
        }

        if let Err(hashes) = pool.finish() {
            drop(f);
            tokio::fs::remove_file(&path).await?;

            return Err(FetchError {
                kind: FetchErrorKind::VerificationFailed { hashes },
                affected: Some(FetchAffected::Fetched),
                dependency: dep.name.clone(),
                url: source.url.clone(),
            }
            .into());
        }

        f.sync_all().await?;

        Ok(FetchedArchive { dep, source, path })
    }

    pub async fn verify_file(
        &self,
        path: &Path,
        expected: Option<[u8; 32]>,
    ) -> anyhow::Result<Result<(), Vec<FailedHash>>> {
        let mut file = OpenOptions::new()
            .read(true)
            .create(false)
            .write(false)
            .open(path)
            .await?;

        let mut pool = DigestPool::from_sha256(expected);
        let mut buffer = vec![0; 4096];

        loop {
            let r = file.read(&mut buffer).await?;
            if r == 0 {
                break;
            }

            pool.update(&buffer[..r]);
        }

        Ok(pool.finish())
    }

    /// Effective git url: `CROSSFORGE_<NAME>_GIT_URL` overrides the
    /// manifest for builds against a fork.
    pub fn git_url(dep: &Dependency, source: &GitSource) -> String {
        let var = format!(
            "CROSSFORGE_{}_GIT_URL",
            dep.name.to_uppercase().replace('-', "_")
        );

        std::env::var(var).unwrap_or_else(|_| source.url.clone())
    }

    /// Brings the checkout to the pinned commit. The folder existing is
    /// not treated as up to date: HEAD is compared against the pin on
    /// every call and re-synced on mismatch.
    pub async fn sync_git(&self, dep: &Dependency, source: &GitSource) -> anyhow::Result<()> {
        let dir = self.folders.source_for(dep);
        let url = Self::git_url(dep, source);

        if !dir.is_dir() {
            println!("  cloning {} ({})", dep.name, url);
            run_git(
                None,
                &[
                    "clone",
                    "--branch",
                    &source.branch,
                    &url,
                    &dir.to_string_lossy(),
                ],
            )
            .await?;
        }

        let head = git_head(&dir).await?;
        if head == source.commit {
            return Ok(());
        }

        println!(
            "  re-syncing {}: HEAD {} != pinned {}",
            dep.name, head, source.commit
        );
        run_git(Some(&dir), &["fetch", "origin"]).await?;
        run_git(Some(&dir), &["checkout", "--force", &source.commit]).await?;

        Ok(())
    }

    /// Switches a checkout to its dev/stable branch tip. Dependencies
    /// without a branch for the channel are left untouched.
    pub async fn checkout_channel(
        &self,
        dep: &Dependency,
        source: &GitSource,
        channel: Channel,
    ) -> anyhow::Result<bool> {
        let branch = match channel {
            Channel::Dev => source.dev_branch.as_ref(),
            Channel::Stable => source.stable_branch.as_ref(),
        };

        let branch = match branch {
            Some(branch) => branch,
            None => return Ok(false),
        };

        let dir = self.folders.source_for(dep);
        if !dir.is_dir() {
            self.sync_git(dep, source).await?;
        }

        run_git(Some(&dir), &["fetch", "origin"]).await?;
        run_git(Some(&dir), &["checkout", branch]).await?;

        Ok(true)
    }
}

async fn run_git(cwd: Option<&Path>, args: &[&str]) -> anyhow::Result<()> {
    let mut cmd = Command::new("git");
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    cmd.args(args);

    let status = cmd.status().await.context("failed to spawn git")?;
    if !status.success() {
        bail!("git {} failed ({})", args.join(" "), status);
    }

    Ok(())
}

async fn git_head(dir: &Path) -> anyhow::Result<String> {
    let output = Command::new("git")
        .current_dir(dir)
        .args(["rev-parse", "HEAD"])
        .stdout(Stdio::piped())
        .output()
        .await
        .context("failed to spawn git")?;

    if !output.status.success() {
        bail!("git rev-parse HEAD failed in {}", dir.display());
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
