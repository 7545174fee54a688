use crate::manifest::Dependency;
use std::path::{Path, PathBuf};

/// Mount roots probed, in order, when no explicit work folder is given.
const CANDIDATE_ROOTS: &[&str] = &["/media/{user}/Work", "/media/Work", "/opt/Work"];

pub const WORK_FOLDER_ENV: &str = "CROSSFORGE_WORK_FOLDER";

/// Layout of all mutable state for a build run.
#[derive(Debug, Clone)]
pub struct WorkFolders {
    base: PathBuf,
}

impl WorkFolders {
    /// Resolution order: explicit flag, environment override, first
    /// existing candidate mount root, `$HOME/Work`. The product's
    /// lowercased name is appended to probed roots and the home
    /// fallback, never to explicit overrides.
    pub fn resolve(product: &str, explicit: Option<&Path>) -> WorkFolders {
        if let Some(path) = explicit {
            return WorkFolders {
                base: path.to_path_buf(),
            };
        }

        if let Some(path) = std::env::var_os(WORK_FOLDER_ENV) {
            return WorkFolders {
                base: PathBuf::from(path),
            };
        }

        let user = std::env::var("USER").unwrap_or_default();
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());

        let candidates: Vec<PathBuf> = CANDIDATE_ROOTS
            .iter()
            .map(|root| PathBuf::from(root.replace("{user}", &user)))
            .collect();

        WorkFolders {
            base: Self::probe(product, &candidates, Path::new(&home)),
        }
    }

    fn probe(product: &str, candidates: &[PathBuf], home: &Path) -> PathBuf {
        let leaf = product.to_lowercase();

        for candidate in candidates {
            if candidate.is_dir() {
                return candidate.join(&leaf);
            }
        }

        home.join("Work").join(leaf)
    }

    pub fn from_base<P: Into<PathBuf>>(base: P) -> WorkFolders {
        WorkFolders { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        self.base.as_path()
    }

    /// Downloaded archives, keyed by content of their source
    /// description.
    pub fn cache(&self) -> PathBuf {
        self.base.join("cache")
    }

    pub fn sources(&self) -> PathBuf {
        self.base.join("sources")
    }

    pub fn source_for(&self, dep: &Dependency) -> PathBuf {
        self.sources().join(&dep.name)
    }

    /// The configurable tree inside a dependency's source folder. Git
    /// checkouts are the tree; archives unpack one level deeper.
    pub fn source_tree_for(&self, dep: &Dependency) -> PathBuf {
        let dir = dep.source_dir();
        if dir.is_empty() {
            self.source_for(dep)
        } else {
            self.source_for(dep).join(dir)
        }
    }

    pub fn build_root(&self) -> PathBuf {
        self.base.join("build")
    }

    pub fn build_for(&self, target_id: &str) -> PathBuf {
        self.build_root().join(target_id)
    }

    pub fn stage_dir(&self, target_id: &str, stage: &str) -> PathBuf {
        self.build_for(target_id).join(stage)
    }

    pub fn stamps_for(&self, target_id: &str) -> PathBuf {
        self.build_for(target_id).join("stamps")
    }

    pub fn install_root(&self) -> PathBuf {
        self.base.join("install")
    }

    pub fn install_for(&self, target_id: &str) -> PathBuf {
        self.install_root().join(target_id)
    }

    pub fn scripts(&self) -> PathBuf {
        self.base.join("scripts")
    }

    pub fn output(&self) -> PathBuf {
        self.base.join("output")
    }

    pub async fn create_skeleton(&self) -> anyhow::Result<()> {
        for dir in [
            self.cache(),
            self.sources(),
            self.build_root(),
            self.install_root(),
            self.scripts(),
            self.output(),
        ] {
            tokio::fs::create_dir_all(dir).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{DependencySource, FetchSource, GitSource};

    #[test]
    fn explicit_override_wins() {
        let folders = WorkFolders::resolve("Forge-GCC", Some(Path::new("/tmp/elsewhere")));
        assert_eq!(folders.base(), Path::new("/tmp/elsewhere"));
    }

    #[test]
    fn probe_picks_first_existing_candidate() {
        let existing = tempfile::tempdir().unwrap();
        let missing = existing.path().join("not-there");

        let base = WorkFolders::probe(
            "Forge-GCC",
            &[missing, existing.path().to_path_buf()],
            Path::new("/home/nobody"),
        );

        assert_eq!(base, existing.path().join("forge-gcc"));
    }

    #[test]
    fn probe_falls_back_to_home() {
        let base = WorkFolders::probe(
            "Forge-GCC",
            &[PathBuf::from("/definitely/not/a/mount")],
            Path::new("/home/nobody"),
        );

        assert_eq!(base, PathBuf::from("/home/nobody/Work/forge-gcc"));
    }

    #[test]
    fn source_tree_depends_on_dependency_kind() {
        let folders = WorkFolders::from_base("/work");

        let git_dep = Dependency {
            name: "binutils".to_string(),
            source: DependencySource::Git(GitSource::default()),
        };
        assert_eq!(
            folders.source_tree_for(&git_dep),
            PathBuf::from("/work/sources/binutils")
        );

        let fetch_dep = Dependency {
            name: "libusb".to_string(),
            source: DependencySource::Fetch(FetchSource {
                dir: "libusb-1.0.27".to_string(),
                ..Default::default()
            }),
        };
        assert_eq!(
            folders.source_tree_for(&fetch_dep),
            PathBuf::from("/work/sources/libusb/libusb-1.0.27")
        );
    }
}
