use crate::engine::build_state::TargetBuild;
use crate::engine::folders::WorkFolders;
use async_trait::async_trait;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

mod tarball;

pub use tarball::Tarball;

#[async_trait]
pub trait Packager: Send + Sync + Debug {
    /// Archives a finished install tree and returns the path of the
    /// produced artifact.
    async fn build_package(&self, build: &TargetBuild<'_>) -> anyhow::Result<PathBuf>;
}

pub trait PackagerBuilder {
    type Output: Packager + 'static;

    fn build(folders: Arc<WorkFolders>) -> Self::Output;
}
