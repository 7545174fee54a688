use crate::engine::environment::Environment;
use crate::engine::fetcher::FetchedArchive;
use crate::manifest::{Product, StageSpec, Target};
use crate::utils::elf::ElfHeader;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

/// Mutable state threaded through one target's pipeline run.
pub struct TargetBuild<'a> {
    pub started: SystemTime,
    pub release: String,
    pub product: &'a Product,
    pub target: &'a Target,
    /// Stage plans with templates already rendered for this target.
    pub stages: Vec<StageSpec>,
    pub env: Environment,
    pub archives: Vec<FetchedArchive<'a>>,
    /// Installed ELF files found by the collect hook.
    pub elf_headers: HashMap<PathBuf, ElfHeader>,
    /// Installed `!<arch>` static archives.
    pub static_libs: Vec<PathBuf>,
}

impl TargetBuild<'_> {
    pub fn target_id(&self) -> String {
        self.target.id()
    }
}
