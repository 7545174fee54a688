use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Target selector ids recognized on the command line, in the order the
/// pipeline visits them.
pub const SELECTOR_IDS: &[&str] = &["win32", "win64", "deb32", "deb64", "osx64"];

#[derive(Parser, Debug)]
#[command(name = "crossforge")]
#[command(about = "Cross-compiles embedded GCC toolchains for several host platforms")]
pub struct Cli {
    /// Build the 32-bit Windows (MinGW) toolchain.
    #[arg(long)]
    pub win32: bool,

    /// Build the 64-bit Windows (MinGW) toolchain.
    #[arg(long)]
    pub win64: bool,

    /// Build the 32-bit Debian toolchain.
    #[arg(long)]
    pub deb32: bool,

    /// Build the 64-bit Debian toolchain.
    #[arg(long)]
    pub deb64: bool,

    /// Build the macOS toolchain.
    #[arg(long)]
    pub osx: bool,

    /// Select every target the manifest declares.
    #[arg(long)]
    pub all: bool,

    /// Parallel job count passed to make; defaults to the host cpu
    /// count.
    #[arg(long)]
    pub jobs: Option<usize>,

    /// Keep debug symbols in the installed binaries.
    #[arg(long = "no-strip")]
    pub no_strip: bool,

    /// Skip documentation (pdf) make targets.
    #[arg(long = "no-pdf")]
    pub no_pdf: bool,

    /// Drop the multilib configure argument from every stage.
    #[arg(long = "disable-multilib")]
    pub disable_multilib: bool,

    /// Script executed once per target before its first stage, inside
    /// the target's execution mode.
    #[arg(long = "helper-script")]
    pub helper_script: Option<PathBuf>,

    /// Manifest path; defaults to crossforge.kdl in the current folder.
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Work folder override; also settable via CROSSFORGE_WORK_FOLDER.
    #[arg(long = "work-folder")]
    pub work_folder: Option<PathBuf>,

    #[command(subcommand)]
    pub action: Action,
}

#[derive(Subcommand, Debug, Clone, Copy, Eq, PartialEq)]
pub enum Action {
    /// Run the build pipeline for the selected targets.
    Build,

    /// Remove build and install trees for the selected targets,
    /// keeping sources, the download cache and the output folder.
    Clean,

    /// Remove build, install, sources, cache and output wholesale.
    Cleanall,

    /// Re-sync every git dependency to its pinned commit.
    Pull,

    /// Check git dependencies out on their development branches.
    CheckoutDev,

    /// Check git dependencies out on their stable branches.
    CheckoutStable,

    /// Build the Docker images that targets declare Dockerfiles for.
    BuildImages,

    /// Pull the Docker images that targets reference.
    PreloadImages,

    /// Create the work folder skeleton and a starter manifest.
    Bootstrap,
}

impl Cli {
    /// Target ids selected by the flags, in pipeline order. `--all`
    /// wins over individual selectors.
    pub fn selected_ids(&self) -> Vec<&'static str> {
        if self.all {
            return SELECTOR_IDS.to_vec();
        }

        let flags = [
            (self.win32, "win32"),
            (self.win64, "win64"),
            (self.deb32, "deb32"),
            (self.deb64, "deb64"),
            (self.osx, "osx64"),
        ];

        flags
            .iter()
            .filter_map(|(set, id)| if *set { Some(*id) } else { None })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn selectors_map_to_target_ids() {
        let cli = Cli::try_parse_from(["crossforge", "--win32", "--deb64", "build"]).unwrap();
        assert_eq!(cli.selected_ids(), vec!["win32", "deb64"]);
        assert_eq!(cli.action, Action::Build);
    }

    #[test]
    fn all_selects_every_target() {
        let cli = Cli::try_parse_from(["crossforge", "--all", "build"]).unwrap();
        assert_eq!(cli.selected_ids(), SELECTOR_IDS);
    }

    #[test]
    fn no_selector_selects_nothing() {
        let cli = Cli::try_parse_from(["crossforge", "build"]).unwrap();
        assert!(cli.selected_ids().is_empty());
    }

    #[test]
    fn unknown_flag_is_a_usage_error() {
        let err = Cli::try_parse_from(["crossforge", "--frobnicate", "build"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn missing_action_is_a_usage_error() {
        assert!(Cli::try_parse_from(["crossforge", "--win32"]).is_err());
    }

    #[test]
    fn two_actions_are_a_usage_error() {
        assert!(Cli::try_parse_from(["crossforge", "clean", "build"]).is_err());
    }

    #[test]
    fn option_flags_parse() {
        let cli = Cli::try_parse_from([
            "crossforge",
            "--osx",
            "--no-strip",
            "--no-pdf",
            "--disable-multilib",
            "--jobs",
            "4",
            "build",
        ])
        .unwrap();

        assert!(cli.no_strip && cli.no_pdf && cli.disable_multilib);
        assert_eq!(cli.jobs, Some(4));
        assert_eq!(cli.selected_ids(), vec!["osx64"]);
    }
}
