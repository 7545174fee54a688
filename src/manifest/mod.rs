pub mod parsing;

use crossforge_utils::{ObjectTraversal, ObjectWalker};
use handlebars::Handlebars;
use ring::digest::{Context, SHA256};
use serde::Serialize;
use std::borrow::Cow;

/// Archive suffixes stripped when guessing the unpacked folder name of a
/// fetched dependency.
const ARCHIVE_SUFFIXES: &[&str] = &[".tar.gz", ".tar.xz", ".tar.bz2", ".tar", ".zip"];

#[derive(Default, Debug, Clone)]
pub struct Manifest {
    pub product: Product,
}

/// The toolchain being produced, independent of any build host.
#[derive(Default, Debug, Clone)]
pub struct Product {
    pub name: String,
    /// Target triple of the toolchain itself (e.g. `arm-none-eabi`).
    pub triple: String,
    /// File whose contents seed the release string, relative to the
    /// manifest.
    pub version_file: String,
    pub license_patterns: Vec<String>,
    pub targets: Vec<Target>,
    pub dependencies: Vec<Dependency>,
    pub stages: Vec<StageSpec>,
}

impl Manifest {
    pub fn target(&self, id: &str) -> Option<&Target> {
        self.product.targets.iter().find(|t| t.id() == id)
    }

    pub fn dependency(&self, name: &str) -> Option<&Dependency> {
        self.product.dependencies.iter().find(|d| d.name == name)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum TargetOs {
    Win,
    Debian,
    Osx,
}

impl TargetOs {
    pub fn parse<T: AsRef<str>>(data: T) -> Option<TargetOs> {
        Some(match data.as_ref() {
            "win" => TargetOs::Win,
            "debian" => TargetOs::Debian,
            "osx" => TargetOs::Osx,
            _ => return None,
        })
    }

    /// Short name used in target ids and artifact file names.
    pub fn name(&self) -> &'static str {
        match self {
            TargetOs::Win => "win",
            TargetOs::Debian => "deb",
            TargetOs::Osx => "osx",
        }
    }
}

/// A build host platform the toolchain is produced for.
#[derive(Debug, Clone)]
pub struct Target {
    pub os: TargetOs,
    pub bits: u32,
    /// Host cross-compile prefix (e.g. `i686-w64-mingw32`), absent for
    /// native builds.
    pub cross_prefix: Option<String>,
    /// Docker image the build runs in; absent means the build runs
    /// directly on the invoking host.
    pub image: Option<String>,
    pub docker_file: Option<String>,
    /// Extra configure arguments appended to every stage for this
    /// target.
    pub configure_args: Vec<String>,
}

impl Target {
    pub fn id(&self) -> String {
        format!("{}{}", self.os.name(), self.bits)
    }

    /// Strip tool for binaries produced for this host.
    pub fn strip_tool(&self) -> String {
        match &self.cross_prefix {
            Some(prefix) => format!("{}-strip", prefix),
            None => "strip".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dependency {
    pub name: String,
    pub source: DependencySource,
}

#[derive(Debug, Clone)]
pub enum DependencySource {
    Git(GitSource),
    Fetch(FetchSource),
}

impl DependencySource {
    pub fn method_name(&self) -> &[u8] {
        match self {
            DependencySource::Git(_) => b"git",
            DependencySource::Fetch(_) => b"fetch",
        }
    }

    pub fn hash_data(&self) -> Cow<'_, [u8]> {
        match self {
            DependencySource::Git(g) => g.url.as_bytes().into(),
            DependencySource::Fetch(f) => f.url.as_bytes().into(),
        }
    }
}

impl Dependency {
    /// Stable cache key for this dependency's source description.
    pub fn cache_key(&self) -> [u8; 32] {
        let mut digest = Context::new(&SHA256);
        digest.update(self.source.method_name());
        digest.update(self.source.hash_data().as_ref());
        let fin = digest.finish();

        fin.as_ref()[..32].try_into().unwrap()
    }

    /// Folder under `sources/<name>/` holding the configurable tree.
    pub fn source_dir(&self) -> &str {
        match &self.source {
            DependencySource::Git(_) => "",
            DependencySource::Fetch(f) => &f.dir,
        }
    }
}

#[derive(Default, Debug, Clone)]
pub struct GitSource {
    pub url: String,
    pub branch: String,
    pub commit: String,
    pub dev_branch: Option<String>,
    pub stable_branch: Option<String>,
}

#[derive(Default, Debug, Clone)]
pub struct FetchSource {
    pub url: String,
    pub file_name: String,
    /// Unpacked top-level folder inside the archive.
    pub dir: String,
    pub sha256: Option<[u8; 32]>,
}

impl FetchSource {
    pub fn guess_dir(file_name: &str) -> String {
        for suffix in ARCHIVE_SUFFIXES {
            if let Some(stripped) = file_name.strip_suffix(suffix) {
                return stripped.to_string();
            }
        }

        file_name.to_string()
    }
}

/// One gated step of the per-target pipeline. Manifest order is
/// execution order.
#[derive(Default, Debug, Clone, ObjectTraversal)]
pub struct StageSpec {
    pub name: String,
    /// Dependency whose source tree is configured.
    pub source: String,
    pub configure_args: Vec<String>,
    pub make_args: Vec<String>,
    pub build_targets: Vec<String>,
    pub install_targets: Vec<String>,
    /// Documentation targets, skipped under `--no-pdf`.
    pub doc_targets: Vec<String>,
    /// Configure argument dropped under `--disable-multilib`.
    pub multilib_arg: Option<String>,
}

/// Variables available to `{{...}}` placeholders in manifest strings.
#[derive(Serialize, Debug)]
pub struct TargetVars {
    pub product: String,
    pub release: String,
    pub triple: String,
    pub os: &'static str,
    pub bits: u32,
    pub host: String,
    pub prefix: String,
    pub jobs: usize,
}

pub struct TemplateExpander<'a> {
    engine: Handlebars<'a>,
    vars: TargetVars,
    error: Option<handlebars::RenderError>,
}

impl TemplateExpander<'_> {
    pub fn new(vars: TargetVars) -> Self {
        let mut engine = Handlebars::new();
        engine.set_strict_mode(true);

        TemplateExpander {
            engine,
            vars,
            error: None,
        }
    }

    pub fn expand<T: ObjectTraversal>(mut self, object: &mut T) -> anyhow::Result<()> {
        object.traverse(&mut self);
        match self.error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

impl ObjectWalker for TemplateExpander<'_> {
    fn enter_string(&mut self, value: &mut String) {
        if self.error.is_some() {
            return;
        }

        match self.engine.render_template(value, &self.vars) {
            Ok(rendered) => *value = rendered,
            Err(err) => self.error = Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> TargetVars {
        TargetVars {
            product: "forge-gcc".to_string(),
            release: "13.2-20260830-1200".to_string(),
            triple: "arm-none-eabi".to_string(),
            os: "win",
            bits: 32,
            host: "i686-w64-mingw32".to_string(),
            prefix: "/work/install/win32".to_string(),
            jobs: 8,
        }
    }

    #[test]
    fn expands_stage_placeholders() {
        let mut stage = StageSpec {
            name: "binutils".to_string(),
            source: "binutils".to_string(),
            configure_args: vec![
                "--target={{triple}}".to_string(),
                "--prefix={{prefix}}".to_string(),
                "--host={{host}}".to_string(),
            ],
            ..Default::default()
        };

        TemplateExpander::new(vars()).expand(&mut stage).unwrap();

        assert_eq!(
            stage.configure_args,
            vec![
                "--target=arm-none-eabi",
                "--prefix=/work/install/win32",
                "--host=i686-w64-mingw32",
            ]
        );
    }

    #[test]
    fn unknown_placeholder_is_an_error() {
        let mut stage = StageSpec {
            configure_args: vec!["--with={{nonsense}}".to_string()],
            ..Default::default()
        };

        assert!(TemplateExpander::new(vars()).expand(&mut stage).is_err());
    }

    #[test]
    fn target_ids_combine_os_and_bits() {
        let target = Target {
            os: TargetOs::Debian,
            bits: 64,
            cross_prefix: None,
            image: None,
            docker_file: None,
            configure_args: vec![],
        };

        assert_eq!(target.id(), "deb64");
        assert_eq!(target.strip_tool(), "strip");
    }

    #[test]
    fn cache_key_tracks_source_url() {
        let mut dep = Dependency {
            name: "libusb".to_string(),
            source: DependencySource::Fetch(FetchSource {
                url: "https://example.com/libusb-1.0.tar.gz".to_string(),
                file_name: "libusb-1.0.tar.gz".to_string(),
                dir: "libusb-1.0".to_string(),
                sha256: None,
            }),
        };

        let first = dep.cache_key();
        assert_eq!(first, dep.cache_key());

        if let DependencySource::Fetch(f) = &mut dep.source {
            f.url = "https://example.com/libusb-1.1.tar.gz".to_string();
        }
        assert_ne!(first, dep.cache_key());
    }

    #[test]
    fn guessed_dir_drops_archive_suffix() {
        assert_eq!(FetchSource::guess_dir("hidapi-0.14.0.zip"), "hidapi-0.14.0");
        assert_eq!(
            FetchSource::guess_dir("libftdi1-1.5.tar.bz2"),
            "libftdi1-1.5"
        );
        assert_eq!(FetchSource::guess_dir("plain"), "plain");
    }
}
