use crate::manifest::{
    Dependency, DependencySource, FetchSource, GitSource, Manifest, Product, StageSpec, Target,
    TargetOs,
};
use kdl::{KdlDocument, KdlNode};
use miette::{Diagnostic, NamedSource, SourceSpan};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[error("Failed parsing crossforge manifest")]
pub struct ManifestCompoundError {
    #[source_code]
    pub source_code: NamedSource,
    #[related]
    pub errors: Vec<ManifestParseError>,
}

#[derive(Debug, Diagnostic, Eq, PartialEq, Error)]
#[error("{kind}")]
pub struct ManifestParseError {
    /// Offset in chars of the error.
    #[label("{}", label.unwrap_or("here"))]
    pub span: SourceSpan,

    /// Label text for this span. Defaults to `"here"`.
    pub label: Option<&'static str>,

    /// Suggestion for fixing the parser error.
    #[help]
    pub help: Option<String>,

    /// Specific error kind for this parser error.
    pub kind: &'static str,
}

const EMPTY_NODES: &[KdlNode] = &[];

pub(crate) trait GetNodes {
    fn nodes(&self) -> &[KdlNode];
}

impl GetNodes for KdlNode {
    fn nodes(&self) -> &[KdlNode] {
        self.children().map_or(EMPTY_NODES, |x| x.nodes())
    }
}

pub trait ParseDocument {
    fn parse_document(
        input: &KdlDocument,
        source: &str,
        filename: Option<&str>,
    ) -> miette::Result<Self>
    where
        Self: Sized,
    {
        let (data, errors) = Self::parse_document_with_errors(input);

        match data {
            Some(obj) if errors.is_empty() => Ok(obj),

            _ => Err(ManifestCompoundError {
                source_code: NamedSource::new(
                    filename
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "[memory.kdl]".to_string()),
                    source.to_string(),
                ),
                errors,
            }
            .into()),
        }
    }

    fn parse_document_with_errors(input: &KdlDocument) -> (Option<Self>, Vec<ManifestParseError>)
    where
        Self: Sized;
}

pub trait ParseNode {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<ManifestParseError>)
    where
        Self: Sized;
}

#[macro_export]
macro_rules! parse_string_into {
    ($input:ident, $into:expr, $errors:expr, $name:literal) => {
        use $crate::manifest::parsing::extract_single_string_value;

        match extract_single_string_value(
            $input,
            concat!($name, " missing"),
            concat!($name, " should be a string"),
            concat!("only 1 string expected for ", $name),
            concat!($name, " expected a value, property found instead"),
        ) {
            Ok(n) => $into = n.into(),
            Err(e) => $errors.push(e),
        };
    };
}

#[macro_export]
macro_rules! parse_string_list_into {
    ($input:ident, $into:ident, $errors:expr, $name:literal) => {
        use $crate::manifest::parsing::{extract_string_values, ListExtHelper};

        match extract_string_values(
            $input,
            concat!($name, " expects only string values"),
            concat!($name, " expected values, property found instead"),
        ) {
            Ok(n) => $into.add(n),
            Err(e) => $errors.push(e),
        };
    };
}

#[macro_export]
macro_rules! parse_string_list_ext_into {
    ($input:ident, $into:expr, $errors:expr, $name:literal) => {
        use $crate::manifest::parsing::{extract_string_values_with_extend, ListExtHelper};

        match extract_string_values_with_extend(
            $input,
            concat!($name, " expects only string values"),
            concat!($name, " expected values, property found instead"),
        ) {
            Ok((n, true)) => $into.add(n),
            Ok((n, false)) => $into.set(n),
            Err(e) => $errors.push(e),
        };
    };
}

pub trait ListExtHelper<T> {
    fn add(&mut self, value: Vec<T>);
    fn set(&mut self, value: Vec<T>);
}

impl<T> ListExtHelper<T> for Vec<T> {
    fn add(&mut self, value: Vec<T>) {
        self.extend(value);
    }

    fn set(&mut self, value: Vec<T>) {
        *self = value;
    }
}

impl<T> ListExtHelper<T> for Option<Vec<T>> {
    fn add(&mut self, value: Vec<T>) {
        if let Some(data) = self {
            data.extend(value)
        } else {
            *self = Some(value)
        }
    }

    fn set(&mut self, value: Vec<T>) {
        *self = Some(value);
    }
}

impl ParseDocument for Manifest {
    fn parse_document_with_errors(input: &KdlDocument) -> (Option<Self>, Vec<ManifestParseError>)
    where
        Self: Sized,
    {
        let mut product: Option<Product> = None;
        let mut errors = vec![];

        for node in input.nodes() {
            match node.name().value() {
                "product" => {
                    if product.is_some() {
                        errors.push(ManifestParseError {
                            span: *node.span(),
                            label: Some("second product here"),
                            help: None,
                            kind: "a manifest describes exactly one product",
                        });
                        continue;
                    }

                    let (parsed, err) = Product::parse_node_with_errors(node);
                    errors.extend(err);
                    product = parsed;
                }

                _ => {}
            }
        }

        let product = if let Some(product) = product {
            product
        } else {
            errors.push(ManifestParseError {
                span: SourceSpan::new(0.into(), 0.into()),
                label: None,
                help: Some("add a `product \"name\" { ... }` node".to_string()),
                kind: "manifest has no product",
            });
            return (None, errors);
        };

        (Some(Manifest { product }), errors)
    }
}

impl ParseNode for Product {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<ManifestParseError>)
    where
        Self: Sized,
    {
        let mut errors: Vec<ManifestParseError> = vec![];

        let mut name: String = "<unnamed>".to_string();
        let mut triple: String = String::new();
        let mut found_triple = false;
        let mut version_file: String = "VERSION".to_string();
        let mut license_patterns: Vec<String> = vec![];
        let mut targets: Vec<Target> = vec![];
        let mut dependencies: Vec<Dependency> = vec![];
        let mut stages: Vec<(StageSpec, SourceSpan)> = vec![];

        parse_string_into!(input, name, errors, "name of product");

        for node in input.nodes() {
            match node.name().value() {
                "triple" => {
                    found_triple = true;
                    parse_string_into!(node, triple, errors, "triple");
                }

                "version-file" => {
                    parse_string_into!(node, version_file, errors, "version-file");
                }

                "license-patterns" => {
                    parse_string_list_into!(node, license_patterns, errors, "license-patterns");
                }

                "target" => {
                    let (target, err) = Target::parse_node_with_errors(node);
                    errors.extend(err);

                    if let Some(target) = target {
                        if targets.iter().any(|t| t.id() == target.id()) {
                            errors.push(ManifestParseError {
                                span: *node.span(),
                                label: Some("second definition here"),
                                help: None,
                                kind: "target defined twice for the same os and bits",
                            });
                        } else {
                            targets.push(target);
                        }
                    }
                }

                "dependency" => {
                    let (dep, err) = Dependency::parse_node_with_errors(node);
                    errors.extend(err);

                    if let Some(dep) = dep {
                        dependencies.push(dep);
                    }
                }

                "stage" => {
                    let (stage, err) = StageSpec::parse_node_with_errors(node);
                    errors.extend(err);

                    if let Some(stage) = stage {
                        stages.push((stage, *node.span()));
                    }
                }

                _ => {}
            }
        }

        if !found_triple {
            errors.push(ManifestParseError {
                span: *input.span(),
                label: None,
                help: Some("add `triple \"arm-none-eabi\"` or similar".to_string()),
                kind: "product missing toolchain triple",
            });
        }

        let known: HashSet<&str> = dependencies.iter().map(|d| d.name.as_str()).collect();
        for (stage, span) in &stages {
            if !known.contains(stage.source.as_str()) {
                errors.push(ManifestParseError {
                    span: *span,
                    label: Some("stage declared here"),
                    help: Some(format!("declare `dependency \"{}\"`", stage.source)),
                    kind: "stage source names an unknown dependency",
                });
            }
        }

        (
            Some(Product {
                name,
                triple,
                version_file,
                license_patterns,
                targets,
                dependencies,
                stages: stages.into_iter().map(|(s, _)| s).collect(),
            }),
            errors,
        )
    }
}

impl ParseNode for Target {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<ManifestParseError>)
    where
        Self: Sized,
    {
        let mut errors = vec![];
        let mut os_name: Option<String> = None;
        let mut cross_prefix: Option<String> = None;
        let mut image: Option<String> = None;
        let mut docker_file: Option<String> = None;
        let mut configure_args: Vec<String> = vec![];

        if let Some(entry) = input.entries().iter().find(|e| e.name().is_none()) {
            if let Some(v) = entry.value().as_string() {
                os_name = Some(v.to_string());
            } else {
                errors.push(ManifestParseError {
                    span: *entry.span(),
                    label: None,
                    help: None,
                    kind: "target os should be a string",
                });
            }
        } else {
            errors.push(ManifestParseError {
                span: *input.name().span(),
                label: None,
                help: Some("write `target \"win\" bits=32`".to_string()),
                kind: "target missing os name",
            });
        }

        let os = os_name.as_deref().and_then(TargetOs::parse);
        if os.is_none() {
            if let Some(name) = &os_name {
                errors.push(ManifestParseError {
                    span: *input.span(),
                    label: None,
                    help: Some(format!("`{}` is not one of win, debian, osx", name)),
                    kind: "unknown target os",
                });
            }
        }

        let bits = match extract_named_integer(input, "bits") {
            Ok(v) if v == 32 || v == 64 => Some(v as u32),
            Ok(_) => {
                errors.push(ManifestParseError {
                    span: *input.span(),
                    label: None,
                    help: None,
                    kind: "target bits must be 32 or 64",
                });
                None
            }
            Err(e) => {
                errors.push(e);
                None
            }
        };

        for node in input.nodes() {
            match node.name().value() {
                "host" => {
                    parse_string_into!(node, cross_prefix, errors, "host prefix");
                }

                "image" => {
                    parse_string_into!(node, image, errors, "image");
                }

                "docker-file" => {
                    parse_string_into!(node, docker_file, errors, "docker-file");
                }

                "configure-args" => {
                    parse_string_list_ext_into!(node, configure_args, errors, "configure args");
                }

                _ => {}
            }
        }

        match (os, bits) {
            (Some(os), Some(bits)) => (
                Some(Target {
                    os,
                    bits,
                    cross_prefix,
                    image,
                    docker_file,
                    configure_args,
                }),
                errors,
            ),
            _ => (None, errors),
        }
    }
}

impl ParseNode for Dependency {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<ManifestParseError>)
    where
        Self: Sized,
    {
        let mut errors = vec![];
        let mut name = String::new();
        let mut source: Option<DependencySource> = None;

        parse_string_into!(input, name, errors, "name of dependency");

        for node in input.nodes() {
            let parsed = match node.name().value() {
                "git" => {
                    let (obj, err) = GitSource::parse_node_with_errors(node);
                    errors.extend(err);
                    obj.map(DependencySource::Git)
                }

                "fetch" => {
                    let (obj, err) = FetchSource::parse_node_with_errors(node);
                    errors.extend(err);
                    obj.map(DependencySource::Fetch)
                }

                _ => continue,
            };

            if source.is_some() {
                errors.push(ManifestParseError {
                    span: *node.span(),
                    label: Some("second source here"),
                    help: None,
                    kind: "dependency has more than one source",
                });
            } else {
                source = parsed;
            }
        }

        let source = if let Some(source) = source {
            source
        } else {
            errors.push(ManifestParseError {
                span: *input.span(),
                label: None,
                help: Some("add a `git { ... }` or `fetch { ... }` child".to_string()),
                kind: "dependency has no source",
            });
            return (None, errors);
        };

        (Some(Dependency { name, source }), errors)
    }
}

impl ParseNode for GitSource {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<ManifestParseError>)
    where
        Self: Sized,
    {
        let mut errors = vec![];
        let mut url: Option<String> = None;
        let mut branch: Option<String> = None;
        let mut commit: Option<String> = None;
        let mut dev_branch: Option<String> = None;
        let mut stable_branch: Option<String> = None;

        for node in input.nodes() {
            match node.name().value() {
                "url" => {
                    parse_string_into!(node, url, errors, "git url");
                }

                "branch" => {
                    parse_string_into!(node, branch, errors, "git branch");
                }

                "commit" => {
                    parse_string_into!(node, commit, errors, "git commit");
                }

                "dev-branch" => {
                    parse_string_into!(node, dev_branch, errors, "dev branch");
                }

                "stable-branch" => {
                    parse_string_into!(node, stable_branch, errors, "stable branch");
                }

                _ => {}
            }
        }

        let res = match (url, branch, commit) {
            (Some(url), Some(branch), Some(commit)) => Some(GitSource {
                url,
                branch,
                commit,
                dev_branch,
                stable_branch,
            }),

            _ => {
                errors.push(ManifestParseError {
                    span: *input.span(),
                    label: None,
                    help: Some("a pinned git source needs url, branch and commit".to_string()),
                    kind: "git source is incompletely pinned",
                });
                None
            }
        };

        (res, errors)
    }
}

impl ParseNode for FetchSource {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<ManifestParseError>)
    where
        Self: Sized,
    {
        let mut url: Option<String> = None;
        let mut errors = vec![];
        let mut file_name: Option<String> = None;
        let mut dir: Option<String> = None;
        let mut sha256 = None;

        for node in input.nodes() {
            match node.name().value() {
                "url" => {
                    parse_string_into!(node, url, errors, "url of archive");
                }

                "name" => {
                    parse_string_into!(node, file_name, errors, "name of archive");
                }

                "dir" => {
                    parse_string_into!(node, dir, errors, "dir of archive");
                }

                "sha256" => {
                    let mut str_sha = None;
                    parse_string_into!(node, str_sha, errors, "sha256");

                    if let Some(str_sha) = str_sha {
                        match hex::decode(&str_sha) {
                            Ok(v) if v.len() != 32 => errors.push(ManifestParseError {
                                span: *node.entries().first().unwrap().span(),
                                label: None,
                                help: None,
                                kind: "expected 32 byte long hex string for sha256",
                            }),
                            Ok(v) => sha256 = Some(v.try_into().unwrap()),
                            Err(v) => errors.push(ManifestParseError {
                                span: *node.entries().first().unwrap().span(),
                                label: None,
                                help: Some(format!("{}", v)),
                                kind: "invalid hex string",
                            }),
                        }
                    }
                }

                _ => {}
            }
        }

        let res = if let Some(url) = url {
            let file_name = file_name.unwrap_or_else(|| {
                url.rsplit('/')
                    .next()
                    .unwrap()
                    .split('?')
                    .next()
                    .unwrap()
                    .to_string()
            });

            Some(FetchSource {
                dir: dir.unwrap_or_else(|| FetchSource::guess_dir(&file_name)),
                file_name,
                url,
                sha256,
            })
        } else {
            errors.push(ManifestParseError {
                span: *input.span(),
                label: None,
                help: None,
                kind: "fetch source requires an url to be given",
            });
            None
        };

        (res, errors)
    }
}

impl ParseNode for StageSpec {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<ManifestParseError>)
    where
        Self: Sized,
    {
        let mut errors = vec![];
        let mut name = String::new();
        let mut source: Option<String> = None;
        let mut configure_args: Vec<String> = vec![];
        let mut make_args: Vec<String> = vec![];
        let mut build_targets: Vec<String> = vec![];
        let mut install_targets: Vec<String> = vec![];
        let mut doc_targets: Vec<String> = vec![];
        let mut multilib_arg: Option<String> = None;

        parse_string_into!(input, name, errors, "name of stage");

        for node in input.nodes() {
            match node.name().value() {
                "source" => {
                    parse_string_into!(node, source, errors, "stage source");
                }

                "configure-args" => {
                    parse_string_list_ext_into!(node, configure_args, errors, "configure args");
                }

                "make-args" => {
                    parse_string_list_ext_into!(node, make_args, errors, "make args");
                }

                "build-targets" => {
                    parse_string_list_into!(node, build_targets, errors, "build targets");
                }

                "install-targets" => {
                    parse_string_list_into!(node, install_targets, errors, "install targets");
                }

                "doc-targets" => {
                    parse_string_list_into!(node, doc_targets, errors, "doc targets");
                }

                "multilib-arg" => {
                    parse_string_into!(node, multilib_arg, errors, "multilib arg");
                }

                _ => {}
            }
        }

        let source = if let Some(source) = source {
            source
        } else {
            errors.push(ManifestParseError {
                span: *input.span(),
                label: None,
                help: Some("add `source \"<dependency>\"`".to_string()),
                kind: "stage has no source dependency",
            });
            return (None, errors);
        };

        if build_targets.is_empty() {
            build_targets.push("all".to_string());
        }
        if install_targets.is_empty() {
            install_targets.push("install".to_string());
        }

        (
            Some(StageSpec {
                name,
                source,
                configure_args,
                make_args,
                build_targets,
                install_targets,
                doc_targets,
                multilib_arg,
            }),
            errors,
        )
    }
}

fn extract_named_integer(input: &KdlNode, name: &'static str) -> Result<i64, ManifestParseError> {
    let entry = input
        .entries()
        .iter()
        .find(|e| e.name().map_or(false, |n| n.value() == name));

    let entry = match entry {
        Some(entry) => entry,
        None => {
            return Err(ManifestParseError {
                span: *input.name().span(),
                label: None,
                help: Some(format!("add `{}=<number>`", name)),
                kind: "missing integer property",
            })
        }
    };

    match entry.value().as_i64() {
        Some(v) => Ok(v),
        None => Err(ManifestParseError {
            span: *entry.span(),
            label: None,
            help: None,
            kind: "property should be an integer",
        }),
    }
}

pub(crate) fn extract_single_string_value(
    input: &KdlNode,
    missing_error: &'static str,
    wrong_type_error: &'static str,
    too_many_error: &'static str,
    property_found_error: &'static str,
) -> Result<String, ManifestParseError> {
    match input.entries().len() {
        0 => Err(ManifestParseError {
            span: *input.name().span(),
            label: None,
            help: None,
            kind: missing_error,
        }),

        1 => {
            let name_entry = input.entries().first().unwrap();

            if name_entry.name().is_some() {
                return Err(ManifestParseError {
                    span: *name_entry.span(),
                    label: None,
                    help: None,
                    kind: property_found_error,
                });
            }

            if let Some(v) = name_entry.value().as_string() {
                Ok(v.to_string())
            } else {
                Err(ManifestParseError {
                    span: *name_entry.span(),
                    label: None,
                    help: None,
                    kind: wrong_type_error,
                })
            }
        }

        _ => {
            let start_args = input.entries().first().unwrap().span().offset();
            let end_args = input
                .entries()
                .last()
                .map(|x| x.span().len() + x.span().offset())
                .unwrap();

            let span = SourceSpan::new(start_args.into(), (end_args - start_args).into());
            Err(ManifestParseError {
                span,
                label: None,
                help: None,
                kind: too_many_error,
            })
        }
    }
}

pub(crate) fn extract_string_values(
    input: &KdlNode,
    wrong_type_error: &'static str,
    property_found_error: &'static str,
) -> Result<Vec<String>, ManifestParseError> {
    let mut values = vec![];

    for entry in input.entries() {
        if entry.name().is_some() {
            return Err(ManifestParseError {
                span: *entry.span(),
                label: None,
                help: None,
                kind: property_found_error,
            });
        }

        if let Some(v) = entry.value().as_string() {
            values.push(v.to_string());
        } else {
            return Err(ManifestParseError {
                span: *entry.span(),
                label: None,
                help: None,
                kind: wrong_type_error,
            });
        }
    }

    Ok(values)
}

pub(crate) fn extract_string_values_with_extend(
    input: &KdlNode,
    wrong_type_error: &'static str,
    property_found_error: &'static str,
) -> Result<(Vec<String>, bool), ManifestParseError> {
    let mut values = vec![];

    let mut first = true;
    let mut extends = true;

    for entry in input.entries() {
        if first && entry.name().map_or(false, |k| k.value() == "extends") {
            if let Some(v) = entry.value().as_bool() {
                extends = v;
            } else {
                return Err(ManifestParseError {
                    span: *entry.span(),
                    label: None,
                    help: None,
                    kind: "extends expects a bool",
                });
            }

            continue;
        }

        first = false;

        if entry.name().is_some() {
            return Err(ManifestParseError {
                span: *entry.span(),
                label: None,
                help: None,
                kind: property_found_error,
            });
        }

        if let Some(v) = entry.value().as_string() {
            values.push(v.to_string());
        } else {
            return Err(ManifestParseError {
                span: *entry.span(),
                label: None,
                help: None,
                kind: wrong_type_error,
            });
        }
    }

    Ok((values, extends))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> (Option<Manifest>, Vec<ManifestParseError>) {
        let doc: KdlDocument = source.parse().unwrap();
        Manifest::parse_document_with_errors(&doc)
    }

    const MINIMAL: &str = r#"
product "forge-gcc" {
    triple "arm-none-eabi"
    version-file "VERSION"
    license-patterns "COPYING*" "LICENSE*"

    target "debian" bits=64 {
        image "crossforge/debian64"
        docker-file "docker/debian64.Dockerfile"
    }

    target "win" bits=32 {
        host "i686-w64-mingw32"
        image "crossforge/mingw32"
        configure-args "--with-gnu-as"
    }

    dependency "binutils" {
        git {
            url "https://sourceware.org/git/binutils-gdb.git"
            branch "binutils-2_43-branch"
            commit "0123456789abcdef0123456789abcdef01234567"
        }
    }

    dependency "libusb" {
        fetch {
            url "https://example.com/libusb-1.0.27.tar.gz"
            sha256 "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f"
        }
    }

    stage "binutils" {
        source "binutils"
        configure-args "--target={{triple}}" "--prefix={{prefix}}"
        doc-targets "pdf" "install-pdf"
        multilib-arg "--enable-multilib"
    }
}
"#;

    #[test]
    fn parses_minimal_manifest() {
        let (manifest, errors) = parse(MINIMAL);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);

        let manifest = manifest.unwrap();
        let product = &manifest.product;

        assert_eq!(product.name, "forge-gcc");
        assert_eq!(product.triple, "arm-none-eabi");
        assert_eq!(product.targets.len(), 2);
        assert_eq!(product.targets[0].id(), "deb64");
        assert_eq!(
            product.targets[1].cross_prefix.as_deref(),
            Some("i686-w64-mingw32")
        );
        assert_eq!(product.dependencies.len(), 2);
        assert_eq!(product.stages.len(), 1);
        assert_eq!(product.stages[0].build_targets, vec!["all"]);
        assert_eq!(product.stages[0].install_targets, vec!["install"]);
        assert_eq!(product.stages[0].doc_targets, vec!["pdf", "install-pdf"]);

        match &manifest.dependency("libusb").unwrap().source {
            DependencySource::Fetch(f) => {
                assert_eq!(f.file_name, "libusb-1.0.27.tar.gz");
                assert_eq!(f.dir, "libusb-1.0.27");
                assert!(f.sha256.is_some());
            }
            other => panic!("expected fetch source, got {:?}", other),
        }
    }

    #[test]
    fn rejects_stage_with_unknown_source() {
        let (_, errors) = parse(
            r#"
product "forge-gcc" {
    triple "arm-none-eabi"
    stage "gcc" {
        source "gcc"
    }
}
"#,
        );

        assert!(errors
            .iter()
            .any(|e| e.kind == "stage source names an unknown dependency"));
    }

    #[test]
    fn rejects_unpinned_git_source() {
        let (_, errors) = parse(
            r#"
product "forge-gcc" {
    triple "arm-none-eabi"
    dependency "gcc" {
        git {
            url "https://example.com/gcc.git"
        }
    }
}
"#,
        );

        assert!(errors
            .iter()
            .any(|e| e.kind == "git source is incompletely pinned"));
    }

    #[test]
    fn rejects_bad_bits() {
        let (_, errors) = parse(
            r#"
product "forge-gcc" {
    triple "arm-none-eabi"
    target "win" bits=16
}
"#,
        );

        assert!(errors
            .iter()
            .any(|e| e.kind == "target bits must be 32 or 64"));
    }

    #[test]
    fn rejects_short_sha256() {
        let (_, errors) = parse(
            r#"
product "forge-gcc" {
    triple "arm-none-eabi"
    dependency "libusb" {
        fetch {
            url "https://example.com/libusb.tar.gz"
            sha256 "abcd"
        }
    }
}
"#,
        );

        assert!(errors
            .iter()
            .any(|e| e.kind == "expected 32 byte long hex string for sha256"));
    }

    #[test]
    fn missing_product_is_an_error() {
        let (manifest, errors) = parse("targets \"none\"");
        assert!(manifest.is_none());
        assert!(errors.iter().any(|e| e.kind == "manifest has no product"));
    }
}
