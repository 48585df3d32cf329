use crate::lister::{PackageLister, PackageRecord};
use crate::scanner::{Scanner, Token};
use crate::target::{Target, TargetError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Identifier prefix the Go toolchain uses for fuzz entry points. The
/// classifier's announcement patterns match the same prefix.
pub const ENTRY_PREFIX: &str = "Fuzz";

/// Errors raised while turning package patterns into fuzz targets.
///
/// Discovery never returns partial results: any of these aborts the whole
/// operation.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("toolchain command is empty")]
    EmptyToolchainCommand,

    #[error("cannot run package lister: {0}")]
    LaunchLister(#[source] std::io::Error),

    /// The lister ran but rejected the patterns (e.g. a pattern that matches
    /// no package). `stderr` is the lister's own diagnostic.
    #[error("cannot get package list for {patterns:?} ({status}): {stderr}")]
    ListPackages {
        patterns: Vec<String>,
        status: String,
        stderr: String,
    },

    #[error("cannot decode package list: {0}")]
    DecodePackages(#[source] serde_json::Error),

    #[error("cannot read test source {path:?}: {source}")]
    ReadSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid fuzz target in {file:?}: {source}")]
    InvalidTarget {
        file: PathBuf,
        #[source]
        source: TargetError,
    },
}

/// Rewrites user-supplied package patterns into patterns local to the project
/// directory, so the toolchain never falls back to searching outside the
/// current module.
///
/// `.` and patterns already starting with `./`, `../` or `/` are kept; any
/// other pattern gets a `./` prefix (`...` becomes `./...`, `sub` becomes
/// `./sub`). No patterns means the current package.
pub fn normalize_patterns<S: AsRef<str>>(patterns: &[S]) -> Vec<String> {
    if patterns.is_empty() {
        return vec![".".to_string()];
    }
    patterns
        .iter()
        .map(|p| {
            let p = p.as_ref();
            if p == "." || p.starts_with("./") || p.starts_with("../") || p.starts_with('/') {
                p.to_string()
            } else {
                format!("./{p}")
            }
        })
        .collect()
}

/// Returns every `func Fuzz<...>` declared in `source`, in source order.
///
/// This is a one-token lookback over the lexical token stream: methods
/// (`func (r T) FuzzX`) and function literals never match because the token
/// after `func` is not an identifier.
pub fn scan_entry_points(source: &[u8]) -> Vec<&str> {
    let mut found = Vec::new();
    let mut previous = None;
    for token in Scanner::new(source) {
        if let (Some(Token::Func), Token::Ident(name)) = (previous, token) {
            if name.starts_with(ENTRY_PREFIX) {
                found.push(name);
            }
        }
        previous = Some(token);
    }
    found
}

fn package_targets(package: &PackageRecord) -> Result<Vec<Target>, DiscoveryError> {
    let mut targets = Vec::new();
    for file in package.test_files() {
        let path = package.dir.join(file);
        let source = fs::read(&path).map_err(|source| DiscoveryError::ReadSource {
            path: path.clone(),
            source,
        })?;
        for name in scan_entry_points(&source) {
            let target = Target::new(name, &package.import_path, package.module_path())
                .map_err(|source| DiscoveryError::InvalidTarget {
                    file: path.clone(),
                    source,
                })?;
            targets.push(target);
        }
    }
    Ok(targets)
}

/// Finds all fuzz targets in the packages matched by `patterns`.
///
/// The lister is invoked once with all normalized patterns. Targets come back
/// in package order and then source order, but callers should treat the
/// result as a set: the toolchain does not promise a stable package order.
/// Finding no targets is not an error.
pub fn discover_targets<S: AsRef<str>>(
    lister: &dyn PackageLister,
    project_dir: &Path,
    patterns: &[S],
) -> Result<Vec<Target>, DiscoveryError> {
    let patterns = normalize_patterns(patterns);
    let packages = lister.list(project_dir, &patterns)?;

    let mut targets = Vec::new();
    for package in &packages {
        let found = package_targets(package)?;
        debug!(
            package = %package.import_path,
            count = found.len(),
            "scanned package for fuzz targets"
        );
        targets.extend(found);
    }
    Ok(targets)
}
