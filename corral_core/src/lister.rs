use crate::discovery::DiscoveryError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ModuleRecord {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub main: bool,
}

/// One package as reported by `go list -json`.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct PackageRecord {
    pub dir: PathBuf,
    pub import_path: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub test_go_files: Vec<String>,
    #[serde(default)]
    pub x_test_go_files: Vec<String>,
    #[serde(default)]
    pub module: Option<ModuleRecord>,
}

impl PackageRecord {
    /// In-package test files followed by external (`_test` package) ones.
    pub fn test_files(&self) -> impl Iterator<Item = &str> {
        self.test_go_files
            .iter()
            .chain(self.x_test_go_files.iter())
            .map(String::as_str)
    }

    pub fn module_path(&self) -> &str {
        self.module.as_ref().map_or("", |m| m.path.as_str())
    }
}

/// Resolves package patterns to package records.
///
/// Implementations must not cache results between calls; the source tree may
/// change from one invocation to the next.
pub trait PackageLister: Send + Sync {
    /// Lists the packages matched by `patterns`, evaluated in `project_dir`.
    /// A pattern that matches nothing is an error.
    fn list(&self, project_dir: &Path, patterns: &[String])
    -> Result<Vec<PackageRecord>, DiscoveryError>;
}

/// [`PackageLister`] backed by `go list -find -json`.
#[derive(Debug, Clone)]
pub struct GoPackageLister {
    command: Vec<String>,
}

impl GoPackageLister {
    /// `command` is the toolchain invocation prefix, usually `["go"]`.
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl Default for GoPackageLister {
    fn default() -> Self {
        Self::new(vec!["go".to_string()])
    }
}

impl PackageLister for GoPackageLister {
    fn list(
        &self,
        project_dir: &Path,
        patterns: &[String],
    ) -> Result<Vec<PackageRecord>, DiscoveryError> {
        let (program, prefix_args) = self
            .command
            .split_first()
            .ok_or(DiscoveryError::EmptyToolchainCommand)?;

        let mut cmd = Command::new(program);
        cmd.args(prefix_args)
            .args(["list", "-find", "-json"])
            .args(patterns)
            .current_dir(project_dir);
        debug!(?cmd, "listing packages");

        let output = cmd.output().map_err(DiscoveryError::LaunchLister)?;
        if !output.status.success() {
            return Err(DiscoveryError::ListPackages {
                patterns: patterns.to_vec(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        decode_packages(&output.stdout)
    }
}

/// Decodes the stream of concatenated JSON objects printed by `go list -json`.
pub fn decode_packages(stdout: &[u8]) -> Result<Vec<PackageRecord>, DiscoveryError> {
    serde_json::Deserializer::from_slice(stdout)
        .into_iter::<PackageRecord>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(DiscoveryError::DecodePackages)
}
