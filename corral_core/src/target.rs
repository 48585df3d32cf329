use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Directory, relative to a package, under which the Go toolchain keeps
/// per-entry-point corpus directories.
pub const CORPUS_SUBDIR: &str = "testdata/fuzz";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    #[error("entry point name must not be empty (package {package:?})")]
    EmptyName { package: String },
    #[error("package {package:?} is not nested under module {root_package:?}")]
    OutsideModule {
        package: String,
        root_package: String,
    },
}

/// A single fuzzable entry point.
///
/// A target is identified by the triple `(name, package, root_package)`.
/// `package` is always either equal to `root_package` or nested under it
/// with a `/`-separated suffix, and that suffix is the package's directory
/// relative to the module root. [`Target::new`] enforces this so that
/// [`Target::corpus_dir`] can never fail.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Target {
    name: String,
    package: String,
    root_package: String,
}

impl Target {
    pub fn new(
        name: impl Into<String>,
        package: impl Into<String>,
        root_package: impl Into<String>,
    ) -> Result<Self, TargetError> {
        let target = Self {
            name: name.into(),
            package: package.into(),
            root_package: root_package.into(),
        };
        if target.name.is_empty() {
            return Err(TargetError::EmptyName {
                package: target.package,
            });
        }
        if target.relative_package().is_none() {
            return Err(TargetError::OutsideModule {
                package: target.package,
                root_package: target.root_package,
            });
        }
        Ok(target)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn root_package(&self) -> &str {
        &self.root_package
    }

    /// Suffix of `package` below `root_package`, empty for the root package.
    /// An empty `root_package` (package outside any module) yields the whole
    /// import path.
    fn relative_package(&self) -> Option<&str> {
        if self.root_package.is_empty() {
            return Some(&self.package);
        }
        if self.package == self.root_package {
            return Some("");
        }
        self.package
            .strip_prefix(&self.root_package)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty())
    }

    /// Corpus directory of this target relative to the module root:
    /// `<package-relative-dir>/testdata/fuzz/<name>`.
    pub fn corpus_dir(&self) -> PathBuf {
        let mut dir = PathBuf::new();
        if let Some(relative) = self.relative_package() {
            for segment in relative.split('/').filter(|s| !s.is_empty()) {
                dir.push(segment);
            }
        }
        dir.push(CORPUS_SUBDIR);
        dir.push(&self.name);
        dir
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.package, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn root_package_target_maps_to_testdata_directly() {
        let target = Target::new("FuzzTarget", "discover", "discover").unwrap();
        assert_eq!(
            target.corpus_dir(),
            Path::new("testdata/fuzz/FuzzTarget"),
            "Root package corpus lives directly under testdata/fuzz"
        );
    }

    #[test]
    fn nested_package_target_keeps_relative_path() {
        let target = Target::new(
            "FuzzSubTarget",
            "github.com/acme/svc/internal/codec",
            "github.com/acme/svc",
        )
        .unwrap();
        assert_eq!(
            target.corpus_dir(),
            Path::new("internal/codec/testdata/fuzz/FuzzSubTarget")
        );
    }

    #[test]
    fn changing_only_the_name_changes_only_the_last_segment() {
        let a = Target::new("FuzzA", "mod/sub", "mod").unwrap();
        let b = Target::new("FuzzB", "mod/sub", "mod").unwrap();
        let a_dir = a.corpus_dir();
        let b_dir = b.corpus_dir();
        assert_eq!(a_dir.parent(), b_dir.parent());
        assert_eq!(a_dir.file_name().unwrap(), "FuzzA");
        assert_eq!(b_dir.file_name().unwrap(), "FuzzB");
        assert_eq!(
            a.corpus_dir(),
            Target::new("FuzzA", "mod/sub", "mod").unwrap().corpus_dir(),
            "Same triple must always map to the same path"
        );
    }

    #[test]
    fn package_sharing_a_string_prefix_is_not_nested() {
        let result = Target::new("FuzzX", "modular/pkg", "mod");
        assert_eq!(
            result,
            Err(TargetError::OutsideModule {
                package: "modular/pkg".to_string(),
                root_package: "mod".to_string(),
            })
        );
    }

    #[test]
    fn empty_module_path_uses_whole_import_path() {
        let target = Target::new("FuzzGopath", "example/pkg", "").unwrap();
        assert_eq!(
            target.corpus_dir(),
            Path::new("example/pkg/testdata/fuzz/FuzzGopath")
        );
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(matches!(
            Target::new("", "mod", "mod"),
            Err(TargetError::EmptyName { .. })
        ));
    }

    #[test]
    fn display_joins_package_and_name() {
        let target = Target::new("FuzzTarget", "mod/sub", "mod").unwrap();
        assert_eq!(target.to_string(), "mod/sub#FuzzTarget");
    }
}
