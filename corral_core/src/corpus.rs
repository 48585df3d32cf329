use crate::classifier::FailingInput;
use crate::copy::{copy_dir, copy_file};
use crate::discovery::DiscoveryError;
use crate::target::Target;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Defines errors that can arise during corpus operations.
///
/// Every filesystem error names the target it happened for and, for copies,
/// both ends of the copy, so the failing direction is obvious. The first error
/// aborts the operation; targets processed before it stay processed.
#[derive(Error, Debug)]
pub enum CorpusError {
    /// Resolving package patterns to targets failed before any file I/O.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// A destination directory could not be created.
    #[error("cannot create corpus directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Copying a corpus directory (or a single input) failed.
    #[error("copying corpus of {target} from {from:?} to {to:?} failed: {source}")]
    Copy {
        target: Target,
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Removing a local corpus directory failed.
    #[error("error deleting corpus entries for {target} located at {path:?}: {source}")]
    Delete {
        target: Target,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Copies every existing local corpus directory into `destination`,
/// mirroring the per-package layout.
///
/// # Arguments
/// * `project_dir`: Module root holding the local corpora.
/// * `destination`: Root of the snapshot. Created if at least one target is
///   given.
/// * `targets`: Targets whose corpora to extract. Targets without a local
///   corpus directory are skipped; having no recorded inputs is normal.
///
/// # Returns
/// The number of corpus directories copied.
pub fn extract(
    project_dir: &Path,
    destination: &Path,
    targets: &[Target],
) -> Result<usize, CorpusError> {
    if targets.is_empty() {
        return Ok(0);
    }
    fs::create_dir_all(destination).map_err(|source| CorpusError::CreateDir {
        path: destination.to_path_buf(),
        source,
    })?;

    let mut copied = 0;
    for target in targets {
        let corpus_dir = target.corpus_dir();
        let local = project_dir.join(&corpus_dir);
        if !local.is_dir() {
            debug!(target = %target, "no local corpus, skipping");
            continue;
        }

        let external = destination.join(&corpus_dir);
        copy_dir(&local, &external).map_err(|source| CorpusError::Copy {
            target: target.clone(),
            from: local.clone(),
            to: external.clone(),
            source,
        })?;
        copied += 1;
    }
    info!("extracted {copied} corpus directories to {destination:?}");
    Ok(copied)
}

/// Removes the local corpus directory of every target.
///
/// Removing a directory that does not exist is not an error, so the
/// operation is idempotent.
pub fn delete(project_dir: &Path, targets: &[Target]) -> Result<(), CorpusError> {
    for target in targets {
        let local = project_dir.join(target.corpus_dir());
        match fs::remove_dir_all(&local) {
            Ok(()) => debug!(target = %target, "deleted local corpus"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(CorpusError::Delete {
                    target: target.clone(),
                    path: local,
                    source,
                });
            }
        }
    }
    Ok(())
}

/// Adds the inputs of an external snapshot to the local corpora.
///
/// The merge is an additive union: local entries without a counterpart in the
/// snapshot are kept, entries present in both are overwritten by the
/// snapshot's copy. Targets absent from the snapshot are skipped, matching
/// what [`extract`] produces for targets without a corpus.
///
/// # Returns
/// The number of corpus directories merged.
pub fn merge(
    project_dir: &Path,
    external: &Path,
    targets: &[Target],
) -> Result<usize, CorpusError> {
    let mut merged = 0;
    for target in targets {
        let corpus_dir = target.corpus_dir();
        let snapshot = external.join(&corpus_dir);
        if !snapshot.is_dir() {
            debug!(target = %target, "no external corpus, skipping");
            continue;
        }

        let local = project_dir.join(&corpus_dir);
        copy_dir(&snapshot, &local).map_err(|source| CorpusError::Copy {
            target: target.clone(),
            from: snapshot.clone(),
            to: local.clone(),
            source,
        })?;
        merged += 1;
    }
    info!("merged {merged} corpus directories from {external:?}");
    Ok(merged)
}

/// Makes the local corpora of `targets` an exact copy of the snapshot:
/// [`delete`] followed by [`merge`].
pub fn replace(
    project_dir: &Path,
    external: &Path,
    targets: &[Target],
) -> Result<usize, CorpusError> {
    delete(project_dir, targets)?;
    merge(project_dir, external, targets)
}

/// Copies the corpus file backing `input` from the project into `out_dir`,
/// keeping its relative path (`<pkg>/testdata/fuzz/<Name>/<id>`).
///
/// # Returns
/// The path written, or `None` for programmatic seeds, which have no file.
pub fn save_failing_input(
    project_dir: &Path,
    out_dir: &Path,
    target: &Target,
    input: &FailingInput,
) -> Result<Option<PathBuf>, CorpusError> {
    let Some(file) = input.file() else {
        return Ok(None);
    };
    let src = project_dir.join(file);
    let dest = out_dir.join(file);
    copy_file(&src, &dest).map_err(|source| CorpusError::Copy {
        target: target.clone(),
        from: src.clone(),
        to: dest.clone(),
        source,
    })?;
    Ok(Some(dest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;
    use walkdir::WalkDir;

    const HASH: &str = "0a7e5e215d8c088d4b9c4993d0189a07e81603fbdf64f2ca44738aa27159acef";

    /// Relative path -> content for every file under `dir`.
    fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
        WalkDir::new(dir)
            .into_iter()
            .map(|e| e.unwrap())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let rel = e.path().strip_prefix(dir).unwrap();
                (
                    rel.to_string_lossy().replace('\\', "/"),
                    fs::read(e.path()).unwrap(),
                )
            })
            .collect()
    }

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn targets() -> Vec<Target> {
        vec![
            Target::new("FuzzTarget", "multiple", "multiple").unwrap(),
            Target::new("FuzzSubTarget", "multiple/sub", "multiple").unwrap(),
            Target::new("FuzzSubTarget", "multiple/nocorpus", "multiple").unwrap(),
        ]
    }

    /// Module with corpora for two of the three targets plus one orphaned
    /// corpus directory that belongs to no target.
    fn project() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "go.mod", b"module multiple\n");
        write(root, "main_test.go", b"package multiple\n");
        write(root, "sub/main_test.go", b"package sub\n");
        write(root, "nocorpus/main_test.go", b"package nocorpus\n");
        write(root, &format!("testdata/fuzz/FuzzTarget/{HASH}"), b"root");
        write(root, &format!("sub/testdata/fuzz/FuzzSubTarget/{HASH}"), b"sub");
        write(
            root,
            &format!("sub/testdata/fuzz/FuzzNonExistingTarget/{HASH}"),
            b"orphan",
        );
        dir
    }

    #[test]
    fn extract_copies_only_existing_corpora() {
        let project = project();
        let out = tempdir().unwrap();

        let copied = extract(project.path(), out.path(), &targets()).unwrap();

        assert_eq!(copied, 2);
        let files: Vec<_> = snapshot(out.path()).into_keys().collect();
        assert_eq!(
            files,
            vec![
                format!("sub/testdata/fuzz/FuzzSubTarget/{HASH}"),
                format!("testdata/fuzz/FuzzTarget/{HASH}"),
            ]
        );
    }

    #[test]
    fn extract_with_no_targets_creates_nothing() {
        let project = project();
        let out = tempdir().unwrap();
        let destination = out.path().join("never");

        assert_eq!(extract(project.path(), &destination, &[]).unwrap(), 0);
        assert!(!destination.exists());
    }

    #[test]
    fn delete_removes_only_target_corpora_and_is_idempotent() {
        let project = project();

        delete(project.path(), &targets()).unwrap();
        delete(project.path(), &targets()).unwrap();

        let files: Vec<_> = snapshot(project.path()).into_keys().collect();
        assert_eq!(
            files,
            vec![
                "go.mod".to_string(),
                "main_test.go".to_string(),
                "nocorpus/main_test.go".to_string(),
                "sub/main_test.go".to_string(),
                format!("sub/testdata/fuzz/FuzzNonExistingTarget/{HASH}"),
            ],
            "Orphaned corpora without a matching target must survive"
        );
    }

    #[test]
    fn merge_is_additive() {
        let project = project();
        let external = tempdir().unwrap();
        write(external.path(), "testdata/fuzz/FuzzTarget/fresh", b"new");
        write(external.path(), "nocorpus/testdata/fuzz/FuzzSubTarget/x", b"x");

        let merged = merge(project.path(), external.path(), &targets()).unwrap();

        assert_eq!(merged, 2);
        let files = snapshot(project.path());
        assert_eq!(files[&format!("testdata/fuzz/FuzzTarget/{HASH}")], b"root");
        assert_eq!(files["testdata/fuzz/FuzzTarget/fresh"], b"new");
        assert_eq!(files["nocorpus/testdata/fuzz/FuzzSubTarget/x"], b"x");
        assert_eq!(files[&format!("sub/testdata/fuzz/FuzzSubTarget/{HASH}")], b"sub");
    }

    #[test]
    fn extract_delete_merge_round_trips() {
        let project = project();
        let before = snapshot(project.path());
        let out = tempdir().unwrap();

        extract(project.path(), out.path(), &targets()).unwrap();
        delete(project.path(), &targets()).unwrap();
        assert_ne!(snapshot(project.path()), before);
        merge(project.path(), out.path(), &targets()).unwrap();

        assert_eq!(snapshot(project.path()), before);
    }

    #[test]
    fn replace_equals_delete_then_merge() {
        let external = tempdir().unwrap();
        write(external.path(), "testdata/fuzz/FuzzTarget/only", b"ext");
        write(external.path(), "sub/testdata/fuzz/FuzzSubTarget/other", b"ext2");

        let replaced = project();
        replace(replaced.path(), external.path(), &targets()).unwrap();

        let composed = project();
        delete(composed.path(), &targets()).unwrap();
        merge(composed.path(), external.path(), &targets()).unwrap();

        let replaced_files = snapshot(replaced.path());
        assert_eq!(replaced_files, snapshot(composed.path()));
        assert!(
            !replaced_files.contains_key(&format!("testdata/fuzz/FuzzTarget/{HASH}")),
            "Stale local entries must be gone after replace"
        );
        assert_eq!(replaced_files["testdata/fuzz/FuzzTarget/only"], b"ext");
    }

    #[test]
    fn copy_failure_names_target_and_direction() {
        let project = project();
        let out = tempdir().unwrap();
        // A file where the destination directory should go.
        write(out.path(), "sub", b"blocker");

        let result = extract(project.path(), out.path(), &targets());
        match result {
            Err(CorpusError::Copy {
                target, from, to, ..
            }) => {
                assert_eq!(target.package(), "multiple/sub");
                assert_eq!(from, project.path().join("sub/testdata/fuzz/FuzzSubTarget"));
                assert_eq!(to, out.path().join("sub/testdata/fuzz/FuzzSubTarget"));
            }
            other => panic!("Expected Copy error, got {other:?}"),
        }
    }

    #[test]
    fn save_failing_input_copies_backing_file() {
        let project = project();
        let out = tempdir().unwrap();
        let target = Target::new("FuzzSubTarget", "multiple/sub", "multiple").unwrap();
        let input = FailingInput::New {
            id: HASH.to_string(),
            file: target.corpus_dir().join(HASH),
        };

        let saved = save_failing_input(project.path(), out.path(), &target, &input)
            .unwrap()
            .unwrap();

        assert_eq!(saved, out.path().join(format!("sub/testdata/fuzz/FuzzSubTarget/{HASH}")));
        assert_eq!(fs::read(saved).unwrap(), b"sub");
    }

    #[test]
    fn save_failing_input_skips_programmatic_seeds() {
        let project = project();
        let out = tempdir().unwrap();
        let target = Target::new("FuzzTarget", "multiple", "multiple").unwrap();
        let input = FailingInput::Seed {
            id: "seed#0".to_string(),
        };

        assert_eq!(
            save_failing_input(project.path(), out.path(), &target, &input).unwrap(),
            None
        );
        assert!(snapshot(out.path()).is_empty());
    }
}
