use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Prefix the toolchain uses for seed values added programmatically with
/// `f.Add(...)`. Such seeds have no backing corpus file.
const PROGRAMMATIC_SEED_PREFIX: &str = "seed#";

// Entry point names and input ids are matched as ASCII only, as the toolchain
// prints them. A run announcing anything else is an unexpected failure.

// For a newly discovered input the driver prints
//   Failing input written to testdata/fuzz/FuzzTarget/0a7e5e21...
//   To re-run:
//   go test -run=FuzzTarget/0a7e5e21...
// and the last line carries the entry point and the content hash.
static NEW_INPUT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*go test -run=(Fuzz[a-zA-Z0-9_]*)/([a-zA-Z0-9#]+)")
        .expect("new input pattern is valid")
});

// For inputs already in the seed corpus the driver prints either
//   failure while testing seed corpus entry: FuzzTarget/seed#0
// or the same line with a content hash for seeds stored under testdata.
static SEED_INPUT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*failure while testing seed corpus entry: (Fuzz[a-zA-Z0-9_]*)/([a-zA-Z0-9#]+)")
        .expect("seed input pattern is valid")
});

/// The one failing input a fuzz run can report.
///
/// The driver stops at the first failure, so a run yields at most one of
/// these. The variant fixes whether a corpus file backs the input: only
/// [`FailingInput::Seed`] has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailingInput {
    /// An input discovered during this run and written to the local corpus.
    New { id: String, file: PathBuf },
    /// A programmatic seed (`seed#<n>`) that failed during corpus replay.
    Seed { id: String },
    /// A seed corpus file that failed during corpus replay.
    SeedFile { id: String, file: PathBuf },
}

impl FailingInput {
    pub fn id(&self) -> &str {
        match self {
            FailingInput::New { id, .. }
            | FailingInput::Seed { id }
            | FailingInput::SeedFile { id, .. } => id,
        }
    }

    /// Corpus file backing this input, relative to the module root.
    pub fn file(&self) -> Option<&Path> {
        match self {
            FailingInput::New { file, .. } | FailingInput::SeedFile { file, .. } => Some(file),
            FailingInput::Seed { .. } => None,
        }
    }

    pub fn is_seed(&self) -> bool {
        !matches!(self, FailingInput::New { .. })
    }
}

impl fmt::Display for FailingInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_seed() { "seed" } else { "new" };
        match self.file() {
            Some(file) => write!(f, "failing {kind} input, saved at {}", file.display()),
            None => write!(f, "failing {kind} input: {}", self.id()),
        }
    }
}

/// Scans the captured stdout of a failed fuzz run for the driver's failure
/// announcement.
///
/// `corpus_dir` is the target's corpus directory relative to the module root;
/// file-backed inputs are reported as `corpus_dir/<id>`. The first matching
/// line wins. `None` means the output did not follow the driver's protocol,
/// which callers must treat as an unexpected failure rather than a pass.
pub fn classify_output(output: &str, corpus_dir: &Path) -> Option<FailingInput> {
    for line in output.lines() {
        if let Some(caps) = NEW_INPUT_LINE.captures(line) {
            let id = caps[2].to_string();
            return Some(FailingInput::New {
                file: corpus_dir.join(&id),
                id,
            });
        }

        if let Some(caps) = SEED_INPUT_LINE.captures(line) {
            let id = caps[2].to_string();
            if id.starts_with(PROGRAMMATIC_SEED_PREFIX) {
                return Some(FailingInput::Seed { id });
            }
            return Some(FailingInput::SeedFile {
                file: corpus_dir.join(&id),
                id,
            });
        }
    }
    None
}

/// Like [`classify_output`], additionally warning when the announced entry
/// point is not the one that was run.
pub fn classify_target_output(
    output: &str,
    corpus_dir: &Path,
    entry_point: &str,
) -> Option<FailingInput> {
    let announced = output.lines().find_map(|line| {
        NEW_INPUT_LINE
            .captures(line)
            .or_else(|| SEED_INPUT_LINE.captures(line))
            .map(|caps| caps[1].to_string())
    });
    if let Some(announced) = announced.filter(|name| name != entry_point) {
        warn!(
            expected = entry_point,
            announced = %announced,
            "driver reported a failure for a different entry point"
        );
    }
    classify_output(output, corpus_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "0a7e5e215d8c088d4b9c4993d0189a07e81603fbdf64f2ca44738aa27159acef";

    fn corpus_dir() -> PathBuf {
        PathBuf::from("sub/testdata/fuzz/FuzzTarget")
    }

    fn new_input_output() -> String {
        format!(
            "fuzz: elapsed: 0s, gathering baseline coverage: 0/1 completed\n\
             --- FAIL: FuzzTarget (0.05s)\n\
             \x20   --- FAIL: FuzzTarget (0.00s)\n\
             \x20       main_test.go:10: \n\
             \n\
             \x20   Failing input written to testdata/fuzz/FuzzTarget/{HASH}\n\
             \x20   To re-run:\n\
             \x20   go test -run=FuzzTarget/{HASH}\n\
             FAIL\n\
             exit status 1\n\
             FAIL\tsub\t0.061s\n"
        )
    }

    #[test]
    fn new_input_is_classified_with_corpus_file() {
        let result = classify_output(&new_input_output(), &corpus_dir());
        assert_eq!(
            result,
            Some(FailingInput::New {
                id: HASH.to_string(),
                file: corpus_dir().join(HASH),
            })
        );
        let input = result.unwrap();
        assert!(!input.is_seed());
        assert_eq!(input.id(), HASH);
    }

    #[test]
    fn programmatic_seed_has_no_file() {
        let output = "--- FAIL: FuzzTarget (0.00s)\n\
                      \x20   --- FAIL: FuzzTarget/seed#0 (0.00s)\n\
                      \x20       main_test.go:8: \n\
                      \x20   failure while testing seed corpus entry: FuzzTarget/seed#0\n\
                      FAIL\n";
        let result = classify_output(output, &corpus_dir()).unwrap();
        assert_eq!(
            result,
            FailingInput::Seed {
                id: "seed#0".to_string()
            }
        );
        assert!(result.is_seed());
        assert_eq!(result.file(), None);
    }

    #[test]
    fn file_backed_seed_has_corpus_file() {
        let output = format!("    failure while testing seed corpus entry: FuzzTarget/{HASH}\n");
        let result = classify_output(&output, &corpus_dir()).unwrap();
        assert_eq!(
            result,
            FailingInput::SeedFile {
                id: HASH.to_string(),
                file: corpus_dir().join(HASH),
            }
        );
        assert!(result.is_seed());
        assert_eq!(
            result.file(),
            Some(Path::new("sub/testdata/fuzz/FuzzTarget").join(HASH).as_path())
        );
    }

    #[test]
    fn first_matching_line_wins() {
        let output = format!(
            "failure while testing seed corpus entry: FuzzTarget/seed#3\n\
             go test -run=FuzzTarget/{HASH}\n"
        );
        assert_eq!(
            classify_output(&output, &corpus_dir()),
            Some(FailingInput::Seed {
                id: "seed#3".to_string()
            })
        );
    }

    #[test]
    fn unrecognised_output_yields_none() {
        let output = "panic: runtime error: index out of range\n\
                      goroutine 1 [running]:\n\
                      FAIL\tsub\t0.010s\n";
        assert_eq!(classify_output(output, &corpus_dir()), None);
        assert_eq!(classify_output("", &corpus_dir()), None);
    }

    #[test]
    fn announcement_must_start_the_line() {
        let output = format!("note: go test -run=FuzzTarget/{HASH}\n");
        assert_eq!(classify_output(&output, &corpus_dir()), None);
    }

    #[test]
    fn only_fuzz_entry_points_are_recognised() {
        let output = format!("    go test -run=PropDecode/{HASH}\n");
        assert_eq!(classify_output(&output, &corpus_dir()), None);

        let output = format!("    go test -run={}Decode/{HASH}\n", crate::discovery::ENTRY_PREFIX);
        assert!(classify_output(&output, &corpus_dir()).is_some());
    }

    #[test]
    fn non_ascii_announcement_is_not_classified() {
        let output = "    go test -run=FuzzDécodage/abc\n\
                      failure while testing seed corpus entry: FuzzCafé/seed#0\n";
        assert_eq!(classify_output(output, &corpus_dir()), None);
    }

    #[test]
    fn classification_is_deterministic() {
        let output = new_input_output();
        assert_eq!(
            classify_output(&output, &corpus_dir()),
            classify_output(&output, &corpus_dir())
        );
    }

    #[test]
    fn target_aware_classification_matches_plain_classification() {
        let output = new_input_output();
        assert_eq!(
            classify_target_output(&output, &corpus_dir(), "FuzzOther"),
            classify_output(&output, &corpus_dir())
        );
    }

    #[test]
    fn display_describes_variant() {
        let new = FailingInput::New {
            id: "abc".to_string(),
            file: PathBuf::from("testdata/fuzz/FuzzT/abc"),
        };
        assert_eq!(
            new.to_string(),
            "failing new input, saved at testdata/fuzz/FuzzT/abc"
        );
        let seed = FailingInput::Seed {
            id: "seed#1".to_string(),
        };
        assert_eq!(seed.to_string(), "failing seed input: seed#1");
    }
}
