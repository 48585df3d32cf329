use crate::classifier::{FailingInput, classify_target_output};
use crate::target::Target;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared flag used to abort the fuzz run in flight, e.g. from a Ctrl-C
/// handler. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Error, Debug)]
pub enum FuzzError {
    #[error("fuzz driver command is empty")]
    EmptyCommand,

    #[error("fuzz driver {program:?} is not installed")]
    DriverNotFound { program: String },

    #[error("cannot launch fuzz driver for {target}: {source}")]
    Launch {
        target: Target,
        #[source]
        source: io::Error,
    },

    #[error("fuzzing {target} was cancelled")]
    Cancelled { target: Target },

    #[error("error waiting for fuzz driver of {target}: {source}")]
    Wait {
        target: Target,
        #[source]
        source: io::Error,
    },

    #[error("cannot capture fuzz driver output for {target}: {source}")]
    CaptureOutput {
        target: Target,
        #[source]
        source: io::Error,
    },

    /// The driver exited abnormally without announcing a failing input.
    #[error("fuzzing {target} failed with an unexpected exit error: {status}")]
    UnexpectedFailure { target: Target, status: String },
}

impl FuzzError {
    /// Whether the error does not depend on the target being fuzzed: the
    /// driver could not be started, or the run was cancelled. Every remaining
    /// target would end the same way.
    pub fn is_launch_error(&self) -> bool {
        matches!(
            self,
            FuzzError::EmptyCommand
                | FuzzError::DriverNotFound { .. }
                | FuzzError::Launch { .. }
                | FuzzError::Cancelled { .. }
        )
    }
}

/// Runs a single fuzz target for a bounded time.
pub trait FuzzDriver {
    /// Fuzzes `target` for at most `duration`.
    ///
    /// Returns `Ok(None)` when no failing input was found within the budget
    /// and `Ok(Some(_))` with the classified input otherwise.
    fn fuzz(&mut self, target: &Target, duration: Duration)
    -> Result<Option<FailingInput>, FuzzError>;
}

#[derive(Debug, Clone)]
pub struct GoFuzzDriverConfig {
    /// Toolchain invocation prefix, usually `["go"]`.
    pub command: Vec<String>,
    /// Module root the driver runs in; corpus paths are relative to it.
    pub project_dir: PathBuf,
    /// Suppresses mirroring of the driver's stdout. Capture is unaffected.
    pub quiet: bool,
    pub poll_interval: Duration,
}

impl GoFuzzDriverConfig {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: vec!["go".to_string()],
            project_dir: project_dir.into(),
            quiet: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// [`FuzzDriver`] running `go test -fuzz` as a child process.
pub struct GoFuzzDriver {
    config: GoFuzzDriverConfig,
    cancel: CancelToken,
}

#[derive(Debug, Default)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
}

enum WaitOutcome {
    Exited(ExitStatus),
    Cancelled,
}

/// Formats a budget for `-test.fuzztime`. The toolchain treats a zero budget
/// as "no limit", so sub-millisecond budgets are rounded up to one
/// millisecond.
pub fn fuzztime_arg(duration: Duration) -> String {
    format!("{}ms", duration.as_millis().max(1))
}

pub fn fuzz_args(target: &Target, duration: Duration) -> Vec<String> {
    vec![
        "test".to_string(),
        "-test.run=^$".to_string(),
        format!("-test.fuzz=^{}$", target.name()),
        format!("-test.fuzztime={}", fuzztime_arg(duration)),
        target.package().to_string(),
    ]
}

/// Drains the child's stdout into a buffer, mirroring it to our own stdout
/// unless `quiet`. Mirroring errors are ignored so capture always completes.
fn spawn_capture(mut stdout: ChildStdout, quiet: bool) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut captured = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = match stdout.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            captured.extend_from_slice(&chunk[..n]);
            if !quiet {
                let mut out = io::stdout().lock();
                let _ = out.write_all(&chunk[..n]).and_then(|_| out.flush());
            }
        }
        Ok(captured)
    })
}

impl GoFuzzDriver {
    pub fn new(config: GoFuzzDriverConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn wait_or_cancel(&self, child: &mut Child) -> io::Result<WaitOutcome> {
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(WaitOutcome::Exited(status));
            }
            if self.cancel.is_cancelled() {
                warn!(pid = child.id(), "cancellation requested, killing fuzz driver");
                if let Err(e) = child.kill() {
                    warn!("failed to kill fuzz driver: {e}");
                }
                let _ = child.wait();
                return Ok(WaitOutcome::Cancelled);
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    /// Runs the driver for `target` and returns its exit status and captured
    /// stdout.
    pub fn run(&self, target: &Target, duration: Duration) -> Result<ProcessOutput, FuzzError> {
        let (program, prefix_args) = self
            .config
            .command
            .split_first()
            .ok_or(FuzzError::EmptyCommand)?;

        if self.cancel.is_cancelled() {
            return Err(FuzzError::Cancelled {
                target: target.clone(),
            });
        }

        let mut cmd = Command::new(program);
        cmd.args(prefix_args)
            .args(fuzz_args(target, duration))
            .current_dir(&self.config.project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        debug!(?cmd, "starting fuzz driver");

        let mut child = cmd.spawn().map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                FuzzError::DriverNotFound {
                    program: program.clone(),
                }
            } else {
                FuzzError::Launch {
                    target: target.clone(),
                    source,
                }
            }
        })?;

        let capture = match child.stdout.take() {
            Some(stdout) => spawn_capture(stdout, self.config.quiet),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(FuzzError::CaptureOutput {
                    target: target.clone(),
                    source: io::Error::other("child stdout was not piped"),
                });
            }
        };

        let status = match self.wait_or_cancel(&mut child) {
            Ok(WaitOutcome::Exited(status)) => status,
            // The capture thread is left to finish on its own: grandchildren
            // of the driver may still hold the pipe open.
            Ok(WaitOutcome::Cancelled) => {
                return Err(FuzzError::Cancelled {
                    target: target.clone(),
                });
            }
            Err(source) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(FuzzError::Wait {
                    target: target.clone(),
                    source,
                });
            }
        };

        let stdout = capture
            .join()
            .map_err(|_| FuzzError::CaptureOutput {
                target: target.clone(),
                source: io::Error::other("output capture thread panicked"),
            })?
            .map_err(|source| FuzzError::CaptureOutput {
                target: target.clone(),
                source,
            })?;

        let mut output = ProcessOutput {
            stdout,
            exit_code: status.code(),
            signal: None,
        };
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            output.signal = status.signal();
        }
        if !output.success() {
            debug!(target = %target, status = %output.describe(), "fuzz driver failed");
        }
        Ok(output)
    }
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    fn describe(&self) -> String {
        match (self.exit_code, self.signal) {
            (Some(code), _) => format!("exited with code {code}"),
            (None, Some(signal)) => format!("terminated by signal {signal}"),
            (None, None) => "exited abnormally".to_string(),
        }
    }
}

/// Interprets a finished driver run for `target`.
///
/// A clean exit is a pass. Any other exit must carry one of the driver's
/// failure announcements; otherwise the run is an unexpected failure.
pub fn interpret_run(
    target: &Target,
    output: &ProcessOutput,
) -> Result<Option<FailingInput>, FuzzError> {
    if output.success() {
        return Ok(None);
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    match classify_target_output(&stdout, &target.corpus_dir(), target.name()) {
        Some(input) => Ok(Some(input)),
        None => Err(FuzzError::UnexpectedFailure {
            target: target.clone(),
            status: output.describe(),
        }),
    }
}

impl FuzzDriver for GoFuzzDriver {
    fn fuzz(
        &mut self,
        target: &Target,
        duration: Duration,
    ) -> Result<Option<FailingInput>, FuzzError> {
        let output = self.run(target, duration)?;
        interpret_run(target, &output)
    }
}
