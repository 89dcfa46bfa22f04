use std::ffi::OsString;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// How often a running compiler is polled for exit, timeout and cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A program plus its arguments, ready to spawn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    /// Compiler executable.
    pub program: PathBuf,
    /// Arguments, in order.
    pub args: Vec<OsString>,
}

impl Invocation {
    /// Pair `program` with `args`.
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Value following the first occurrence of `flag`, e.g. the path after `/Fo`.
    pub fn flag_value(&self, flag: &str) -> Option<&Path> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(Path::new)
    }
}

/// Shell-like rendering for logs and failure reports; arguments with spaces are quoted.
impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_word(f, &self.program.to_string_lossy())?;
        for arg in &self.args {
            f.write_str(" ")?;
            write_word(f, &arg.to_string_lossy())?;
        }
        Ok(())
    }
}

fn write_word(f: &mut fmt::Formatter<'_>, word: &str) -> fmt::Result {
    if word.is_empty() || word.contains(char::is_whitespace) {
        write!(f, "\"{word}\"")
    } else {
        f.write_str(word)
    }
}

/// What a finished compiler process left behind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Whether the process reported success.
    pub success: bool,
    /// Exit code; `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// Why a compiler run produced no exit status.
#[derive(thiserror::Error, Debug)]
pub enum RunError {
    /// The process could not be started (missing binary, not executable, ...).
    #[error("failed to spawn '{}': {source}", program.display())]
    Spawn {
        /// Program that was requested.
        program: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the running process failed.
    #[error("failed to wait for compiler: {0}")]
    Wait(#[source] std::io::Error),

    /// The process, or its hold on the output pipes, outlived the configured limit.
    #[error("compiler did not finish within {0:?}")]
    Timeout(Duration),

    /// The run was cancelled and the process was killed.
    #[error("compilation cancelled")]
    Cancelled,
}

/// Shared cancellation flag, checked between units and while waiting on a compiler.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs one compiler invocation to completion.
///
/// This is the only place OS process handling happens; orchestration takes any
/// implementation, which is how it is tested without a real compiler.
pub trait CompilerRunner {
    /// Run `invocation` synchronously. A non-zero exit is `Ok` with `success == false`;
    /// `Err` means no exit status was obtained.
    fn run(
        &mut self,
        invocation: &Invocation,
        cancel: &CancelToken,
    ) -> Result<ProcessOutput, RunError>;
}

/// [`CompilerRunner`] that spawns real processes.
#[derive(Clone, Debug, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    /// Runner with no time limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill and fail any invocation that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Configured per-invocation limit.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn interrupted(&self, started: Instant, cancel: &CancelToken) -> Option<RunError> {
        if cancel.is_cancelled() {
            return Some(RunError::Cancelled);
        }
        match self.timeout {
            Some(limit) if started.elapsed() >= limit => Some(RunError::Timeout(limit)),
            _ => None,
        }
    }
}

impl CompilerRunner for ProcessRunner {
    fn run(
        &mut self,
        invocation: &Invocation,
        cancel: &CancelToken,
    ) -> Result<ProcessOutput, RunError> {
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RunError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        // Both pipes are drained on their own threads so a chatty compiler cannot block
        // on a full pipe while we poll for exit.
        let stdout_drain = spawn_drain(child.stdout.take());
        let stderr_drain = spawn_drain(child.stderr.take());

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait().map_err(RunError::Wait)? {
                break status;
            }
            if let Some(err) = self.interrupted(started, cancel) {
                kill(&mut child);
                return Err(err);
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        // A process the compiler left behind can keep the pipes open after it exits, so
        // the same limits apply until both drains have finished.
        while !drain_finished(&stdout_drain) || !drain_finished(&stderr_drain) {
            if let Some(err) = self.interrupted(started, cancel) {
                return Err(err);
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        Ok(ProcessOutput {
            success: status.success(),
            exit_code: status.code(),
            stdout: collect_drain(stdout_drain),
            stderr: collect_drain(stderr_drain),
        })
    }
}

type Drain = Option<JoinHandle<std::io::Result<Vec<u8>>>>;

fn spawn_drain<R: Read + Send + 'static>(pipe: Option<R>) -> Drain {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut bytes = Vec::new();
            pipe.read_to_end(&mut bytes)?;
            Ok(bytes)
        })
    })
}

fn drain_finished(drain: &Drain) -> bool {
    drain.as_ref().is_none_or(JoinHandle::is_finished)
}

fn collect_drain(drain: Drain) -> String {
    drain
        .and_then(|handle| handle.join().ok())
        .and_then(Result::ok)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

// Drains are not joined after a kill: a grandchild may still hold the pipes open.
fn kill(child: &mut Child) {
    if let Err(err) = child.kill() {
        tracing::warn!("failed to kill compiler process: {err}");
    }
    let _ = child.wait();
}

#[cfg(test)]
#[path = "../../tests/unit/compile/runner.rs"]
mod tests;
