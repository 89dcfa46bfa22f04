use std::fmt;
use std::time::Duration;

use crate::compile::runner::{CancelToken, CompilerRunner, Invocation, RunError};
use crate::compile::unit::{BuildConfig, CompileUnit};
use crate::foundation::error::{ShaderError, ShaderResult};
use crate::foundation::fs::{ensure_dir, ensure_parent_dir};
use crate::manifest::model::ShaderManifest;

/// How a single unit ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// The compiler exited with success.
    Succeeded,
    /// The shader's source file does not exist; the compiler was not invoked.
    SourceFileMissing,
    /// The compiler could not be started or waited on.
    InvocationFailed {
        /// Human-readable cause.
        cause: String,
    },
    /// The compiler ran and reported failure.
    ExitNonZero {
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
        /// Command line that was run.
        command: String,
    },
    /// The compiler was killed after exceeding the per-invocation limit.
    TimedOut {
        /// The limit that was exceeded.
        limit: Duration,
    },
    /// The run was cancelled before or while this unit was compiling.
    Cancelled,
}

/// Result of one unit: what was compiled and how it went.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileOutcome {
    /// The unit this outcome belongs to.
    pub unit: CompileUnit,
    /// How it ended.
    pub status: OutcomeStatus,
}

impl CompileOutcome {
    /// Pair `unit` with `status`.
    pub fn new(unit: CompileUnit, status: OutcomeStatus) -> Self {
        Self { unit, status }
    }

    /// Whether the unit compiled.
    pub fn success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Succeeded)
    }

    /// Compiler exit code, when the compiler ran and exited with one.
    pub fn exit_code(&self) -> Option<i32> {
        match &self.status {
            OutcomeStatus::Succeeded => Some(0),
            OutcomeStatus::ExitNonZero { code, .. } => *code,
            _ => None,
        }
    }

    /// Captured compiler diagnostics, for failed runs that produced any.
    pub fn diagnostics(&self) -> Option<&str> {
        match &self.status {
            OutcomeStatus::ExitNonZero { stderr, .. } => Some(stderr.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for CompileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self.unit.label();
        match &self.status {
            OutcomeStatus::Succeeded => write!(f, "{label}: ok"),
            OutcomeStatus::SourceFileMissing => write!(
                f,
                "{label}: shader source file not found: '{}'",
                self.unit.source.display()
            ),
            OutcomeStatus::InvocationFailed { cause } => {
                write!(f, "{label}: failed to invoke compiler: {cause}")
            }
            OutcomeStatus::ExitNonZero {
                code,
                stderr,
                command,
            } => {
                match code {
                    Some(code) => write!(f, "{label}: compiler exited with code {code}")?,
                    None => write!(f, "{label}: compiler was terminated by a signal")?,
                }
                write!(f, "\n  command: {command}")?;
                let stderr = stderr.trim_end();
                if !stderr.is_empty() {
                    write!(f, "\n{stderr}")?;
                }
                Ok(())
            }
            OutcomeStatus::TimedOut { limit } => {
                write!(f, "{label}: compiler timed out after {limit:?}")
            }
            OutcomeStatus::Cancelled => write!(f, "{label}: cancelled"),
        }
    }
}

/// Aggregated result of a whole build.
#[derive(Debug, Default)]
pub struct BuildResult {
    /// One outcome per attempted unit, in manifest order.
    pub outcomes: Vec<CompileOutcome>,
    /// Set when a precondition failed and no unit was attempted.
    pub aborted: Option<ShaderError>,
}

impl BuildResult {
    /// True iff nothing aborted the run and every unit compiled.
    pub fn success(&self) -> bool {
        self.aborted.is_none() && self.outcomes.iter().all(CompileOutcome::success)
    }

    /// Failing outcomes, in order.
    pub fn failures(&self) -> impl Iterator<Item = &CompileOutcome> {
        self.outcomes.iter().filter(|o| !o.success())
    }

    /// Process exit code for this result: `0` on success, `1` otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.success() { 0 } else { 1 }
    }

    fn abort(err: ShaderError) -> Self {
        Self {
            outcomes: Vec::new(),
            aborted: Some(err),
        }
    }
}

/// Compiles every shader in a manifest, one stage at a time.
///
/// Failures of individual units are recorded and the batch continues; only a failed
/// precondition (output directories, source directory) stops the run early.
pub struct ShaderCompiler<'m, R> {
    manifest: &'m ShaderManifest,
    runner: R,
    config: BuildConfig,
    cancel: CancelToken,
}

impl<'m, R: CompilerRunner> ShaderCompiler<'m, R> {
    /// Compiler over `manifest` using `runner` with the default (debug) configuration.
    pub fn new(manifest: &'m ShaderManifest, runner: R) -> Self {
        Self {
            manifest,
            runner,
            config: BuildConfig::default(),
            cancel: CancelToken::new(),
        }
    }

    /// Select the build configuration.
    pub fn with_config(mut self, config: BuildConfig) -> Self {
        self.config = config;
        self
    }

    /// Observe `cancel` between units and while a compiler is running.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Borrow the runner.
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Give back the runner.
    pub fn into_runner(self) -> R {
        self.runner
    }

    /// Compile every graphics shader (VS then PS) and then every compute shader, in
    /// manifest order, without stopping at the first failure.
    #[tracing::instrument(skip(self), fields(config = %self.config))]
    pub fn compile_all(&mut self) -> BuildResult {
        // Not logged here: the caller reports `aborted`.
        if let Err(err) = self.check_preconditions() {
            return BuildResult::abort(err);
        }

        let mut result = BuildResult::default();
        for (kind, shader) in self.manifest.shaders() {
            tracing::info!("Compiling {kind} shader: {}", shader.name);

            let source = self.manifest.source_dir.join(&shader.source);
            let source_present = source.is_file();
            if !source_present {
                tracing::debug!("shader source file not found: '{}'", source.display());
            }

            for &stage in kind.stages() {
                let unit = CompileUnit::new(self.manifest, shader, stage);
                let outcome = if self.cancel.is_cancelled() {
                    CompileOutcome::new(unit, OutcomeStatus::Cancelled)
                } else if !source_present {
                    CompileOutcome::new(unit, OutcomeStatus::SourceFileMissing)
                } else {
                    self.invoke(unit)
                };
                result.outcomes.push(outcome);
            }
        }

        let failed = result.failures().count();
        if failed == 0 {
            tracing::info!(units = result.outcomes.len(), "build succeeded");
        } else {
            tracing::warn!(units = result.outcomes.len(), failed, "build failed");
        }
        result
    }

    /// Run the compiler for one unit and classify the result. Never panics or returns
    /// early on compiler failure; everything ends up in the outcome.
    pub fn invoke(&mut self, unit: CompileUnit) -> CompileOutcome {
        let label = unit.label();

        let dirs = ensure_parent_dir(&unit.output).and_then(|()| match &unit.header {
            Some(header) => ensure_parent_dir(header),
            None => Ok(()),
        });
        if let Err(err) = dirs {
            tracing::debug!("{label}: {err:#}");
            let cause = format!("{err:#}");
            return CompileOutcome::new(unit, OutcomeStatus::InvocationFailed { cause });
        }

        let invocation = Invocation::new(
            self.manifest.compiler_path.clone(),
            unit.compiler_args(self.config),
        );
        tracing::debug!(command = %invocation, "invoking compiler for {label}");

        let status = match self.runner.run(&invocation, &self.cancel) {
            Ok(output) if output.success => {
                if !output.stderr.trim().is_empty() {
                    tracing::warn!("{label}: {}", output.stderr.trim_end());
                }
                OutcomeStatus::Succeeded
            }
            Ok(output) => OutcomeStatus::ExitNonZero {
                code: output.exit_code,
                stderr: output.stderr,
                command: invocation.to_string(),
            },
            Err(RunError::Timeout(limit)) => OutcomeStatus::TimedOut { limit },
            Err(RunError::Cancelled) => OutcomeStatus::Cancelled,
            Err(err) => OutcomeStatus::InvocationFailed {
                cause: err.to_string(),
            },
        };

        let outcome = CompileOutcome::new(unit, status);
        if outcome.success() {
            tracing::debug!("{label}: compiled");
        } else {
            tracing::debug!("{outcome}");
        }
        outcome
    }

    fn check_preconditions(&self) -> ShaderResult<()> {
        ensure_dir(&self.manifest.output_dir)?;
        if let Some(dir) = &self.manifest.header_output_dir {
            ensure_dir(dir)?;
        }
        if !self.manifest.source_dir.is_dir() {
            return Err(ShaderError::SourceDirectoryMissing(
                self.manifest.source_dir.clone(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compile/orchestrator.rs"]
mod tests;
