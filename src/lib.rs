//! xshader compiles HLSL shaders listed in a JSON manifest by driving an external
//! FXC-style compiler once per shader stage.
//!
//! # Pipeline overview
//!
//! 1. **Load**: `manifest.json -> ShaderManifest` (required-field checks, typed
//!    deserialization, paths anchored at the manifest's own directory)
//! 2. **Derive**: each graphics shader expands to a vertex and a pixel [`CompileUnit`],
//!    each compute shader to one compute unit
//! 3. **Invoke**: every unit runs through a [`CompilerRunner`] (real processes via
//!    [`ProcessRunner`])
//! 4. **Aggregate**: outcomes fold into a [`BuildResult`]; a failing unit never stops the
//!    rest of the batch
//!
//! ```no_run
//! let manifest = xshader::ShaderManifest::load("Engine/Shaders/manifest.json")?;
//! let mut compiler = xshader::ShaderCompiler::new(&manifest, xshader::ProcessRunner::new());
//! let result = compiler.compile_all();
//! assert!(result.success());
//! # Ok::<(), xshader::ShaderError>(())
//! ```
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod compile;
mod foundation;
mod manifest;

pub use compile::orchestrator::{BuildResult, CompileOutcome, OutcomeStatus, ShaderCompiler};
pub use compile::runner::{
    CancelToken, CompilerRunner, Invocation, ProcessOutput, ProcessRunner, RunError,
};
pub use compile::unit::{
    ARTIFACT_EXTENSION, BuildConfig, CompileUnit, HEADER_EXTENSION, Stage, artifact_stem,
    derive_units,
};
pub use foundation::error::{ShaderError, ShaderResult};
pub use foundation::fs::{ensure_dir, ensure_parent_dir};
pub use manifest::model::{
    ManifestVersion, ShaderDescriptor, ShaderKind, ShaderManifest, resolve_path,
};
