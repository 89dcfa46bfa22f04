use std::path::PathBuf;

/// Convenience result type used across xshader.
pub type ShaderResult<T> = Result<T, ShaderError>;

/// Errors that stop a run before (or instead of) compiling any shader.
///
/// Per-unit failures (missing source file, compiler crash, non-zero exit) are not errors
/// at this level; they are recorded as [`crate::OutcomeStatus`] values so the batch can
/// keep going.
#[derive(thiserror::Error, Debug)]
pub enum ShaderError {
    /// The manifest file could not be opened or read.
    #[error("manifest not found: '{}': {source}", path.display())]
    ManifestNotFound {
        /// Path that was requested.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest is not valid JSON, or a field has the wrong type.
    #[error("manifest parse error: {0}")]
    ManifestParse(#[from] serde_json::Error),

    /// A required manifest field is absent. Carries the dotted field path.
    #[error("missing required field '{0}'")]
    MissingField(String),

    /// The manifest parsed but breaks a semantic rule (shader model, shader names).
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// The configured shader source directory does not exist.
    #[error("source directory does not exist: '{}'", .0.display())]
    SourceDirectoryMissing(PathBuf),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ShaderError {
    /// Build a [`ShaderError::MissingField`] value.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    /// Build a [`ShaderError::InvalidManifest`] value.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidManifest(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
