use std::path::Path;

use anyhow::Context as _;

use crate::foundation::error::ShaderResult;

/// Create `dir` and any missing parents. Succeeds if it already exists.
pub fn ensure_dir(dir: &Path) -> ShaderResult<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory '{}'", dir.display()))?;
    Ok(())
}

/// Create the parent directory of `path`, if it has one.
pub fn ensure_parent_dir(path: &Path) -> ShaderResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}
