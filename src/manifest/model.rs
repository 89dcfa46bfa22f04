use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde_json::{Map, Value};

use crate::compile::unit::Stage;
use crate::foundation::error::{ShaderError, ShaderResult};

/// One named shader entry from the manifest.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ShaderDescriptor {
    /// Identifier used for output filenames and generated symbol names.
    pub name: String,
    /// Source file, relative to the manifest's source directory.
    pub source: PathBuf,
}

/// Which collection a shader came from. Decides the stages it expands to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderKind {
    /// Vertex + pixel pair.
    Graphics,
    /// Single compute stage.
    Compute,
}

impl ShaderKind {
    /// Stages compiled for a shader of this kind, in invocation order.
    pub fn stages(self) -> &'static [Stage] {
        match self {
            Self::Graphics => &[Stage::Vertex, Stage::Pixel],
            Self::Compute => &[Stage::Compute],
        }
    }
}

impl fmt::Display for ShaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Graphics => "graphics",
            Self::Compute => "compute",
        })
    }
}

/// Free-form manifest version; accepted as either a JSON string or number.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum ManifestVersion {
    /// `"version": 1`
    Number(serde_json::Number),
    /// `"version": "1.0"`
    Text(String),
}

impl fmt::Display for ManifestVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Validated, path-resolved shader compilation request.
///
/// Every directory field is anchored at the manifest file's own directory by
/// [`ShaderManifest::load`], so nothing downstream depends on the process working
/// directory.
#[derive(Clone, Debug, PartialEq)]
pub struct ShaderManifest {
    /// Informational manifest version, if present.
    pub version: Option<ManifestVersion>,
    /// External compiler executable (`compiler.fxcPath`).
    pub compiler_path: PathBuf,
    /// Shader-model major version, e.g. `5` for `vs_5_0`.
    pub shader_model: u32,
    /// Directory shader sources are read from.
    pub source_dir: PathBuf,
    /// Directory compiled `.xs` artifacts are written to.
    pub output_dir: PathBuf,
    /// Directory generated `.h` headers are written to. Headers are skipped when unset.
    pub header_output_dir: Option<PathBuf>,
    /// Vertex/pixel shaders, in manifest order.
    pub graphics_shaders: Vec<ShaderDescriptor>,
    /// Compute shaders, in manifest order.
    pub compute_shaders: Vec<ShaderDescriptor>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestDoc {
    #[serde(default)]
    version: Option<ManifestVersion>,
    compiler: CompilerSection,
    shader_model: u32,
    shaders: ShadersSection,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompilerSection {
    fxc_path: PathBuf,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShadersSection {
    source_dir: PathBuf,
    #[serde(alias = "binOutput")]
    output: PathBuf,
    #[serde(default)]
    header_output: Option<PathBuf>,
    graphics: Vec<ShaderDescriptor>,
    compute: Vec<ShaderDescriptor>,
}

impl From<ManifestDoc> for ShaderManifest {
    fn from(doc: ManifestDoc) -> Self {
        Self {
            version: doc.version,
            compiler_path: doc.compiler.fxc_path,
            shader_model: doc.shader_model,
            source_dir: doc.shaders.source_dir,
            output_dir: doc.shaders.output,
            header_output_dir: doc.shaders.header_output,
            graphics_shaders: doc.shaders.graphics,
            compute_shaders: doc.shaders.compute,
        }
    }
}

impl ShaderManifest {
    /// Read, validate and path-resolve the manifest at `path`.
    ///
    /// Relative paths inside the manifest are interpreted relative to the directory that
    /// contains `path`. Performs no directory creation.
    pub fn load(path: impl AsRef<Path>) -> ShaderResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ShaderError::ManifestNotFound {
            path: path.to_path_buf(),
            source,
        })?;

        let absolute = std::path::absolute(path)
            .with_context(|| format!("failed to make '{}' absolute", path.display()))?;
        let manifest_dir = absolute.parent().unwrap_or_else(|| Path::new("/"));

        let manifest = Self::from_json_str(&text, manifest_dir)?;
        tracing::debug!(
            path = %path.display(),
            shaders = manifest.shader_count(),
            units = manifest.unit_count(),
            "loaded shader manifest"
        );
        Ok(manifest)
    }

    /// Parse manifest JSON and anchor its relative paths at `manifest_dir`.
    ///
    /// `manifest_dir` should be absolute; it is used as given.
    pub fn from_json_str(text: &str, manifest_dir: &Path) -> ShaderResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        check_required_fields(&value)?;

        let doc: ManifestDoc = serde_json::from_value(value)?;
        let mut manifest = Self::from(doc);
        manifest.validate()?;
        manifest.resolve_paths(manifest_dir);
        Ok(manifest)
    }

    /// Anchor relative path fields at `base`. Absolute fields are left alone, so calling
    /// this again is a no-op.
    ///
    /// `compiler_path` is only anchored when it has a directory component; a bare program
    /// name such as `fxc.exe` is left for the OS to find on `PATH`.
    pub fn resolve_paths(&mut self, base: &Path) {
        self.source_dir = resolve_path(base, &self.source_dir);
        self.output_dir = resolve_path(base, &self.output_dir);
        if let Some(dir) = self.header_output_dir.as_mut() {
            *dir = resolve_path(base, dir);
        }
        if self.compiler_path.components().count() > 1 {
            self.compiler_path = resolve_path(base, &self.compiler_path);
        }
    }

    /// Check the semantic rules serde cannot express.
    pub fn validate(&self) -> ShaderResult<()> {
        if self.shader_model == 0 {
            return Err(ShaderError::invalid("shaderModel must be a positive integer"));
        }
        if self.compiler_path.as_os_str().is_empty() {
            return Err(ShaderError::invalid("compiler.fxcPath must not be empty"));
        }

        let emits_headers = self.header_output_dir.is_some();
        for (kind, shaders) in [
            (ShaderKind::Graphics, &self.graphics_shaders),
            (ShaderKind::Compute, &self.compute_shaders),
        ] {
            let mut seen = BTreeSet::new();
            for shader in shaders {
                if shader.name.is_empty() {
                    return Err(ShaderError::invalid(format!(
                        "{kind} shader with source '{}' has an empty name",
                        shader.source.display()
                    )));
                }
                if shader.source.as_os_str().is_empty() {
                    return Err(ShaderError::invalid(format!(
                        "{kind} shader '{}' has an empty source path",
                        shader.name
                    )));
                }
                if !seen.insert(shader.name.as_str()) {
                    return Err(ShaderError::invalid(format!(
                        "duplicate {kind} shader name '{}'",
                        shader.name
                    )));
                }
                // The name ends up inside the generated `k{Name}_{Stage}Bytes` symbol.
                if emits_headers && !is_c_identifier(&shader.name) {
                    return Err(ShaderError::invalid(format!(
                        "{kind} shader name '{}' is not a valid C identifier (required when headerOutput is set)",
                        shader.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// All shaders in compile order: graphics first, then compute.
    pub fn shaders(&self) -> impl Iterator<Item = (ShaderKind, &ShaderDescriptor)> {
        self.graphics_shaders
            .iter()
            .map(|s| (ShaderKind::Graphics, s))
            .chain(self.compute_shaders.iter().map(|s| (ShaderKind::Compute, s)))
    }

    /// Number of shader descriptors across both collections.
    pub fn shader_count(&self) -> usize {
        self.graphics_shaders.len() + self.compute_shaders.len()
    }

    /// Number of compiler invocations a full build derives (`2 * graphics + compute`).
    pub fn unit_count(&self) -> usize {
        2 * self.graphics_shaders.len() + self.compute_shaders.len()
    }
}

/// `base.join(path)` for relative paths; absolute paths come back unchanged.
pub fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn is_c_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Report the first absent required field by its dotted path.
///
/// Runs before typed deserialization so a missing key surfaces as
/// [`ShaderError::MissingField`] instead of a generic serde message. Fields that are
/// present with the wrong type are left for serde to reject.
fn check_required_fields(value: &Value) -> ShaderResult<()> {
    let Some(root) = value.as_object() else {
        return Ok(());
    };

    if let Some(compiler) = require(root, None, &["compiler"])?.as_object() {
        require(compiler, Some("compiler"), &["fxcPath"])?;
    }
    require(root, None, &["shaderModel"])?;
    if let Some(shaders) = require(root, None, &["shaders"])?.as_object() {
        let required: [&[&str]; 4] = [
            &["output", "binOutput"],
            &["sourceDir"],
            &["graphics"],
            &["compute"],
        ];
        for keys in required {
            require(shaders, Some("shaders"), keys)?;
        }
    }

    Ok(())
}

/// Look up the first of `keys` present in `obj`; the error names `keys[0]`.
fn require<'a>(
    obj: &'a Map<String, Value>,
    parent: Option<&str>,
    keys: &[&str],
) -> ShaderResult<&'a Value> {
    keys.iter()
        .find_map(|key| obj.get(*key))
        .ok_or_else(|| {
            let field = match parent {
                Some(parent) => format!("{parent}.{}", keys[0]),
                None => keys[0].to_string(),
            };
            ShaderError::missing_field(field)
        })
}

#[cfg(test)]
#[path = "../../tests/unit/manifest/model.rs"]
mod tests;
