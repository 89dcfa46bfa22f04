use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

use crate::manifest::model::{ShaderDescriptor, ShaderManifest};

/// Extension of compiled shader artifacts.
pub const ARTIFACT_EXTENSION: &str = "xs";
/// Extension of generated C headers.
pub const HEADER_EXTENSION: &str = "h";

/// Pipeline stage a single compiler invocation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Vertex shader (`vs`, `VS_Main`).
    Vertex,
    /// Pixel shader (`ps`, `PS_Main`).
    Pixel,
    /// Compute shader (`cs`, `CS_Main`).
    Compute,
}

impl Stage {
    /// Short tag used in artifact names and symbols (`VS`, `PS`, `CS`).
    pub fn tag(self) -> &'static str {
        match self {
            Self::Vertex => "VS",
            Self::Pixel => "PS",
            Self::Compute => "CS",
        }
    }

    /// Entry-point function the compiler is told to compile.
    pub fn entry_point(self) -> &'static str {
        match self {
            Self::Vertex => "VS_Main",
            Self::Pixel => "PS_Main",
            Self::Compute => "CS_Main",
        }
    }

    /// Target profile for `shader_model`, e.g. `vs_5_0`.
    pub fn profile(self, shader_model: u32) -> String {
        let prefix = match self {
            Self::Vertex => "vs",
            Self::Pixel => "ps",
            Self::Compute => "cs",
        };
        format!("{prefix}_{shader_model}_0")
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Build configuration; selects optimisation and debug-info flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BuildConfig {
    /// Debug info, optimisations off.
    #[default]
    Debug,
    /// Full optimisation.
    Release,
    /// Full optimisation with debug and reflection data stripped.
    Dist,
}

impl BuildConfig {
    /// Extra compiler flags for this configuration, placed after the entry point.
    pub fn compiler_flags(self) -> &'static [&'static str] {
        match self {
            Self::Debug => &["/Zi", "/Od"],
            Self::Release => &["/O3"],
            Self::Dist => &["/O3", "/Qstrip_debug", "/Qstrip_reflect"],
        }
    }
}

impl fmt::Display for BuildConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debug => "debug",
            Self::Release => "release",
            Self::Dist => "dist",
        })
    }
}

/// One fully resolved compiler invocation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileUnit {
    /// Manifest name of the shader.
    pub shader: String,
    /// Stage being compiled.
    pub stage: Stage,
    /// Absolute source path.
    pub source: PathBuf,
    /// Compiled artifact path, `{output}/{name}_{stage}.xs`.
    pub output: PathBuf,
    /// Generated header path, `{headerOutput}/{name}_{stage}.h`, when headers are on.
    pub header: Option<PathBuf>,
    /// Target profile, e.g. `ps_5_0`.
    pub profile: String,
    /// Entry-point symbol.
    pub entry_point: &'static str,
    /// Byte-array symbol in the generated header, `k{name}_{stage}Bytes`.
    pub symbol: String,
}

impl CompileUnit {
    /// Derive the unit compiling `shader` for `stage` under `manifest`.
    pub fn new(manifest: &ShaderManifest, shader: &ShaderDescriptor, stage: Stage) -> Self {
        let stem = artifact_stem(&shader.name, stage);
        Self {
            shader: shader.name.clone(),
            stage,
            source: manifest.source_dir.join(&shader.source),
            output: manifest
                .output_dir
                .join(format!("{stem}.{ARTIFACT_EXTENSION}")),
            header: manifest
                .header_output_dir
                .as_ref()
                .map(|dir| dir.join(format!("{stem}.{HEADER_EXTENSION}"))),
            profile: stage.profile(manifest.shader_model),
            entry_point: stage.entry_point(),
            symbol: format!("k{stem}Bytes"),
        }
    }

    /// `{name}_{stage}`, used in progress and failure reports.
    pub fn label(&self) -> String {
        artifact_stem(&self.shader, self.stage)
    }

    /// Compiler arguments in FXC order:
    /// `/T <profile> /E <entry> [config flags] /Fo <out> [/Fh <header> /Vn <symbol>] <source>`.
    pub fn compiler_args(&self, config: BuildConfig) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "/T".into(),
            self.profile.clone().into(),
            "/E".into(),
            self.entry_point.into(),
        ];
        args.extend(config.compiler_flags().iter().map(OsString::from));
        args.push("/Fo".into());
        args.push(self.output.clone().into_os_string());
        if let Some(header) = &self.header {
            args.push("/Fh".into());
            args.push(header.clone().into_os_string());
            args.push("/Vn".into());
            args.push(self.symbol.clone().into());
        }
        args.push(self.source.clone().into_os_string());
        args
    }
}

/// `{name}_{stage}`: the shared stem of artifact, header and symbol names.
pub fn artifact_stem(name: &str, stage: Stage) -> String {
    format!("{name}_{}", stage.tag())
}

/// Every unit a full build of `manifest` compiles, in invocation order.
pub fn derive_units(manifest: &ShaderManifest) -> Vec<CompileUnit> {
    manifest
        .shaders()
        .flat_map(|(kind, shader)| {
            kind.stages()
                .iter()
                .map(move |&stage| CompileUnit::new(manifest, shader, stage))
        })
        .collect()
}

#[cfg(test)]
#[path = "../../tests/unit/compile/unit.rs"]
mod tests;
