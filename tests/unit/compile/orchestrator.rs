use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::*;
use crate::compile::runner::ProcessOutput;
use crate::manifest::model::ShaderDescriptor;

/// Scripted behaviour for one unit, keyed by its output stem (e.g. `Unlit_PS`).
enum Script {
    Exit(i32, &'static str),
    SpawnFails,
    TimesOut,
    /// Succeed, then cancel the rest of the run.
    CancelAfter(CancelToken),
}

#[derive(Default)]
struct FakeRunner {
    calls: Vec<Invocation>,
    scripts: HashMap<String, Script>,
}

impl FakeRunner {
    fn script(mut self, stem: &str, script: Script) -> Self {
        self.scripts.insert(stem.to_string(), script);
        self
    }

    fn called_stems(&self) -> Vec<String> {
        self.calls.iter().map(output_stem).collect()
    }
}

fn output_stem(inv: &Invocation) -> String {
    inv.flag_value("/Fo")
        .and_then(Path::file_stem)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl CompilerRunner for FakeRunner {
    fn run(
        &mut self,
        invocation: &Invocation,
        _cancel: &CancelToken,
    ) -> Result<ProcessOutput, RunError> {
        self.calls.push(invocation.clone());
        let ok = ProcessOutput {
            success: true,
            exit_code: Some(0),
            ..ProcessOutput::default()
        };
        match self.scripts.get(&output_stem(invocation)) {
            None => Ok(ok),
            Some(Script::Exit(code, stderr)) => Ok(ProcessOutput {
                success: *code == 0,
                exit_code: Some(*code),
                stdout: String::new(),
                stderr: stderr.to_string(),
            }),
            Some(Script::SpawnFails) => Err(RunError::Spawn {
                program: invocation.program.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
            Some(Script::TimesOut) => Err(RunError::Timeout(Duration::from_secs(1))),
            Some(Script::CancelAfter(token)) => {
                token.cancel();
                Ok(ok)
            }
        }
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        std::fs::create_dir_all(root.join("Source")).unwrap();
        Self { _dir: dir, root }
    }

    fn source(&self, rel: &str) -> &Self {
        let path = self.root.join("Source").join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "float4 VS_Main() : SV_Position { return 0; }").unwrap();
        self
    }

    fn manifest(&self, graphics: &[(&str, &str)], compute: &[(&str, &str)]) -> ShaderManifest {
        ShaderManifest {
            version: None,
            compiler_path: PathBuf::from("fxc"),
            shader_model: 5,
            source_dir: self.root.join("Source"),
            output_dir: self.root.join("Bin"),
            header_output_dir: None,
            graphics_shaders: descriptors(graphics),
            compute_shaders: descriptors(compute),
        }
    }
}

fn descriptors(list: &[(&str, &str)]) -> Vec<ShaderDescriptor> {
    list.iter()
        .map(|(name, source)| ShaderDescriptor {
            name: name.to_string(),
            source: PathBuf::from(source),
        })
        .collect()
}

#[test]
fn unlit_graphics_shader_compiles_both_stages() {
    let fx = Fixture::new();
    fx.source("unlit.hlsl");
    let manifest = fx.manifest(&[("Unlit", "unlit.hlsl")], &[]);

    let mut compiler = ShaderCompiler::new(&manifest, FakeRunner::default());
    let result = compiler.compile_all();

    assert!(result.success());
    assert_eq!(result.exit_code(), 0);
    let calls = &compiler.runner().calls;
    assert_eq!(calls.len(), 2);

    let vs = &calls[0];
    assert_eq!(vs.program, PathBuf::from("fxc"));
    assert_eq!(vs.flag_value("/T"), Some(Path::new("vs_5_0")));
    assert_eq!(vs.flag_value("/E"), Some(Path::new("VS_Main")));
    assert_eq!(vs.flag_value("/Fo"), Some(fx.root.join("Bin/Unlit_VS.xs").as_path()));

    let ps = &calls[1];
    assert_eq!(ps.flag_value("/T"), Some(Path::new("ps_5_0")));
    assert_eq!(ps.flag_value("/E"), Some(Path::new("PS_Main")));
    assert_eq!(ps.flag_value("/Fo"), Some(fx.root.join("Bin/Unlit_PS.xs").as_path()));
    assert_eq!(
        ps.args.last().map(PathBuf::from),
        Some(fx.root.join("Source").join("unlit.hlsl"))
    );

    assert!(result.outcomes.iter().all(|o| o.exit_code() == Some(0)));
}

#[test]
fn units_are_invoked_in_manifest_order() {
    let fx = Fixture::new();
    fx.source("a.hlsl").source("b.hlsl").source("c.hlsl");
    let manifest = fx.manifest(
        &[("A", "a.hlsl"), ("B", "b.hlsl")],
        &[("C", "c.hlsl"), ("D", "a.hlsl")],
    );

    let mut compiler = ShaderCompiler::new(&manifest, FakeRunner::default());
    let result = compiler.compile_all();

    assert!(result.success());
    assert_eq!(result.outcomes.len(), manifest.unit_count());
    assert_eq!(
        compiler.runner().called_stems(),
        ["A_VS", "A_PS", "B_VS", "B_PS", "C_CS", "D_CS"]
    );
    let profiles: Vec<_> = result.outcomes.iter().map(|o| o.unit.profile.as_str()).collect();
    assert_eq!(profiles, ["vs_5_0", "ps_5_0", "vs_5_0", "ps_5_0", "cs_5_0", "cs_5_0"]);
}

#[test]
fn output_directories_are_created() {
    let fx = Fixture::new();
    let mut manifest = fx.manifest(&[], &[]);
    manifest.output_dir = fx.root.join("Bin/Shaders/Nested");
    manifest.header_output_dir = Some(fx.root.join("Generated"));

    let result = ShaderCompiler::new(&manifest, FakeRunner::default()).compile_all();

    assert!(result.success());
    assert!(manifest.output_dir.is_dir());
    assert!(fx.root.join("Generated").is_dir());
}

#[test]
fn empty_manifest_is_a_successful_no_op() {
    let fx = Fixture::new();
    let manifest = fx.manifest(&[], &[]);
    let mut compiler = ShaderCompiler::new(&manifest, FakeRunner::default());
    let result = compiler.compile_all();
    assert!(result.success());
    assert!(result.outcomes.is_empty());
    assert!(compiler.runner().calls.is_empty());
}

#[test]
fn missing_source_dir_aborts_without_invoking() {
    let fx = Fixture::new();
    let mut manifest = fx.manifest(&[("Unlit", "unlit.hlsl")], &[("Blur", "blur.hlsl")]);
    manifest.source_dir = fx.root.join("NoSuchDir");

    let mut compiler = ShaderCompiler::new(&manifest, FakeRunner::default());
    let result = compiler.compile_all();

    assert!(!result.success());
    assert_eq!(result.exit_code(), 1);
    assert!(matches!(
        result.aborted,
        Some(ShaderError::SourceDirectoryMissing(ref p)) if p == &manifest.source_dir
    ));
    assert!(result.outcomes.is_empty());
    assert!(compiler.runner().calls.is_empty());
}

#[test]
fn missing_source_fails_both_stages_and_continues() {
    let fx = Fixture::new();
    fx.source("b.hlsl");
    let manifest = fx.manifest(&[("A", "missing.hlsl"), ("B", "b.hlsl")], &[]);

    let mut compiler = ShaderCompiler::new(&manifest, FakeRunner::default());
    let result = compiler.compile_all();

    assert!(!result.success());
    let statuses: Vec<_> = result
        .outcomes
        .iter()
        .map(|o| (o.unit.label(), o.success()))
        .collect();
    assert_eq!(
        statuses,
        [
            ("A_VS".to_string(), false),
            ("A_PS".to_string(), false),
            ("B_VS".to_string(), true),
            ("B_PS".to_string(), true),
        ]
    );
    assert!(
        result
            .failures()
            .all(|o| o.status == OutcomeStatus::SourceFileMissing)
    );
    assert_eq!(compiler.runner().called_stems(), ["B_VS", "B_PS"]);
}

#[test]
fn non_zero_exit_attaches_stderr_to_that_unit_only() {
    let fx = Fixture::new();
    fx.source("unlit.hlsl").source("blur.hlsl");
    let manifest = fx.manifest(&[("Unlit", "unlit.hlsl")], &[("Blur", "blur.hlsl")]);
    let runner = FakeRunner::default().script(
        "Unlit_PS",
        Script::Exit(1, "unlit.hlsl(12,5): error X3004: undeclared identifier 'uv'"),
    );

    let mut compiler = ShaderCompiler::new(&manifest, runner);
    let result = compiler.compile_all();

    assert!(!result.success());
    assert_eq!(result.exit_code(), 1);
    assert_eq!(compiler.runner().calls.len(), 3);

    let failures: Vec<_> = result.failures().collect();
    assert_eq!(failures.len(), 1);
    let failed = failures[0];
    assert_eq!(failed.unit.label(), "Unlit_PS");
    assert_eq!(failed.exit_code(), Some(1));
    assert!(failed.diagnostics().unwrap().contains("X3004"));

    for outcome in result.outcomes.iter().filter(|o| o.success()) {
        assert_eq!(outcome.diagnostics(), None);
    }

    let report = failed.to_string();
    assert!(report.starts_with("Unlit_PS: compiler exited with code 1"));
    assert!(report.contains("command: fxc /T ps_5_0"));
}

#[test]
fn spawn_failure_and_timeout_are_failures_but_not_exit_codes() {
    let fx = Fixture::new();
    fx.source("a.hlsl").source("b.hlsl");
    let manifest = fx.manifest(&[], &[("A", "a.hlsl"), ("B", "b.hlsl")]);
    let runner = FakeRunner::default()
        .script("A_CS", Script::SpawnFails)
        .script("B_CS", Script::TimesOut);

    let result = ShaderCompiler::new(&manifest, runner).compile_all();

    assert!(!result.success());
    let a = &result.outcomes[0];
    assert!(matches!(a.status, OutcomeStatus::InvocationFailed { .. }));
    assert_eq!(a.exit_code(), None);
    let b = &result.outcomes[1];
    assert_eq!(
        b.status,
        OutcomeStatus::TimedOut {
            limit: Duration::from_secs(1)
        }
    );
}

#[test]
fn cancellation_skips_remaining_units() {
    let fx = Fixture::new();
    fx.source("a.hlsl").source("b.hlsl");
    let manifest = fx.manifest(&[("A", "a.hlsl")], &[("B", "b.hlsl")]);
    let token = CancelToken::new();
    let runner = FakeRunner::default().script("A_VS", Script::CancelAfter(token.clone()));

    let mut compiler = ShaderCompiler::new(&manifest, runner).with_cancel_token(token);
    let result = compiler.compile_all();

    assert!(!result.success());
    assert_eq!(compiler.runner().called_stems(), ["A_VS"]);
    let statuses: Vec<_> = result.outcomes.iter().map(|o| o.status.clone()).collect();
    assert_eq!(
        statuses,
        [
            OutcomeStatus::Succeeded,
            OutcomeStatus::Cancelled,
            OutcomeStatus::Cancelled,
        ]
    );
}

#[test]
fn config_flags_reach_the_compiler() {
    let fx = Fixture::new();
    fx.source("blur.hlsl");
    let manifest = fx.manifest(&[], &[("Blur", "blur.hlsl")]);

    let mut compiler =
        ShaderCompiler::new(&manifest, FakeRunner::default()).with_config(BuildConfig::Release);
    compiler.compile_all();

    let runner = compiler.into_runner();
    assert!(runner.calls[0].args.iter().any(|a| a == "/O3"));
    assert!(!runner.calls[0].args.iter().any(|a| a == "/Od"));
}

#[test]
fn header_paths_are_passed_when_enabled() {
    let fx = Fixture::new();
    fx.source("blur.hlsl");
    let mut manifest = fx.manifest(&[], &[("Blur", "blur.hlsl")]);
    manifest.header_output_dir = Some(fx.root.join("Generated"));

    let mut compiler = ShaderCompiler::new(&manifest, FakeRunner::default());
    assert!(compiler.compile_all().success());

    let call = &compiler.runner().calls[0];
    assert_eq!(
        call.flag_value("/Fh"),
        Some(fx.root.join("Generated/Blur_CS.h").as_path())
    );
    assert_eq!(call.flag_value("/Vn"), Some(Path::new("kBlur_CSBytes")));
}
