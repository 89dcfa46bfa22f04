use std::{path::PathBuf, time::Duration};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "xshader", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile every shader listed in a manifest (requires the configured compiler).
    Compile(CompileArgs),
}

#[derive(Parser, Debug)]
struct CompileArgs {
    /// Shader manifest JSON.
    manifest: PathBuf,

    /// Build configuration; selects optimisation and debug-info flags.
    #[arg(long, value_enum, default_value_t = ConfigChoice::Debug)]
    config: ConfigChoice,

    /// Kill and fail any single compiler invocation that runs longer than this.
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ConfigChoice {
    Debug,
    Release,
    Dist,
}

impl From<ConfigChoice> for xshader::BuildConfig {
    fn from(choice: ConfigChoice) -> Self {
        match choice {
            ConfigChoice::Debug => Self::Debug,
            ConfigChoice::Release => Self::Release,
            ConfigChoice::Dist => Self::Dist,
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Compile(args) => cmd_compile(args),
    }
}

/// Progress goes to stdout, warnings and errors to stderr. `RUST_LOG` overrides the
/// default `info` filter. Each stream gets colour only when it is a terminal.
fn init_tracing() {
    use std::io::IsTerminal as _;
    use tracing_subscriber::fmt::writer::MakeWriterExt as _;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let diagnostics = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr.with_max_level(tracing::Level::WARN))
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .without_time();
    let progress = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout.with_min_level(tracing::Level::INFO))
        .with_target(false)
        .with_ansi(std::io::stdout().is_terminal())
        .without_time();

    tracing_subscriber::registry()
        .with(filter)
        .with(diagnostics)
        .with(progress)
        .init();
}

fn cmd_compile(args: CompileArgs) -> anyhow::Result<()> {
    let manifest = xshader::ShaderManifest::load(&args.manifest)
        .with_context(|| format!("load manifest '{}'", args.manifest.display()))?;

    if let Some(version) = &manifest.version {
        println!("manifest version {version}");
    }

    let mut runner = xshader::ProcessRunner::new();
    if let Some(secs) = args.timeout_secs {
        runner = runner.with_timeout(Duration::from_secs(secs));
    }

    let mut compiler =
        xshader::ShaderCompiler::new(&manifest, runner).with_config(args.config.into());
    let mut result = compiler.compile_all();

    if let Some(err) = result.aborted.take() {
        return Err(err.into());
    }

    if result.success() {
        println!(
            "All shaders compiled successfully ({} units)",
            result.outcomes.len()
        );
        return Ok(());
    }

    let failures: Vec<_> = result.failures().collect();
    eprintln!("failed units:");
    for outcome in &failures {
        eprintln!("  {outcome}");
    }
    anyhow::bail!(
        "Some shaders failed to compile ({} of {} units failed)",
        failures.len(),
        result.outcomes.len()
    )
}
