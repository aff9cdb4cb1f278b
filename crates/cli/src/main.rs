//! suiterun CLI - Main Entry Point

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use suiterun_cli::commands::{detect, report, run};
use suiterun_cli::output;
use suiterun_engine::EngineConfig;

/// suiterun - run generated browser test suites in throwaway workspaces
#[derive(Parser)]
#[command(name = "suiterun")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Engine configuration file
    #[arg(long, env = "SUITERUN_CONFIG", default_value = "suiterun.toml", global = true)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision and run a suite, streaming progress
    Run(run::RunArgs),

    /// Show which toolchain a manifest would use
    Detect(detect::DetectArgs),

    /// Normalize an existing report artifact
    Report(report::ReportArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays parseable with --format json
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => {
            let mut config = EngineConfig::load(&cli.config)?;
            config.apply_env()?;
            let code = run::execute(args, config, cli.format).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Detect(args) => detect::execute(args, cli.format)?,
        Commands::Report(args) => report::execute(args, cli.format)?,
        Commands::Version => {
            println!("suiterun v{}", suiterun_common::VERSION);
        }
    }

    Ok(())
}
