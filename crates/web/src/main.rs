use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use suiterun_engine::EngineConfig;

#[derive(Parser, Debug)]
#[command(name = "suiterun-web")]
#[command(author, version, about = "Stream generated test suite runs over WebSocket and NDJSON", long_about = None)]
struct Args {
    /// Listen address
    #[arg(long, env = "SUITERUN_WEB_ADDR", default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Engine configuration file
    #[arg(long, env = "SUITERUN_CONFIG", default_value = "suiterun.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if args.verbose { "debug" } else { "info" })
    });
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let mut config = EngineConfig::load(&args.config)?;
    config.apply_env()?;

    info!(
        "Starting suiterun web on http://{} (config: {})",
        args.addr,
        args.config.display()
    );

    suiterun_web::server::serve(args.addr, config).await
}
