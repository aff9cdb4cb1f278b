//! Run Command

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use suiterun_common::{StreamEvent, TargetEngine};
use suiterun_engine::{EngineConfig, Pipeline};
use tracing::debug;

use super::load_manifest;
use crate::output::{print_event, print_warning, OutputFormat};

/// Exit code when the pipeline itself failed (as opposed to failing tests)
pub const PIPELINE_ERROR_EXIT: i32 = 2;

/// Exit code after Ctrl-C
pub const INTERRUPTED_EXIT: i32 = 130;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Manifest file: execution request JSON or a bare array of files
    pub manifest: PathBuf,

    /// Browser engine (overrides the manifest)
    #[arg(long, value_parser = ["chromium", "firefox", "webkit"])]
    pub engine: Option<String>,

    /// Run the browser with a visible window
    #[arg(long)]
    pub headed: bool,
}

/// Run the suite and return the process exit code
pub async fn execute(args: RunArgs, config: EngineConfig, format: OutputFormat) -> Result<i32> {
    let mut request = load_manifest(&args.manifest)?;
    if let Some(engine) = args.engine.as_deref() {
        request.target_engine = TargetEngine::parse_lossy(engine);
    }
    if args.headed {
        request.headed = true;
    }

    let pipeline = Pipeline::new(config);
    let (handle, mut events) = pipeline.spawn(request);
    let mut exit_code = None;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match &event {
                    StreamEvent::Complete(done) => exit_code = Some(done.exit_code),
                    StreamEvent::Error(_) => exit_code = Some(PIPELINE_ERROR_EXIT),
                    _ => {}
                }
                print_event(&event, format);
            }
            _ = tokio::signal::ctrl_c() => {
                print_warning("Interrupted, stopping the run and removing its workspace");
                handle.abort();
                exit_code = Some(INTERRUPTED_EXIT);
                break;
            }
        }
    }

    match handle.await {
        Ok(stage) => debug!(%stage, "run finished"),
        Err(e) => debug!("run task ended: {}", e),
    }

    Ok(exit_code.unwrap_or(PIPELINE_ERROR_EXIT))
}
