//! Environment provisioning per language family
//!
//! Each [`LanguageFamily`] has one [`Toolchain`] variant implementing
//! [`Provisioner`]. A new family is a new variant plus its module; the
//! pipeline only talks to the trait.

mod dotnet;
mod python;

pub use dotnet::DotnetToolchain;
pub use python::PythonToolchain;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use suiterun_common::{LanguageFamily, LogPhase, TargetEngine};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::ProvisionError;
use crate::events::EventSink;
use crate::process::{run_streaming, StepCommand, StepOutput};

/// Everything a provisioner needs for one request
pub struct ProvisionContext<'a> {
    pub workspace: &'a Path,
    pub engine: TargetEngine,
    pub sink: &'a EventSink,
    /// Bound applied to each provisioning command
    pub timeout: Option<Duration>,
}

/// Common interface over the family-specific installer protocols
#[async_trait]
pub trait Provisioner: Send + Sync {
    fn family(&self) -> LanguageFamily;

    /// Build a runnable environment inside the workspace
    async fn provision(&self, ctx: &ProvisionContext<'_>) -> Result<(), ProvisionError>;

    /// The single test-execution command for this family
    fn test_command(&self, workspace: &Path, engine: TargetEngine, headed: bool) -> StepCommand;

    /// Where the test command leaves its machine-readable report
    fn report_path(&self, workspace: &Path) -> PathBuf;
}

/// Closed set of supported toolchains, one per family
#[derive(Debug, Clone)]
pub enum Toolchain {
    Python(PythonToolchain),
    Dotnet(DotnetToolchain),
}

impl Toolchain {
    pub fn for_family(family: LanguageFamily, config: &EngineConfig) -> Self {
        match family {
            LanguageFamily::Python => Toolchain::Python(PythonToolchain::new(config.python.clone())),
            LanguageFamily::Dotnet => Toolchain::Dotnet(DotnetToolchain::new(config.dotnet.clone())),
        }
    }

    fn inner(&self) -> &dyn Provisioner {
        match self {
            Toolchain::Python(t) => t,
            Toolchain::Dotnet(t) => t,
        }
    }
}

#[async_trait]
impl Provisioner for Toolchain {
    fn family(&self) -> LanguageFamily {
        self.inner().family()
    }

    async fn provision(&self, ctx: &ProvisionContext<'_>) -> Result<(), ProvisionError> {
        self.inner().provision(ctx).await
    }

    fn test_command(&self, workspace: &Path, engine: TargetEngine, headed: bool) -> StepCommand {
        self.inner().test_command(workspace, engine, headed)
    }

    fn report_path(&self, workspace: &Path) -> PathBuf {
        self.inner().report_path(workspace)
    }
}

/// Run a step whose failure makes execution impossible
pub(crate) async fn run_required(
    ctx: &ProvisionContext<'_>,
    step: &str,
    cmd: StepCommand,
    phase: LogPhase,
) -> Result<StepOutput, ProvisionError> {
    let cmd = cmd.timeout(ctx.timeout);
    ctx.sink.status(format!("{}: {}", step, cmd.display()));
    info!(step, command = %cmd.display(), "provisioning step");

    let output = run_streaming(&cmd, phase, ctx.sink).await?;
    if !output.success() {
        return Err(ProvisionError::StepFailed {
            step: step.to_string(),
            exit_code: output.exit_code,
            output: output.diagnostic_tail(),
        });
    }
    Ok(output)
}

/// Run a step whose failure is logged and then ignored. Browser engine
/// installers are idempotent and frequently redundant with a global cache.
pub(crate) async fn run_optional(
    ctx: &ProvisionContext<'_>,
    step: &str,
    cmd: StepCommand,
    phase: LogPhase,
) -> bool {
    let cmd = cmd.timeout(ctx.timeout);
    ctx.sink.status(format!("{}: {}", step, cmd.display()));
    info!(step, command = %cmd.display(), "provisioning step (non-fatal)");

    let problem = match run_streaming(&cmd, phase, ctx.sink).await {
        Ok(output) if output.success() => return true,
        Ok(output) => format!("exited with code {}", output.exit_code),
        Err(e) => e.to_string(),
    };

    warn!(step, %problem, "non-fatal provisioning step failed");
    ctx.sink.status(format!(
        "{} failed ({}); continuing, the {} engine may already be installed",
        step, problem, ctx.engine
    ));
    false
}
