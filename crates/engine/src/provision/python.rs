//! pytest + pytest-playwright inside a per-workspace virtual environment

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use suiterun_common::{LanguageFamily, LogPhase, TargetEngine};
use tracing::debug;

use super::{run_optional, run_required, ProvisionContext, Provisioner};
use crate::config::PythonConfig;
use crate::error::ProvisionError;
use crate::process::StepCommand;

#[derive(Debug, Clone)]
pub struct PythonToolchain {
    config: PythonConfig,
}

impl PythonToolchain {
    pub fn new(config: PythonConfig) -> Self {
        Self { config }
    }

    /// Interpreter inside the workspace's virtual environment
    pub fn venv_python(&self, workspace: &Path) -> PathBuf {
        let venv = workspace.join(&self.config.venv_dir);
        if cfg!(windows) {
            venv.join("Scripts").join("python.exe")
        } else {
            venv.join("bin").join("python")
        }
    }

    fn venv_command(&self, workspace: &Path) -> StepCommand {
        StepCommand::new(self.venv_python(workspace).to_string_lossy(), workspace)
            .env("PYTHONUNBUFFERED", "1")
            .env("PIP_DISABLE_PIP_VERSION_CHECK", "1")
    }
}

#[async_trait]
impl Provisioner for PythonToolchain {
    fn family(&self) -> LanguageFamily {
        LanguageFamily::Python
    }

    async fn provision(&self, ctx: &ProvisionContext<'_>) -> Result<(), ProvisionError> {
        let manifest = ctx.workspace.join(&self.config.requirements_file);
        if !manifest.is_file() {
            return Err(ProvisionError::MissingManifest {
                file: self.config.requirements_file.clone(),
            });
        }

        run_required(
            ctx,
            "Creating virtual environment",
            StepCommand::new(&self.config.interpreter, ctx.workspace).args([
                "-m",
                "venv",
                self.config.venv_dir.as_str(),
            ]),
            LogPhase::Environment,
        )
        .await?;

        let install = self
            .venv_command(ctx.workspace)
            .args(["-m", "pip", "install", "-r"])
            .arg(self.config.requirements_file.as_str())
            .args(self.config.extra_packages.iter().map(String::as_str));
        run_required(ctx, "Installing dependencies", install, LogPhase::Dependencies).await?;

        let browsers = self
            .venv_command(ctx.workspace)
            .args(["-m", "playwright", "install", ctx.engine.as_str()]);
        run_optional(ctx, "Installing browser engine", browsers, LogPhase::Browsers).await;

        debug!(workspace = %ctx.workspace.display(), "python environment ready");
        Ok(())
    }

    fn test_command(&self, workspace: &Path, engine: TargetEngine, headed: bool) -> StepCommand {
        let report = self.report_path(workspace);
        let cmd = self
            .venv_command(workspace)
            .args(["-m", "pytest", "-v", "--tb=short", "--browser", engine.as_str()])
            .arg("--json-report")
            .arg(format!("--json-report-file={}", report.display()));

        if headed {
            cmd.arg("--headed")
        } else {
            cmd
        }
    }

    fn report_path(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.config.report_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_arguments() {
        let toolchain = PythonToolchain::new(PythonConfig::default());
        let ws = Path::new("/tmp/suiterun-1-x");

        let cmd = toolchain.test_command(ws, TargetEngine::Firefox, false);
        assert_eq!(cmd.program, toolchain.venv_python(ws).to_string_lossy());
        assert_eq!(cmd.cwd, ws);
        assert!(cmd.args.windows(2).any(|w| w[0] == "--browser" && w[1] == "firefox"));
        assert!(cmd.args.contains(&"-v".to_string()));
        assert!(cmd.args.contains(&"--tb=short".to_string()));
        assert!(cmd
            .args
            .contains(&format!("--json-report-file={}", ws.join("report.json").display())));
        assert!(!cmd.args.contains(&"--headed".to_string()));

        let headed = toolchain.test_command(ws, TargetEngine::Chromium, true);
        assert_eq!(headed.args.last().map(String::as_str), Some("--headed"));
    }

    #[tokio::test]
    async fn test_missing_manifest_fails_before_any_command() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("test_login.py"), "def test_x(): pass\n").unwrap();

        let config = PythonConfig {
            interpreter: "suiterun-no-such-python".to_string(),
            ..PythonConfig::default()
        };
        let toolchain = PythonToolchain::new(config);
        let (sink, stream) = crate::events::EventSink::channel();
        let ctx = ProvisionContext {
            workspace: dir.path(),
            engine: TargetEngine::Chromium,
            sink: &sink,
            timeout: None,
        };

        let err = toolchain.provision(&ctx).await.unwrap_err();
        assert!(matches!(err, ProvisionError::MissingManifest { ref file } if file == "requirements.txt"));
        drop(sink);
        assert!(stream.collect_all().await.is_empty());
    }
}
