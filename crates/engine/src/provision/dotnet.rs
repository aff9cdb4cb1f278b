//! `dotnet test` with Playwright for .NET

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use suiterun_common::{LanguageFamily, LogPhase, TargetEngine};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{run_optional, run_required, ProvisionContext, Provisioner};
use crate::config::DotnetConfig;
use crate::error::ProvisionError;
use crate::process::StepCommand;

/// Build output directories never searched for project descriptors
const BUILD_DIRS: &[&str] = &["bin", "obj", "TestResults"];

/// How deep to look for a project descriptor
const PROJECT_SEARCH_DEPTH: usize = 4;

#[derive(Debug, Clone)]
pub struct DotnetToolchain {
    config: DotnetConfig,
}

impl DotnetToolchain {
    pub fn new(config: DotnetConfig) -> Self {
        Self { config }
    }

    fn dotnet(&self, workspace: &Path) -> StepCommand {
        StepCommand::new(&self.config.binary, workspace)
            .env("DOTNET_CLI_TELEMETRY_OPTOUT", "1")
            .env("DOTNET_NOLOGO", "1")
            .env("DOTNET_SKIP_FIRST_TIME_EXPERIENCE", "1")
            // Build nodes must not outlive the step
            .env("MSBUILDDISABLENODEREUSE", "1")
    }

    /// Locate the project to build: a solution file wins over project files,
    /// shallower paths over deeper ones, then lexical order.
    pub fn find_project(workspace: &Path) -> Option<PathBuf> {
        let mut candidates: Vec<(u8, usize, PathBuf)> = WalkDir::new(workspace)
            .max_depth(PROJECT_SEARCH_DEPTH)
            .into_iter()
            .filter_entry(|e| {
                !(e.file_type().is_dir()
                    && BUILD_DIRS.iter().any(|d| e.file_name().to_str() == Some(d)))
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let rank = match e.path().extension()?.to_str()?.to_ascii_lowercase().as_str() {
                    "sln" => 0,
                    "csproj" | "fsproj" | "vbproj" => 1,
                    _ => return None,
                };
                let rel = e.path().strip_prefix(workspace).ok()?.to_path_buf();
                Some((rank, e.depth(), rel))
            })
            .collect();
        candidates.sort();
        candidates.into_iter().next().map(|(_, _, path)| path)
    }

    /// The `playwright.ps1` installer emitted by a Playwright for .NET build
    fn find_install_script(&self, workspace: &Path) -> Option<PathBuf> {
        let configuration = self.config.configuration.to_ascii_lowercase();
        let mut scripts: Vec<PathBuf> = WalkDir::new(workspace)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && e.file_name() == "playwright.ps1")
            .map(|e| e.into_path())
            .filter(|p| {
                p.components().any(|c| {
                    c.as_os_str()
                        .to_str()
                        .map(|s| s.to_ascii_lowercase() == configuration)
                        .unwrap_or(false)
                })
            })
            .collect();
        scripts.sort();
        scripts.into_iter().next()
    }
}

#[async_trait]
impl Provisioner for DotnetToolchain {
    fn family(&self) -> LanguageFamily {
        LanguageFamily::Dotnet
    }

    async fn provision(&self, ctx: &ProvisionContext<'_>) -> Result<(), ProvisionError> {
        let project = Self::find_project(ctx.workspace).ok_or_else(|| ProvisionError::MissingProject {
            kind: "solution or project file".to_string(),
        })?;
        let project = project.to_string_lossy().to_string();
        info!(%project, "building dotnet project");

        run_required(
            ctx,
            "Restoring packages",
            self.dotnet(ctx.workspace).args(["restore", project.as_str()]),
            LogPhase::Restore,
        )
        .await?;

        run_required(
            ctx,
            "Building project",
            self.dotnet(ctx.workspace).args([
                "build",
                project.as_str(),
                "-c",
                self.config.configuration.as_str(),
                "--no-restore",
            ]),
            LogPhase::Build,
        )
        .await?;

        match self.find_install_script(ctx.workspace) {
            Some(script) => {
                let install = StepCommand::new(&self.config.powershell, ctx.workspace)
                    .args(["-NoProfile", "-File"])
                    .arg(script.to_string_lossy())
                    .args(["install", ctx.engine.as_str()]);
                run_optional(ctx, "Installing browser engine", install, LogPhase::Browsers).await;
            }
            None => {
                ctx.sink.status(
                    "Playwright install script not found in build output; skipping browser installation",
                );
            }
        }

        debug!(workspace = %ctx.workspace.display(), "dotnet environment ready");
        Ok(())
    }

    fn test_command(&self, workspace: &Path, engine: TargetEngine, headed: bool) -> StepCommand {
        let results_dir = workspace.join(&self.config.results_dir);
        let mut cmd = self.dotnet(workspace).arg("test");
        if let Some(project) = Self::find_project(workspace) {
            cmd = cmd.arg(project.to_string_lossy());
        }

        cmd.args(["-c", self.config.configuration.as_str(), "--no-build"])
            .arg("--logger")
            .arg(format!("trx;LogFileName={}", self.config.report_file))
            .args(["--logger", "console;verbosity=detailed"])
            .arg("--results-directory")
            .arg(results_dir.to_string_lossy())
            .arg("--")
            .arg(format!("Playwright.BrowserName={}", engine.as_str()))
            .arg(format!("Playwright.LaunchOptions.Headless={}", !headed))
    }

    fn report_path(&self, workspace: &Path) -> PathBuf {
        workspace
            .join(&self.config.results_dir)
            .join(&self.config.report_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    #[test]
    fn test_find_project_prefers_solution_then_shallow() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "E2E/E2E.csproj");
        touch(dir.path(), "Other.csproj");
        assert_eq!(
            DotnetToolchain::find_project(dir.path()),
            Some(PathBuf::from("Other.csproj"))
        );

        touch(dir.path(), "suite/Suite.sln");
        assert_eq!(
            DotnetToolchain::find_project(dir.path()),
            Some(PathBuf::from("suite/Suite.sln"))
        );
    }

    #[test]
    fn test_find_project_ignores_build_output() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "obj/Generated.csproj");
        assert_eq!(DotnetToolchain::find_project(dir.path()), None);
    }

    #[test]
    fn test_install_script_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = DotnetToolchain::new(DotnetConfig::default());
        assert!(toolchain.find_install_script(dir.path()).is_none());

        touch(dir.path(), "bin/Debug/net8.0/playwright.ps1");
        assert!(toolchain.find_install_script(dir.path()).is_none());

        touch(dir.path(), "bin/Release/net8.0/playwright.ps1");
        assert_eq!(
            toolchain.find_install_script(dir.path()),
            Some(dir.path().join("bin/Release/net8.0/playwright.ps1"))
        );
    }

    #[test]
    fn test_command_arguments() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "E2E.csproj");
        let toolchain = DotnetToolchain::new(DotnetConfig::default());

        let cmd = toolchain.test_command(dir.path(), TargetEngine::Webkit, true);
        assert_eq!(cmd.program, "dotnet");
        assert_eq!(cmd.args[0], "test");
        assert_eq!(cmd.args[1], "E2E.csproj");
        assert!(cmd.args.contains(&"--no-build".to_string()));
        assert!(cmd.args.contains(&"trx;LogFileName=results.trx".to_string()));
        assert!(cmd.args.contains(&"Playwright.BrowserName=webkit".to_string()));
        assert!(cmd.args.contains(&"Playwright.LaunchOptions.Headless=false".to_string()));
        assert!(cmd
            .envs
            .contains(&("MSBUILDDISABLENODEREUSE".to_string(), "1".to_string())));

        let headless = toolchain.test_command(dir.path(), TargetEngine::Chromium, false);
        assert!(headless
            .args
            .contains(&"Playwright.LaunchOptions.Headless=true".to_string()));
    }

    #[tokio::test]
    async fn test_missing_project_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "LoginTests.cs");
        let toolchain = DotnetToolchain::new(DotnetConfig::default());
        let (sink, _stream) = crate::events::EventSink::channel();
        let ctx = ProvisionContext {
            workspace: dir.path(),
            engine: TargetEngine::Chromium,
            sink: &sink,
            timeout: None,
        };

        let err = toolchain.provision(&ctx).await.unwrap_err();
        assert!(matches!(err, ProvisionError::MissingProject { .. }));
    }
}
