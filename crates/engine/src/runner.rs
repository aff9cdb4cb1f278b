//! Test suite execution

use std::path::Path;
use std::time::Duration;

use suiterun_common::{LogPhase, TargetEngine};
use tracing::info;

use crate::error::RunnerError;
use crate::events::EventSink;
use crate::process::run_streaming;
use crate::provision::Provisioner;

/// How the test process ended. A non-zero exit code means failing tests,
/// not a broken run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub exit_code: i32,
    pub duration: Duration,
}

/// Spawns the single test-execution process of a request
#[derive(Debug, Clone, Default)]
pub struct TestRunner {
    timeout: Option<Duration>,
}

impl TestRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub async fn run(
        &self,
        provisioner: &dyn Provisioner,
        workspace: &Path,
        engine: TargetEngine,
        headed: bool,
        sink: &EventSink,
    ) -> Result<RunOutcome, RunnerError> {
        // A report shipped inside the bundle must not be mistaken for this run's
        let report = provisioner.report_path(workspace);
        if report.exists() {
            std::fs::remove_file(&report).map_err(|source| RunnerError::StaleReport {
                path: report.clone(),
                source,
            })?;
        }

        let cmd = provisioner
            .test_command(workspace, engine, headed)
            .timeout(self.timeout);

        sink.status(format!(
            "Running tests ({}, {}): {}",
            engine,
            if headed { "headed" } else { "headless" },
            cmd.display()
        ));
        info!(command = %cmd.display(), %engine, headed, "running test suite");

        let output = run_streaming(&cmd, LogPhase::Test, sink).await?;

        info!(exit_code = output.exit_code, elapsed_ms = output.duration.as_millis() as u64, "test process exited");
        sink.status(format!(
            "Test process exited with code {} after {:.1}s",
            output.exit_code,
            output.duration.as_secs_f64()
        ));

        Ok(RunOutcome {
            exit_code: output.exit_code,
            duration: output.duration,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::StepCommand;
    use crate::error::ProvisionError;
    use crate::provision::ProvisionContext;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use suiterun_common::{LanguageFamily, StreamEvent};

    /// Runs a fixed shell snippet as the "test suite"
    struct ScriptSuite(&'static str);

    #[async_trait]
    impl Provisioner for ScriptSuite {
        fn family(&self) -> LanguageFamily {
            LanguageFamily::Python
        }

        async fn provision(&self, _ctx: &ProvisionContext<'_>) -> Result<(), ProvisionError> {
            Ok(())
        }

        fn test_command(&self, workspace: &Path, engine: TargetEngine, headed: bool) -> StepCommand {
            StepCommand::new("sh", workspace)
                .args(["-c", self.0])
                .env("ENGINE", engine.as_str())
                .env("HEADED", headed.to_string())
        }

        fn report_path(&self, workspace: &Path) -> PathBuf {
            workspace.join("report.json")
        }
    }

    #[tokio::test]
    async fn test_failing_suite_is_an_outcome_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, stream) = EventSink::channel();
        let suite = ScriptSuite("echo \"running on $ENGINE headed=$HEADED\"; exit 1");

        let outcome = TestRunner::default()
            .run(&suite, dir.path(), TargetEngine::Firefox, true, &sink)
            .await
            .unwrap();
        drop(sink);

        assert_eq!(outcome.exit_code, 1);
        let events = stream.collect_all().await;
        assert!(events.iter().any(|e| matches!(
            e,
            StreamEvent::Log(c) if c.chunk == "running on firefox headed=true"
        )));
    }

    #[tokio::test]
    async fn test_stale_report_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.json"), "{}").unwrap();
        let (sink, _stream) = EventSink::channel();

        TestRunner::default()
            .run(&ScriptSuite("exit 0"), dir.path(), TargetEngine::Chromium, false, &sink)
            .await
            .unwrap();
        assert!(!dir.path().join("report.json").exists());
    }

    #[tokio::test]
    async fn test_timeout_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, _stream) = EventSink::channel();

        let err = TestRunner::new(Some(Duration::from_millis(200)))
            .run(&ScriptSuite("sleep 30"), dir.path(), TargetEngine::Chromium, false, &sink)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
