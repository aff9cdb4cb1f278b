//! Per-request execution pipeline
//!
//! One [`ExecutionRequest`] becomes one ephemeral workspace, one provisioned
//! environment and one test process. Progress flows out through an
//! [`EventSink`]; the run always ends with exactly one `complete` or `error`
//! event.

use std::sync::Arc;

use suiterun_common::ExecutionRequest;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::detect::detect;
use crate::error::PipelineError;
use crate::events::{EventSink, EventStream};
use crate::provision::{ProvisionContext, Provisioner, Toolchain};
use crate::report;
use crate::runner::TestRunner;
use crate::workspace::Workspace;

/// Pipeline lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Created,
    Provisioning,
    Running,
    Reporting,
    Completed,
    Failed,
}

impl PipelineStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Completed | PipelineStage::Failed)
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::Created => write!(f, "created"),
            PipelineStage::Provisioning => write!(f, "provisioning"),
            PipelineStage::Running => write!(f, "running"),
            PipelineStage::Reporting => write!(f, "reporting"),
            PipelineStage::Completed => write!(f, "completed"),
            PipelineStage::Failed => write!(f, "failed"),
        }
    }
}

/// Tracks the current stage of one run and announces transitions
struct StageTracker<'a> {
    stage: PipelineStage,
    sink: &'a EventSink,
}

impl<'a> StageTracker<'a> {
    fn new(sink: &'a EventSink) -> Self {
        Self {
            stage: PipelineStage::Created,
            sink,
        }
    }

    fn advance(&mut self, next: PipelineStage, message: impl Into<String>) {
        info!(from = %self.stage, to = %next, "stage transition");
        self.stage = next;
        self.sink.status(message);
    }
}

/// Executes requests against a shared configuration. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: Arc<EngineConfig>,
}

impl Pipeline {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one request to its terminal event and return the final stage
    pub async fn execute(&self, request: ExecutionRequest, sink: EventSink) -> PipelineStage {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, engine = %request.target_engine);

        async move {
            info!(files = request.files.len(), headed = request.headed, "run started");
            let mut tracker = StageTracker::new(&sink);

            let result = self.drive(&request, &mut tracker).await;
            match result {
                Ok(exit_code) => {
                    tracker.stage = PipelineStage::Completed;
                    info!(exit_code, "run completed");
                    sink.complete(exit_code);
                }
                Err(e) => {
                    tracker.stage = PipelineStage::Failed;
                    error!("run failed: {}", e);
                    sink.error(e.to_string());
                }
            }
            tracker.stage
        }
        .instrument(span)
        .await
    }

    /// Run a request on its own task, handing back the event stream
    pub fn spawn(&self, request: ExecutionRequest) -> (JoinHandle<PipelineStage>, EventStream) {
        let (sink, stream) = EventSink::channel();
        let pipeline = self.clone();
        let handle = tokio::spawn(async move { pipeline.execute(request, sink).await });
        (handle, stream)
    }

    async fn drive(
        &self,
        request: &ExecutionRequest,
        tracker: &mut StageTracker<'_>,
    ) -> Result<i32, PipelineError> {
        let sink = tracker.sink;

        let mut workspace = Workspace::create(self.config.work_root.as_deref())?;
        if self.config.keep_workspaces {
            workspace.keep();
            sink.status(format!("Workspace kept at {}", workspace.root().display()));
        }

        let written = workspace.materialize(&request.files)?;
        sink.status(format!("Wrote {} file(s) to the workspace", written.len()));

        let detection = detect(&workspace.files());
        let family = detection.family;
        match &detection.matched {
            Some(marker) => sink.status(format!(
                "Detected {} suite ({})",
                family,
                marker.display()
            )),
            None => sink.status(format!(
                "No language markers found; assuming a {} suite",
                family
            )),
        };

        let toolchain = Toolchain::for_family(family, &self.config);
        tracker.advance(
            PipelineStage::Provisioning,
            format!("Provisioning {} environment", family),
        );
        let ctx = ProvisionContext {
            workspace: workspace.root(),
            engine: request.target_engine,
            sink,
            timeout: self.config.timeouts.provision(),
        };
        toolchain.provision(&ctx).await?;

        tracker.advance(PipelineStage::Running, "Environment ready");
        let outcome = TestRunner::new(self.config.timeouts.test())
            .run(
                &toolchain,
                workspace.root(),
                request.target_engine,
                request.headed,
                sink,
            )
            .await?;

        tracker.advance(PipelineStage::Reporting, "Collecting test report");
        match report::normalize(family, &toolchain.report_path(workspace.root())) {
            Ok(parsed) => {
                info!(
                    total = parsed.summary.total,
                    passed = parsed.summary.passed,
                    failed = parsed.summary.failed,
                    skipped = parsed.summary.skipped,
                    "report ready"
                );
                sink.report(parsed);
            }
            Err(e) => {
                warn!("report unavailable: {}", e);
                sink.status(format!(
                    "No structured report available ({}); see the test log for results",
                    e
                ));
            }
        }

        drop(workspace);
        Ok(outcome.exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use suiterun_common::{FileEntry, StreamEvent};

    #[test]
    fn test_stage_display() {
        assert_eq!(PipelineStage::Provisioning.to_string(), "provisioning");
        assert!(PipelineStage::Failed.is_terminal());
        assert!(!PipelineStage::Reporting.is_terminal());
    }

    #[tokio::test]
    async fn test_invalid_path_fails_before_any_subprocess() {
        let work_root = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(EngineConfig {
            work_root: Some(work_root.path().to_path_buf()),
            ..EngineConfig::default()
        });
        let request = ExecutionRequest::new(vec![FileEntry::new("../outside", "test_x.py", "")]);

        let (handle, stream) = pipeline.spawn(request);
        let events = stream.collect_all().await;
        assert_eq!(handle.await.unwrap(), PipelineStage::Failed);

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StreamEvent::Error(f) if f.message.contains("outside")));
        assert_eq!(std::fs::read_dir(work_root.path()).unwrap().count(), 0);
    }
}
