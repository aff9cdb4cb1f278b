//! suiterun execution engine
//!
//! Turns an [`ExecutionRequest`](suiterun_common::ExecutionRequest) into an
//! ordered stream of [`StreamEvent`](suiterun_common::StreamEvent)s:
//!
//! 1. materialize the files into an ephemeral [`Workspace`]
//! 2. [`detect`] the language family
//! 3. provision a [`Toolchain`] for that family
//! 4. run the suite once with [`TestRunner`]
//! 5. normalize the artifact with [`report::normalize`]

pub mod config;
pub mod detect;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod process;
pub mod provision;
pub mod report;
pub mod runner;
pub mod workspace;

pub use config::EngineConfig;
pub use detect::{detect, detect_family, Detection};
pub use error::{
    ConfigError, PipelineError, ProcessError, ProvisionError, ReportParseError, RunnerError,
    WorkspaceError,
};
pub use events::{EventSink, EventStream};
pub use pipeline::{Pipeline, PipelineStage};
pub use provision::{Provisioner, Toolchain};
pub use runner::{RunOutcome, TestRunner};
pub use workspace::Workspace;
