//! Error types for the execution engine

use std::path::PathBuf;
use thiserror::Error;

/// Filesystem failures while allocating or populating a workspace
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Failed to allocate workspace: {0}")]
    Allocate(#[source] std::io::Error),

    #[error("Invalid file path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of a single external command
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {seconds}s")]
    Timeout { program: String, seconds: u64 },

    #[error("IO error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Fatal provisioning failures
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Dependency manifest {file} not found in the workspace root")]
    MissingManifest { file: String },

    #[error("No {kind} found in the workspace")]
    MissingProject { kind: String },

    #[error("{step} failed with exit code {exit_code}: {output}")]
    StepFailed {
        step: String,
        exit_code: i32,
        output: String,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// The test process could not be run to completion
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to run test suite: {0}")]
    Process(#[from] ProcessError),

    #[error("Failed to clear stale report {}: {source}", path.display())]
    StaleReport {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Report artifact missing or unreadable. Never fatal to a run.
#[derive(Error, Debug)]
pub enum ReportParseError {
    #[error("Report artifact not found at {}", .0.display())]
    Missing(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed XML report: {0}")]
    Xml(String),

    #[error("Unexpected report layout: {0}")]
    Schema(String),
}

/// Configuration loading failures
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Errors that end a pipeline run with an `error` event
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Runner(#[from] RunnerError),
}
