//! Core types for suiterun

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One generated source file as delivered by the producer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    /// Directory relative to the workspace root. May be empty and may itself
    /// contain separators.
    #[serde(default)]
    pub path: String,
    pub content: String,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Browser engine driven by the generated suite
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "EngineWire")]
pub enum TargetEngine {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl TargetEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetEngine::Chromium => "chromium",
            TargetEngine::Firefox => "firefox",
            TargetEngine::Webkit => "webkit",
        }
    }

    /// Parse an engine name, falling back to the default for anything unknown.
    pub fn parse_lossy(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => TargetEngine::Chromium,
            "firefox" => TargetEngine::Firefox,
            "webkit" => TargetEngine::Webkit,
            _ => TargetEngine::default(),
        }
    }
}

impl std::fmt::Display for TargetEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TargetEngine {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse_lossy(s))
    }
}

/// Accepts any JSON value for the engine field; only known names select an engine.
#[derive(Deserialize)]
#[serde(untagged)]
enum EngineWire {
    Name(String),
    Other(serde_json::Value),
}

impl From<EngineWire> for TargetEngine {
    fn from(wire: EngineWire) -> Self {
        match wire {
            EngineWire::Name(name) => TargetEngine::parse_lossy(&name),
            EngineWire::Other(_) => TargetEngine::default(),
        }
    }
}

/// A request to materialize, provision and execute a generated suite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub files: Vec<FileEntry>,
    #[serde(default, alias = "browser")]
    pub target_engine: TargetEngine,
    #[serde(default)]
    pub headed: bool,
}

impl ExecutionRequest {
    pub fn new(files: Vec<FileEntry>) -> Self {
        Self {
            files,
            target_engine: TargetEngine::default(),
            headed: false,
        }
    }

    pub fn with_engine(mut self, engine: TargetEngine) -> Self {
        self.target_engine = engine;
        self
    }

    pub fn with_headed(mut self, headed: bool) -> Self {
        self.headed = headed;
        self
    }

    /// Parse a manifest document: either a full request object or a bare
    /// array of file entries.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if value.is_array() {
            let files: Vec<FileEntry> = serde_json::from_value(value)?;
            return Ok(Self::new(files));
        }
        if !value.is_object() {
            return Err(Error::InvalidManifest(
                "expected an object with `files` or an array of file entries".to_string(),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Toolchain ecosystem a generated suite belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageFamily {
    /// pytest + pytest-playwright inside a virtual environment
    Python,
    /// `dotnet test` with Playwright for .NET
    Dotnet,
}

impl LanguageFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageFamily::Python => "python",
            LanguageFamily::Dotnet => "dotnet",
        }
    }
}

impl std::fmt::Display for LanguageFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LanguageFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "py" | "pytest" => Ok(LanguageFamily::Python),
            "dotnet" | "csharp" | "c#" | ".net" => Ok(LanguageFamily::Dotnet),
            other => Err(Error::UnknownFamily(other.to_string())),
        }
    }
}

/// Phase a log chunk originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogPhase {
    Environment,
    Dependencies,
    Restore,
    Build,
    Browsers,
    Test,
}

impl std::fmt::Display for LogPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogPhase::Environment => "environment",
            LogPhase::Dependencies => "dependencies",
            LogPhase::Restore => "restore",
            LogPhase::Build => "build",
            LogPhase::Browsers => "browsers",
            LogPhase::Test => "test",
        };
        f.write_str(s)
    }
}

/// Raw subprocess output tagged with its phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogChunk {
    pub phase: LogPhase,
    pub chunk: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub exit_code: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub message: String,
}

/// One record of the ordered event stream sent to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "lowercase")]
pub enum StreamEvent {
    Status(String),
    Log(LogChunk),
    Report(TestReport),
    Complete(Completion),
    Error(Failure),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete(_) | StreamEvent::Error(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Status(_) => "status",
            StreamEvent::Log(_) => "log",
            StreamEvent::Report(_) => "report",
            StreamEvent::Complete(_) => "complete",
            StreamEvent::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Passed,
    Failed,
    Skipped,
}

impl std::fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestOutcome::Passed => write!(f, "passed"),
            TestOutcome::Failed => write!(f, "failed"),
            TestOutcome::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub id: String,
    pub outcome: TestOutcome,
    pub duration_seconds: f64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_seconds: f64,
}

/// Canonical report produced regardless of the source family
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    pub summary: TestSummary,
    pub tests: Vec<TestResult>,
}

impl TestReport {
    /// Build a report whose summary is recomputed from the results.
    /// `duration_seconds` overrides the summed per-test durations.
    pub fn from_results(tests: Vec<TestResult>, duration_seconds: Option<f64>) -> Self {
        let summary = TestSummary::from_results(&tests, duration_seconds);
        Self { summary, tests }
    }

    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }
}

impl TestSummary {
    pub fn from_results(tests: &[TestResult], duration_seconds: Option<f64>) -> Self {
        let count = |outcome: TestOutcome| tests.iter().filter(|t| t.outcome == outcome).count();
        Self {
            total: tests.len(),
            passed: count(TestOutcome::Passed),
            failed: count(TestOutcome::Failed),
            skipped: count(TestOutcome::Skipped),
            duration_seconds: duration_seconds
                .unwrap_or_else(|| tests.iter().map(|t| t.duration_seconds).sum()),
        }
    }
}
