//! pytest-json-report documents

use serde::Deserialize;
use serde_json::Value;
use suiterun_common::{TestOutcome, TestReport, TestResult, TestSummary};

use crate::error::ReportParseError;

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    summary: Option<Summary>,
    #[serde(default)]
    tests: Vec<TestEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct Summary {
    passed: Option<usize>,
    failed: Option<usize>,
    error: Option<usize>,
    skipped: Option<usize>,
    xfailed: Option<usize>,
    xpassed: Option<usize>,
    total: Option<usize>,
    collected: Option<usize>,
    duration: Option<f64>,
}

impl Summary {
    fn has_counts(&self) -> bool {
        [
            self.passed,
            self.failed,
            self.error,
            self.skipped,
            self.xfailed,
            self.xpassed,
            self.total,
        ]
        .iter()
        .any(Option::is_some)
    }
}

#[derive(Debug, Deserialize)]
struct TestEntry {
    nodeid: String,
    #[serde(default)]
    outcome: String,
    #[serde(default)]
    setup: Option<Stage>,
    #[serde(default)]
    call: Option<Stage>,
    #[serde(default)]
    teardown: Option<Stage>,
}

#[derive(Debug, Default, Deserialize)]
struct Stage {
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    longrepr: Option<Value>,
    #[serde(default)]
    crash: Option<Crash>,
}

#[derive(Debug, Deserialize)]
struct Crash {
    #[serde(default)]
    message: Option<String>,
}

pub fn parse(text: &str) -> Result<TestReport, ReportParseError> {
    let doc: Document = serde_json::from_str(text)?;

    let tests: Vec<TestResult> = doc.tests.iter().map(convert).collect();
    let summed: f64 = tests.iter().map(|t| t.duration_seconds).sum();
    let summary = doc.summary.unwrap_or_default();
    let duration = summary.duration.or(doc.duration).unwrap_or(summed);

    let summary = if summary.has_counts() {
        let n = |v: Option<usize>| v.unwrap_or(0);
        TestSummary {
            total: summary.total.or(summary.collected).unwrap_or(tests.len()),
            passed: n(summary.passed).saturating_add(n(summary.xpassed)),
            failed: n(summary.failed).saturating_add(n(summary.error)),
            skipped: n(summary.skipped).saturating_add(n(summary.xfailed)),
            duration_seconds: duration,
        }
    } else {
        TestSummary::from_results(&tests, Some(duration))
    };

    Ok(TestReport { summary, tests })
}

fn convert(entry: &TestEntry) -> TestResult {
    let stages = [entry.call.as_ref(), entry.setup.as_ref(), entry.teardown.as_ref()];

    let duration_seconds = entry
        .call
        .as_ref()
        .and_then(|s| s.duration)
        .or_else(|| entry.setup.as_ref().and_then(|s| s.duration))
        .unwrap_or(0.0);

    let error = stages
        .into_iter()
        .flatten()
        .find_map(|s| s.longrepr.as_ref().and_then(render_longrepr))
        .or_else(|| {
            stages
                .into_iter()
                .flatten()
                .find_map(|s| s.crash.as_ref().and_then(|c| c.message.clone()))
        });

    TestResult {
        id: entry.nodeid.clone(),
        outcome: map_outcome(&entry.outcome),
        duration_seconds,
        error,
    }
}

fn map_outcome(outcome: &str) -> TestOutcome {
    match outcome {
        "passed" | "xpassed" => TestOutcome::Passed,
        "failed" | "error" => TestOutcome::Failed,
        _ => TestOutcome::Skipped,
    }
}

/// `longrepr` is a string for failures and a `[path, line, reason]` triple
/// for skips
fn render_longrepr(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .map(|p| match p {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(":"),
        other => other.to_string(),
    };
    (!text.trim().is_empty()).then_some(text)
}
