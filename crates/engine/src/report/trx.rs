//! Visual Studio TRX result files
//!
//! Only the parts of the schema that feed the canonical report are read:
//! top-level `UnitTestResult` elements and the `Counters` summary. Element
//! and attribute names are matched on their local part, so the default
//! `TeamTest/2010` namespace and prefixed variants both work.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use suiterun_common::{TestOutcome, TestReport, TestResult, TestSummary};
use tracing::debug;

use crate::error::ReportParseError;

/// Parse `[d.]HH:MM:SS[.fraction]` into seconds
pub fn parse_trx_duration(value: &str) -> Option<f64> {
    let mut parts = value.trim().split(':');
    let (head, minutes, seconds) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let (days, hours) = match head.split_once('.') {
        Some((d, h)) => (d.parse::<u64>().ok()?, h.parse::<u64>().ok()?),
        None => (0, head.parse::<u64>().ok()?),
    };
    let minutes: u64 = minutes.parse().ok()?;
    let seconds: f64 = seconds.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }

    let whole = days
        .checked_mul(24)?
        .checked_add(hours)?
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?;
    Some(whole as f64 + seconds)
}

pub fn parse(text: &str) -> Result<TestReport, ReportParseError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut tests = Vec::new();
    let mut counters: Option<HashMap<String, usize>> = None;
    let mut current: Option<PendingResult> = None;
    let mut saw_root = false;

    loop {
        let event = reader.read_event().map_err(|e| {
            ReportParseError::Xml(format!("at byte {}: {}", reader.buffer_position(), e))
        })?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let name = local_name(e);
                let is_empty = matches!(event, Event::Empty(_));

                if !saw_root {
                    if name != "TestRun" {
                        return Err(ReportParseError::Schema(format!(
                            "expected <TestRun> root element, found <{}>",
                            name
                        )));
                    }
                    saw_root = true;
                }

                match name.as_str() {
                    // Nested results (data-driven rows) roll up into their parent
                    "UnitTestResult" if current.is_none() => {
                        let pending = PendingResult::from_attributes(&attributes(e)?, stack.len());
                        if is_empty {
                            tests.push(pending.finish());
                        } else {
                            current = Some(pending);
                        }
                    }
                    "Counters" => counters = Some(parse_counters(&attributes(e)?)),
                    _ => {}
                }

                if let Some(pending) = current.as_mut() {
                    if !is_empty && stack.last().map(String::as_str) == Some("ErrorInfo") {
                        pending.capture = match name.as_str() {
                            "Message" => Some(Field::Message),
                            "StackTrace" => Some(Field::StackTrace),
                            _ => None,
                        };
                    }
                }

                if !is_empty {
                    stack.push(name);
                }
            }
            Event::End(_) => {
                stack.pop();
                if let Some(pending) = current.as_mut() {
                    pending.capture = None;
                    if stack.len() == pending.depth {
                        if let Some(done) = current.take() {
                            tests.push(done.finish());
                        }
                    }
                }
            }
            Event::Text(ref t) => {
                if let Some(pending) = current.as_mut() {
                    if pending.capture.is_some() {
                        let text = t.unescape().map_err(|e| ReportParseError::Xml(e.to_string()))?;
                        pending.append(&text);
                    }
                }
            }
            Event::CData(ref c) => {
                if let Some(pending) = current.as_mut() {
                    if pending.capture.is_some() {
                        pending.append(&String::from_utf8_lossy(c));
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ReportParseError::Xml(format!(
            "document ended inside <{}>",
            open
        )));
    }
    if !saw_root {
        return Err(ReportParseError::Schema("empty document".to_string()));
    }

    let summary = match counters {
        Some(counters) => summary_from_counters(&counters, &tests),
        None => TestSummary::from_results(&tests, None),
    };
    Ok(TestReport { summary, tests })
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Message,
    StackTrace,
}

#[derive(Debug)]
struct PendingResult {
    id: String,
    outcome: TestOutcome,
    duration_seconds: f64,
    message: String,
    stack_trace: String,
    capture: Option<Field>,
    /// Stack depth at which the element was opened
    depth: usize,
}

impl PendingResult {
    fn from_attributes(attrs: &HashMap<String, String>, depth: usize) -> Self {
        let duration_seconds = match attrs.get("duration") {
            Some(raw) => parse_trx_duration(raw).unwrap_or_else(|| {
                debug!(duration = %raw, "unparseable TRX duration");
                0.0
            }),
            None => 0.0,
        };

        Self {
            id: attrs.get("testName").cloned().unwrap_or_default(),
            outcome: map_outcome(attrs.get("outcome").map(String::as_str).unwrap_or("")),
            duration_seconds,
            message: String::new(),
            stack_trace: String::new(),
            capture: None,
            depth,
        }
    }

    fn append(&mut self, text: &str) {
        match self.capture {
            Some(Field::Message) => self.message.push_str(text),
            Some(Field::StackTrace) => self.stack_trace.push_str(text),
            None => {}
        }
    }

    fn finish(self) -> TestResult {
        let message = self.message.trim();
        let stack_trace = self.stack_trace.trim();
        let error = match (message.is_empty(), stack_trace.is_empty()) {
            (true, true) => None,
            (false, true) => Some(message.to_string()),
            (true, false) => Some(stack_trace.to_string()),
            (false, false) => Some(format!("{}\n{}", message, stack_trace)),
        };

        TestResult {
            id: self.id,
            outcome: self.outcome,
            duration_seconds: self.duration_seconds,
            error,
        }
    }
}

fn map_outcome(outcome: &str) -> TestOutcome {
    match outcome {
        "Passed" | "PassedButRunAborted" => TestOutcome::Passed,
        "Failed" | "Error" | "Timeout" | "Aborted" => TestOutcome::Failed,
        _ => TestOutcome::Skipped,
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attributes(e: &BytesStart<'_>) -> Result<HashMap<String, String>, ReportParseError> {
    let mut map = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ReportParseError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| ReportParseError::Xml(e.to_string()))?;
        map.insert(key, value.into_owned());
    }
    Ok(map)
}

fn parse_counters(attrs: &HashMap<String, String>) -> HashMap<String, usize> {
    attrs
        .iter()
        .filter_map(|(k, v)| v.trim().parse().ok().map(|n| (k.clone(), n)))
        .collect()
}

fn summary_from_counters(counters: &HashMap<String, usize>, tests: &[TestResult]) -> TestSummary {
    let n = |key: &str| counters.get(key).copied().unwrap_or(0);

    let total = counters.get("total").copied().unwrap_or(tests.len());
    let sum = |keys: &[&str]| keys.iter().fold(0usize, |acc, k| acc.saturating_add(n(*k)));
    let passed = sum(&["passed", "passedButRunAborted"]);
    let failed = sum(&["failed", "error", "timeout", "aborted"]);

    TestSummary {
        total,
        passed,
        failed,
        skipped: total.saturating_sub(passed.saturating_add(failed)),
        duration_seconds: tests.iter().map(|t| t.duration_seconds).sum(),
    }
}
