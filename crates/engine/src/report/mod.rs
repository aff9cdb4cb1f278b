//! Report normalization
//!
//! Each family leaves a machine-readable artifact behind: pytest-json-report
//! JSON for Python, TRX XML for dotnet. Both are reduced to the canonical
//! [`TestReport`].

pub mod pytest;
pub mod trx;

pub use trx::parse_trx_duration;

use std::path::Path;

use suiterun_common::{LanguageFamily, TestReport};
use tracing::debug;

use crate::error::ReportParseError;

/// Read and normalize the artifact at `path`
pub fn normalize(family: LanguageFamily, path: &Path) -> Result<TestReport, ReportParseError> {
    if !path.is_file() {
        return Err(ReportParseError::Missing(path.to_path_buf()));
    }
    let raw = std::fs::read(path).map_err(|source| ReportParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(strip_bom(&raw));

    let report = normalize_str(family, &text)?;
    debug!(
        %family,
        path = %path.display(),
        total = report.summary.total,
        failed = report.summary.failed,
        "report normalized"
    );
    Ok(report)
}

/// Normalize an artifact already held in memory
pub fn normalize_str(family: LanguageFamily, text: &str) -> Result<TestReport, ReportParseError> {
    match family {
        LanguageFamily::Python => pytest::parse(text),
        LanguageFamily::Dotnet => trx::parse(text),
    }
}

/// The TRX logger writes a UTF-8 byte order mark
fn strip_bom(raw: &[u8]) -> &[u8] {
    raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let err = normalize(LanguageFamily::Python, &dir.path().join("report.json")).unwrap_err();
        assert!(matches!(err, ReportParseError::Missing(_)));
    }

    #[test]
    fn test_bom_prefixed_trx() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.trx");
        let mut raw = b"\xEF\xBB\xBF".to_vec();
        raw.extend_from_slice(
            br#"<?xml version="1.0" encoding="utf-8"?>
<TestRun xmlns="http://microsoft.com/schemas/VisualStudio/TeamTest/2010">
  <Results>
    <UnitTestResult testName="Login" outcome="Passed" duration="00:00:02.2500000" />
  </Results>
</TestRun>"#,
        );
        std::fs::write(&path, raw).unwrap();

        let report = normalize(LanguageFamily::Dotnet, &path).unwrap();
        assert_eq!(report.summary.total, 1);
        assert_eq!(report.summary.passed, 1);
        assert_eq!(report.tests[0].duration_seconds, 2.25);
    }

    #[test]
    fn test_garbage_is_an_error_not_a_panic() {
        assert!(normalize_str(LanguageFamily::Python, "not json").is_err());
        assert!(normalize_str(LanguageFamily::Dotnet, "<TestRun><Results>").is_err());
    }
}
