//! CLI Commands

pub mod detect;
pub mod report;
pub mod run;

use std::path::Path;

use anyhow::{Context, Result};
use suiterun_common::ExecutionRequest;

/// Read a manifest: an `ExecutionRequest` document or a bare array of files
pub fn load_manifest(path: &Path) -> Result<ExecutionRequest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    ExecutionRequest::from_json(&raw)
        .with_context(|| format!("Invalid manifest {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_manifest_variants() {
        let dir = tempfile::tempdir().unwrap();

        let object = dir.path().join("request.json");
        std::fs::write(
            &object,
            r#"{"files": [{"name": "test_a.py", "path": "", "content": ""}], "targetEngine": "webkit", "headed": true}"#,
        )
        .unwrap();
        let request = load_manifest(&object).unwrap();
        assert_eq!(request.files.len(), 1);
        assert!(request.headed);

        let array = dir.path().join("files.json");
        std::fs::write(&array, r#"[{"name": "E2E.csproj", "path": "E2E", "content": ""}]"#).unwrap();
        assert_eq!(load_manifest(&array).unwrap().files[0].path, "E2E");

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{").unwrap();
        let err = load_manifest(&broken).unwrap_err();
        assert!(err.to_string().contains("Invalid manifest"));

        assert!(load_manifest(&dir.path().join("absent.json")).is_err());
    }
}
