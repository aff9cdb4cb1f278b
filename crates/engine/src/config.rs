//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Parent directory for ephemeral workspaces (system temp dir if unset)
    pub work_root: Option<PathBuf>,

    /// Leave workspaces on disk after a run, for debugging
    pub keep_workspaces: bool,

    /// Interpreted-scripting toolchain
    pub python: PythonConfig,

    /// Compiled-managed toolchain
    pub dotnet: DotnetConfig,

    /// Per-stage bounds
    pub timeouts: TimeoutConfig,
}

/// pytest / pytest-playwright toolchain settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PythonConfig {
    /// Interpreter used to create the virtual environment
    pub interpreter: String,

    /// Dependency manifest expected in the workspace root
    pub requirements_file: String,

    /// Virtual environment directory, relative to the workspace
    pub venv_dir: String,

    /// Packages installed alongside the manifest (report plugin)
    pub extra_packages: Vec<String>,

    /// JSON report artifact, relative to the workspace
    pub report_file: String,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            requirements_file: "requirements.txt".to_string(),
            venv_dir: ".venv".to_string(),
            extra_packages: vec!["pytest-json-report".to_string()],
            report_file: "report.json".to_string(),
        }
    }
}

/// dotnet / Playwright for .NET toolchain settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DotnetConfig {
    /// Path to the dotnet CLI
    pub binary: String,

    /// Build configuration
    pub configuration: String,

    /// Results directory for the TRX logger, relative to the workspace
    pub results_dir: String,

    /// TRX report file name inside `results_dir`
    pub report_file: String,

    /// PowerShell used to run the generated playwright.ps1 installer
    pub powershell: String,
}

impl Default for DotnetConfig {
    fn default() -> Self {
        Self {
            binary: "dotnet".to_string(),
            configuration: "Release".to_string(),
            results_dir: "TestResults".to_string(),
            report_file: "results.trx".to_string(),
            powershell: "pwsh".to_string(),
        }
    }
}

/// Stage timeouts in seconds. Zero disables the bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Applied to each provisioning command
    pub provision_secs: u64,

    /// Applied to the test process
    pub test_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            provision_secs: 900,
            test_secs: 1800,
        }
    }
}

impl TimeoutConfig {
    pub fn provision(&self) -> Option<Duration> {
        (self.provision_secs > 0).then(|| Duration::from_secs(self.provision_secs))
    }

    pub fn test(&self) -> Option<Duration> {
        (self.test_secs > 0).then(|| Duration::from_secs(self.test_secs))
    }
}

impl EngineConfig {
    /// Load configuration from file, falling back to defaults when it is absent
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `SUITERUN_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SUITERUN_WORK_ROOT") {
            self.work_root = Some(PathBuf::from(v));
        }
        if let Some(v) = get("SUITERUN_KEEP_WORKSPACES") {
            self.keep_workspaces = parse_bool("SUITERUN_KEEP_WORKSPACES", &v)?;
        }
        if let Some(v) = get("SUITERUN_PYTHON") {
            self.python.interpreter = v;
        }
        if let Some(v) = get("SUITERUN_DOTNET") {
            self.dotnet.binary = v;
        }
        if let Some(v) = get("SUITERUN_POWERSHELL") {
            self.dotnet.powershell = v;
        }
        if let Some(v) = get("SUITERUN_PROVISION_TIMEOUT_SECS") {
            self.timeouts.provision_secs = parse_secs("SUITERUN_PROVISION_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("SUITERUN_TEST_TIMEOUT_SECS") {
            self.timeouts.test_secs = parse_secs("SUITERUN_TEST_TIMEOUT_SECS", &v)?;
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml(
            r#"
keep_workspaces = true

[python]
interpreter = "/usr/bin/python3.12"

[timeouts]
test_secs = 0
"#,
        )
        .unwrap();

        assert!(config.keep_workspaces);
        assert_eq!(config.python.interpreter, "/usr/bin/python3.12");
        assert_eq!(config.python.requirements_file, "requirements.txt");
        assert_eq!(config.dotnet, DotnetConfig::default());
        assert_eq!(config.timeouts.provision(), Some(Duration::from_secs(900)));
        assert_eq!(config.timeouts.test(), None);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SUITERUN_WORK_ROOT", "/var/tmp/suiterun"),
            ("SUITERUN_KEEP_WORKSPACES", "yes"),
            ("SUITERUN_TEST_TIMEOUT_SECS", "60"),
            ("SUITERUN_PYTHON", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.work_root, Some(PathBuf::from("/var/tmp/suiterun")));
        assert!(config.keep_workspaces);
        assert_eq!(config.timeouts.test_secs, 60);
        assert_eq!(config.python.interpreter, "python3");
    }

    #[test]
    fn test_invalid_override() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_overrides(|k| (k == "SUITERUN_TEST_TIMEOUT_SECS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
