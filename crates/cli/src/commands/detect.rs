//! Detect Command

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use suiterun_common::LanguageFamily;
use suiterun_engine::workspace::resolve_relative_path;
use suiterun_engine::Detection;

use super::load_manifest;
use crate::output::{print_item, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct DetectArgs {
    /// Manifest file: execution request JSON or a bare array of files
    pub manifest: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct DetectionDisplay {
    pub family: LanguageFamily,
    pub matched: Option<String>,
    pub files: usize,
}

impl DetectionDisplay {
    fn new(detection: Detection, files: usize) -> Self {
        Self {
            family: detection.family,
            matched: detection
                .matched
                .map(|p| p.to_string_lossy().replace('\\', "/")),
            files,
        }
    }
}

impl TableDisplay for DetectionDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Family", "Matched", "Files"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.family.to_string(),
            self.matched
                .clone()
                .unwrap_or_else(|| "(no marker, default)".to_string()),
            self.files.to_string(),
        ]
    }
}

pub fn execute(args: DetectArgs, format: OutputFormat) -> Result<()> {
    let request = load_manifest(&args.manifest)?;
    let paths = request
        .files
        .iter()
        .map(resolve_relative_path)
        .collect::<Result<Vec<_>, _>>()?;

    let display = DetectionDisplay::new(suiterun_engine::detect(&paths), paths.len());
    print_item(&display, format);
    Ok(())
}
