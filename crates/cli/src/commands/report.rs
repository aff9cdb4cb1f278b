//! Report Command

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::Args;
use suiterun_common::LanguageFamily;
use suiterun_engine::report::normalize;

use crate::output::{print_report, OutputFormat};

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// pytest-json-report JSON or TRX file
    pub artifact: PathBuf,

    /// Artifact family, inferred from the extension when omitted
    #[arg(long)]
    pub family: Option<LanguageFamily>,
}

/// `.json` artifacts come from pytest, `.trx` from dotnet
fn infer_family(path: &Path) -> Option<LanguageFamily> {
    match path
        .extension()?
        .to_str()?
        .to_ascii_lowercase()
        .as_str()
    {
        "json" => Some(LanguageFamily::Python),
        "trx" | "xml" => Some(LanguageFamily::Dotnet),
        _ => None,
    }
}

pub fn execute(args: ReportArgs, format: OutputFormat) -> Result<()> {
    let family = match args.family.or_else(|| infer_family(&args.artifact)) {
        Some(family) => family,
        None => bail!(
            "Cannot infer the report family of {}; pass --family python|dotnet",
            args.artifact.display()
        ),
    };

    let report = normalize(family, &args.artifact)?;
    print_report(&report, format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_family() {
        assert_eq!(infer_family(Path::new("report.json")), Some(LanguageFamily::Python));
        assert_eq!(
            infer_family(Path::new("TestResults/results.TRX")),
            Some(LanguageFamily::Dotnet)
        );
        assert_eq!(infer_family(Path::new("results")), None);
    }
}
