//! Language family detection over a materialized manifest

use std::path::{Path, PathBuf};

use suiterun_common::LanguageFamily;

/// Family used when nothing in the manifest matches
pub const DEFAULT_FAMILY: LanguageFamily = LanguageFamily::Python;

#[derive(Debug, Clone, Copy)]
enum Marker {
    Extension(&'static str),
    FileName(&'static str),
}

impl Marker {
    fn matches(&self, path: &Path) -> bool {
        match self {
            Marker::Extension(ext) => path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(ext))
                .unwrap_or(false),
            Marker::FileName(name) => path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.eq_ignore_ascii_case(name))
                .unwrap_or(false),
        }
    }
}

/// Families in priority order. Compiled project descriptors come first since
/// a bundle often carries incidental scripts from other ecosystems.
const PRIORITY: &[(LanguageFamily, &[Marker])] = &[
    (
        LanguageFamily::Dotnet,
        &[
            Marker::Extension("csproj"),
            Marker::Extension("fsproj"),
            Marker::Extension("vbproj"),
            Marker::Extension("sln"),
        ],
    ),
    (
        LanguageFamily::Python,
        &[
            Marker::Extension("py"),
            Marker::FileName("requirements.txt"),
            Marker::FileName("pyproject.toml"),
            Marker::FileName("pytest.ini"),
            Marker::FileName("conftest.py"),
        ],
    ),
];

/// Outcome of detection with the file that decided it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub family: LanguageFamily,
    /// `None` when the default family was used
    pub matched: Option<PathBuf>,
}

impl Detection {
    pub fn is_default(&self) -> bool {
        self.matched.is_none()
    }
}

/// Classify a manifest. Total and deterministic: input order does not matter
/// and an unrecognized manifest yields [`DEFAULT_FAMILY`].
pub fn detect<P: AsRef<Path>>(paths: &[P]) -> Detection {
    let mut sorted: Vec<&Path> = paths.iter().map(AsRef::as_ref).collect();
    sorted.sort();

    for (family, markers) in PRIORITY {
        if let Some(hit) = sorted
            .iter()
            .find(|path| markers.iter().any(|m| m.matches(path)))
        {
            return Detection {
                family: *family,
                matched: Some(hit.to_path_buf()),
            };
        }
    }

    Detection {
        family: DEFAULT_FAMILY,
        matched: None,
    }
}

pub fn detect_family<P: AsRef<Path>>(paths: &[P]) -> LanguageFamily {
    detect(paths).family
}
