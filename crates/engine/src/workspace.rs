//! Ephemeral per-request workspaces

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use suiterun_common::FileEntry;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::WorkspaceError;

/// Directories created by provisioning, never part of the materialized suite
const ENVIRONMENT_DIRS: &[&str] = &[".venv", "__pycache__", ".pytest_cache"];

/// Process-wide sequence number for workspace names
static WORKSPACE_SEQ: AtomicU64 = AtomicU64::new(0);

/// An exclusively owned directory holding one request's files, environment and
/// report artifacts. Removed on drop unless [`Workspace::keep`] was called.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    guard: Option<TempDir>,
}

impl Workspace {
    /// Allocate a fresh directory under `parent`, or the system temp dir
    pub fn create(parent: Option<&Path>) -> Result<Self, WorkspaceError> {
        let seq = WORKSPACE_SEQ.fetch_add(1, Ordering::Relaxed);
        let prefix = format!("suiterun-{}-", seq);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent).map_err(|source| WorkspaceError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
        .map_err(WorkspaceError::Allocate)?;

        let root = dir.path().to_path_buf();
        debug!(root = %root.display(), "workspace allocated");

        Ok(Self {
            root,
            guard: Some(dir),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Leave the directory on disk after the workspace is dropped
    pub fn keep(&mut self) {
        if let Some(dir) = self.guard.take() {
            let path = dir.keep();
            info!(root = %path.display(), "keeping workspace");
        }
    }

    /// Write every entry under the root, creating parent directories as
    /// needed. Returns the resolved relative paths in input order.
    pub fn materialize(&self, files: &[FileEntry]) -> Result<Vec<PathBuf>, WorkspaceError> {
        let mut written = Vec::with_capacity(files.len());
        let mut seen = HashSet::new();

        for entry in files {
            let relative = resolve_relative_path(entry)?;
            let target = self.root.join(&relative);

            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|source| WorkspaceError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }

            std::fs::write(&target, entry.content.as_bytes()).map_err(|source| {
                WorkspaceError::Write {
                    path: relative.clone(),
                    source,
                }
            })?;

            if !seen.insert(relative.clone()) {
                warn!(path = %relative.display(), "duplicate file entry, last one wins");
            } else {
                written.push(relative);
            }
        }

        debug!(count = written.len(), "workspace populated");
        Ok(written)
    }

    /// Re-walk the workspace and list regular files relative to the root,
    /// sorted, skipping provisioned environment directories
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| {
                !(e.file_type().is_dir()
                    && ENVIRONMENT_DIRS
                        .iter()
                        .any(|skip| e.file_name().to_str() == Some(skip)))
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.path().strip_prefix(&self.root).ok().map(Path::to_path_buf))
            .collect();
        files.sort();
        files
    }
}

/// Resolve an entry's relative location under the workspace root.
///
/// A non-empty `path` is the directory. A `name` containing separators
/// contributes its leading segments as a directory too; when both are given
/// and neither is a prefix of the other they are concatenated.
pub fn resolve_relative_path(entry: &FileEntry) -> Result<PathBuf, WorkspaceError> {
    let invalid = |reason: &str| WorkspaceError::InvalidPath {
        path: if entry.path.is_empty() {
            entry.name.clone()
        } else {
            format!("{}/{}", entry.path, entry.name)
        },
        reason: reason.to_string(),
    };

    let path_dir = segments(&entry.path);
    let mut name_segments = segments(&entry.name);
    let file_name = name_segments.pop().ok_or_else(|| invalid("empty file name"))?;
    if entry.name.ends_with(['/', '\\']) {
        return Err(invalid("file name ends with a separator"));
    }
    let name_dir = name_segments;

    if path_dir
        .iter()
        .chain(name_dir.iter())
        .chain(std::iter::once(&file_name))
        .any(|s| *s == "..")
    {
        return Err(invalid("parent directory segments are not allowed"));
    }
    if path_dir
        .iter()
        .chain(name_dir.iter())
        .chain(std::iter::once(&file_name))
        .any(|s| s.contains(':'))
    {
        return Err(invalid("drive or stream specifiers are not allowed"));
    }

    let dir: Vec<&str> = if name_dir.is_empty() {
        path_dir
    } else if path_dir.is_empty() {
        name_dir
    } else if path_dir.starts_with(&name_dir) {
        path_dir
    } else if name_dir.starts_with(&path_dir) {
        name_dir
    } else {
        path_dir.into_iter().chain(name_dir).collect()
    };

    let mut resolved: PathBuf = dir.into_iter().collect();
    resolved.push(file_name);
    Ok(resolved)
}

fn segments(raw: &str) -> Vec<&str> {
    raw.split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect()
}
