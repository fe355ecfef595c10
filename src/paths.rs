//! Mapping between git-relative paths, working-directory paths, and chart names.
//!
//! Git reports paths relative to the repository root while users type paths
//! relative to wherever they happen to be standing. Everything in here is
//! lexical: no function touches the filesystem except
//! [`detect_chart_context`], which only checks for a `Chart.yaml`.

use crate::git::slash_path;
use error_set::error_set;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

error_set! {
    /// Errors from translating paths between the working directory and the repository
    PathError := {
        /// Path resolves to somewhere outside the repository
        #[display("{path} is outside the repository at {root}")]
        OutsideRepository { path: String, root: String },
        /// Current directory is not inside the repository
        #[display("current directory {cwd} is outside the repository at {root}")]
        CwdOutsideRepository { cwd: String, root: String },
    }
}

/// Chart inferred from the current directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartContext {
    /// Repository-relative directory holding the chart
    pub chart_dir: PathBuf,
    /// Chart directory name
    pub chart: String,
}

/// Fold `.` and `..` components without consulting the filesystem.
///
/// Leading `..` components that cannot be folded are kept.
pub fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }

    parts.iter().collect()
}

/// Names of the chart directories under `chart_dir` touched by `files`.
///
/// `files` are repository-relative paths as printed by `git diff --name-only`.
/// A file only counts when it sits inside a subdirectory of `chart_dir`; an
/// empty `chart_dir` means the repository root. The result is sorted and free
/// of duplicates.
pub fn changed_charts<S: AsRef<str>>(files: &[S], chart_dir: &Path) -> Vec<String> {
    let prefix = slash_path(chart_dir);

    let charts: BTreeSet<&str> = files
        .iter()
        .filter_map(|file| {
            let file = file.as_ref();
            let rest = if prefix.is_empty() {
                file
            } else {
                file.strip_prefix(prefix.as_str())?.strip_prefix('/')?
            };
            let (name, _) = rest.split_once('/')?;
            (!name.is_empty()).then_some(name)
        })
        .collect();

    charts.into_iter().map(str::to_string).collect()
}

/// Translate a user-supplied chart path into a repository-relative one.
///
/// - absolute paths must live under `root`
/// - paths starting with `.` or `..` are relative to `cwd`
/// - anything else is already relative to the repository root
pub fn repo_relative(path: &Path, cwd: &Path, root: &Path) -> Result<PathBuf, PathError> {
    let outside = || PathError::OutsideRepository {
        path: path.display().to_string(),
        root: root.display().to_string(),
    };

    if path.is_absolute() {
        let path = normalize(path);
        let rel = path.strip_prefix(root).map_err(|_| outside())?;
        return Ok(rel.to_path_buf());
    }

    let cwd_relative = matches!(
        path.components().next(),
        Some(Component::CurDir) | Some(Component::ParentDir)
    );
    if !cwd_relative {
        return Ok(normalize(path));
    }

    let cwd_rel = cwd
        .strip_prefix(root)
        .map_err(|_| PathError::CwdOutsideRepository {
            cwd: cwd.display().to_string(),
            root: root.display().to_string(),
        })?;

    let resolved = normalize(&cwd_rel.join(path));
    if matches!(resolved.components().next(), Some(Component::ParentDir)) {
        return Err(outside());
    }
    Ok(resolved)
}

/// Working-tree location of a repository-relative path.
pub fn workdir_path(repo_rel: &Path, root: &Path) -> PathBuf {
    root.join(repo_rel)
}

/// Infer the chart when invoked from inside a chart directory.
///
/// Returns `None` when the current directory has no `Chart.yaml`, or when it
/// is the repository root itself (there is no parent to diff under).
pub fn detect_chart_context(cwd: &Path, root: &Path) -> Result<Option<ChartContext>, PathError> {
    if !cwd.join("Chart.yaml").is_file() {
        return Ok(None);
    }

    let rel = cwd
        .strip_prefix(root)
        .map_err(|_| PathError::CwdOutsideRepository {
            cwd: cwd.display().to_string(),
            root: root.display().to_string(),
        })?;

    let Some(chart) = rel.file_name() else {
        tracing::warn!("Chart.yaml at the repository root cannot be diffed by name");
        return Ok(None);
    };

    Ok(Some(ChartContext {
        chart_dir: rel.parent().map(Path::to_path_buf).unwrap_or_default(),
        chart: chart.to_string_lossy().into_owned(),
    }))
}

/// Resolve comma-split values file arguments against the current directory.
pub fn resolve_values_files(files: &[String], cwd: &Path) -> Vec<PathBuf> {
    files
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .map(|f| {
            let path = Path::new(f);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                cwd.join(path)
            }
        })
        .collect()
}
