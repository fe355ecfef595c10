//! Rendering charts to manifests with `helm template`.

use crate::git::{self, Git};
use crate::{HelmError, HelmGitDiffError, chart, deps};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Everything `helm template` needs besides the chart itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// The helm executable
    pub helm: PathBuf,
    pub release_name: String,
    /// Absolute paths, passed as `-f`
    pub values_files: Vec<PathBuf>,
    /// Passed verbatim as `--set`
    pub set_values: Vec<String>,
    pub skip_dependency_build: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            helm: PathBuf::from(crate::DEFAULT_HELM),
            release_name: crate::DEFAULT_RELEASE_NAME.to_string(),
            values_files: Vec::new(),
            set_values: Vec::new(),
            skip_dependency_build: false,
        }
    }
}

/// Arguments for `helm template <release> <chart> [-f values]... [--set kv]...`.
pub fn template_args(chart_path: &Path, opts: &RenderOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "template".into(),
        opts.release_name.as_str().into(),
        chart_path.into(),
    ];
    for values in &opts.values_files {
        args.push("-f".into());
        args.push(values.into());
    }
    for set in &opts.set_values {
        args.push("--set".into());
        args.push(set.as_str().into());
    }
    args
}

/// Render a chart directory on disk, building its dependencies first.
pub fn render_workdir(chart_path: &Path, opts: &RenderOptions) -> Result<String, HelmError> {
    deps::build_dependencies(&opts.helm, chart_path, opts.skip_dependency_build)?;

    tracing::debug!(chart = %chart_path.display(), "helm template");
    let output = Command::new(&opts.helm)
        .args(template_args(chart_path, opts))
        .output()
        .map_err(|e| HelmError::HelmSpawnFailed {
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(HelmError::TemplateFailed {
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    String::from_utf8(output.stdout).map_err(|e| HelmError::HelmInvalidUtf8 {
        message: e.to_string(),
    })
}

/// Render the chart at `chart_rel` as it exists at `reference`.
///
/// The chart and its `file://` dependencies are archived from git into a
/// temporary directory that is removed on return. A chart missing at an
/// existing reference renders as the empty manifest, so added and deleted
/// charts still diff. An unknown reference is an error.
pub fn render_at_ref(
    repo: &Git,
    chart_rel: &Path,
    reference: &str,
    opts: &RenderOptions,
) -> Result<String, HelmGitDiffError> {
    repo.verify_ref(reference)?;

    if !repo.exists_at(reference, chart_rel)? {
        tracing::debug!(chart = %chart_rel.display(), reference, "chart absent at reference");
        return Ok(String::new());
    }

    let chart_yaml = repo.show(reference, &chart_rel.join("Chart.yaml"))?;
    let mut paths = chart::extraction_paths(chart_rel, chart_yaml.as_deref());
    let mut missing = Vec::new();
    for path in paths.iter().skip(1) {
        if !repo.exists_at(reference, path)? {
            missing.push(path.clone());
        }
    }
    for path in &missing {
        tracing::warn!(dependency = %path.display(), reference, "local dependency not found");
    }
    paths.retain(|p| !missing.contains(p));
    tracing::debug!(?paths, reference, "archiving");

    let archive = repo.archive(reference, &paths)?;
    if archive.is_empty() {
        return Ok(String::new());
    }

    let tmp = tempfile::Builder::new()
        .prefix("helm-git-diff-")
        .tempdir()
        .map_err(|e| HelmGitDiffError::Io {
            message: format!("creating temp dir: {}", e),
        })?;

    git::extract(&archive, tmp.path())?;

    Ok(render_workdir(&tmp.path().join(chart_rel), opts)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lossy(args: &[OsString]) -> Vec<String> {
        args.iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn template_args_minimal() {
        let opts = RenderOptions::default();
        assert_eq!(
            lossy(&template_args(Path::new("/repo/charts/api"), &opts)),
            vec!["template", "release-name", "/repo/charts/api"]
        );
    }

    #[test]
    fn template_args_values_and_overrides() {
        let opts = RenderOptions {
            helm: PathBuf::from("/usr/local/bin/helm"),
            release_name: "demo".into(),
            values_files: vec![PathBuf::from("/work/a.yaml"), PathBuf::from("/work/b.yaml")],
            set_values: vec!["image.tag=v2".into(), "replicas=3,debug=true".into()],
            skip_dependency_build: true,
        };
        assert_eq!(
            lossy(&template_args(Path::new("chart"), &opts)),
            vec![
                "template",
                "demo",
                "chart",
                "-f",
                "/work/a.yaml",
                "-f",
                "/work/b.yaml",
                "--set",
                "image.tag=v2",
                "--set",
                "replicas=3,debug=true",
            ]
        );
    }
}
