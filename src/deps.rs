//! Chart dependency resolution via `helm dependency build`.

use crate::HelmError;
use crate::chart;
use std::fs;
use std::path::Path;
use std::process::Command;

/// Whether the vendored dependencies under `charts/` can be trusted.
///
/// Stale when `Chart.yaml`, `Chart.lock`, or `charts/` is missing, or when
/// `Chart.yaml` was modified after `Chart.lock`. A chart that declares
/// dependencies additionally needs a non-empty `charts/`.
pub fn dependencies_up_to_date(chart_dir: &Path) -> bool {
    let chart_yaml = chart_dir.join("Chart.yaml");
    let chart_lock = chart_dir.join("Chart.lock");
    let charts = chart_dir.join("charts");

    let (Ok(yaml_meta), Ok(lock_meta)) = (fs::metadata(&chart_yaml), fs::metadata(&chart_lock))
    else {
        return false;
    };
    if !charts.is_dir() {
        return false;
    }

    match (yaml_meta.modified(), lock_meta.modified()) {
        (Ok(yaml_time), Ok(lock_time)) if yaml_time <= lock_time => {}
        _ => return false,
    }

    let Ok(text) = fs::read_to_string(&chart_yaml) else {
        return false;
    };
    if !chart::has_dependencies(&text) {
        return true;
    }

    fs::read_dir(&charts)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Run `<helm> dependency build` for `chart_dir` unless skipped or up to date.
pub fn build_dependencies(helm: &Path, chart_dir: &Path, skip: bool) -> Result<(), HelmError> {
    if !chart_dir.join("Chart.yaml").exists() {
        return Ok(());
    }
    if skip {
        tracing::debug!(chart = %chart_dir.display(), "dependency build skipped");
        return Ok(());
    }
    if dependencies_up_to_date(chart_dir) {
        tracing::debug!(chart = %chart_dir.display(), "dependencies up to date");
        return Ok(());
    }

    tracing::debug!(chart = %chart_dir.display(), "helm dependency build");
    let output = Command::new(helm)
        .args(["dependency", "build"])
        .arg(chart_dir)
        .output()
        .map_err(|e| HelmError::HelmSpawnFailed {
            message: e.to_string(),
        })?;

    if !output.status.success() {
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(HelmError::DependencyBuildFailed {
            output: combined.trim().to_string(),
        });
    }

    Ok(())
}
