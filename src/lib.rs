use error_set::error_set;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub mod chart;
pub mod deps;
pub mod diff;
pub mod git;
pub mod paths;
pub mod render;

pub use git::Git;
pub use paths::PathError;
pub use render::RenderOptions;

/// Reference diffed from when `--base` is not given.
pub const DEFAULT_BASE: &str = "origin/main";
/// Reference diffed to when `--current` is not given. Rendered from the
/// working tree, so uncommitted edits show up.
pub const DEFAULT_CURRENT: &str = "HEAD";
/// Release name handed to `helm template`.
pub const DEFAULT_RELEASE_NAME: &str = "release-name";
/// Helm executable used when none is configured.
pub const DEFAULT_HELM: &str = "helm";

error_set! {
    /// Top-level error for helm-git-diff operations
    HelmGitDiffError := {
        #[display("no Chart.yaml found in {path} - not a valid Helm chart")]
        ChartNotFound { path: String },
        #[display("diffing chart {chart}: {source}")]
        ChartFailed { chart: String, source: Box<HelmGitDiffError> },
        #[display("{message}")]
        Io { message: String },
        PathError(PathError),
    } || GitCommandError || HelmError

    /// Errors from git and tar command execution
    GitCommandError := {
        #[display("not a git repository (or any of the parent directories)")]
        NotARepository,
        #[display("unknown git reference '{reference}'")]
        UnknownReference { reference: String },
        #[display("Failed to run git {command}: {message}")]
        SpawnFailed { command: String, message: String },
        #[display("git {command} failed: {stderr}")]
        ExitError { command: String, stderr: String },
        #[display("archiving chart paths at {reference} failed: {stderr}")]
        ArchiveFailed { reference: String, stderr: String },
        #[display("Invalid UTF-8 in git output: {message}")]
        InvalidUtf8 { message: String },
        #[display("Failed to spawn tar: {message}")]
        TarSpawnFailed { message: String },
        #[display("Failed to get stdin handle for tar")]
        TarStdinFailed,
        #[display("Failed to write archive to tar: {message}")]
        TarWriteFailed { message: String },
        #[display("Failed to wait for tar: {message}")]
        TarWaitFailed { message: String },
        #[display("extracting archive failed: {stderr}")]
        TarExitError { stderr: String },
    }

    /// Errors from helm command execution
    HelmError := {
        #[display("Failed to run helm: {message}")]
        HelmSpawnFailed { message: String },
        #[display("helm template failed: {stderr}")]
        TemplateFailed { stderr: String },
        #[display("helm dependency build failed: {output}")]
        DependencyBuildFailed { output: String },
        #[display("Invalid UTF-8 in helm output: {message}")]
        HelmInvalidUtf8 { message: String },
    }
}

impl HelmGitDiffError {
    fn io(context: &str, err: std::io::Error) -> Self {
        HelmGitDiffError::Io {
            message: format!("{}: {}", context, err),
        }
    }
}

/// What to diff and how to render it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub base: String,
    pub current: String,
    /// Directory holding one subdirectory per chart. Paths starting with `.`
    /// are relative to the current directory, others to the repository root.
    pub chart_dir: PathBuf,
    /// Charts to diff; empty means every chart changed between the refs
    pub charts: Vec<String>,
    /// Values files, relative to the current directory unless absolute
    pub values_files: Vec<String>,
    pub set_values: Vec<String>,
    pub release_name: String,
    pub context_lines: usize,
    pub fail_on_diff: bool,
    pub no_color: bool,
    pub skip_dependency_build: bool,
    /// Helm executable, looked up on `PATH` when not a path
    pub helm_bin: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE.to_string(),
            current: DEFAULT_CURRENT.to_string(),
            chart_dir: PathBuf::from("."),
            charts: Vec::new(),
            values_files: Vec::new(),
            set_values: Vec::new(),
            release_name: DEFAULT_RELEASE_NAME.to_string(),
            context_lines: 3,
            fail_on_diff: false,
            no_color: false,
            skip_dependency_build: false,
            helm_bin: PathBuf::from(DEFAULT_HELM),
        }
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Charts that were examined, in order
    pub charts: Vec<String>,
    /// Charts whose manifests differ
    pub changed: Vec<String>,
}

impl RunSummary {
    pub fn has_differences(&self) -> bool {
        !self.changed.is_empty()
    }
}

/// Main interface for diffing rendered charts between two refs
pub struct HelmGitDiff {
    config: Config,
    git: Git,
    cwd: PathBuf,
    use_color: bool,
}

impl HelmGitDiff {
    /// Create a runner for the repository containing `cwd`.
    ///
    /// When no charts are named and `cwd` is itself a chart directory, that
    /// chart is diffed.
    pub fn new(mut config: Config, cwd: impl Into<PathBuf>) -> Result<Self, HelmGitDiffError> {
        let cwd = cwd.into();
        let git = Git::discover(&cwd)?;

        if config.charts.is_empty() {
            match paths::detect_chart_context(&cwd, git.root()) {
                Ok(Some(ctx)) => {
                    tracing::debug!(
                        chart = %ctx.chart,
                        dir = %ctx.chart_dir.display(),
                        "chart inferred from current directory"
                    );
                    config.chart_dir = ctx.chart_dir;
                    config.charts = vec![ctx.chart];
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("{}", e),
            }
        }

        Ok(Self {
            config,
            git,
            cwd,
            use_color: false,
        })
    }

    /// Enable or disable coloured diff output.
    pub fn with_color(mut self, use_color: bool) -> Self {
        self.use_color = use_color;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Diff every requested (or changed) chart, writing results to `out`.
    ///
    /// # Examples
    /// ```no_run
    /// # use helm_git_diff::{Config, HelmGitDiff};
    /// let runner = HelmGitDiff::new(Config::default(), std::env::current_dir().unwrap()).unwrap();
    /// let summary = runner.run(&mut std::io::stdout()).unwrap();
    /// println!("{} chart(s) changed", summary.changed.len());
    /// ```
    pub fn run(&self, out: &mut impl Write) -> Result<RunSummary, HelmGitDiffError> {
        let chart_dir = paths::repo_relative(&self.config.chart_dir, &self.cwd, self.git.root())?;
        let mut summary = RunSummary::default();

        let charts = if self.config.charts.is_empty() {
            let files = self
                .git
                .changed_files(&self.config.base, &self.config.current)?;
            let charts = paths::changed_charts(&files, &chart_dir);

            if charts.is_empty() {
                writeln!(out, "No chart changes detected")
                    .map_err(|e| HelmGitDiffError::io("writing output", e))?;
                return Ok(summary);
            }
            writeln!(out, "Detected changed charts: {}\n", charts.join(", "))
                .map_err(|e| HelmGitDiffError::io("writing output", e))?;
            charts
        } else {
            self.config.charts.clone()
        };

        let opts = self.render_options();
        for chart in charts {
            let changed = self
                .diff_chart(&chart_dir, &chart, &opts, out)
                .map_err(|e| HelmGitDiffError::ChartFailed {
                    chart: chart.clone(),
                    source: Box::new(e),
                })?;
            if changed {
                summary.changed.push(chart.clone());
            }
            summary.charts.push(chart);
        }

        Ok(summary)
    }

    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            helm: self.config.helm_bin.clone(),
            release_name: self.config.release_name.clone(),
            values_files: paths::resolve_values_files(&self.config.values_files, &self.cwd),
            set_values: self.config.set_values.clone(),
            skip_dependency_build: self.config.skip_dependency_build,
        }
    }

    /// Render and diff one chart. Returns whether the manifests differ.
    fn diff_chart(
        &self,
        chart_dir: &Path,
        chart: &str,
        opts: &RenderOptions,
        out: &mut impl Write,
    ) -> Result<bool, HelmGitDiffError> {
        let chart_rel = chart_dir.join(chart);
        let workdir = paths::workdir_path(&chart_rel, self.git.root());

        let chart_yaml = workdir.join("Chart.yaml");
        if !chart_yaml.is_file() {
            return Err(HelmGitDiffError::ChartNotFound {
                path: chart_rel.display().to_string(),
            });
        }
        let text = fs::read_to_string(&chart_yaml)
            .map_err(|e| HelmGitDiffError::io("checking chart type", e))?;
        if chart::is_library(&text) {
            writeln!(out, "{}: skipped (library chart)", chart)
                .map_err(|e| HelmGitDiffError::io("writing output", e))?;
            return Ok(false);
        }

        let base = render::render_at_ref(&self.git, &chart_rel, &self.config.base, opts)?;
        let current = if self.config.current == DEFAULT_CURRENT {
            render::render_workdir(&workdir, opts)?
        } else {
            render::render_at_ref(&self.git, &chart_rel, &self.config.current, opts)?
        };

        let patch = diff::unified_diff(
            &base,
            &current,
            &diff::label(chart, &self.config.base),
            &diff::label(chart, &self.config.current),
            self.config.context_lines,
        );

        if patch.is_empty() {
            writeln!(out, "{}: no changes", chart)
                .map_err(|e| HelmGitDiffError::io("writing output", e))?;
            return Ok(false);
        }

        let patch = if self.use_color {
            diff::colorize(&patch)
        } else {
            patch
        };
        write!(out, "{}", patch).map_err(|e| HelmGitDiffError::io("writing output", e))?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = Config::default();
        assert_eq!(config.base, "origin/main");
        assert_eq!(config.current, "HEAD");
        assert_eq!(config.chart_dir, PathBuf::from("."));
        assert_eq!(config.release_name, "release-name");
        assert_eq!(config.context_lines, 3);
        assert!(config.charts.is_empty());
        assert!(!config.fail_on_diff);
        assert_eq!(config.helm_bin, PathBuf::from("helm"));
    }

    #[test]
    fn summary_reports_differences() {
        let mut summary = RunSummary::default();
        assert!(!summary.has_differences());
        summary.changed.push("api".into());
        assert!(summary.has_differences());
    }

    #[test]
    fn chart_errors_carry_chart_name() {
        let err = HelmGitDiffError::ChartFailed {
            chart: "api".into(),
            source: Box::new(
                HelmError::TemplateFailed {
                    stderr: "parse error".into(),
                }
                .into(),
            ),
        };
        assert_eq!(
            err.to_string(),
            "diffing chart api: helm template failed: parse error"
        );
    }

    #[test]
    fn missing_chart_message() {
        let err = HelmGitDiffError::ChartNotFound {
            path: "charts/nope".into(),
        };
        assert_eq!(
            err.to_string(),
            "no Chart.yaml found in charts/nope - not a valid Helm chart"
        );
    }
}
