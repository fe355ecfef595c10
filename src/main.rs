use clap::{ArgAction, CommandFactory, Parser};
use clap_complete::Shell;
use helm_git_diff::{
    Config, DEFAULT_BASE, DEFAULT_CURRENT, DEFAULT_HELM, DEFAULT_RELEASE_NAME, HelmGitDiff,
    HelmGitDiffError, diff,
};
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "helm-git-diff")]
#[command(override_usage = "helm git-diff [FLAGS] [CHART...]")]
#[command(about = "Show Kubernetes resource differences between git commits for Helm charts")]
struct Cli {
    /// Charts to diff (default: every chart changed between the references)
    charts: Vec<String>,

    /// Base git reference to compare from
    #[arg(long, env = "HELM_GIT_DIFF_BASE", default_value = DEFAULT_BASE)]
    base: String,

    /// Current git reference to compare to (HEAD renders the working tree)
    #[arg(long, env = "HELM_GIT_DIFF_CURRENT", default_value = DEFAULT_CURRENT)]
    current: String,

    /// Directory containing Helm charts
    #[arg(long, env = "HELM_GIT_DIFF_CHART_DIR", default_value = ".")]
    chart_dir: PathBuf,

    /// Values files to use (repeatable or comma-separated)
    #[arg(short = 'f', long = "values", value_delimiter = ',')]
    values: Vec<String>,

    /// Set values on the command line (repeatable, e.g. key1=val1,key2=val2)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Exit with code 1 if differences are found
    #[arg(long)]
    fail_on_diff: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Skip building chart dependencies (use if dependencies are already up to date)
    #[arg(long)]
    skip_dependency_build: bool,

    /// Release name passed to helm template
    #[arg(long, default_value = DEFAULT_RELEASE_NAME)]
    release_name: String,

    /// Helm executable (set by helm when run as a plugin)
    #[arg(long, env = "HELM_BIN", default_value = DEFAULT_HELM)]
    helm_bin: PathBuf,

    /// Lines of context around each change
    #[arg(short = 'U', long = "context", default_value_t = 3)]
    context: usize,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Print shell completions and exit
    #[arg(long, value_name = "SHELL", exclusive = true)]
    completions: Option<Shell>,

    /// Print a man page and exit
    #[arg(long, exclusive = true)]
    man: bool,
}

impl Cli {
    fn into_config(self) -> Config {
        Config {
            base: self.base,
            current: self.current,
            chart_dir: self.chart_dir,
            charts: self.charts,
            values_files: self.values,
            set_values: self.set,
            release_name: self.release_name,
            context_lines: self.context,
            fail_on_diff: self.fail_on_diff,
            no_color: self.no_color,
            skip_dependency_build: self.skip_dependency_build,
            helm_bin: self.helm_bin,
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode, HelmGitDiffError> {
    let cwd = std::env::current_dir().map_err(|e| HelmGitDiffError::Io {
        message: format!("getting current directory: {}", e),
    })?;

    let use_color = diff::should_use_color(
        cli.no_color,
        std::env::var("NO_COLOR").ok().as_deref(),
        io::stdout().is_terminal(),
    );
    colored::control::set_override(use_color);

    let config = cli.into_config();
    let fail_on_diff = config.fail_on_diff;

    let summary = HelmGitDiff::new(config, cwd)?
        .with_color(use_color)
        .run(&mut io::stdout().lock())?;

    if fail_on_diff && summary.has_differences() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Some(shell) = cli.completions {
        clap_complete::generate(shell, &mut Cli::command(), "helm-git-diff", &mut io::stdout());
        return ExitCode::SUCCESS;
    }

    if cli.man {
        if let Err(e) = clap_mangen::Man::new(Cli::command()).render(&mut io::stdout()) {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
        return ExitCode::SUCCESS;
    }

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_refs_dir_and_charts() {
        let cli = Cli::try_parse_from([
            "helm-git-diff",
            "--base",
            "main",
            "--current",
            "feature",
            "--chart-dir",
            "mychart",
            "chart1",
            "chart2",
        ])
        .unwrap();
        let config = cli.into_config();

        assert_eq!(config.base, "main");
        assert_eq!(config.current, "feature");
        assert_eq!(config.chart_dir, PathBuf::from("mychart"));
        assert_eq!(config.charts, vec!["chart1", "chart2"]);
    }

    #[test]
    fn parse_values_and_set() {
        let cli = Cli::try_parse_from([
            "helm-git-diff",
            "-f",
            "a.yaml,b.yaml",
            "--values",
            "c.yaml",
            "--set",
            "image.tag=v2,replicas=3",
            "--set",
            "debug=true",
        ])
        .unwrap();
        let config = cli.into_config();

        assert_eq!(config.values_files, vec!["a.yaml", "b.yaml", "c.yaml"]);
        assert_eq!(config.set_values, vec!["image.tag=v2,replicas=3", "debug=true"]);
    }

    #[test]
    fn parse_flags() {
        let cli = Cli::try_parse_from([
            "helm-git-diff",
            "--fail-on-diff",
            "--no-color",
            "--skip-dependency-build",
            "-U",
            "5",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let config = cli.into_config();

        assert!(config.fail_on_diff);
        assert!(config.no_color);
        assert!(config.skip_dependency_build);
        assert_eq!(config.context_lines, 5);
    }

    #[test]
    fn parse_helm_bin() {
        let cli =
            Cli::try_parse_from(["helm-git-diff", "--helm-bin", "/opt/helm/bin/helm"]).unwrap();
        assert_eq!(cli.into_config().helm_bin, PathBuf::from("/opt/helm/bin/helm"));
    }

    #[test]
    fn completions_are_exclusive() {
        assert!(Cli::try_parse_from(["helm-git-diff", "--completions", "bash", "api"]).is_err());
        assert!(Cli::try_parse_from(["helm-git-diff", "--completions", "zsh"]).is_ok());
    }
}
