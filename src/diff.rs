use colored::Colorize;
use similar::TextDiff;

/// Unified diff between two rendered manifests.
///
/// Returns an empty string when the manifests are identical.
///
/// Example output:
/// ```text
/// --- api (origin/main)
/// +++ api (HEAD)
/// @@ -4,3 +4,3 @@
///    name: api
///  spec:
/// -  replicas: 1
/// +  replicas: 3
/// ```
pub fn unified_diff(
    base: &str,
    current: &str,
    from_label: &str,
    to_label: &str,
    context: usize,
) -> String {
    if base == current {
        return String::new();
    }

    TextDiff::from_lines(base, current)
        .unified_diff()
        .context_radius(context)
        .header(from_label, to_label)
        .to_string()
}

/// Diff header label: `<chart> (<ref>)`.
pub fn label(chart: &str, reference: &str) -> String {
    format!("{} ({})", chart, reference)
}

/// Colour a unified diff for terminal display.
///
/// File headers and hunk headers are cyan, removals red, additions green.
pub fn colorize(diff: &str) -> String {
    diff.split('\n')
        .map(|line| {
            if line.starts_with("---") || line.starts_with("+++") || line.starts_with('@') {
                line.cyan().to_string()
            } else if line.starts_with('-') {
                line.red().to_string()
            } else if line.starts_with('+') {
                line.green().to_string()
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whether diff output should carry colour.
///
/// Disabled by `--no-color`, by a non-empty `NO_COLOR`, or when stdout is
/// not a terminal.
pub fn should_use_color(no_color_flag: bool, no_color_env: Option<&str>, is_terminal: bool) -> bool {
    if no_color_flag {
        return false;
    }
    if no_color_env.is_some_and(|v| !v.is_empty()) {
        return false;
    }
    is_terminal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_manifests_have_no_diff() {
        let manifest = "kind: ConfigMap\n";
        assert_eq!(unified_diff(manifest, manifest, "a", "b", 3), "");
    }

    #[test]
    fn changed_line_diff() {
        let base = "apiVersion: v1\nkind: ConfigMap\ndata:\n  key: old\n";
        let current = "apiVersion: v1\nkind: ConfigMap\ndata:\n  key: new\n";
        let diff = unified_diff(
            base,
            current,
            &label("api", "origin/main"),
            &label("api", "HEAD"),
            3,
        );
        similar_asserts::assert_eq!(
            diff,
            "--- api (origin/main)\n\
             +++ api (HEAD)\n\
             @@ -1,4 +1,4 @@\n \
             apiVersion: v1\n \
             kind: ConfigMap\n \
             data:\n\
             -  key: old\n\
             +  key: new\n"
        );
    }

    #[test]
    fn context_radius_limits_hunk() {
        let base = "a\nb\nc\nd\ne\n";
        let current = "a\nb\nc\nd\nE\n";
        let diff = unified_diff(base, current, "x", "y", 1);
        similar_asserts::assert_eq!(diff, "--- x\n+++ y\n@@ -4,2 +4,2 @@\n d\n-e\n+E\n");
    }

    #[test]
    fn new_chart_diffs_against_empty() {
        let diff = unified_diff("", "kind: Service\n", "x", "y", 3);
        similar_asserts::assert_eq!(diff, "--- x\n+++ y\n@@ -0,0 +1 @@\n+kind: Service\n");
    }

    #[test]
    fn colorize_marks_lines() {
        colored::control::set_override(true);
        let out = colorize("--- a\n+++ b\n@@ -1 +1 @@\n-old\n+new\n same\n");
        let lines: Vec<&str> = out.split('\n').collect();
        assert_eq!(lines[0], "\u{1b}[36m--- a\u{1b}[0m");
        assert_eq!(lines[1], "\u{1b}[36m+++ b\u{1b}[0m");
        assert_eq!(lines[2], "\u{1b}[36m@@ -1 +1 @@\u{1b}[0m");
        assert_eq!(lines[3], "\u{1b}[31m-old\u{1b}[0m");
        assert_eq!(lines[4], "\u{1b}[32m+new\u{1b}[0m");
        assert_eq!(lines[5], " same");
        assert_eq!(lines[6], "");
    }

    #[test]
    fn color_disabled_by_flag() {
        assert!(!should_use_color(true, None, true));
    }

    #[test]
    fn color_disabled_by_env() {
        assert!(!should_use_color(false, Some("1"), true));
        assert!(should_use_color(false, Some(""), true));
    }

    #[test]
    fn color_requires_terminal() {
        assert!(!should_use_color(false, None, false));
        assert!(should_use_color(false, None, true));
    }
}
