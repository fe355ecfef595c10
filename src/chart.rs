//! Line scanning of `Chart.yaml`.
//!
//! Only the handful of keys the diff needs are recognised: the top-level
//! `type`, and the `repository` of each entry under `dependencies`. Anything
//! more would call for a real YAML parser.

use crate::paths::normalize;
use nom::{
    IResult, Parser,
    bytes::complete::take_while1,
    character::complete::{char, space0, space1},
    combinator::opt,
    sequence::terminated,
};
use std::path::{Path, PathBuf};

/// Prefix marking a dependency vendored from a path on disk.
const FILE_REPOSITORY: &str = "file://";

/// A `key: value` line, possibly a list item (`- key: value`).
#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry<'a> {
    indent: usize,
    list_item: bool,
    key: &'a str,
    value: &'a str,
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
}

fn entry(input: &str) -> IResult<&str, (usize, bool, &str)> {
    (
        space0,
        opt(terminated(char('-'), space1)),
        terminated(take_while1(is_key_char), char(':')),
    )
        .map(|(indent, item, key): (&str, Option<char>, &str)| {
            (indent.len(), item.is_some(), key)
        })
        .parse(input)
}

fn parse_entry(line: &str) -> Option<Entry<'_>> {
    let (rest, (indent, list_item, key)) = entry(line).ok()?;
    if !(rest.is_empty() || rest.starts_with([' ', '\t'])) {
        return None;
    }
    Some(Entry {
        indent,
        list_item,
        key,
        value: scalar(rest),
    })
}

/// Strip a trailing comment and surrounding quotes from a scalar value.
fn scalar(raw: &str) -> &str {
    let raw = raw.trim();
    let raw = if raw.starts_with('#') {
        ""
    } else {
        raw.find(" #").map_or(raw, |idx| &raw[..idx]).trim_end()
    };
    raw.trim_matches(|c| c == '"' || c == '\'')
}

fn is_ignorable(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

fn top_level<'a>(text: &'a str, key: &str) -> Option<Entry<'a>> {
    text.lines()
        .filter_map(parse_entry)
        .find(|e| e.indent == 0 && !e.list_item && e.key == key)
}

/// Whether the chart declares `type: library`.
pub fn is_library(text: &str) -> bool {
    top_level(text, "type").is_some_and(|e| e.value == "library")
}

/// Whether the chart declares a non-empty `dependencies` list.
pub fn has_dependencies(text: &str) -> bool {
    top_level(text, "dependencies").is_some_and(|e| e.value != "[]")
}

/// Relative paths of every `file://` dependency, in declaration order.
pub fn local_dependencies(text: &str) -> Vec<&str> {
    let mut in_block = false;
    let mut deps = Vec::new();

    for line in text.lines() {
        if is_ignorable(line) {
            continue;
        }

        if !in_block {
            in_block = top_level_key(line) == Some("dependencies");
            continue;
        }

        // Block ends at the next top-level key; list items may sit at column 0.
        if !line.starts_with([' ', '\t', '-']) {
            break;
        }

        if let Some(e) = parse_entry(line)
            && e.key == "repository"
            && let Some(path) = e.value.strip_prefix(FILE_REPOSITORY)
        {
            deps.push(path);
        }
    }

    deps
}

fn top_level_key(line: &str) -> Option<&str> {
    parse_entry(line)
        .filter(|e| e.indent == 0 && !e.list_item)
        .map(|e| e.key)
}

/// Repository paths that must be archived to render `chart_path` at a ref:
/// the chart itself plus every local dependency it references.
pub fn extraction_paths(chart_path: &Path, chart_yaml: Option<&str>) -> Vec<PathBuf> {
    let mut paths = vec![chart_path.to_path_buf()];

    for dep in chart_yaml.map(local_dependencies).unwrap_or_default() {
        let path = normalize(&chart_path.join(dep));
        if !paths.contains(&path) {
            paths.push(path);
        }
    }

    paths
}
