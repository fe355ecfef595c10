//! Thin wrapper around the `git` binary.
//!
//! Every call runs `git -C <root> ...` so nothing depends on the process
//! working directory. Failures surface as [`GitCommandError`] carrying the
//! command's stderr.

use crate::GitCommandError;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Output, Stdio};

/// A git repository located by its top-level directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Git {
    root: PathBuf,
}

impl Git {
    /// Use `root` as the repository top-level without asking git.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Locate the repository containing `dir` via `git rev-parse --show-toplevel`.
    pub fn discover(dir: &Path) -> Result<Self, GitCommandError> {
        let output = run_git(dir, &["rev-parse", "--show-toplevel"])?;
        if !output.status.success() {
            tracing::debug!(
                dir = %dir.display(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "rev-parse failed"
            );
            return Err(GitCommandError::NotARepository);
        }

        let root = into_utf8(output.stdout)?;
        Ok(Self::new(root.trim()))
    }

    /// Repository top-level directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `reference` to a commit id.
    ///
    /// Fails with [`GitCommandError::UnknownReference`] when the reference
    /// does not name a commit.
    pub fn verify_ref(&self, reference: &str) -> Result<String, GitCommandError> {
        let revspec = format!("{}^{{commit}}", reference);
        let output = self.run(&["rev-parse", "--verify", "--quiet", &revspec])?;
        if !output.status.success() {
            return Err(GitCommandError::UnknownReference {
                reference: reference.to_string(),
            });
        }
        Ok(into_utf8(output.stdout)?.trim().to_string())
    }

    /// Paths (relative to the repository root) that differ between two refs.
    pub fn changed_files(&self, base: &str, current: &str) -> Result<Vec<String>, GitCommandError> {
        let stdout = self.checked(&["diff", "--name-only", base, current])?;
        Ok(into_utf8(stdout)?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Contents of `path` at `reference`, or `None` if the object does not exist there.
    pub fn show(&self, reference: &str, path: &Path) -> Result<Option<String>, GitCommandError> {
        let object = object_name(reference, path);
        let output = self.run(&["show", &object])?;
        if !output.status.success() {
            tracing::debug!(%object, "object not found");
            return Ok(None);
        }
        into_utf8(output.stdout).map(Some)
    }

    /// Whether `path` exists in the tree of `reference`.
    ///
    /// An unknown reference also reads as missing; check it with
    /// [`Git::verify_ref`] first.
    pub fn exists_at(&self, reference: &str, path: &Path) -> Result<bool, GitCommandError> {
        let object = object_name(reference, path);
        Ok(self.run(&["cat-file", "-e", &object])?.status.success())
    }

    /// Tar archive of `paths` as they exist at `reference`.
    pub fn archive(&self, reference: &str, paths: &[PathBuf]) -> Result<Vec<u8>, GitCommandError> {
        let paths: Vec<String> = paths.iter().map(|p| slash_path(p)).collect();
        let mut args = vec!["archive", reference];
        args.extend(paths.iter().map(String::as_str));

        self.checked(&args).map_err(|e| match e {
            GitCommandError::ExitError { stderr, .. } => GitCommandError::ArchiveFailed {
                reference: reference.to_string(),
                stderr,
            },
            other => other,
        })
    }

    fn run(&self, args: &[&str]) -> Result<Output, GitCommandError> {
        run_git(&self.root, args)
    }

    /// Run git and return stdout, treating a non-zero exit as an error.
    fn checked(&self, args: &[&str]) -> Result<Vec<u8>, GitCommandError> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(GitCommandError::ExitError {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

/// Unpack a tar archive into `dest` by piping it through `tar x`.
pub fn extract(archive: &[u8], dest: &Path) -> Result<(), GitCommandError> {
    tracing::debug!(dest = %dest.display(), bytes = archive.len(), "extracting archive");

    let mut child = Command::new("tar")
        .arg("x")
        .arg("-C")
        .arg(dest)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| GitCommandError::TarSpawnFailed {
            message: e.to_string(),
        })?;

    child
        .stdin
        .take()
        .ok_or(GitCommandError::TarStdinFailed)?
        .write_all(archive)
        .map_err(|e| GitCommandError::TarWriteFailed {
            message: e.to_string(),
        })?;

    let output = child
        .wait_with_output()
        .map_err(|e| GitCommandError::TarWaitFailed {
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(GitCommandError::TarExitError {
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}

fn run_git(dir: &Path, args: &[&str]) -> Result<Output, GitCommandError> {
    tracing::trace!(dir = %dir.display(), ?args, "git");

    Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .map_err(|e| GitCommandError::SpawnFailed {
            command: args.join(" "),
            message: e.to_string(),
        })
}

fn into_utf8(bytes: Vec<u8>) -> Result<String, GitCommandError> {
    String::from_utf8(bytes).map_err(|e| GitCommandError::InvalidUtf8 {
        message: e.to_string(),
    })
}

/// `ref:path` object name, always with forward slashes.
fn object_name(reference: &str, path: &Path) -> String {
    format!("{}:{}", reference, slash_path(path))
}

/// Render a repository-relative path the way git expects it.
pub(crate) fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn object_name_uses_forward_slashes() {
        let path: PathBuf = ["charts", "api", "Chart.yaml"].iter().collect();
        assert_eq!(object_name("main", &path), "main:charts/api/Chart.yaml");
    }

    #[test]
    fn slash_path_drops_current_dir_markers() {
        assert_eq!(slash_path(Path::new("./charts/web")), "charts/web");
    }

    #[test]
    fn discover_outside_repository_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        match Git::discover(dir.path()) {
            Err(GitCommandError::NotARepository) | Err(GitCommandError::SpawnFailed { .. }) => {}
            other => panic!("expected NotARepository, got {:?}", other),
        }
    }

    #[test]
    fn extract_rejects_garbage() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = extract(b"definitely not a tar archive", dir.path());
        assert!(result.is_err());
    }
}
