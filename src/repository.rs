//! Pipeline repository access.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use tracing::info;

pub trait Repository {
    fn ref_exists(&self, reference: &str) -> Result<bool>;
    fn checkout(&self, reference: &str) -> Result<()>;
    fn working_tree_dir(&self) -> &Path;
}

/// A git checkout driven through the `git` CLI.
#[derive(Debug, Clone)]
pub struct GitRepository {
    path: PathBuf,
}

impl GitRepository {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Clone `url` into `path`, or reset an existing checkout to a pristine
    /// state so a previous run's edits do not leak into this one.
    ///
    /// A relative `path` is resolved against the current directory; the
    /// returned repository always holds the absolute path.
    pub fn open_or_clone(path: &Path, url: &str) -> Result<Self> {
        let cwd = std::env::current_dir().context("reading current directory")?;
        Self::open_or_clone_in(&cwd, path, url)
    }

    /// [`GitRepository::open_or_clone`] with relative paths resolved against `base`.
    pub fn open_or_clone_in(base: &Path, path: &Path, url: &str) -> Result<Self> {
        let path = std::path::absolute(base.join(path))
            .with_context(|| format!("resolving checkout path '{}'", path.display()))?;

        if !path.join(".git").exists() {
            if path.exists() {
                fs::remove_dir_all(&path)
                    .with_context(|| format!("removing stale checkout '{}'", path.display()))?;
            }
            info!(repository = url, path = %path.display(), "Cloning repository");
            let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
                bail!("cannot clone into '{}'", path.display());
            };
            fs::create_dir_all(parent)
                .with_context(|| format!("creating '{}'", parent.display()))?;
            run_git(parent, &["clone", url, &name.to_string_lossy()])?;
        } else {
            info!(repository = url, path = %path.display(), "Cleaning existing repository");
            run_git(&path, &["reset", "--hard", "HEAD"])?;
            run_git(&path, &["clean", "-df"])?;
        }
        Ok(Self::open(path))
    }

    pub fn show_ref(&self) -> Result<String> {
        run_git(&self.path, &["show-ref"])
    }
}

impl Repository for GitRepository {
    fn ref_exists(&self, reference: &str) -> Result<bool> {
        Ok(ref_listed(&self.show_ref()?, reference))
    }

    fn checkout(&self, reference: &str) -> Result<()> {
        run_git(&self.path, &["checkout", reference]).map(|_| ())
    }

    fn working_tree_dir(&self) -> &Path {
        &self.path
    }
}

/// Whether `reference` names one of the refs in `git show-ref` output, either
/// fully (`refs/tags/v1`) or by its short name (`v1`).
pub fn ref_listed(show_ref: &str, reference: &str) -> bool {
    show_ref
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|full| {
            full == reference
                || ["refs/heads/", "refs/tags/", "refs/remotes/"]
                    .iter()
                    .any(|prefix| full.strip_prefix(prefix) == Some(reference))
        })
}

fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("running git {}", args.join(" ")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "git {} failed in '{}'\n  Exit code: {}\n  stderr: {}",
            args.join(" "),
            dir.display(),
            output.status.code().unwrap_or(-1),
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
