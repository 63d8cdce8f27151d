//! Git adapter for change detection.
//!
//! Every query here is allowed to fail: an unknown base ref, a missing HEAD or
//! a directory that is not a repository just means that source contributes no
//! paths.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::changeset::ChangeSet;

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Union of committed, unstaged, staged and untracked changes.
    ///
    /// Untracked files only count when they start with `untracked_prefix`.
    #[instrument(skip(self))]
    pub fn changed_files(&self, base_ref: &str, untracked_prefix: &str) -> ChangeSet {
        let mut changes = ChangeSet::new();

        let range = format!("{base_ref}...HEAD");
        if let Some(out) = self.try_capture(&["diff", "--name-only", &range]) {
            changes.extend_name_only(&out);
        }
        if let Some(out) = self.try_capture(&["diff", "--name-only", "HEAD"]) {
            changes.extend_name_only(&out);
        }
        if let Some(out) = self.try_capture(&["diff", "--name-only", "--cached"]) {
            changes.extend_name_only(&out);
        }
        if let Some(out) = self.try_capture(&["ls-files", "--others", "--exclude-standard"]) {
            changes.extend_untracked(&out, untracked_prefix);
        }

        debug!(count = changes.len(), "changed files collected");
        changes
    }

    /// Run a query, returning stdout only when git exits successfully.
    fn try_capture(&self, args: &[&str]) -> Option<String> {
        match self.run(args) {
            Ok(output) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(output) => {
                debug!(
                    args = %args.join(" "),
                    code = ?output.status.code(),
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "git query failed, skipping source"
                );
                None
            }
            Err(err) => {
                debug!(args = %args.join(" "), err = %format!("{err:#}"), "git query not run");
                None
            }
        }
    }

    /// Paths come back verbatim: `core.quotePath` would C-quote non-ASCII names.
    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(["-c", "core.quotePath=false"])
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}
