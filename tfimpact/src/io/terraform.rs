//! Terraform CLI adapter.
//!
//! Exit codes are returned as data: a failing `validate` or `plan` is often
//! exactly what a test wants to see. Only conditions no caller can assert on
//! (missing binary, spawn failure, timeout, unreadable plan) become errors.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::core::plan::PlanDocument;
use crate::io::process::run_command;

pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 1_000_000;

/// Errors raised by terraform workspaces and the CLI adapter.
#[derive(Debug, Error)]
pub enum TerraformError {
    #[error("Terraform CLI not found in PATH")]
    ToolUnavailable,

    #[error("module path does not exist: {}", .0.display())]
    ModuleNotFound(PathBuf),

    #[error("terraform workspace not initialized (call setup first)")]
    NotInitialized,

    #[error("{command} failed: {stderr}")]
    ToolFailed { command: String, stderr: String },

    #[error("Terraform command timed out: {command}")]
    Timeout { command: String },

    #[error("failed to run {command}: {message}")]
    Spawn { command: String, message: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse plan json: {0}")]
    PlanJson(#[from] serde_json::Error),
}

impl TerraformError {
    pub fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| TerraformError::Io { context, source }
    }
}

pub type TerraformResult<T> = Result<T, TerraformError>;

/// Exit code and captured text of one terraform invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A terraform binary bound to one working directory.
#[derive(Debug, Clone)]
pub struct Terraform {
    binary: PathBuf,
    workdir: PathBuf,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
}

impl Terraform {
    pub fn new(binary: impl Into<PathBuf>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            workdir: workdir.into(),
            timeout: None,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }

    /// Kill any command that runs longer than `timeout` and report [`TerraformError::Timeout`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.output_limit_bytes = bytes;
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn init(&self, backend: bool) -> TerraformResult<ToolOutput> {
        let mut args = vec!["init", "-input=false"];
        if !backend {
            args.push("-backend=false");
        }
        args.push("-no-color");
        self.run(&args)
    }

    pub fn validate(&self) -> TerraformResult<ToolOutput> {
        self.run(&["validate", "-no-color"])
    }

    pub fn plan(&self, out: Option<&Path>, var_file: Option<&Path>) -> TerraformResult<ToolOutput> {
        let mut args = vec![
            "plan".to_string(),
            "-input=false".to_string(),
            "-no-color".to_string(),
        ];
        if let Some(out) = out {
            args.push(format!("-out={}", out.display()));
        }
        if let Some(var_file) = var_file {
            args.push(format!("-var-file={}", var_file.display()));
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&args)
    }

    /// `show -json <plan_file>`, decoded. A non-zero exit is an error.
    ///
    /// Stdout is captured in full regardless of the output limit; a plan
    /// document cut short cannot be decoded.
    pub fn show_json(&self, plan_file: &Path) -> TerraformResult<PlanDocument> {
        let plan_arg = plan_file.display().to_string();
        let args = ["show", "-json", plan_arg.as_str()];
        let output = self.run_limited(&args, usize::MAX)?;
        if !output.success() {
            return Err(TerraformError::ToolFailed {
                command: self.describe(&args),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(PlanDocument::from_json(&output.stdout)?)
    }

    /// `fmt -check`; a non-zero exit means files need formatting.
    pub fn fmt_check(&self) -> TerraformResult<ToolOutput> {
        self.run(&["fmt", "-check", "-diff=false", "-no-color"])
    }

    pub fn run(&self, args: &[&str]) -> TerraformResult<ToolOutput> {
        self.run_limited(args, self.output_limit_bytes)
    }

    #[instrument(skip(self), fields(workdir = %self.workdir.display()))]
    fn run_limited(&self, args: &[&str], output_limit_bytes: usize) -> TerraformResult<ToolOutput> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).current_dir(&self.workdir);
        // No interactive hints, no version checkpoint calls.
        cmd.env("TF_IN_AUTOMATION", "1")
            .env("CHECKPOINT_DISABLE", "1");

        let output = run_command(cmd, self.timeout, output_limit_bytes).map_err(|err| {
            TerraformError::Spawn {
                command: self.describe(args),
                message: format!("{err:#}"),
            }
        })?;
        if output.timed_out {
            return Err(TerraformError::Timeout {
                command: self.describe(args),
            });
        }
        debug!(code = ?output.status.code(), "terraform finished");
        Ok(ToolOutput {
            code: output.status.code(),
            stdout: output.stdout_lossy(),
            stderr: output.stderr_lossy(),
        })
    }

    fn describe(&self, args: &[&str]) -> String {
        let mut parts = vec![self.binary.display().to_string()];
        parts.extend(args.iter().map(|arg| arg.to_string()));
        parts.join(" ")
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::write_fake_terraform;

    fn fake_terraform(dir: &Path, script: &str) -> PathBuf {
        write_fake_terraform(dir, script).expect("fake terraform")
    }

    #[test]
    fn non_zero_validate_is_returned_not_raised() {
        let temp = tempfile::tempdir().expect("tempdir");
        let bin = fake_terraform(temp.path(), "echo 'Error: bad' >&2; exit 1");
        let tf = Terraform::new(bin, temp.path());
        let out = tf.validate().expect("validate runs");
        assert!(!out.success());
        assert!(out.stderr.contains("Error: bad"));
    }

    #[test]
    fn init_without_backend_passes_flag() {
        let temp = tempfile::tempdir().expect("tempdir");
        let bin = fake_terraform(temp.path(), "echo \"$@\"");
        let tf = Terraform::new(bin, temp.path());
        let out = tf.init(false).expect("init runs");
        assert_eq!(out.stdout.trim(), "init -input=false -backend=false -no-color");
    }

    #[test]
    fn timeout_names_the_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        let bin = fake_terraform(temp.path(), "exec sleep 5");
        let tf = Terraform::new(&bin, temp.path()).with_timeout(Duration::from_millis(100));
        let err = tf.fmt_check().expect_err("should time out");
        match err {
            TerraformError::Timeout { command } => {
                assert!(command.ends_with("fmt -check -diff=false -no-color"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn show_json_decodes_plan() {
        let temp = tempfile::tempdir().expect("tempdir");
        let bin = fake_terraform(
            temp.path(),
            r#"echo '{"resource_changes":[{"type":"x","change":{"actions":["create"]}}]}'"#,
        );
        let tf = Terraform::new(bin, temp.path());
        let plan = tf.show_json(Path::new("plan.tfplan")).expect("show");
        assert_eq!(plan.resource_changes.len(), 1);
    }

    #[test]
    fn show_json_ignores_output_limit() {
        let temp = tempfile::tempdir().expect("tempdir");
        let bin = fake_terraform(
            temp.path(),
            r#"printf '{"format_version":"'
head -c 1200000 /dev/zero | tr '\0' 'x'
printf '","resource_changes":[{"type":"x","change":{"actions":["create"]}}]}'"#,
        );
        let tf = Terraform::new(bin, temp.path()).with_output_limit(1024);
        let plan = tf.show_json(Path::new("plan.tfplan")).expect("show");
        assert_eq!(plan.format_version.map(|v| v.len()), Some(1_200_000));
        assert_eq!(plan.resource_changes.len(), 1);
    }

    #[test]
    fn show_json_failure_is_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let bin = fake_terraform(temp.path(), "echo 'no plan' >&2; exit 1");
        let tf = Terraform::new(bin, temp.path());
        let err = tf.show_json(Path::new("plan.tfplan")).expect_err("show fails");
        assert!(matches!(err, TerraformError::ToolFailed { .. }));
        assert!(err.to_string().contains("no plan"));
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tf = Terraform::new(temp.path().join("nope"), temp.path());
        assert!(matches!(tf.validate(), Err(TerraformError::Spawn { .. })));
    }
}
