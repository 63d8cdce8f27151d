//! Detection of the terraform binary and the `SKIP_TERRAFORM_TESTS` switch.
//!
//! Evaluated once by the caller and passed around explicitly; call
//! [`ToolEnv::refresh`] to pick up changes to `PATH` or the environment.

use std::path::{Path, PathBuf};

use tracing::debug;

pub const SKIP_ENV_VAR: &str = "SKIP_TERRAFORM_TESTS";
pub const TERRAFORM_BIN: &str = "terraform";

/// Snapshot of which terraform-dependent paths are usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolEnv {
    skip_requested: bool,
    terraform: Option<PathBuf>,
}

impl ToolEnv {
    /// Read the environment and search `PATH`.
    pub fn detect() -> Self {
        let skip_requested = std::env::var(SKIP_ENV_VAR)
            .map(|value| parse_skip_flag(&value))
            .unwrap_or(false);
        let terraform = which::which(TERRAFORM_BIN).ok();
        debug!(skip_requested, terraform = ?terraform, "tool environment detected");
        Self {
            skip_requested,
            terraform,
        }
    }

    /// Build an environment from explicit values.
    pub fn new(skip_requested: bool, terraform: Option<PathBuf>) -> Self {
        Self {
            skip_requested,
            terraform,
        }
    }

    /// Re-run detection in place.
    pub fn refresh(&mut self) {
        *self = Self::detect();
    }

    pub fn terraform(&self) -> Option<&Path> {
        self.terraform.as_deref()
    }

    pub fn should_skip_terraform(&self) -> bool {
        self.skip_reason().is_some()
    }

    /// Why terraform-dependent work is disabled, if it is.
    pub fn skip_reason(&self) -> Option<&'static str> {
        if self.skip_requested {
            return Some("SKIP_TERRAFORM_TESTS environment variable is set");
        }
        if self.terraform.is_none() {
            return Some("Terraform CLI not available in PATH");
        }
        None
    }
}

/// Only a case-insensitive `true` disables terraform work.
fn parse_skip_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}
