//! Repository configuration stored in `tfimpact.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "tfimpact.toml";

/// tfimpact configuration (TOML).
///
/// Every field has a default so an absent or partial file works. Paths are
/// relative to the repository root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TfImpactConfig {
    /// Directory searched for modules.
    pub terraform_root: PathBuf,

    /// File whose presence marks a directory as a module.
    pub root_file: String,

    /// Untracked files only count as changes under this prefix.
    pub untracked_prefix: String,

    pub base_branch: String,

    /// Where module test files live.
    pub tests_dir: PathBuf,

    pub test_file_extension: String,

    /// Per-command bound for validation-only terraform calls.
    pub validation_timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    pub test_command: TestCommandConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestCommandConfig {
    /// Program and leading arguments (e.g. `["poetry","run","pytest"]`).
    pub program: Vec<String>,

    /// Arguments appended after the selected test files.
    pub args: Vec<String>,
}

impl Default for TestCommandConfig {
    fn default() -> Self {
        Self {
            program: vec!["poetry".to_string(), "run".to_string(), "pytest".to_string()],
            args: vec!["-v".to_string(), "-m".to_string(), "terraform".to_string()],
        }
    }
}

impl Default for TfImpactConfig {
    fn default() -> Self {
        Self {
            terraform_root: PathBuf::from("terraform"),
            root_file: "main.tf".to_string(),
            untracked_prefix: "terraform/".to_string(),
            base_branch: "main".to_string(),
            tests_dir: PathBuf::from("tests/terraform/modules"),
            test_file_extension: "py".to_string(),
            validation_timeout_secs: 120,
            output_limit_bytes: 1_000_000,
            test_command: TestCommandConfig::default(),
        }
    }
}

impl TfImpactConfig {
    pub fn validate(&self) -> Result<()> {
        if self.terraform_root.as_os_str().is_empty() {
            return Err(anyhow!("terraform_root must not be empty"));
        }
        if self.root_file.trim().is_empty() {
            return Err(anyhow!("root_file must not be empty"));
        }
        if self.base_branch.trim().is_empty() {
            return Err(anyhow!("base_branch must not be empty"));
        }
        if self.test_file_extension.trim().is_empty() {
            return Err(anyhow!("test_file_extension must not be empty"));
        }
        if self.validation_timeout_secs == 0 {
            return Err(anyhow!("validation_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.test_command.program.is_empty() || self.test_command.program[0].trim().is_empty()
        {
            return Err(anyhow!("test_command.program must be a non-empty array"));
        }
        Ok(())
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `TfImpactConfig::default()`.
pub fn load_config(path: &Path) -> Result<TfImpactConfig> {
    if !path.exists() {
        let cfg = TfImpactConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: TfImpactConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &TfImpactConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
