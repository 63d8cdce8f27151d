//! Per-module validation for `tfimpact validate`.
//!
//! Each module goes through a file check, `init -backend=false` plus
//! `validate` in a validation workspace, an optional format check, an optional
//! checkov scan and a documentation check. A module passes only when every
//! check passes; warnings still fail the module but are reported separately
//! from errors.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, bail};
use tabled::{Table, Tabled};
use tracing::{debug, info, instrument};

use crate::io::config::TfImpactConfig;
use crate::io::module_files::ModuleAnalyzer;
use crate::io::process::run_command;
use crate::io::terraform::{TerraformError, TerraformResult};
use crate::io::toolchain::ToolEnv;
use crate::io::validation_workspace::ValidationWorkspace;

pub const CHECKOV_BIN: &str = "checkov";

const DOC_FILES: [&str; 3] = ["README.md", "variables.tf", "outputs.tf"];

/// Which optional checks to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidateOptions {
    pub security: bool,
    pub format: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            security: true,
            format: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Files,
    Syntax,
    Format,
    Security,
    Docs,
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Check::Files => "terraform files",
            Check::Syntax => "terraform validate",
            Check::Format => "terraform fmt",
            Check::Security => "security scan",
            Check::Docs => "documentation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Passed,
    Warning,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub check: Check,
    pub status: CheckStatus,
    pub message: Option<String>,
}

impl CheckResult {
    fn passed(check: Check) -> Self {
        Self {
            check,
            status: CheckStatus::Passed,
            message: None,
        }
    }

    fn warning(check: Check, message: impl Into<String>) -> Self {
        Self {
            check,
            status: CheckStatus::Warning,
            message: Some(message.into()),
        }
    }

    fn failed(check: Check, message: impl Into<String>) -> Self {
        Self {
            check,
            status: CheckStatus::Failed,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleResult {
    pub module: PathBuf,
    pub checks: Vec<CheckResult>,
}

impl ModuleResult {
    pub fn passed(&self) -> bool {
        self.checks
            .iter()
            .all(|check| check.status == CheckStatus::Passed)
    }

    fn messages(&self, status: CheckStatus) -> impl Iterator<Item = &str> {
        self.checks
            .iter()
            .filter(move |check| check.status == status)
            .filter_map(|check| check.message.as_deref())
    }
}

/// Results for every validated module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub results: Vec<ModuleResult>,
}

impl ValidationReport {
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.passed_count()
    }

    pub fn all_passed(&self) -> bool {
        self.failed_count() == 0
    }

    pub fn errors(&self) -> Vec<&str> {
        self.results
            .iter()
            .flat_map(|r| r.messages(CheckStatus::Failed))
            .collect()
    }

    pub fn warnings(&self) -> Vec<&str> {
        self.results
            .iter()
            .flat_map(|r| r.messages(CheckStatus::Warning))
            .collect()
    }

    /// Module/status table.
    pub fn summary_table(&self) -> String {
        #[derive(Tabled)]
        struct Row {
            #[tabled(rename = "Module")]
            module: String,
            #[tabled(rename = "Status")]
            status: &'static str,
        }

        let rows = self.results.iter().map(|r| Row {
            module: r.module.display().to_string(),
            status: if r.passed() { "PASSED" } else { "FAILED" },
        });
        Table::new(rows).to_string()
    }
}

/// Runs the per-module checks.
#[derive(Debug, Clone)]
pub struct Validator {
    root: PathBuf,
    tools: ToolEnv,
    checkov: Option<PathBuf>,
    timeout: Duration,
    output_limit_bytes: usize,
    options: ValidateOptions,
}

impl Validator {
    /// `checkov` is looked up on `PATH` when security scanning is enabled.
    pub fn new(root: &Path, cfg: &TfImpactConfig, tools: ToolEnv, options: ValidateOptions) -> Self {
        let checkov = if options.security {
            which::which(CHECKOV_BIN).ok()
        } else {
            None
        };
        Self {
            root: root.to_path_buf(),
            tools,
            checkov,
            timeout: cfg.validation_timeout(),
            output_limit_bytes: cfg.output_limit_bytes,
            options,
        }
    }

    /// Use a specific checkov binary, or none.
    pub fn with_checkov(mut self, checkov: Option<PathBuf>) -> Self {
        self.checkov = checkov;
        self
    }

    /// Validate `modules` (paths relative to the root, or absolute) in order.
    pub fn validate_all(&self, modules: &[PathBuf]) -> ValidationReport {
        ValidationReport {
            results: modules.iter().map(|m| self.validate_module(m)).collect(),
        }
    }

    #[instrument(skip(self))]
    pub fn validate_module(&self, module: &Path) -> ModuleResult {
        let dir = self.root.join(module);
        let label = module.display().to_string();
        let analyzer = ModuleAnalyzer::new(&dir);
        let mut checks = Vec::new();

        match analyzer.has_tf_files() {
            Ok(true) => {}
            Ok(false) => {
                checks.push(CheckResult::failed(
                    Check::Files,
                    format!("No Terraform files found in {label}"),
                ));
                return ModuleResult {
                    module: module.to_path_buf(),
                    checks,
                };
            }
            Err(err) => {
                checks.push(CheckResult::failed(Check::Files, format!("{err:#}")));
                return ModuleResult {
                    module: module.to_path_buf(),
                    checks,
                };
            }
        }

        let mut workspace = self.open_workspace(&dir);
        checks.push(syntax_check(&workspace));
        if self.options.format {
            checks.push(format_check(&workspace, &label));
        }
        if let Ok(ws) = workspace.as_mut() {
            ws.cleanup();
        }
        if self.options.security {
            checks.push(self.security_check(&dir, &label));
        }
        checks.push(docs_check(&dir, &label));

        let result = ModuleResult {
            module: module.to_path_buf(),
            checks,
        };
        info!(module = %module.display(), passed = result.passed(), "module validated");
        result
    }

    fn open_workspace(&self, dir: &Path) -> TerraformResult<ValidationWorkspace> {
        let mut ws = ValidationWorkspace::new(dir, &self.tools)?
            .with_timeout(self.timeout)
            .with_output_limit(self.output_limit_bytes);
        ws.setup()?;
        Ok(ws)
    }

    fn security_check(&self, dir: &Path, label: &str) -> CheckResult {
        let Some(checkov) = &self.checkov else {
            return CheckResult::warning(
                Check::Security,
                "Checkov not found. Security scanning skipped.",
            );
        };
        let mut cmd = Command::new(checkov);
        cmd.arg("-d")
            .arg(dir)
            .args(["--framework", "terraform", "--quiet"]);
        let output = match run_command(cmd, None, self.output_limit_bytes) {
            Ok(output) => output,
            Err(err) => {
                return CheckResult::failed(
                    Check::Security,
                    format!("Error running security scan: {err:#}"),
                );
            }
        };
        if output.status.success() {
            return CheckResult::passed(Check::Security);
        }
        let stdout = output.stdout_lossy();
        debug!(code = ?output.status.code(), "checkov reported problems");
        if stdout.contains("Check:") || stdout.contains("FAILED") {
            CheckResult::warning(
                Check::Security,
                format!("Security scan found issues in {label}"),
            )
        } else {
            CheckResult::failed(
                Check::Security,
                format!("Security scan error: {}", output.stderr_lossy().trim()),
            )
        }
    }
}

fn syntax_check(workspace: &TerraformResult<ValidationWorkspace>) -> CheckResult {
    let ws = match workspace {
        Ok(ws) => ws,
        Err(TerraformError::ToolUnavailable) => {
            return CheckResult::failed(
                Check::Syntax,
                "Terraform command not found. Please install Terraform.",
            );
        }
        Err(err) => return CheckResult::failed(Check::Syntax, err.to_string()),
    };
    let init = match ws.init_backend_false() {
        Ok(init) => init,
        Err(err) => return CheckResult::failed(Check::Syntax, err.to_string()),
    };
    if !init.success() {
        return CheckResult::failed(
            Check::Syntax,
            format!("Terraform init failed: {}", init.stderr.trim()),
        );
    }
    match ws.validate() {
        Ok(out) if out.success() => CheckResult::passed(Check::Syntax),
        Ok(out) => CheckResult::failed(
            Check::Syntax,
            format!("Terraform validation failed: {}", out.stderr.trim()),
        ),
        Err(err) => CheckResult::failed(Check::Syntax, err.to_string()),
    }
}

fn format_check(workspace: &TerraformResult<ValidationWorkspace>, label: &str) -> CheckResult {
    let result = workspace.as_ref().map_err(|err| err.to_string()).and_then(|ws| {
        ws.fmt_check().map_err(|err| err.to_string())
    });
    match result {
        Ok(out) if out.success() => CheckResult::passed(Check::Format),
        Ok(_) => CheckResult::warning(
            Check::Format,
            format!("Terraform files in {label} need formatting"),
        ),
        Err(err) => CheckResult::warning(
            Check::Format,
            format!("Could not check Terraform formatting: {err}"),
        ),
    }
}

fn docs_check(dir: &Path, label: &str) -> CheckResult {
    let missing: Vec<String> = DOC_FILES
        .iter()
        .filter(|name| !dir.join(name).exists())
        .map(|name| format!("Missing {name}"))
        .collect();
    if missing.is_empty() {
        CheckResult::passed(Check::Docs)
    } else {
        CheckResult::warning(Check::Docs, format!("{label}: {}", missing.join(", ")))
    }
}

/// Resolve `--module PATH` to a module path, rejecting paths that do not exist.
pub fn single_module(root: &Path, module: &Path) -> Result<PathBuf> {
    let dir = root.join(module);
    if !dir.is_dir() {
        bail!("module path does not exist: {}", module.display());
    }
    Ok(module.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_sample_module;
    use std::fs;

    fn validator(root: &Path, tools: ToolEnv, options: ValidateOptions) -> Validator {
        Validator::new(root, &TfImpactConfig::default(), tools, options).with_checkov(None)
    }

    #[test]
    fn module_without_tf_files_fails_early() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("terraform/empty")).expect("mkdir");
        let v = validator(temp.path(), ToolEnv::new(false, None), ValidateOptions::default());

        let result = v.validate_module(Path::new("terraform/empty"));
        assert!(!result.passed());
        assert_eq!(result.checks.len(), 1);
        assert_eq!(
            result.checks[0].message.as_deref(),
            Some("No Terraform files found in terraform/empty")
        );
    }

    #[test]
    fn missing_terraform_is_an_error_and_missing_checkov_a_warning() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_sample_module(&temp.path().join("terraform/rg")).expect("module");
        let v = validator(temp.path(), ToolEnv::new(false, None), ValidateOptions::default());

        let report = v.validate_all(&[PathBuf::from("terraform/rg")]);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(
            report.errors(),
            vec!["Terraform command not found. Please install Terraform."]
        );
        let warnings = report.warnings();
        assert!(warnings.iter().any(|w| w.starts_with("Could not check Terraform formatting")));
        assert!(warnings.contains(&"Checkov not found. Security scanning skipped."));
    }

    #[test]
    fn docs_check_lists_every_missing_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("main.tf"), "").expect("write");
        let result = docs_check(temp.path(), "terraform/x");
        assert_eq!(result.status, CheckStatus::Warning);
        assert_eq!(
            result.message.as_deref(),
            Some("terraform/x: Missing README.md, Missing variables.tf, Missing outputs.tf")
        );
    }

    #[test]
    fn summary_table_lists_modules() {
        let report = ValidationReport {
            results: vec![
                ModuleResult {
                    module: PathBuf::from("terraform/a"),
                    checks: vec![CheckResult::passed(Check::Docs)],
                },
                ModuleResult {
                    module: PathBuf::from("terraform/b"),
                    checks: vec![CheckResult::warning(Check::Docs, "x")],
                },
            ],
        };
        let table = report.summary_table();
        assert!(table.contains("terraform/a"));
        assert!(table.contains("PASSED"));
        assert!(table.contains("FAILED"));
        assert_eq!(report.passed_count(), 1);
        assert!(!report.all_passed());
    }

    #[test]
    fn single_module_must_exist() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(single_module(temp.path(), Path::new("terraform/nope")).is_err());
        fs::create_dir_all(temp.path().join("terraform/yes")).expect("mkdir");
        assert_eq!(
            single_module(temp.path(), Path::new("terraform/yes")).expect("exists"),
            PathBuf::from("terraform/yes")
        );
    }

    #[cfg(unix)]
    mod with_fake_tools {
        use super::*;
        use crate::test_support::write_fake_terraform;

        fn fake_bin(dir: &Path, name: &str, script: &str) -> PathBuf {
            let bin_dir = dir.join(name);
            fs::create_dir_all(&bin_dir).expect("mkdir");
            let path = write_fake_terraform(&bin_dir, script).expect("fake");
            let renamed = bin_dir.join(name);
            fs::rename(&path, &renamed).expect("rename");
            renamed
        }

        #[test]
        fn passing_tools_pass_the_module() {
            let temp = tempfile::tempdir().expect("tempdir");
            write_sample_module(&temp.path().join("terraform/rg")).expect("module");
            let terraform = fake_bin(temp.path(), "tf", "exit 0");
            let checkov = fake_bin(temp.path(), "checkov", "exit 0");
            let v = validator(
                temp.path(),
                ToolEnv::new(false, Some(terraform)),
                ValidateOptions::default(),
            )
            .with_checkov(Some(checkov));

            let result = v.validate_module(Path::new("terraform/rg"));
            assert!(result.passed(), "{result:?}");
            assert_eq!(result.checks.len(), 4);
        }

        #[test]
        fn fmt_failure_is_a_warning() {
            let temp = tempfile::tempdir().expect("tempdir");
            write_sample_module(&temp.path().join("terraform/rg")).expect("module");
            let terraform = fake_bin(
                temp.path(),
                "tf",
                "if [ \"$1\" = fmt ]; then exit 3; fi; exit 0",
            );
            let v = validator(
                temp.path(),
                ToolEnv::new(false, Some(terraform)),
                ValidateOptions {
                    security: false,
                    format: true,
                },
            );

            let result = v.validate_module(Path::new("terraform/rg"));
            assert!(!result.passed());
            let format = result
                .checks
                .iter()
                .find(|c| c.check == Check::Format)
                .expect("format check");
            assert_eq!(format.status, CheckStatus::Warning);
            assert!(result.checks.iter().all(|c| c.check != Check::Security));
        }

        #[test]
        fn checkov_findings_warn_and_other_failures_error() {
            let temp = tempfile::tempdir().expect("tempdir");
            write_sample_module(&temp.path().join("terraform/rg")).expect("module");
            let terraform = fake_bin(temp.path(), "tf", "exit 0");
            let options = ValidateOptions {
                security: true,
                format: false,
            };

            let findings = fake_bin(temp.path(), "checkov", "echo 'Check: CKV_AZURE_1'; exit 1");
            let v = validator(temp.path(), ToolEnv::new(false, Some(terraform.clone())), options)
                .with_checkov(Some(findings));
            let security = v.security_check(&temp.path().join("terraform/rg"), "terraform/rg");
            assert_eq!(security.status, CheckStatus::Warning);

            let crash = fake_bin(temp.path(), "checkov2", "echo boom >&2; exit 2");
            let v = validator(temp.path(), ToolEnv::new(false, Some(terraform)), options)
                .with_checkov(Some(crash));
            let security = v.security_check(&temp.path().join("terraform/rg"), "terraform/rg");
            assert_eq!(security.status, CheckStatus::Failed);
            assert_eq!(security.message.as_deref(), Some("Security scan error: boom"));
        }

        #[test]
        fn validate_failure_carries_stderr() {
            let temp = tempfile::tempdir().expect("tempdir");
            write_sample_module(&temp.path().join("terraform/rg")).expect("module");
            let terraform = fake_bin(
                temp.path(),
                "tf",
                "if [ \"$1\" = validate ]; then echo 'Error: Unsupported argument' >&2; exit 1; fi; exit 0",
            );
            let v = validator(
                temp.path(),
                ToolEnv::new(false, Some(terraform)),
                ValidateOptions {
                    security: false,
                    format: false,
                },
            );
            let report = v.validate_all(&[PathBuf::from("terraform/rg")]);
            assert_eq!(
                report.errors(),
                vec!["Terraform validation failed: Error: Unsupported argument"]
            );
        }
    }
}
