//! Validation-only workspace: init without a backend, validate, fmt check.
//!
//! Needs no provider credentials. Only the module's `.tf` and `.tfvars` files
//! are copied, nested ones included so local submodules resolve, and every
//! command is bounded by a timeout.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::core::value::{Variables, render_assignments};
use crate::io::plan_workspace::ProviderRequirement;
use crate::io::terraform::{Terraform, TerraformError, TerraformResult, ToolOutput};
use crate::io::toolchain::ToolEnv;

pub const DEFAULT_VALIDATION_TIMEOUT: Duration = Duration::from_secs(120);
pub const REQUIRED_TERRAFORM_VERSION: &str = ">= 1.0";

#[derive(Debug)]
struct Active {
    dir: TempDir,
    terraform: Terraform,
}

/// Temporary copy of a module's configuration files for syntax checks.
#[derive(Debug)]
pub struct ValidationWorkspace {
    module_path: PathBuf,
    binary: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
    required_providers: Vec<ProviderRequirement>,
    active: Option<Active>,
}

impl ValidationWorkspace {
    /// Fails fast when terraform is not available or the module does not exist.
    pub fn new(module_path: impl Into<PathBuf>, tools: &ToolEnv) -> TerraformResult<Self> {
        let binary = tools
            .terraform()
            .ok_or(TerraformError::ToolUnavailable)?
            .to_path_buf();
        let module_path = module_path.into();
        if !module_path.exists() {
            return Err(TerraformError::ModuleNotFound(module_path));
        }
        Ok(Self {
            module_path,
            binary,
            timeout: DEFAULT_VALIDATION_TIMEOUT,
            output_limit_bytes: crate::io::terraform::DEFAULT_OUTPUT_LIMIT_BYTES,
            required_providers: vec![ProviderRequirement::azurerm()],
            active: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.output_limit_bytes = bytes;
        self
    }

    /// Replace the default `azurerm` requirement written to `versions.tf`.
    pub fn with_required_providers(mut self, providers: Vec<ProviderRequirement>) -> Self {
        self.required_providers = providers;
        self
    }

    pub fn dir(&self) -> TerraformResult<&Path> {
        Ok(self.active()?.dir.path())
    }

    /// Create a fresh workspace holding the module's `.tf` and `.tfvars` files.
    ///
    /// Files in subdirectories keep their relative path; `.terraform` is skipped.
    pub fn setup(&mut self) -> TerraformResult<&Path> {
        self.cleanup();
        let dir = tempfile::Builder::new()
            .prefix("terraform-validation-")
            .tempdir()
            .map_err(TerraformError::io("create validation workspace"))?;
        info!(workspace = %dir.path().display(), "validation workspace created");

        copy_config_files(&self.module_path, dir.path())?;

        let terraform = Terraform::new(&self.binary, dir.path())
            .with_timeout(self.timeout)
            .with_output_limit(self.output_limit_bytes);
        self.active = Some(Active { dir, terraform });
        self.dir()
    }

    /// Write `terraform.tfvars` from `variables` and a `versions.tf` with the
    /// provider requirements.
    ///
    /// `versions.tf` replaces any copy taken from the module.
    pub fn create_minimal_config(&self, variables: &Variables) -> TerraformResult<()> {
        let dir = self.dir()?;

        let tfvars = dir.join("terraform.tfvars");
        fs::write(&tfvars, render_assignments(variables, ""))
            .map_err(TerraformError::io(format!("write {}", tfvars.display())))?;

        let versions = dir.join("versions.tf");
        fs::write(&versions, render_versions(&self.required_providers))
            .map_err(TerraformError::io(format!("write {}", versions.display())))?;
        Ok(())
    }

    /// `terraform init -backend=false`.
    pub fn init_backend_false(&self) -> TerraformResult<ToolOutput> {
        self.active()?.terraform.init(false)
    }

    pub fn validate(&self) -> TerraformResult<ToolOutput> {
        self.active()?.terraform.validate()
    }

    pub fn fmt_check(&self) -> TerraformResult<ToolOutput> {
        self.active()?.terraform.fmt_check()
    }

    /// Remove the workspace. Safe to call any number of times.
    pub fn cleanup(&mut self) {
        if let Some(active) = self.active.take() {
            let path = active.dir.path().to_path_buf();
            if let Err(err) = active.dir.close() {
                warn!(path = %path.display(), err = %err, "failed to remove validation workspace");
            }
        }
    }

    fn active(&self) -> TerraformResult<&Active> {
        self.active.as_ref().ok_or(TerraformError::NotInitialized)
    }
}

fn copy_config_files(src: &Path, dest: &Path) -> TerraformResult<()> {
    let walker = WalkDir::new(src)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || entry.file_name() != ".terraform");
    for entry in walker {
        let entry = entry.map_err(|err| TerraformError::Io {
            context: format!("walk {}", src.display()),
            source: err.into(),
        })?;
        if !entry.file_type().is_file() || !is_config_file(entry.path()) {
            continue;
        }
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dest.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(TerraformError::io(format!("create {}", parent.display())))?;
        }
        fs::copy(entry.path(), &target)
            .map_err(TerraformError::io(format!("copy {}", entry.path().display())))?;
        debug!(from = %entry.path().display(), to = %target.display(), "copied");
    }
    Ok(())
}

fn is_config_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("tf") | Some("tfvars")
    )
}

/// `versions.tf` content: the terraform version floor plus provider requirements.
pub fn render_versions(required: &[ProviderRequirement]) -> String {
    let mut out = format!("terraform {{\n  required_version = \"{REQUIRED_TERRAFORM_VERSION}\"\n");
    if !required.is_empty() {
        out.push_str("  required_providers {\n");
        for req in required {
            out.push_str(&format!(
                "    {} = {{\n      source  = \"{}\"\n      version = \"{}\"\n    }}\n",
                req.name, req.source, req.version
            ));
        }
        out.push_str("  }\n");
    }
    out.push_str("}\n");
    out
}
