//! Read a module's files from disk and run the source scans over them.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::hcl_scan::{self, VersionConstraints};

/// Files every module is expected to ship.
pub const REQUIRED_FILES: [&str; 5] = [
    "main.tf",
    "variables.tf",
    "outputs.tf",
    "versions.tf",
    "README.md",
];

const VARIABLES_FILE: &str = "variables.tf";
const OUTPUTS_FILE: &str = "outputs.tf";
const VERSIONS_FILE: &str = "versions.tf";

/// Whether a variable is referenced anywhere outside `variables.tf`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableUsage {
    pub name: String,
    pub used: bool,
}

/// Static view of one module directory.
#[derive(Debug, Clone)]
pub struct ModuleAnalyzer {
    module_path: PathBuf,
}

impl ModuleAnalyzer {
    pub fn new(module_path: impl Into<PathBuf>) -> Self {
        Self {
            module_path: module_path.into(),
        }
    }

    pub fn module_path(&self) -> &Path {
        &self.module_path
    }

    /// Presence of each of [`REQUIRED_FILES`], in that order.
    pub fn check_required_files(&self) -> Vec<(&'static str, bool)> {
        REQUIRED_FILES
            .iter()
            .map(|name| (*name, self.module_path.join(name).is_file()))
            .collect()
    }

    /// Variables declared in `variables.tf`; empty when the file is absent.
    pub fn defined_variables(&self) -> Result<Vec<String>> {
        Ok(self
            .read_optional(VARIABLES_FILE)?
            .map(|source| hcl_scan::variable_names(&source))
            .unwrap_or_default())
    }

    /// Outputs declared in `outputs.tf`; empty when the file is absent.
    pub fn defined_outputs(&self) -> Result<Vec<String>> {
        Ok(self
            .read_optional(OUTPUTS_FILE)?
            .map(|source| hcl_scan::output_names(&source))
            .unwrap_or_default())
    }

    /// Distinct resource types across every top-level `.tf` file, sorted.
    pub fn resource_types(&self) -> Result<Vec<String>> {
        let mut types = Vec::new();
        for path in self.tf_files()? {
            let source = read(&path)?;
            types.extend(hcl_scan::resource_types(&source));
        }
        types.sort();
        types.dedup();
        Ok(types)
    }

    /// Usage of each declared variable, in declaration order.
    pub fn variable_usage(&self) -> Result<Vec<VariableUsage>> {
        let defined = self.defined_variables()?;
        let mut content = String::new();
        for path in self.tf_files()? {
            if path.file_name().is_some_and(|name| name == VARIABLES_FILE) {
                continue;
            }
            content.push_str(&read(&path)?);
            content.push('\n');
        }
        let referenced = hcl_scan::variable_references(&content);
        Ok(defined
            .into_iter()
            .map(|name| {
                let used = referenced.contains(&name);
                VariableUsage { name, used }
            })
            .collect())
    }

    /// Constraints from `versions.tf`, or `None` when the module has none.
    pub fn version_constraints(&self) -> Result<Option<VersionConstraints>> {
        Ok(self
            .read_optional(VERSIONS_FILE)?
            .map(|source| hcl_scan::version_constraints(&source)))
    }

    /// True if the directory holds at least one top-level `.tf` file.
    pub fn has_tf_files(&self) -> Result<bool> {
        Ok(!self.tf_files()?.is_empty())
    }

    /// Top-level `.tf` files, sorted by name.
    pub fn tf_files(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.module_path)
            .with_context(|| format!("read {}", self.module_path.display()))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("read {}", self.module_path.display()))?
                .path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "tf") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn read_optional(&self, name: &str) -> Result<Option<String>> {
        let path = self.module_path.join(name);
        if !path.is_file() {
            return Ok(None);
        }
        read(&path).map(Some)
    }
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}
