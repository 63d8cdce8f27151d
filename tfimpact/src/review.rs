//! Static module review for `tfimpact review`: structure, variables, outputs, providers.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::core::hcl_scan::ProviderConstraint;
use crate::io::module_files::ModuleAnalyzer;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureReport {
    pub has_main_tf: bool,
    pub has_variables_tf: bool,
    pub has_outputs_tf: bool,
    pub has_versions_tf: bool,
    pub has_readme: bool,
    /// Fraction of the required files present, from 0.0 to 1.0.
    pub structure_score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariablesReport {
    pub total_variables: usize,
    pub unused_variables: Vec<String>,
    pub all_variables_used: bool,
    pub variable_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputsReport {
    pub total_outputs: usize,
    pub has_outputs: bool,
    pub output_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvidersReport {
    pub has_version_constraints: bool,
    pub terraform_version: Option<String>,
    pub providers: BTreeMap<String, ProviderConstraint>,
    pub has_azurerm_provider: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleReview {
    pub module: String,
    pub structure: StructureReport,
    pub variables: VariablesReport,
    pub outputs: OutputsReport,
    pub providers: ProvidersReport,
    pub resource_types: Vec<String>,
}

/// Review the module at `module_path`.
pub fn review_module(module_path: &Path) -> Result<ModuleReview> {
    if !module_path.is_dir() {
        bail!("module path does not exist: {}", module_path.display());
    }
    let analyzer = ModuleAnalyzer::new(module_path);
    Ok(ModuleReview {
        module: module_path.display().to_string(),
        structure: structure_report(&analyzer),
        variables: variables_report(&analyzer)?,
        outputs: outputs_report(&analyzer)?,
        providers: providers_report(&analyzer)?,
        resource_types: analyzer.resource_types().context("scan resource types")?,
    })
}

pub fn structure_report(analyzer: &ModuleAnalyzer) -> StructureReport {
    let files: BTreeMap<&str, bool> = analyzer.check_required_files().into_iter().collect();
    let present = files.values().filter(|present| **present).count();
    let has = |name: &str| files.get(name).copied().unwrap_or(false);
    StructureReport {
        has_main_tf: has("main.tf"),
        has_variables_tf: has("variables.tf"),
        has_outputs_tf: has("outputs.tf"),
        has_versions_tf: has("versions.tf"),
        has_readme: has("README.md"),
        structure_score: present as f64 / files.len() as f64,
    }
}

pub fn variables_report(analyzer: &ModuleAnalyzer) -> Result<VariablesReport> {
    let usage = analyzer.variable_usage().context("scan variable usage")?;
    let unused_variables: Vec<String> = usage
        .iter()
        .filter(|u| !u.used)
        .map(|u| u.name.clone())
        .collect();
    Ok(VariablesReport {
        total_variables: usage.len(),
        all_variables_used: unused_variables.is_empty(),
        unused_variables,
        variable_names: usage.into_iter().map(|u| u.name).collect(),
    })
}

pub fn outputs_report(analyzer: &ModuleAnalyzer) -> Result<OutputsReport> {
    let output_names = analyzer.defined_outputs().context("scan outputs")?;
    Ok(OutputsReport {
        total_outputs: output_names.len(),
        has_outputs: !output_names.is_empty(),
        output_names,
    })
}

pub fn providers_report(analyzer: &ModuleAnalyzer) -> Result<ProvidersReport> {
    let report = match analyzer.version_constraints().context("scan versions.tf")? {
        Some(constraints) => ProvidersReport {
            has_version_constraints: true,
            has_azurerm_provider: constraints.providers.contains_key("azurerm"),
            terraform_version: constraints.terraform_version,
            providers: constraints.providers,
        },
        None => ProvidersReport {
            has_version_constraints: false,
            terraform_version: None,
            providers: BTreeMap::new(),
            has_azurerm_provider: false,
        },
    };
    Ok(report)
}
