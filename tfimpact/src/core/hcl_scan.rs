//! Best-effort structural scan of Terraform source text.
//!
//! This is pattern matching, not parsing. Commented-out blocks still match and
//! unusual formatting can hide a block; malformed text yields whatever the
//! patterns still find, never an error.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static VARIABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"variable\s+"([^"]+)""#).unwrap());
static OUTPUT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"output\s+"([^"]+)""#).unwrap());
static RESOURCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"resource\s+"([^"]+)"\s+"[^"]+""#).unwrap());
static REQUIRED_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"required_version\s*=\s*"([^"]+)""#).unwrap());
static PROVIDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\w+)\s*=\s*\{[^}]*source\s*=\s*"([^"]+)"[^}]*version\s*=\s*"([^"]+)""#)
        .unwrap()
});
static VAR_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"var\.([A-Za-z_][A-Za-z0-9_-]*)").unwrap());

/// Provider requirement found in a `required_providers` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderConstraint {
    pub source: String,
    pub version: String,
}

/// Version constraints declared in a `versions.tf`-style file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VersionConstraints {
    pub terraform_version: Option<String>,
    pub providers: BTreeMap<String, ProviderConstraint>,
}

/// Names of `variable "<name>"` blocks, in source order.
pub fn variable_names(source: &str) -> Vec<String> {
    first_captures(&VARIABLE_RE, source)
}

/// Names of `output "<name>"` blocks, in source order.
pub fn output_names(source: &str) -> Vec<String> {
    first_captures(&OUTPUT_RE, source)
}

/// Resource types of `resource "<type>" "<name>"` blocks, in source order.
pub fn resource_types(source: &str) -> Vec<String> {
    first_captures(&RESOURCE_RE, source)
}

/// Every `var.<name>` reference in the text.
pub fn variable_references(source: &str) -> BTreeSet<String> {
    first_captures(&VAR_REF_RE, source).into_iter().collect()
}

pub fn version_constraints(source: &str) -> VersionConstraints {
    let terraform_version = REQUIRED_VERSION_RE
        .captures(source)
        .map(|caps| caps[1].to_string());
    let providers = PROVIDER_RE
        .captures_iter(source)
        .map(|caps| {
            (
                caps[1].to_string(),
                ProviderConstraint {
                    source: caps[2].to_string(),
                    version: caps[3].to_string(),
                },
            )
        })
        .collect();
    VersionConstraints {
        terraform_version,
        providers,
    }
}

fn first_captures(re: &Regex, source: &str) -> Vec<String> {
    re.captures_iter(source)
        .map(|caps| caps[1].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARIABLES: &str = r#"
variable "name" {
  type = string
}

variable "location" {
  type    = string
  default = "East US"
}
"#;

    const VERSIONS: &str = r#"
terraform {
  required_version = ">= 1.0"

  required_providers {
    azurerm = {
      source  = "hashicorp/azurerm"
      version = "~> 3.0"
    }
  }
}
"#;

    #[test]
    fn extracts_variable_names_in_order() {
        assert_eq!(variable_names(VARIABLES), vec!["name", "location"]);
    }

    #[test]
    fn extracts_outputs_and_resources() {
        let source = r#"
resource "azurerm_resource_group" "this" {
  name = var.name
}
output "id" { value = azurerm_resource_group.this.id }
"#;
        assert_eq!(output_names(source), vec!["id"]);
        assert_eq!(resource_types(source), vec!["azurerm_resource_group"]);
    }

    #[test]
    fn extracts_version_constraints() {
        let constraints = version_constraints(VERSIONS);
        assert_eq!(constraints.terraform_version.as_deref(), Some(">= 1.0"));
        assert_eq!(
            constraints.providers.get("azurerm"),
            Some(&ProviderConstraint {
                source: "hashicorp/azurerm".to_string(),
                version: "~> 3.0".to_string(),
            })
        );
    }

    #[test]
    fn commented_blocks_still_match() {
        let source = "# variable \"legacy\" {}\nvariable \"live\" {}\n";
        assert_eq!(variable_names(source), vec!["legacy", "live"]);
    }

    #[test]
    fn malformed_text_gives_partial_results() {
        let source = "variable \"ok\" {\n  type = string\n\nvariable unclosed {\n resource {";
        assert_eq!(variable_names(source), vec!["ok"]);
        assert!(resource_types(source).is_empty());
        assert_eq!(version_constraints(source), VersionConstraints::default());
    }

    #[test]
    fn collects_variable_references() {
        let refs = variable_references("name = var.name\ntags = merge(var.tags, {})\n");
        assert!(refs.contains("name"));
        assert!(refs.contains("tags"));
        assert!(!refs.contains("location"));
    }
}
