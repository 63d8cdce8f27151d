//! Test-only helpers: throwaway git repositories, fixture modules and plan JSON.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use tempfile::TempDir;

/// A git repository in a temporary directory, removed on drop.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create repo tempdir")?;
        let repo = Self { dir };
        repo.git(&["init", "-q"])?;
        repo.git(&["config", "user.name", "tfimpact tests"])?;
        repo.git(&["config", "user.email", "tfimpact@local.invalid"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to a repository-relative path, creating parents.
    pub fn write(&self, rel: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    pub fn stage(&self, rel: &str) -> Result<()> {
        self.git(&["add", "--", rel])?;
        Ok(())
    }

    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "-q", "-m", message])?;
        Ok(())
    }

    /// Create a branch at HEAD without switching to it.
    pub fn branch(&self, name: &str) -> Result<()> {
        self.git(&["branch", name])?;
        Ok(())
    }

    pub fn checkout_new(&self, name: &str) -> Result<()> {
        self.git(&["checkout", "-q", "-b", name])?;
        Ok(())
    }

    /// Write a complete module (see [`write_sample_module`]) under `rel`.
    pub fn write_module(&self, rel: &str) -> Result<PathBuf> {
        write_sample_module(&self.path().join(rel))
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .with_context(|| format!("run git {:?}", args))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git {:?} failed: {}", args, stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

pub const SAMPLE_MAIN_TF: &str = r#"# Sample Terraform module
resource "azurerm_resource_group" "example" {
  name     = var.resource_group_name
  location = var.location
}
"#;

pub const SAMPLE_VARIABLES_TF: &str = r#"variable "resource_group_name" {
  description = "Name of the resource group"
  type        = string
}

variable "location" {
  description = "Azure region"
  type        = string
  default     = "East US"
}
"#;

pub const SAMPLE_OUTPUTS_TF: &str = r#"output "resource_group_id" {
  description = "ID of the created resource group"
  value       = azurerm_resource_group.example.id
}
"#;

pub const SAMPLE_VERSIONS_TF: &str = r#"terraform {
  required_version = ">= 1.0"

  required_providers {
    azurerm = {
      source  = "hashicorp/azurerm"
      version = ">= 3.0"
    }
  }
}
"#;

/// Write the five-file sample module (`main.tf`, `variables.tf`, `outputs.tf`,
/// `versions.tf`, `README.md`) into `dir`.
pub fn write_sample_module(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let files = [
        ("main.tf", SAMPLE_MAIN_TF),
        ("variables.tf", SAMPLE_VARIABLES_TF),
        ("outputs.tf", SAMPLE_OUTPUTS_TF),
        ("versions.tf", SAMPLE_VERSIONS_TF),
        ("README.md", "# Sample Module\n\nThis is a sample module for testing.\n"),
    ];
    for (name, contents) in files {
        let path = dir.join(name);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
    }
    Ok(dir.to_path_buf())
}

/// A module with a single `terraform_data` resource and no provider requirements,
/// so `terraform init` works offline.
pub fn write_offline_module(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let files = [
        (
            "main.tf",
            "resource \"terraform_data\" \"this\" {\n  input = {\n    name   = var.name\n    labels = var.labels\n    rules  = var.rules\n    on     = var.enabled\n  }\n}\n",
        ),
        (
            "variables.tf",
            "variable \"name\" {\n  type = string\n}\n\nvariable \"labels\" {\n  type    = map(string)\n  default = {}\n}\n\nvariable \"rules\" {\n  type = list(object({\n    name = string\n    days = number\n  }))\n  default = []\n}\n\nvariable \"enabled\" {\n  type    = bool\n  default = true\n}\n",
        ),
        (
            "outputs.tf",
            "output \"name\" {\n  value = var.name\n}\n",
        ),
    ];
    for (name, contents) in files {
        let path = dir.join(name);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
    }
    Ok(dir.to_path_buf())
}

/// Plan for a module call creating one resource group inside `module.test_module`.
pub const PLAN_CREATE_RESOURCE_GROUP: &str = r#"{
  "format_version": "1.2",
  "planned_values": {
    "outputs": {
      "resource_group_name": { "sensitive": false, "value": "test-rg-basic" }
    },
    "root_module": {
      "child_modules": [
        {
          "address": "module.test_module",
          "resources": [
            {
              "address": "module.test_module.azurerm_resource_group.this",
              "mode": "managed",
              "type": "azurerm_resource_group",
              "name": "this",
              "values": {
                "location": "eastus",
                "name": "test-rg-basic",
                "tags": { "Environment": "test", "Project": "terraform-testing" }
              }
            }
          ]
        }
      ]
    }
  },
  "resource_changes": [
    {
      "address": "module.test_module.azurerm_resource_group.this",
      "module_address": "module.test_module",
      "type": "azurerm_resource_group",
      "name": "this",
      "change": { "actions": ["create"], "before": null }
    }
  ]
}"#;

/// Plan with one change per action shape, including a replace and an unknown verb.
pub const PLAN_MIXED_ACTIONS: &str = r#"{
  "format_version": "1.2",
  "planned_values": {
    "root_module": {
      "resources": [
        { "address": "null_resource.a", "type": "null_resource", "name": "a", "values": {} },
        { "address": "null_resource.b", "type": "null_resource", "name": "b", "values": {} },
        { "address": "null_resource.d", "type": "null_resource", "name": "d", "values": {} }
      ]
    }
  },
  "resource_changes": [
    { "address": "null_resource.a", "type": "null_resource", "name": "a", "change": { "actions": ["create"] } },
    { "address": "null_resource.b", "type": "null_resource", "name": "b", "change": { "actions": ["update"] } },
    { "address": "null_resource.c", "type": "null_resource", "name": "c", "change": { "actions": ["delete"] } },
    { "address": "null_resource.d", "type": "null_resource", "name": "d", "change": { "actions": ["delete", "create"] } },
    { "address": "null_resource.e", "type": "null_resource", "name": "e", "change": { "actions": ["forget"] } }
  ]
}"#;

/// Write an executable stand-in for `terraform` that runs `script` with the real arguments.
#[cfg(unix)]
pub fn write_fake_terraform(dir: &Path, script: &str) -> Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("terraform");
    fs::write(&path, format!("#!/bin/sh\n{script}\n"))
        .with_context(|| format!("write {}", path.display()))?;
    let mut perms = fs::metadata(&path)
        .with_context(|| format!("stat {}", path.display()))?
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).with_context(|| format!("chmod {}", path.display()))?;
    Ok(path)
}
