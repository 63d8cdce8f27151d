//! Isolated workspace that calls a module and plans it.
//!
//! Lifecycle: `Uninitialized → WorkspaceReady → Configured → Planned → CleanedUp`.
//! The module is copied into `<tmp>/module`, a root `main.tf` calls it, and the
//! terraform subcommands run against the copy. The source tree is never touched.
//! The temporary directory is removed by [`PlanWorkspace::cleanup`] or on drop,
//! whichever comes first.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::core::plan::PlanDocument;
use crate::core::value::{TfValue, Variables, render_assignments};
use crate::io::terraform::{Terraform, TerraformError, TerraformResult, ToolOutput};
use crate::io::toolchain::ToolEnv;

pub const MODULE_DIR: &str = "module";
pub const MODULE_CALL: &str = "test_module";
pub const PLAN_FILE: &str = "plan.tfplan";

/// Entry in the generated `required_providers` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRequirement {
    pub name: String,
    pub source: String,
    pub version: String,
}

impl ProviderRequirement {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            version: version.into(),
        }
    }

    pub fn azurerm() -> Self {
        Self::new("azurerm", "hashicorp/azurerm", "~> 3.0")
    }
}

/// A generated `provider "<name>" { ... }` block.
///
/// Map-valued settings render as nested blocks (`features {}`), everything else
/// as attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub name: String,
    pub settings: Variables,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: Variables::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<TfValue>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// `provider "azurerm" { features {} }`.
    pub fn azurerm() -> Self {
        Self::new("azurerm").with("features", TfValue::Map(Default::default()))
    }

    fn render(&self) -> String {
        let mut out = format!("provider \"{}\" {{\n", self.name);
        for (key, value) in &self.settings {
            match value {
                TfValue::Map(entries) if entries.is_empty() => {
                    out.push_str(&format!("  {key} {{}}\n"));
                }
                TfValue::Map(entries) => {
                    out.push_str(&format!("  {key} {{\n"));
                    for (sub_key, sub_value) in entries {
                        out.push_str(&format!("    {sub_key} = {}\n", sub_value.render()));
                    }
                    out.push_str("  }\n");
                }
                other => out.push_str(&format!("  {key} = {}\n", other.render())),
            }
        }
        out.push_str("}\n");
        out
    }
}

/// Where a [`PlanWorkspace`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    WorkspaceReady,
    Configured,
    Planned,
    CleanedUp,
}

#[derive(Debug)]
struct Active {
    dir: TempDir,
    terraform: Terraform,
}

/// Temporary root configuration wrapping one module under test.
#[derive(Debug)]
pub struct PlanWorkspace {
    module_path: PathBuf,
    binary: PathBuf,
    required_providers: Vec<ProviderRequirement>,
    active: Option<Active>,
    phase: Phase,
}

impl PlanWorkspace {
    /// Fails fast when terraform is not available or the module does not exist.
    pub fn new(module_path: impl Into<PathBuf>, tools: &ToolEnv) -> TerraformResult<Self> {
        let binary = tools
            .terraform()
            .ok_or(TerraformError::ToolUnavailable)?
            .to_path_buf();
        let module_path = module_path.into();
        if !module_path.is_dir() {
            return Err(TerraformError::ModuleNotFound(module_path));
        }
        Ok(Self {
            module_path,
            binary,
            required_providers: vec![ProviderRequirement::azurerm()],
            active: None,
            phase: Phase::Uninitialized,
        })
    }

    /// Replace the default `azurerm` requirement. An empty list omits the
    /// `required_providers` block entirely.
    pub fn with_required_providers(mut self, providers: Vec<ProviderRequirement>) -> Self {
        self.required_providers = providers;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn module_path(&self) -> &Path {
        &self.module_path
    }

    /// Root of the temporary workspace.
    pub fn dir(&self) -> TerraformResult<&Path> {
        Ok(self.active()?.dir.path())
    }

    /// Create a fresh temporary directory and copy the module into it.
    ///
    /// Calling this again discards the previous workspace.
    pub fn setup(&mut self) -> TerraformResult<&Path> {
        self.cleanup();
        let dir = tempfile::Builder::new()
            .prefix("terraform_test_")
            .tempdir()
            .map_err(TerraformError::io("create plan workspace"))?;
        copy_module_tree(&self.module_path, &dir.path().join(MODULE_DIR))?;
        info!(workspace = %dir.path().display(), module = %self.module_path.display(), "plan workspace ready");

        let terraform = Terraform::new(&self.binary, dir.path());
        self.active = Some(Active { dir, terraform });
        self.phase = Phase::WorkspaceReady;
        self.dir()
    }

    /// Write the root `main.tf` that calls the copied module with `variables`.
    ///
    /// `providers = None` configures `azurerm` with an empty `features` block.
    pub fn configure(
        &mut self,
        variables: &Variables,
        providers: Option<&[ProviderConfig]>,
    ) -> TerraformResult<PathBuf> {
        let default_providers = [ProviderConfig::azurerm()];
        let providers = providers.unwrap_or(&default_providers);
        let contents = render_root_config(&self.required_providers, providers, variables);

        let path = self.dir()?.join("main.tf");
        fs::write(&path, contents).map_err(TerraformError::io(format!("write {}", path.display())))?;
        debug!(path = %path.display(), variables = variables.len(), "root configuration written");
        self.phase = Phase::Configured;
        Ok(path)
    }

    /// `terraform init`; a non-zero exit is an error carrying stderr.
    pub fn init(&self) -> TerraformResult<ToolOutput> {
        let terraform = &self.active()?.terraform;
        let output = terraform.init(true)?;
        if !output.success() {
            return Err(TerraformError::ToolFailed {
                command: "terraform init".to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// `terraform validate`; the exit code is the caller's to judge.
    pub fn validate(&self) -> TerraformResult<ToolOutput> {
        self.active()?.terraform.validate()
    }

    /// `terraform plan`; the exit code is the caller's to judge.
    pub fn plan(&self, var_file: Option<&Path>) -> TerraformResult<ToolOutput> {
        self.active()?.terraform.plan(None, var_file)
    }

    /// Plan to a file and decode `terraform show -json` of it.
    pub fn plan_json(&mut self, var_file: Option<&Path>) -> TerraformResult<PlanDocument> {
        let active = self.active()?;
        let plan_file = active.dir.path().join(PLAN_FILE);
        let output = active.terraform.plan(Some(&plan_file), var_file)?;
        if !output.success() {
            return Err(TerraformError::ToolFailed {
                command: "terraform plan".to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        let plan = active.terraform.show_json(&plan_file)?;
        debug!(changes = plan.resource_changes.len(), "plan decoded");
        self.phase = Phase::Planned;
        Ok(plan)
    }

    /// Remove the temporary workspace. Safe to call any number of times.
    pub fn cleanup(&mut self) {
        if let Some(active) = self.active.take() {
            let path = active.dir.path().to_path_buf();
            if let Err(err) = active.dir.close() {
                warn!(path = %path.display(), err = %err, "failed to remove plan workspace");
            } else {
                debug!(path = %path.display(), "plan workspace removed");
            }
            self.phase = Phase::CleanedUp;
        }
    }

    fn active(&self) -> TerraformResult<&Active> {
        self.active.as_ref().ok_or(TerraformError::NotInitialized)
    }
}

/// Generated root configuration: provider requirements, provider blocks, the
/// module call and an output re-exporting every module output.
pub fn render_root_config(
    required: &[ProviderRequirement],
    providers: &[ProviderConfig],
    variables: &Variables,
) -> String {
    let mut sections = Vec::new();

    if !required.is_empty() {
        let mut block = String::from("terraform {\n  required_providers {\n");
        for req in required {
            block.push_str(&format!(
                "    {} = {{\n      source  = \"{}\"\n      version = \"{}\"\n    }}\n",
                req.name, req.source, req.version
            ));
        }
        block.push_str("  }\n}\n");
        sections.push(block);
    }

    sections.extend(providers.iter().map(ProviderConfig::render));

    let mut module = format!("module \"{MODULE_CALL}\" {{\n  source = \"./{MODULE_DIR}\"\n");
    if !variables.is_empty() {
        module.push('\n');
        module.push_str(&render_assignments(variables, "  "));
    }
    module.push_str("}\n");
    sections.push(module);

    sections.push(format!(
        "# Output all module outputs for testing\noutput \"module_outputs\" {{\n  value = module.{MODULE_CALL}\n}}\n"
    ));

    sections.join("\n")
}

/// Recursive copy that leaves out local terraform state and plugin directories.
fn copy_module_tree(src: &Path, dest: &Path) -> TerraformResult<()> {
    let walker = WalkDir::new(src).into_iter().filter_entry(|entry| {
        let name = entry.file_name().to_string_lossy();
        !(name == ".terraform" || name.ends_with(".tfstate") || name.ends_with(".tfstate.backup"))
    });
    for entry in walker {
        let entry = entry.map_err(|err| TerraformError::Io {
            context: format!("walk {}", src.display()),
            source: err.into(),
        })?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .map_err(TerraformError::io(format!("create {}", target.display())))?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target)
                .map_err(TerraformError::io(format!("copy {}", entry.path().display())))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_sample_module;

    fn tools_with(binary: &Path) -> ToolEnv {
        ToolEnv::new(false, Some(binary.to_path_buf()))
    }

    #[test]
    fn missing_terraform_fails_at_construction() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = PlanWorkspace::new(temp.path(), &ToolEnv::new(false, None)).expect_err("no tf");
        assert!(matches!(err, TerraformError::ToolUnavailable));
    }

    #[test]
    fn missing_module_fails_at_construction() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = PlanWorkspace::new(temp.path().join("absent"), &tools_with(Path::new("terraform")))
            .expect_err("no module");
        assert!(matches!(err, TerraformError::ModuleNotFound(_)));
    }

    #[test]
    fn setup_copies_module_without_state() {
        let temp = tempfile::tempdir().expect("tempdir");
        let module = write_sample_module(&temp.path().join("rg")).expect("module");
        fs::create_dir_all(module.join(".terraform/providers")).expect("mkdir");
        fs::write(module.join("terraform.tfstate"), "{}").expect("state");
        fs::create_dir_all(module.join("examples/basic")).expect("mkdir");
        fs::write(module.join("examples/basic/main.tf"), "# example\n").expect("example");

        let mut ws = PlanWorkspace::new(&module, &tools_with(Path::new("terraform"))).expect("ws");
        let dir = ws.setup().expect("setup").to_path_buf();
        let copied = dir.join(MODULE_DIR);

        assert!(copied.join("main.tf").exists());
        assert!(copied.join("examples/basic/main.tf").exists());
        assert!(!copied.join(".terraform").exists());
        assert!(!copied.join("terraform.tfstate").exists());
        assert_eq!(ws.phase(), Phase::WorkspaceReady);
    }

    #[test]
    fn default_configuration_calls_module_with_azurerm() {
        let mut vars = Variables::new();
        vars.insert("name".into(), "test-rg-basic".into());
        vars.insert("tags".into(), TfValue::map([("Environment", "test")]));
        let rendered = render_root_config(
            &[ProviderRequirement::azurerm()],
            &[ProviderConfig::azurerm()],
            &vars,
        );
        let expected = r#"terraform {
  required_providers {
    azurerm = {
      source  = "hashicorp/azurerm"
      version = "~> 3.0"
    }
  }
}

provider "azurerm" {
  features {}
}

module "test_module" {
  source = "./module"

  name = "test-rg-basic"
  tags = {"Environment":"test"}
}

# Output all module outputs for testing
output "module_outputs" {
  value = module.test_module
}
"#;
        assert_eq!(rendered, expected);
    }

    #[test]
    fn provider_settings_render_blocks_and_attributes() {
        let provider = ProviderConfig::azurerm()
            .with("skip_provider_registration", true)
            .with("subscription_id", "0000");
        let rendered = provider.render();
        assert!(rendered.contains("  features {}\n"));
        assert!(rendered.contains("  skip_provider_registration = true\n"));
        assert!(rendered.contains("  subscription_id = \"0000\"\n"));
    }

    #[test]
    fn cleanup_is_idempotent_and_blocks_reuse() {
        let temp = tempfile::tempdir().expect("tempdir");
        let module = write_sample_module(&temp.path().join("rg")).expect("module");
        let mut ws = PlanWorkspace::new(&module, &tools_with(Path::new("terraform"))).expect("ws");
        let dir = ws.setup().expect("setup").to_path_buf();

        ws.cleanup();
        ws.cleanup();

        assert!(!dir.exists());
        assert_eq!(ws.phase(), Phase::CleanedUp);
        assert!(matches!(ws.dir(), Err(TerraformError::NotInitialized)));
        assert!(matches!(ws.validate(), Err(TerraformError::NotInitialized)));
        assert!(matches!(
            ws.configure(&Variables::new(), None),
            Err(TerraformError::NotInitialized)
        ));
        assert!(module.join("main.tf").exists());
    }

    #[test]
    fn drop_removes_workspace() {
        let temp = tempfile::tempdir().expect("tempdir");
        let module = write_sample_module(&temp.path().join("rg")).expect("module");
        let dir = {
            let mut ws =
                PlanWorkspace::new(&module, &tools_with(Path::new("terraform"))).expect("ws");
            ws.setup().expect("setup").to_path_buf()
        };
        assert!(!dir.exists());
    }

    #[cfg(unix)]
    #[test]
    fn failing_init_is_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let module = write_sample_module(&temp.path().join("rg")).expect("module");
        let bin = crate::test_support::write_fake_terraform(
            temp.path(),
            "echo 'registry unreachable' >&2; exit 1",
        )
        .expect("fake");
        let mut ws = PlanWorkspace::new(&module, &tools_with(&bin)).expect("ws");
        ws.setup().expect("setup");
        let err = ws.init().expect_err("init fails");
        assert!(err.to_string().contains("registry unreachable"));
    }

    #[cfg(unix)]
    #[test]
    fn large_plan_decodes_in_full() {
        let temp = tempfile::tempdir().expect("tempdir");
        let module = write_sample_module(&temp.path().join("rg")).expect("module");
        let change = r#"{"type":"terraform_data","change":{"actions":["create"]}}"#;
        let script = format!(
            r#"if [ "$1" != show ]; then exit 0; fi
printf '{{"resource_changes":['
i=0
while [ $i -lt 20000 ]; do printf '%s,' '{change}'; i=$((i+1)); done
printf '%s]}}' '{change}'"#
        );
        let bin = crate::test_support::write_fake_terraform(temp.path(), &script).expect("fake");
        let mut ws = PlanWorkspace::new(&module, &tools_with(&bin)).expect("ws");
        ws.setup().expect("setup");

        let plan = ws.plan_json(None).expect("plan json");
        assert_eq!(plan.resource_changes.len(), 20_001);
        assert_eq!(ws.phase(), Phase::Planned);
    }
}
