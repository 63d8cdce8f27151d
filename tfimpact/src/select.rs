//! Change-aware test selection for `tfimpact select`.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::changeset::ChangeSet;
use crate::core::impact::{Module, affected_modules};
use crate::core::test_map::{TestKind, test_file_for};
use crate::io::config::TfImpactConfig;
use crate::io::discover::discover_modules;
use crate::io::git::Git;
use crate::io::process::{CommandOutput, run_command};

/// Which modules to consider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Modules touched relative to `base_branch`, including uncommitted work.
    Changed { base_branch: String },
    /// Every discovered module.
    All,
}

/// A module whose expected test file does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingTest {
    pub module: Module,
    pub test_file: PathBuf,
}

/// Modules and test files chosen for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Modules to test, sorted.
    pub modules: Vec<Module>,
    /// Existing test files, repository-relative, in module order.
    pub tests: Vec<PathBuf>,
    pub missing: Vec<MissingTest>,
}

/// Structured selection outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// Git reported nothing changed.
    NoChanges,
    /// Files changed, but none inside a module.
    NoAffectedModules { changed: ChangeSet },
    /// Modules chosen; `changed` is `None` for [`Scope::All`].
    Selected {
        changed: Option<ChangeSet>,
        selection: Selection,
    },
}

/// Resolve the scope to a set of modules and their existing test files.
#[instrument(skip(cfg))]
pub fn select_tests(
    root: &Path,
    cfg: &TfImpactConfig,
    scope: &Scope,
    kind: TestKind,
) -> Result<SelectOutcome> {
    let modules = discover_modules(root, &cfg.terraform_root, &cfg.root_file)
        .context("discover modules")?;

    let (changed, modules) = match scope {
        Scope::All => (None, modules),
        Scope::Changed { base_branch } => {
            let changed = Git::new(root).changed_files(base_branch, &cfg.untracked_prefix);
            if changed.is_empty() {
                info!("no changed files");
                return Ok(SelectOutcome::NoChanges);
            }
            let affected: Vec<Module> = affected_modules(&changed, &modules).into_iter().collect();
            if affected.is_empty() {
                info!(changed = changed.len(), "no modules affected");
                return Ok(SelectOutcome::NoAffectedModules { changed });
            }
            (Some(changed), affected)
        }
    };

    let selection = partition_tests(root, cfg, modules, kind);
    info!(
        modules = selection.modules.len(),
        tests = selection.tests.len(),
        missing = selection.missing.len(),
        "selection complete"
    );
    Ok(SelectOutcome::Selected { changed, selection })
}

/// Map each module to its test file and split by whether the file exists.
pub fn partition_tests(
    root: &Path,
    cfg: &TfImpactConfig,
    modules: Vec<Module>,
    kind: TestKind,
) -> Selection {
    let mut tests = Vec::new();
    let mut missing = Vec::new();
    for module in &modules {
        let test_file = test_file_for(module, kind, &cfg.tests_dir, &cfg.test_file_extension);
        if root.join(&test_file).is_file() {
            tests.push(test_file);
        } else {
            warn!(module = %module.path.display(), test_file = %test_file.display(), "test file not found");
            missing.push(MissingTest {
                module: module.clone(),
                test_file,
            });
        }
    }
    Selection {
        modules,
        tests,
        missing,
    }
}

/// Full argv: program, the test files, then the configured arguments.
pub fn test_command_line(cfg: &TfImpactConfig, tests: &[PathBuf]) -> Vec<String> {
    let mut argv = cfg.test_command.program.clone();
    argv.extend(tests.iter().map(|path| path.display().to_string()));
    argv.extend(cfg.test_command.args.iter().cloned());
    argv
}

/// Run the configured test command from `root`, blocking until it exits.
pub fn run_tests(root: &Path, cfg: &TfImpactConfig, tests: &[PathBuf]) -> Result<CommandOutput> {
    let argv = test_command_line(cfg, tests);
    let (program, args) = argv
        .split_first()
        .context("test_command.program must be a non-empty array")?;
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(root);
    info!(command = %argv.join(" "), "running tests");
    run_command(cmd, None, cfg.output_limit_bytes)
        .with_context(|| format!("run test command {}", argv.join(" ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    fn repo_with_modules() -> TestRepo {
        let repo = TestRepo::new().expect("repo");
        repo.write_module("terraform/foundation/resource-group")
            .expect("module");
        repo.write_module("terraform/monitoring/diagnostic-settings")
            .expect("module");
        repo.write("tests/terraform/modules/test_resource_group_validation.py", "")
            .expect("test file");
        repo.commit_all("initial").expect("commit");
        repo.branch("base").expect("branch");
        repo
    }

    fn changed(base: &str) -> Scope {
        Scope::Changed {
            base_branch: base.to_string(),
        }
    }

    #[test]
    fn clean_tree_selects_nothing() {
        let repo = repo_with_modules();
        let outcome = select_tests(
            repo.path(),
            &TfImpactConfig::default(),
            &changed("base"),
            TestKind::Validation,
        )
        .expect("select");
        assert_eq!(outcome, SelectOutcome::NoChanges);
    }

    #[test]
    fn change_outside_modules_affects_nothing() {
        let repo = repo_with_modules();
        repo.write("docs/notes.md", "hi\n").expect("write");
        repo.stage("docs/notes.md").expect("stage");
        let outcome = select_tests(
            repo.path(),
            &TfImpactConfig::default(),
            &changed("base"),
            TestKind::Validation,
        )
        .expect("select");
        match outcome {
            SelectOutcome::NoAffectedModules { changed } => {
                assert!(changed.contains("docs/notes.md"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn committed_change_selects_module_and_reports_missing_tests() {
        let repo = repo_with_modules();
        repo.checkout_new("feature").expect("checkout");
        repo.write(
            "terraform/foundation/resource-group/main.tf",
            "# edited\n",
        )
        .expect("write");
        repo.write(
            "terraform/monitoring/diagnostic-settings/outputs.tf",
            "# edited\n",
        )
        .expect("write");
        repo.commit_all("edit modules").expect("commit");

        let outcome = select_tests(
            repo.path(),
            &TfImpactConfig::default(),
            &changed("base"),
            TestKind::Validation,
        )
        .expect("select");
        let SelectOutcome::Selected { changed, selection } = outcome else {
            panic!("expected a selection");
        };
        assert_eq!(changed.expect("change set").len(), 2);
        assert_eq!(selection.modules.len(), 2);
        assert_eq!(
            selection.tests,
            vec![PathBuf::from(
                "tests/terraform/modules/test_resource_group_validation.py"
            )]
        );
        assert_eq!(selection.missing.len(), 1);
        assert_eq!(
            selection.missing[0].test_file,
            PathBuf::from("tests/terraform/modules/test_diagnostic_settings_validation.py")
        );
    }

    #[test]
    fn all_scope_ignores_git() {
        let temp = tempfile::tempdir().expect("tempdir");
        crate::test_support::write_sample_module(&temp.path().join("terraform/a"))
            .expect("module");
        let outcome = select_tests(
            temp.path(),
            &TfImpactConfig::default(),
            &Scope::All,
            TestKind::Plan,
        )
        .expect("select");
        let SelectOutcome::Selected { changed, selection } = outcome else {
            panic!("expected a selection");
        };
        assert!(changed.is_none());
        assert_eq!(selection.modules, vec![Module::new("terraform/a")]);
        assert_eq!(
            selection.missing[0].test_file,
            PathBuf::from("tests/terraform/modules/test_a_terraform.py")
        );
    }

    #[test]
    fn command_line_places_files_between_program_and_args() {
        let argv = test_command_line(
            &TfImpactConfig::default(),
            &[PathBuf::from("tests/terraform/modules/test_a_validation.py")],
        );
        assert_eq!(
            argv,
            vec![
                "poetry",
                "run",
                "pytest",
                "tests/terraform/modules/test_a_validation.py",
                "-v",
                "-m",
                "terraform",
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn run_tests_reports_exit_status() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut cfg = TfImpactConfig::default();
        cfg.test_command.program = vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()];
        cfg.test_command.args = vec![];
        let output = run_tests(temp.path(), &cfg, &[]).expect("run");
        assert_eq!(output.status.code(), Some(3));
    }
}
