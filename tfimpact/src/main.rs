//! Change-aware test runner and validator for Terraform module repositories.
//!
//! Works out which modules a branch touched and runs only their tests, lists
//! modules and changes, validates modules and prints a static review.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use tfimpact::core::test_map::TestKind;
use tfimpact::exit_codes;
use tfimpact::io::config::{CONFIG_FILE, TfImpactConfig, load_config};
use tfimpact::io::discover::discover_modules;
use tfimpact::io::git::Git;
use tfimpact::io::toolchain::ToolEnv;
use tfimpact::logging;
use tfimpact::review::review_module;
use tfimpact::select::{Scope, SelectOutcome, run_tests, select_tests, test_command_line};
use tfimpact::validate::{CheckStatus, ValidateOptions, Validator, single_module};

#[derive(Parser)]
#[command(
    name = "tfimpact",
    version,
    about = "Run Terraform module tests for changed modules only"
)]
struct Cli {
    /// Config file (default: `tfimpact.toml` in the current directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run tests for modules affected by changes (or all modules).
    Select {
        /// Base branch to compare against (default from config: main).
        #[arg(long)]
        base_branch: Option<String>,
        /// Which family of tests to run.
        #[arg(long, value_enum, default_value_t = TestKind::Validation)]
        test_type: TestKind,
        /// Test all modules regardless of changes.
        #[arg(long)]
        all: bool,
        /// Print the test command instead of running it.
        #[arg(long)]
        dry_run: bool,
    },
    /// List discovered modules.
    Modules,
    /// List changed files.
    Changed {
        #[arg(long)]
        base_branch: Option<String>,
    },
    /// Validate modules: syntax, formatting, security scan, documentation.
    Validate {
        /// Path to a single module.
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        module: Option<PathBuf>,
        /// Validate every module under the terraform root.
        #[arg(long)]
        all: bool,
        /// Skip the checkov scan.
        #[arg(long)]
        no_security: bool,
        /// Skip the `terraform fmt -check` step.
        #[arg(long)]
        no_format: bool,
    },
    /// Print a static review of one module as JSON.
    Review { path: PathBuf },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = std::env::current_dir().context("resolve current directory")?;
    let config_path = cli.config.unwrap_or_else(|| root.join(CONFIG_FILE));
    let cfg = load_config(&config_path)?;

    match cli.command {
        Command::Select {
            base_branch,
            test_type,
            all,
            dry_run,
        } => {
            let scope = if all {
                Scope::All
            } else {
                Scope::Changed {
                    base_branch: base_branch.unwrap_or_else(|| cfg.base_branch.clone()),
                }
            };
            cmd_select(&root, &cfg, &scope, test_type, dry_run)
        }
        Command::Modules => cmd_modules(&root, &cfg),
        Command::Changed { base_branch } => {
            let base = base_branch.unwrap_or_else(|| cfg.base_branch.clone());
            cmd_changed(&root, &cfg, &base)
        }
        Command::Validate {
            module,
            all: _,
            no_security,
            no_format,
        } => {
            let options = ValidateOptions {
                security: !no_security,
                format: !no_format,
            };
            let modules = match module {
                Some(module) => vec![single_module(&root, &module)?],
                None => {
                    discover_modules(&root, &cfg.terraform_root, &cfg.root_file)?
                        .into_iter()
                        .map(|m| m.path)
                        .collect()
                }
            };
            cmd_validate(&root, &cfg, &modules, options)
        }
        Command::Review { path } => cmd_review(&path),
    }
}

fn cmd_select(
    root: &Path,
    cfg: &TfImpactConfig,
    scope: &Scope,
    kind: TestKind,
    dry_run: bool,
) -> Result<i32> {
    match scope {
        Scope::All => println!("Testing ALL Terraform modules..."),
        Scope::Changed { base_branch } => {
            println!("Detecting changed files compared to {base_branch}...");
        }
    }

    let selection = match select_tests(root, cfg, scope, kind)? {
        SelectOutcome::NoChanges => {
            println!("No changed files detected.");
            return Ok(exit_codes::OK);
        }
        SelectOutcome::NoAffectedModules { changed } => {
            print_changed(&changed.iter().collect::<Vec<_>>());
            println!("No Terraform modules affected by changes.");
            return Ok(exit_codes::OK);
        }
        SelectOutcome::Selected { changed, selection } => {
            if let Some(changed) = changed {
                print_changed(&changed.iter().collect::<Vec<_>>());
            }
            selection
        }
    };

    if selection.modules.is_empty() {
        println!("No Terraform modules to test.");
        return Ok(exit_codes::OK);
    }
    println!("Testing {} Terraform module(s):", selection.modules.len());
    for module in &selection.modules {
        println!("  - {}", module.path.display());
    }

    if !selection.missing.is_empty() {
        println!("\nWarning: Missing test files for some modules:");
        for missing in &selection.missing {
            println!(
                "  - {} -> {} (not found)",
                missing.module.path.display(),
                missing.test_file.display()
            );
        }
    }

    if selection.tests.is_empty() {
        println!("No test files found for selected modules.");
        return Ok(exit_codes::OK);
    }

    let command = test_command_line(cfg, &selection.tests).join(" ");
    if dry_run {
        println!("\nWould run: {command}");
        return Ok(exit_codes::OK);
    }

    println!("\nRunning tests: {command}");
    let output = run_tests(root, cfg, &selection.tests)?;
    let stdout = output.stdout_lossy();
    if !stdout.is_empty() {
        print!("{stdout}");
    }
    let stderr = output.stderr_lossy();
    if !stderr.is_empty() {
        eprint!("{stderr}");
    }
    Ok(if output.status.success() {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    })
}

fn print_changed(paths: &[&str]) {
    println!("Changed files ({}):", paths.len());
    for path in paths {
        println!("  - {path}");
    }
}

fn cmd_modules(root: &Path, cfg: &TfImpactConfig) -> Result<i32> {
    let modules = discover_modules(root, &cfg.terraform_root, &cfg.root_file)?;
    if modules.is_empty() {
        println!("No Terraform modules found under {}", cfg.terraform_root.display());
    }
    for module in modules {
        println!("{}", module.path.display());
    }
    Ok(exit_codes::OK)
}

fn cmd_changed(root: &Path, cfg: &TfImpactConfig, base: &str) -> Result<i32> {
    let changed = Git::new(root).changed_files(base, &cfg.untracked_prefix);
    for path in changed.iter() {
        println!("{path}");
    }
    Ok(exit_codes::OK)
}

fn cmd_validate(
    root: &Path,
    cfg: &TfImpactConfig,
    modules: &[PathBuf],
    options: ValidateOptions,
) -> Result<i32> {
    if modules.is_empty() {
        println!("No modules found to validate");
        println!("Searched in: {}", root.join(&cfg.terraform_root).display());
        return Ok(exit_codes::OK);
    }
    println!("Found {} module(s) to validate", modules.len());

    let validator = Validator::new(root, cfg, ToolEnv::detect(), options);
    let report = validator.validate_all(modules);

    for result in &report.results {
        println!("\nValidating module: {}", result.module.display());
        for check in &result.checks {
            let label = match check.status {
                CheckStatus::Passed => "ok",
                CheckStatus::Warning => "warn",
                CheckStatus::Failed => "FAIL",
            };
            match &check.message {
                Some(message) => println!("  {label:<4} {}: {message}", check.check),
                None => println!("  {label:<4} {}", check.check),
            }
        }
    }

    println!("\nVALIDATION SUMMARY");
    println!("{}", report.summary_table());
    println!(
        "\nResults: {} passed, {} failed",
        report.passed_count(),
        report.failed_count()
    );

    let errors = report.errors();
    if !errors.is_empty() {
        println!("\nErrors ({}):", errors.len());
        for error in errors {
            println!("  - {error}");
        }
    }
    let warnings = report.warnings();
    if !warnings.is_empty() {
        println!("\nWarnings ({}):", warnings.len());
        for warning in warnings {
            println!("  - {warning}");
        }
    }

    if report.all_passed() {
        println!("\nAll validations passed!");
        Ok(exit_codes::OK)
    } else {
        println!("\nValidation failed!");
        Ok(exit_codes::FAILED)
    }
}

fn cmd_review(path: &Path) -> Result<i32> {
    let review = review_module(path)?;
    let json = serde_json::to_string_pretty(&review).context("serialize review")?;
    println!("{json}");
    Ok(exit_codes::OK)
}
