//! Module to test-file naming.

use std::fmt;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::core::impact::Module;

/// Which family of test files to select for a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    /// Syntax and structure checks that need no credentials.
    Validation,
    /// Plan-driven tests that call a provider.
    Plan,
}

impl TestKind {
    fn suffix(self) -> &'static str {
        match self {
            TestKind::Validation => "validation",
            TestKind::Plan => "terraform",
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestKind::Validation => f.write_str("validation"),
            TestKind::Plan => f.write_str("plan"),
        }
    }
}

/// Expected test file for `module`, e.g. `resource-group` → `test_resource_group_validation.py`.
///
/// Does not check that the file exists.
pub fn test_file_for(module: &Module, kind: TestKind, tests_dir: &Path, extension: &str) -> PathBuf {
    let name = module.name().replace('-', "_");
    tests_dir.join(format!("test_{name}_{}.{extension}", kind.suffix()))
}
