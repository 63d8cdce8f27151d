//! Module discovery: every directory under the terraform root holding a root file.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::impact::Module;

/// Directory name whose subtree never contains real modules.
const EXAMPLES_DIR: &str = "examples";

/// Find modules under `repo_root/terraform_root`.
///
/// Module paths are relative to `repo_root` so they compare directly against
/// git's repository-relative change lists. Sorted, no duplicates. A missing
/// terraform root is not an error.
pub fn discover_modules(
    repo_root: &Path,
    terraform_root: &Path,
    root_file: &str,
) -> Result<Vec<Module>> {
    let search_root = repo_root.join(terraform_root);
    if !search_root.is_dir() {
        warn!(path = %search_root.display(), "terraform root not found; no modules");
        return Ok(Vec::new());
    }

    let walker = WalkDir::new(&search_root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || entry.file_name() != EXAMPLES_DIR);

    let mut modules = Vec::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("walk {}", search_root.display()))?;
        if !entry.file_type().is_file() || entry.file_name() != root_file {
            continue;
        }
        let Some(dir) = entry.path().parent() else {
            continue;
        };
        let rel = dir.strip_prefix(repo_root).unwrap_or(dir);
        debug!(module = %rel.display(), "module discovered");
        modules.push(Module::new(rel));
    }
    modules.sort();
    modules.dedup();
    Ok(modules)
}
