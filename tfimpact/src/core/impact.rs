//! Mapping changed paths onto the modules that contain them.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::core::changeset::ChangeSet;

/// A directory holding a module's root definition file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Module {
    pub path: PathBuf,
}

impl Module {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Final path component, e.g. `resource-group` for `terraform/foundation/resource-group`.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// True if `file` is the module directory itself or lives anywhere below it.
    ///
    /// Comparison is per path component, so `foo-module2/main.tf` is not inside `foo-module`.
    pub fn contains(&self, file: &Path) -> bool {
        file.strip_prefix(&self.path).is_ok()
    }
}

/// Modules containing at least one changed path.
///
/// Every containing module matches; nested module directories are all reported.
pub fn affected_modules(changed: &ChangeSet, modules: &[Module]) -> BTreeSet<Module> {
    let mut affected = BTreeSet::new();
    for file in changed.iter() {
        let file = Path::new(file);
        for module in modules {
            if module.contains(file) {
                affected.insert(module.clone());
            }
        }
    }
    affected
}
