//! The set of repository-relative paths considered changed.

use std::collections::BTreeSet;

/// Deduplicated union of changed paths from every diff source.
///
/// Membership is all that matters; the ordered set only keeps output stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    paths: BTreeSet<String>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every path listed in `git diff --name-only` style output.
    pub fn extend_name_only(&mut self, output: &str) {
        self.paths.extend(parse_name_only(output));
    }

    /// Add untracked paths, keeping only those under `prefix`.
    pub fn extend_untracked(&mut self, output: &str, prefix: &str) {
        self.paths.extend(
            parse_name_only(output)
                .into_iter()
                .filter(|path| path.starts_with(prefix)),
        );
    }

    pub fn insert(&mut self, path: impl Into<String>) -> bool {
        self.paths.insert(path.into())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }
}

impl FromIterator<String> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<&'a str> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().map(str::to_string).collect()
    }
}

/// One path per non-blank line.
pub fn parse_name_only(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
