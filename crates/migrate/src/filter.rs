//! File selection for `up`, `down` and `refresh`

use std::collections::HashSet;

/// An ordered set of option values; repeated values are kept once
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionSet {
    values: Vec<String>,
    seen: HashSet<String>,
}

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, returning `false` if it was already present
    pub fn insert(&mut self, value: impl Into<String>) -> bool {
        let value = value.into();
        if self.seen.contains(&value) {
            return false;
        }
        self.seen.insert(value.clone());
        self.values.push(value);
        true
    }

    pub fn contains(&self, value: &str) -> bool {
        self.seen.contains(value)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Values in first-insertion order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for OptionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = OptionSet::new();
        for value in iter {
            set.insert(value);
        }
        set
    }
}

impl<S: Into<String>> Extend<S> for OptionSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}

/// Restricts which migration files an operation acts on
///
/// A file is selected when the only-set is empty or names it, and the skip-set
/// does not name it. Names are compared exactly against the canonical file
/// name. Calls accumulate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationFilter {
    only: OptionSet,
    exclude: OptionSet,
}

impl MigrationFilter {
    /// A filter that selects every file
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the operation to the named files
    pub fn only_files<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only.extend(names);
        self
    }

    /// Exclude the named files
    pub fn skip_files<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(names);
        self
    }

    /// Check whether the file `name` is selected
    pub fn allows(&self, name: &str) -> bool {
        if self.exclude.contains(name) {
            return false;
        }
        self.only.is_empty() || self.only.contains(name)
    }
}
