//! Per-application failures collected during one sync cycle.

use std::collections::BTreeMap;
use std::fmt;

use super::store::StoreError;

/// Failures keyed by application name.
///
/// Renders one `<name>: <error>` line per application, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppSyncErrors {
    errors: BTreeMap<String, StoreError>,
}

impl AppSyncErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the failure for `name`, replacing an earlier one.
    pub fn insert(&mut self, name: impl Into<String>, error: StoreError) {
        self.errors.insert(name.into(), error);
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.errors.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&StoreError> {
        self.errors.get(name)
    }

    /// Failed application names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StoreError)> {
        self.errors.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Display for AppSyncErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, err) in &self.errors {
            writeln!(f, "{}: {}", name, err)?;
        }
        Ok(())
    }
}

impl std::error::Error for AppSyncErrors {}
