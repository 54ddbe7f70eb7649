//! Stack reference directory.
//!
//! Services only carry the identifier of their stack, so the stacks
//! collection is indexed first and services are labelled from it. The
//! directory lives for a single scrape cycle.

use std::collections::{HashMap, HashSet};

/// Placeholder label for a stack reference that cannot be resolved.
pub const UNKNOWN_STACK: &str = "unknown";

/// Stack id to stack name lookup for one scrape cycle.
#[derive(Debug, Default)]
pub struct StackDirectory {
    names_by_id: HashMap<String, String>,
    names: HashSet<String>,
}

impl StackDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a stack. A later record with the same id wins.
    pub fn record(&mut self, id: &str, name: &str) {
        if !name.is_empty() {
            self.names.insert(name.to_string());
        }
        if !id.is_empty() {
            self.names_by_id.insert(id.to_string(), name.to_string());
        }
    }

    /// Resolve a stack reference to a display name.
    ///
    /// A reference may be an id or, on schemas that reference stacks by
    /// name, the name itself. Anything else resolves to [`UNKNOWN_STACK`].
    pub fn resolve(&self, reference: &str) -> &str {
        if reference.is_empty() {
            return UNKNOWN_STACK;
        }
        if let Some(name) = self.names_by_id.get(reference) {
            return name.as_str();
        }
        match self.names.get(reference) {
            Some(name) => name.as_str(),
            None => UNKNOWN_STACK,
        }
    }

    pub fn clear(&mut self) {
        self.names_by_id.clear();
        self.names.clear();
    }

    /// Number of stacks recorded by id.
    pub fn len(&self) -> usize {
        self.names_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names_by_id.is_empty() && self.names.is_empty()
    }
}
