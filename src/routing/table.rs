//! Prefix-indexed routing table.
//!
//! # Responsibilities
//! - Map path-like keys to backend ports
//! - Exact lookup and longest-prefix lookup
//!
//! # Design Decisions
//! - Prefix matches stop on path-segment boundaries: `/a/b` matches
//!   `/a/b` and `/a/b/c` but not `/a/bc`
//! - Lookup probes one candidate per segment boundary of the query, so cost
//!   follows the depth of the request path, not the number of keys
//! - No locking here; the registry serializes access

use std::collections::BTreeMap;

/// Path-to-port routing table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    entries: BTreeMap<String, u16>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `key` with `port`, replacing any previous port.
    pub fn insert(&mut self, key: impl Into<String>, port: u16) {
        self.entries.insert(key.into(), port);
    }

    /// Remove `key`. Returns the port it mapped to, if any.
    pub fn remove(&mut self, key: &str) -> Option<u16> {
        self.entries.remove(key)
    }

    /// Exact match only.
    pub fn get(&self, key: &str) -> Option<u16> {
        self.entries.get(key).copied()
    }

    /// Find the longest stored key that prefixes `path` on a segment boundary.
    ///
    /// Returns the matched key (a slice of `path`) and its port.
    pub fn longest_prefix<'a>(&self, path: &'a str) -> Option<(&'a str, u16)> {
        if let Some(port) = self.get(path) {
            return Some((path, port));
        }

        let bytes = path.as_bytes();
        for i in (0..bytes.len()).rev() {
            if bytes[i] != b'/' {
                continue;
            }
            // A key ending in '/' covers everything below it.
            let with_slash = &path[..=i];
            if let Some(port) = self.get(with_slash) {
                return Some((with_slash, port));
            }
            let segment = &path[..i];
            if let Some(port) = self.get(segment) {
                return Some((segment, port));
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
