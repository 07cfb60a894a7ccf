//! SPDY header maps and header-block compression.

mod compress;
mod dictionary;

pub use compress::{Compressor, Decompressor, HeaderError};
pub(crate) use dictionary::DICTIONARY;

use std::collections::BTreeMap;

/// Case-insensitive multi-valued header map.
///
/// Keys are normalised to lowercase, as SPDY requires on the wire, and
/// kept in a deterministic order. Pseudo-headers (`:status`, `:path`,
/// ...) are ordinary entries whose names begin with a colon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: BTreeMap<String, Vec<String>>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of header names present.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace all values for a name.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .insert(name.to_ascii_lowercase(), vec![value.into()]);
    }

    /// Append a value for a name, keeping existing ones.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// First value for a name, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// All values for a name.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Remove a name and all its values.
    pub fn del(&mut self, name: &str) {
        self.entries.remove(&name.to_ascii_lowercase());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Bulk update from another map, replacing values per name.
    pub fn merge(&mut self, other: Headers) {
        for (name, values) in other.entries {
            self.entries.insert(name, values);
        }
    }

    /// Move the map's contents out, leaving it empty.
    ///
    /// This is the drain used when pending headers are flushed into an
    /// outbound frame: the block is built from the moved-out map, so no
    /// entry can be sent twice.
    pub fn take(&mut self) -> Headers {
        std::mem::take(self)
    }
}
