//! Ordered driver collections and their filtering views
//!
//! Order is attempt order. Every view returns a new collection and leaves the
//! source untouched; an empty result is an empty collection, never an error.

use bmcmux_bmc::{Feature, Features};

/// Something a collection can filter: a named, protocol-tagged feature holder
pub trait Entry: Clone {
    fn name(&self) -> &str;
    fn protocol(&self) -> &str;
    fn features(&self) -> &Features;
}

/// An ordered sequence of entries
#[derive(Debug, Clone)]
pub struct Collection<T> {
    entries: Vec<T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Entry> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry at the end of the attempt order
    pub fn push(&mut self, entry: T) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.entries
    }

    /// Look up an entry by name
    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.iter().find(|e| e.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Entry names in order
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name().to_string()).collect()
    }

    fn filtered(&self, keep: impl Fn(&T) -> bool) -> Self {
        self.entries.iter().filter(|e| keep(e)).cloned().collect()
    }

    /// Entries named `name`
    pub fn for_driver(&self, name: &str) -> Self {
        self.filtered(|e| e.name() == name)
    }

    /// Entries speaking `protocol`
    pub fn using(&self, protocol: &str) -> Self {
        self.filtered(|e| e.protocol() == protocol)
    }

    /// Entries advertising every one of `features`
    pub fn supports(&self, features: &[Feature]) -> Self {
        self.filtered(|e| e.features().includes(features))
    }

    /// Move the entry named `name` to the front; the rest keep their order.
    pub fn prefer_driver(&self, name: &str) -> Self {
        let mut front = Vec::new();
        let mut rest = Vec::new();
        for entry in &self.entries {
            if entry.name() == name {
                front.push(entry.clone());
            } else {
                rest.push(entry.clone());
            }
        }
        front.extend(rest);
        Self { entries: front }
    }

    /// Move entries speaking any of `protocols` to the front, grouped in
    /// argument order. Unmatched entries follow in their original order.
    pub fn prefer_protocol(&self, protocols: &[&str]) -> Self {
        let mut taken = vec![false; self.entries.len()];
        let mut ordered = Vec::with_capacity(self.entries.len());

        for protocol in protocols {
            for (i, entry) in self.entries.iter().enumerate() {
                if !taken[i] && entry.protocol() == *protocol {
                    taken[i] = true;
                    ordered.push(entry.clone());
                }
            }
        }
        for (i, entry) in self.entries.iter().enumerate() {
            if !taken[i] {
                ordered.push(entry.clone());
            }
        }

        Self { entries: ordered }
    }

    pub fn into_vec(self) -> Vec<T> {
        self.entries
    }
}

impl<T> FromIterator<T> for Collection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<T> From<Vec<T>> for Collection<T> {
    fn from(entries: Vec<T>) -> Self {
        Self { entries }
    }
}

impl<T> IntoIterator for Collection<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Collection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
