//! Render Option Sets
//!
//! A [`RenderOptions`] set is the key-value collection of compile-time shader
//! options a material or geometry contributes (e.g. `HAS_NORMAL_MAP = 1`,
//! `NUM_DIR_LIGHTS = 2`). Two sets with the same entries always produce the
//! same [`RenderOptions::compute_hash`], independent of insertion order, so the
//! hash doubles as the shader-variant cache key.
//!
//! Keys and values are interned [`Symbol`]s; entries are kept sorted by key
//! *text* so the canonical form is stable across processes.
//!
//! ```rust,ignore
//! let mut options = RenderOptions::new();
//! options.set_flag("HAS_MAP");
//! options.set_count("NUM_DIR_LIGHTS", 2);
//! let hash = options.compute_hash();
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;

use xxhash_rust::xxh3::Xxh3;

use crate::utils::interner::{self, Symbol};

/// Ordered collection of shader compile options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RenderOptions {
    entries: Vec<(Symbol, Symbol)>,
}

impl RenderOptions {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    fn position(&self, key: &str) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|(k, _)| interner::resolve(*k).cmp(key))
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn set(&mut self, key: &str, value: &str) {
        let value = interner::intern(value);
        match self.position(key) {
            Ok(idx) => self.entries[idx].1 = value,
            Err(idx) => self.entries.insert(idx, (interner::intern(key), value)),
        }
    }

    /// Sets a boolean option (`key = 1`).
    #[inline]
    pub fn set_flag(&mut self, key: &str) {
        self.set(key, "1");
    }

    /// Sets a numeric option such as a light count.
    pub fn set_count(&mut self, key: &str, count: usize) {
        self.set(key, &count.to_string());
    }

    /// Removes `key`. Returns `true` if it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.position(key) {
            Ok(idx) => {
                self.entries.remove(idx);
                true
            }
            Err(_) => false,
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_ok()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&'static str> {
        self.position(key)
            .ok()
            .map(|idx| interner::resolve(self.entries[idx].1))
    }

    #[inline]
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in canonical (key-sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.entries
            .iter()
            .map(|&(k, v)| (interner::resolve(k), interner::resolve(v)))
    }

    /// Merges `other` into `self`. Entries from `other` win on conflicts.
    pub fn merge(&mut self, other: &RenderOptions) {
        for (key, value) in other.iter() {
            self.set(key, value);
        }
    }

    #[must_use]
    pub fn merged_with(&self, other: &RenderOptions) -> Self {
        let mut out = self.clone();
        out.merge(other);
        out
    }

    /// Canonical `KEY=VALUE;` form in key order.
    #[must_use]
    pub fn canonical(&self) -> String {
        let mut out = String::with_capacity(self.entries.len() * 24);
        for (key, value) in self.iter() {
            let _ = write!(out, "{key}={value};");
        }
        out
    }

    /// Stable 64-bit digest of the canonical `KEY=VALUE;` form.
    #[must_use]
    pub fn compute_hash(&self) -> u64 {
        let mut hasher = Xxh3::new();
        for (key, value) in self.iter() {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b";");
        }
        hasher.digest()
    }

    /// Renders the set as GLSL `#define` lines.
    #[must_use]
    pub fn to_define_block(&self) -> String {
        let mut out = String::with_capacity(self.entries.len() * 24);
        for (key, value) in self.iter() {
            let _ = writeln!(out, "#define {key} {value}");
        }
        out
    }

    /// Builds the template context; numeric values become integers so
    /// templates can compare them (`NUM_DIR_LIGHTS > 0`).
    #[must_use]
    pub fn to_template_context(&self) -> BTreeMap<String, minijinja::Value> {
        self.iter()
            .map(|(key, value)| {
                let value = value
                    .parse::<i64>()
                    .map_or_else(|_| minijinja::Value::from(value), minijinja::Value::from);
                (key.to_owned(), value)
            })
            .collect()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for RenderOptions {
    fn from_iter<T: IntoIterator<Item = (&'a str, &'a str)>>(iter: T) -> Self {
        let mut options = RenderOptions::new();
        for (key, value) in iter {
            options.set(key, value);
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_does_not_change_hash() {
        let mut a = RenderOptions::new();
        a.set_flag("HAS_MAP");
        a.set_count("NUM_DIR_LIGHTS", 2);

        let mut b = RenderOptions::new();
        b.set_count("NUM_DIR_LIGHTS", 2);
        b.set_flag("HAS_MAP");

        assert_eq!(a, b);
        assert_eq!(a.compute_hash(), b.compute_hash());
    }

    #[test]
    fn value_change_changes_hash() {
        let mut a = RenderOptions::new();
        a.set_count("NUM_POINT_LIGHTS", 1);
        let before = a.compute_hash();
        a.set_count("NUM_POINT_LIGHTS", 2);
        assert_ne!(before, a.compute_hash());
        assert_eq!(a.get("NUM_POINT_LIGHTS"), Some("2"));
    }

    #[test]
    fn merge_prefers_other() {
        let a: RenderOptions = [("A", "1"), ("B", "1")].into_iter().collect();
        let b: RenderOptions = [("B", "2"), ("C", "1")].into_iter().collect();
        let merged = a.merged_with(&b);

        let entries: Vec<_> = merged.iter().collect();
        assert_eq!(entries, vec![("A", "1"), ("B", "2"), ("C", "1")]);
    }

    #[test]
    fn remove_and_contains() {
        let mut options = RenderOptions::new();
        options.set_flag("HAS_UV");
        assert!(options.contains("HAS_UV"));
        assert!(options.remove("HAS_UV"));
        assert!(!options.remove("HAS_UV"));
        assert!(options.is_empty());
    }

    #[test]
    fn define_block_is_sorted() {
        let options: RenderOptions = [("Z_LAST", "1"), ("A_FIRST", "3")].into_iter().collect();
        assert_eq!(options.to_define_block(), "#define A_FIRST 3\n#define Z_LAST 1\n");
    }

    #[test]
    fn template_context_parses_numbers() {
        let options: RenderOptions = [("NUM_DIR_LIGHTS", "2"), ("MODE", "fast")].into_iter().collect();
        let ctx = options.to_template_context();
        assert_eq!(ctx["NUM_DIR_LIGHTS"], minijinja::Value::from(2_i64));
        assert_eq!(ctx["MODE"], minijinja::Value::from("fast"));
    }
}
