//! The compiled-in, read-only file store.
//!
//! Entries are keyed by their canonical virtual path. The set of entries is
//! fixed once [`StaticStoreBuilder::build`] (or [`StaticStore::from_blob`])
//! returns; there is no way to add or remove files afterwards.

use bytes::Bytes;
use indexmap::IndexMap;
use tracing::trace;

use crate::config::{DEFAULT_PREFIX, MAX_PATH_LEN};
use crate::{FsError, Result};

/// Collapses every run of `/` into a single separator and truncates the
/// result to `max_len - 1` bytes, mirroring a fixed, NUL-terminated buffer
/// of `max_len` bytes. Truncation never splits a UTF-8 sequence.
pub fn canonicalize(path: &str, max_len: usize) -> String {
    let limit = max_len.saturating_sub(1);
    let mut out = String::with_capacity(path.len().min(limit));
    let mut prev_slash = false;
    for ch in path.chars() {
        let is_slash = ch == '/';
        if is_slash && prev_slash {
            continue;
        }
        prev_slash = is_slash;
        if out.len() + ch.len_utf8() > limit {
            break;
        }
        out.push(ch);
    }
    out
}

#[derive(Debug, Clone)]
pub struct StaticStore {
    prefix: String,
    max_path_len: usize,
    entries: IndexMap<String, Bytes>,
}

impl StaticStore {
    pub fn builder(prefix: impl Into<String>) -> StaticStoreBuilder {
        StaticStoreBuilder {
            prefix: prefix.into(),
            max_path_len: MAX_PATH_LEN,
            entries: IndexMap::new(),
        }
    }

    /// A store without any files. Every prefixed path is reported missing.
    pub fn empty() -> Self {
        Self::builder(DEFAULT_PREFIX).build()
    }

    /// Builds a store over one contiguous data blob, as emitted by
    /// `builtin-pack`. Each index row is `(virtual path, start, end)`.
    pub fn from_blob(
        prefix: impl Into<String>,
        blob: &'static [u8],
        index: &[(&str, usize, usize)],
    ) -> Result<Self> {
        let data = Bytes::from_static(blob);
        let mut builder = Self::builder(prefix);
        for &(path, start, end) in index {
            if start > end || end > data.len() {
                return Err(FsError::InvalidInput);
            }
            let canonical = canonicalize(path, builder.max_path_len);
            builder.entries.insert(canonical, data.slice(start..end));
        }
        Ok(builder.build())
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether `path` is in the builtin namespace.
    #[inline]
    pub fn has_prefix(&self, path: &str) -> bool {
        path.starts_with(self.prefix.as_str())
    }

    /// Finds the entry for `path`.
    ///
    /// Paths without the prefix are rejected before any canonicalisation.
    pub fn lookup(&self, path: &str) -> Option<&Bytes> {
        if !self.has_prefix(path) {
            return None;
        }
        let canonical = canonicalize(path, self.max_path_len);
        let found = self.entries.get(canonical.as_str());
        trace!(path, %canonical, found = found.is_some(), "builtin lookup");
        found
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Bytes)> + '_ {
        self.entries.iter().map(|(path, data)| (path.as_str(), data))
    }
}

#[derive(Debug)]
pub struct StaticStoreBuilder {
    prefix: String,
    max_path_len: usize,
    entries: IndexMap<String, Bytes>,
}

impl StaticStoreBuilder {
    pub fn max_path_len(mut self, max_path_len: usize) -> Self {
        self.max_path_len = max_path_len;
        self
    }

    /// Adds a file at `prefix/relative`. A later file with the same
    /// canonical path replaces an earlier one.
    pub fn file(mut self, relative: &str, data: impl Into<Bytes>) -> Self {
        let joined = join_virtual(&self.prefix, relative);
        let canonical = canonicalize(&joined, self.max_path_len);
        self.entries.insert(canonical, data.into());
        self
    }

    pub fn build(self) -> StaticStore {
        StaticStore {
            prefix: self.prefix,
            max_path_len: self.max_path_len,
            entries: self.entries,
        }
    }
}

/// Virtual path of `relative` under `prefix`, before canonicalisation.
pub fn join_virtual(prefix: &str, relative: &str) -> String {
    let relative = relative.trim_start_matches("./");
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{prefix}/{relative}")
    }
}
