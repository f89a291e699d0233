use std::collections::HashMap;
use std::collections::hash_map::Iter;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;

use super::entry::CacheEntry;

/// Normalized directory key: an absolute path with trailing separators
/// stripped. Comparison and hashing are ASCII-case-insensitive so cache
/// files travel between case-insensitive and case-sensitive filesystems;
/// the original casing is preserved for serialization.
#[derive(Debug, Clone, Eq)]
pub struct DirKey(String);

impl DirKey {
    /// Build a key from an absolute path. Returns `None` for relative paths.
    pub fn new(path: &Path) -> Option<Self> {
        if !path.is_absolute() {
            return None;
        }
        let text = path.to_string_lossy();
        Some(Self(strip_trailing_separators(&text).to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Component-wise "equal to or beneath" test against a scan root.
    ///
    /// `/foo/barbaz` is NOT under `/foo/bar`: after the shared prefix the
    /// next character of the candidate must be a separator (or the root must
    /// itself end in one, i.e. be a filesystem root).
    pub fn is_same_or_under(&self, root: &DirKey) -> bool {
        let path = self.0.as_bytes();
        let root = root.0.as_bytes();
        if path.len() < root.len() {
            return false;
        }
        if !path[..root.len()].eq_ignore_ascii_case(root) {
            return false;
        }
        if path.len() == root.len() {
            return true;
        }
        if matches!(root[root.len() - 1], b'/' | b'\\') {
            return true;
        }
        matches!(path[root.len()], b'/' | b'\\')
    }
}

impl PartialEq for DirKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Hash for DirKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.0.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

impl fmt::Display for DirKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip trailing path separators, preserving filesystem roots
/// (`/`, `C:\`) whole.
fn strip_trailing_separators(s: &str) -> &str {
    let bytes = s.as_bytes();
    let mut end = bytes.len();
    while end > 1 && matches!(bytes[end - 1], b'/' | b'\\') {
        if bytes[end - 2] == b':' {
            break;
        }
        end -= 1;
    }
    &s[..end]
}

/// In-memory index from normalized directory key to [`CacheEntry`].
///
/// Not thread-safe; the engine assumes exclusive access for the duration of
/// one invocation.
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: HashMap<DirKey, CacheEntry>,
    current_root: Option<DirKey>,
    recursive_scan: bool,
    dirty: bool,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &DirKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: DirKey, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    /// Flag the entry as reached by the current invocation.
    pub fn mark_visited(&mut self, key: &DirKey) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.visited = true;
        }
    }

    pub fn iter(&self) -> Iter<'_, DirKey, CacheEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record the active scan's root and mode; both are consumed by the
    /// pruning step at save time.
    pub fn begin_scan(&mut self, root: DirKey, recursive: bool) {
        self.current_root = Some(root);
        self.recursive_scan = recursive;
    }

    pub fn current_root(&self) -> Option<&DirKey> {
        self.current_root.as_ref()
    }

    pub fn scan_was_recursive(&self) -> bool {
        self.recursive_scan
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}
