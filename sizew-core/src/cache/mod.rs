mod entry;
mod store;

pub use entry::{
    CACHE_MAGIC, CACHE_VERSION, CHECK_RATE_DECAY, CHECK_RATE_EPSILON, CHECK_RATE_GROWTH,
    CacheEntry, DEFAULT_CHECK_RATE, LWT_TOLERANCE_TICKS, MAX_CHECK_RATE, MIN_CHECK_RATE,
};
pub use store::{CacheStore, DirKey};

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, SizewError};

/// Default cache file location: `<local-app-data>/sizew/cache.bin`, falling
/// back to a `cache.bin` next to the executable when that directory cannot
/// be created.
pub fn default_cache_path() -> Option<PathBuf> {
    if let Some(base) = dirs::data_local_dir() {
        let dir = base.join("sizew");
        if fs::create_dir_all(&dir).is_ok() {
            return Some(dir.join("cache.bin"));
        }
        log::debug!("cannot create cache directory {}", dir.display());
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|d| d.join("cache.bin")))
}

/// Load the store from `path`, absorbing every failure.
///
/// A missing, truncated, or wrong-magic/wrong-version file yields an empty
/// store; no migration is attempted. Every loaded entry starts with
/// `visited = false`.
pub fn load_store(path: &Path) -> CacheStore {
    if !path.exists() {
        return CacheStore::new();
    }
    match read_store(path) {
        Ok(store) => store,
        Err(e) => {
            log::warn!("discarding cache file {}: {}", path.display(), e);
            CacheStore::new()
        }
    }
}

fn read_store(path: &Path) -> Result<CacheStore> {
    let data = fs::read(path)?;
    let mut reader = Reader::new(&data);

    let magic = reader.read_i32("magic")? as u32;
    if magic != CACHE_MAGIC {
        return Err(SizewError::Cache(format!("bad magic 0x{magic:08X}")));
    }
    let version = reader.read_i32("version")?;
    if version != CACHE_VERSION {
        return Err(SizewError::Cache(format!(
            "unsupported version {version}, expected {CACHE_VERSION}"
        )));
    }
    let count = reader.read_i32("count")?;
    if count < 0 {
        return Err(SizewError::Cache(format!("negative record count {count}")));
    }

    let mut store = CacheStore::new();
    for _ in 0..count {
        let path_len = reader.read_i32("path length")?;
        if path_len <= 0 {
            return Err(SizewError::Cache(format!("bad path length {path_len}")));
        }
        let path_bytes = reader.take(path_len as usize, "path bytes")?;
        let text = std::str::from_utf8(path_bytes)
            .map_err(|e| SizewError::Cache(format!("path is not UTF-8: {e}")))?;

        let own_size_bytes = reader.read_i64("own size")?.max(0) as u64;
        let total_size_bytes = reader.read_i64("total size")?.max(0) as u64;
        let directory_lwt_ticks = reader.read_i64("directory lwt")?;
        let updated_ticks = reader.read_i64("updated")?;
        let check_rate = CacheEntry::clamp_check_rate(reader.read_f64("check rate")?);

        let Some(key) = DirKey::new(Path::new(text)) else {
            log::debug!("skipping non-absolute cached path {text:?}");
            continue;
        };
        store.insert(
            key,
            CacheEntry {
                own_size_bytes,
                total_size_bytes,
                directory_lwt_ticks,
                updated_ticks,
                check_rate,
                visited: false,
            },
        );
    }
    Ok(store)
}

/// Write the store to `path`, pruning stale entries first.
///
/// An entry is pruned iff the scan was recursive, its key lies at or beneath
/// the scan root (component-wise), and it was not visited during the run.
/// Non-recursive scans did not enumerate children and keep everything.
///
/// The file is staged through a sibling temp file and renamed into place.
pub fn save_store(path: &Path, store: &CacheStore) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let survivors: Vec<(&DirKey, &CacheEntry)> = store
        .iter()
        .filter(|(key, entry)| !should_prune(store, key, entry))
        .collect();

    let mut data = Vec::new();
    data.extend_from_slice(&CACHE_MAGIC.to_le_bytes());
    data.extend_from_slice(&CACHE_VERSION.to_le_bytes());
    data.extend_from_slice(&(survivors.len() as i32).to_le_bytes());

    for (key, entry) in survivors {
        let path_bytes = key.as_str().as_bytes();
        data.extend_from_slice(&(path_bytes.len() as i32).to_le_bytes());
        data.extend_from_slice(path_bytes);
        data.extend_from_slice(&(entry.own_size_bytes as i64).to_le_bytes());
        data.extend_from_slice(&(entry.total_size_bytes as i64).to_le_bytes());
        data.extend_from_slice(&entry.directory_lwt_ticks.to_le_bytes());
        data.extend_from_slice(&entry.updated_ticks.to_le_bytes());
        data.extend_from_slice(&entry.check_rate.to_le_bytes());
    }

    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)?;
    file.write_all(&data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;
    Ok(())
}

fn should_prune(store: &CacheStore, key: &DirKey, entry: &CacheEntry) -> bool {
    if !store.scan_was_recursive() || entry.visited {
        return false;
    }
    match store.current_root() {
        Some(root) => key.is_same_or_under(root),
        None => false,
    }
}

/// Bounds-checked little-endian cursor over the raw cache bytes.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| SizewError::Cache(format!("truncated reading {what}")))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_i32(&mut self, what: &str) -> Result<i32> {
        let bytes = self.take(4, what)?;
        Ok(i32::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_i64(&mut self, what: &str) -> Result<i64> {
        let bytes = self.take(8, what)?;
        Ok(i64::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_f64(&mut self, what: &str) -> Result<f64> {
        let bytes = self.take(8, what)?;
        Ok(f64::from_le_bytes(bytes.try_into().unwrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(s: &str) -> DirKey {
        DirKey::new(Path::new(s)).unwrap()
    }

    fn entry(own: u64, total: u64, visited: bool) -> CacheEntry {
        CacheEntry {
            own_size_bytes: own,
            total_size_bytes: total,
            directory_lwt_ticks: 638_000_000_000_000_000,
            updated_ticks: 638_000_000_100_000_000,
            check_rate: 0.3,
            visited,
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let temp = TempDir::new().unwrap();
        let store = load_store(&temp.path().join("absent.bin"));
        assert!(store.is_empty());
    }

    #[test]
    fn save_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let cache_path = temp.path().join("cache.bin");

        let mut store = CacheStore::new();
        store.insert(key("/t/a"), entry(150, 350, true));
        let mut deep = entry(200, 200, true);
        deep.check_rate = 0.01;
        store.insert(key("/t/a/b"), deep);

        save_store(&cache_path, &store).unwrap();
        let loaded = load_store(&cache_path);

        assert_eq!(loaded.len(), 2);
        let a = loaded.get(&key("/t/a")).unwrap();
        assert_eq!(a.own_size_bytes, 150);
        assert_eq!(a.total_size_bytes, 350);
        assert_eq!(a.directory_lwt_ticks, 638_000_000_000_000_000);
        assert_eq!(a.updated_ticks, 638_000_000_100_000_000);
        assert_eq!(a.check_rate, 0.3);
        assert!(!a.visited);

        let b = loaded.get(&key("/t/a/b")).unwrap();
        assert_eq!(b.check_rate, 0.01);
        assert!(!b.visited);
    }

    #[test]
    fn header_layout_matches_the_format() {
        let temp = TempDir::new().unwrap();
        let cache_path = temp.path().join("cache.bin");

        let mut store = CacheStore::new();
        store.insert(key("/x"), entry(1, 1, true));
        save_store(&cache_path, &store).unwrap();

        let raw = fs::read(&cache_path).unwrap();
        assert_eq!(&raw[0..4], b"SCZ1");
        assert_eq!(i32::from_le_bytes(raw[4..8].try_into().unwrap()), 2);
        assert_eq!(i32::from_le_bytes(raw[8..12].try_into().unwrap()), 1);
        assert_eq!(i32::from_le_bytes(raw[12..16].try_into().unwrap()), 2); // "/x"
        assert_eq!(&raw[16..18], b"/x");
    }

    #[test]
    fn bad_magic_loads_empty() {
        let temp = TempDir::new().unwrap();
        let cache_path = temp.path().join("cache.bin");
        let mut raw = Vec::new();
        raw.extend_from_slice(b"NOPE");
        raw.extend_from_slice(&CACHE_VERSION.to_le_bytes());
        raw.extend_from_slice(&0i32.to_le_bytes());
        fs::write(&cache_path, raw).unwrap();

        assert!(load_store(&cache_path).is_empty());
    }

    #[test]
    fn version_mismatch_loads_empty_then_resaves_as_current() {
        let temp = TempDir::new().unwrap();
        let cache_path = temp.path().join("cache.bin");
        let mut raw = Vec::new();
        raw.extend_from_slice(&CACHE_MAGIC.to_le_bytes());
        raw.extend_from_slice(&99i32.to_le_bytes());
        raw.extend_from_slice(&0i32.to_le_bytes());
        fs::write(&cache_path, raw).unwrap();

        let store = load_store(&cache_path);
        assert!(store.is_empty());

        let mut fresh = CacheStore::new();
        fresh.insert(key("/t/a"), entry(150, 350, true));
        save_store(&cache_path, &fresh).unwrap();

        let raw = fs::read(&cache_path).unwrap();
        assert_eq!(i32::from_le_bytes(raw[4..8].try_into().unwrap()), 2);
        assert_eq!(load_store(&cache_path).len(), 1);
    }

    #[test]
    fn truncated_file_loads_empty() {
        let temp = TempDir::new().unwrap();
        let cache_path = temp.path().join("cache.bin");

        let mut store = CacheStore::new();
        store.insert(key("/t/a"), entry(150, 350, true));
        save_store(&cache_path, &store).unwrap();

        let raw = fs::read(&cache_path).unwrap();
        fs::write(&cache_path, &raw[..raw.len() - 5]).unwrap();
        assert!(load_store(&cache_path).is_empty());
    }

    #[test]
    fn empty_file_loads_empty() {
        let temp = TempDir::new().unwrap();
        let cache_path = temp.path().join("cache.bin");
        fs::write(&cache_path, b"").unwrap();
        assert!(load_store(&cache_path).is_empty());
    }

    #[test]
    fn recursive_save_prunes_unvisited_descendants_only() {
        let temp = TempDir::new().unwrap();
        let cache_path = temp.path().join("cache.bin");

        let mut store = CacheStore::new();
        store.begin_scan(key("/t/a"), true);
        store.insert(key("/t/a"), entry(150, 350, true));
        store.insert(key("/t/a/b"), entry(200, 200, false)); // collapsed
        store.insert(key("/t/ab"), entry(7, 7, false)); // sibling, not a descendant
        store.insert(key("/other"), entry(9, 9, false));

        save_store(&cache_path, &store).unwrap();
        let loaded = load_store(&cache_path);

        assert!(loaded.get(&key("/t/a")).is_some());
        assert!(loaded.get(&key("/t/a/b")).is_none());
        assert!(loaded.get(&key("/t/ab")).is_some());
        assert!(loaded.get(&key("/other")).is_some());
    }

    #[test]
    fn non_recursive_save_preserves_unvisited_entries() {
        let temp = TempDir::new().unwrap();
        let cache_path = temp.path().join("cache.bin");

        let mut store = CacheStore::new();
        store.begin_scan(key("/t/a"), false);
        store.insert(key("/t/a"), entry(150, 350, true));
        store.insert(key("/t/a/b"), entry(200, 200, false));

        save_store(&cache_path, &store).unwrap();
        let loaded = load_store(&cache_path);
        assert!(loaded.get(&key("/t/a/b")).is_some());
    }

    #[test]
    fn out_of_range_check_rates_are_clamped_on_load() {
        let temp = TempDir::new().unwrap();
        let cache_path = temp.path().join("cache.bin");

        let mut store = CacheStore::new();
        let mut high = entry(1, 1, true);
        high.check_rate = 9.0;
        store.insert(key("/t/high"), high);
        save_store(&cache_path, &store).unwrap();

        // Overwrite the check_rate field in place with NaN.
        let mut raw = fs::read(&cache_path).unwrap();
        let rate_offset = raw.len() - 8;
        raw[rate_offset..].copy_from_slice(&f64::NAN.to_le_bytes());
        fs::write(&cache_path, raw).unwrap();

        let loaded = load_store(&cache_path);
        let rate = loaded.get(&key("/t/high")).unwrap().check_rate;
        assert_eq!(rate, DEFAULT_CHECK_RATE);
    }

    #[test]
    fn save_is_staged_and_leaves_no_temp_file() {
        let temp = TempDir::new().unwrap();
        let cache_path = temp.path().join("cache.bin");

        let mut store = CacheStore::new();
        store.insert(key("/t"), entry(1, 1, true));
        save_store(&cache_path, &store).unwrap();

        assert!(cache_path.exists());
        assert!(!cache_path.with_extension("tmp").exists());
    }
}
