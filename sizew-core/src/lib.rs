pub mod cache;
pub mod engine;
pub mod error;
pub mod probe;
pub mod ticks;

pub use cache::{CacheEntry, CacheStore, DirKey, default_cache_path, load_store, save_store};
pub use engine::{Engine, MeasureOptions, ThreadUnitRng, UnitRng};
pub use error::{Result, SizewError};

use std::path::Path;

/// Total bytes beneath `path`, served from the persistent cache where the
/// staleness checks allow it.
///
/// Side effects: may read and rewrite the cache file at
/// [`default_cache_path`]. Filesystem enumeration errors are absorbed and
/// contribute zero; cache I/O errors are logged and never fail the call.
pub fn measure_directory(
    path: impl AsRef<Path>,
    recursive: bool,
    bypass_cache: bool,
    recalculate: bool,
) -> u64 {
    let opts = MeasureOptions {
        recursive,
        bypass_cache,
        recalculate,
    };
    match default_cache_path() {
        Some(cache_file) => measure_with_cache_file(&cache_file, path.as_ref(), opts),
        None => {
            log::warn!("no usable cache location, measuring without persistence");
            Engine::new(CacheStore::new()).measure(path.as_ref(), opts)
        }
    }
}

/// [`measure_directory`] against an explicit cache file.
pub fn measure_with_cache_file(cache_file: &Path, path: &Path, opts: MeasureOptions) -> u64 {
    let store = load_store(cache_file);
    let mut engine = Engine::new(store);
    let total = engine.measure(path, opts);

    let store = engine.into_store();
    if store.is_dirty()
        && let Err(e) = save_store(cache_file, &store)
    {
        log::warn!("failed to save cache {}: {}", cache_file.display(), e);
    }
    total
}
