mod rng;

pub use rng::{ThreadUnitRng, UnitRng};

#[cfg(test)]
pub use rng::{FixedUnitRng, SequenceUnitRng};

use std::path::Path;

use crate::cache::{
    CHECK_RATE_DECAY, CHECK_RATE_EPSILON, CHECK_RATE_GROWTH, CacheEntry, CacheStore,
    DEFAULT_CHECK_RATE, DirKey, LWT_TOLERANCE_TICKS, MAX_CHECK_RATE, MIN_CHECK_RATE,
};
use crate::probe;
use crate::ticks;

/// Flags controlling one measurement pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeasureOptions {
    /// Descend into subdirectories. When false only the directory's own
    /// files are measured.
    pub recursive: bool,
    /// Measure from disk without reading or writing the store.
    pub bypass_cache: bool,
    /// Recompute every visited directory, writing fresh values back.
    pub recalculate: bool,
}

/// Recursive measurement core: fuses fresh disk enumeration with cached
/// per-directory totals, re-verifying "stable" directories with a
/// per-directory probability that adapts to observed churn.
///
/// Single-threaded; assumes exclusive ownership of its [`CacheStore`] for
/// the duration of a call.
pub struct Engine<R: UnitRng = ThreadUnitRng> {
    store: CacheStore,
    rng: R,
}

impl Engine {
    pub fn new(store: CacheStore) -> Self {
        Self {
            store,
            rng: ThreadUnitRng,
        }
    }
}

impl<R: UnitRng> Engine<R> {
    /// Build an engine with an injected randomness source.
    pub fn with_rng(store: CacheStore, rng: R) -> Self {
        Self { store, rng }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn into_store(self) -> CacheStore {
        self.store
    }

    /// Total bytes beneath `path`. Invalid input returns 0; enumeration
    /// errors inside the walk are absorbed and undercount.
    pub fn measure(&mut self, path: &Path, opts: MeasureOptions) -> u64 {
        if path.as_os_str().is_empty() {
            log::warn!("refusing to measure an empty path");
            return 0;
        }
        let abs = match std::path::absolute(path) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("cannot resolve {}: {}", path.display(), e);
                return 0;
            }
        };
        let Some(root_key) = DirKey::new(&abs) else {
            log::warn!("cannot normalize {}", abs.display());
            return 0;
        };
        match std::fs::metadata(&abs) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                log::warn!("{} is not a directory", abs.display());
                return 0;
            }
            Err(e) => {
                log::warn!("cannot stat {}: {}", abs.display(), e);
                return 0;
            }
        }

        if !opts.bypass_cache {
            self.store.begin_scan(root_key, opts.recursive);
        }
        self.measure_dir(&abs, opts)
    }

    fn measure_dir(&mut self, path: &Path, opts: MeasureOptions) -> u64 {
        if opts.bypass_cache {
            return self.measure_uncached(path, opts);
        }
        let Some(key) = DirKey::new(path) else {
            return self.measure_uncached(path, opts);
        };
        self.store.mark_visited(&key);
        let prior = self.store.get(&key).cloned();
        let lwt_now = probe::dir_lwt(path).map(ticks::from_system_time);

        let mut force = opts.recalculate;
        if !force
            && let Some(e) = &prior
            && let Some(now_ticks) = lwt_now
            && !e.lwt_unknown()
            && (now_ticks - e.directory_lwt_ticks).abs() > LWT_TOLERANCE_TICKS
        {
            log::debug!("last-write time moved for {key}, recomputing");
            self.store.mark_dirty();
            force = true;
        }

        if !force
            && let Some(e) = &prior
            && self.rng.next_unit() >= CacheEntry::clamp_check_rate(e.check_rate)
        {
            // Stable. A positive cached total answers a recursive query
            // outright; children stay unvisited and a recursive save will
            // collapse them into this entry. Otherwise the cached own size
            // is trusted and the walk continues below it.
            if opts.recursive && e.total_size_bytes > 0 {
                return e.total_size_bytes;
            }
            let mut total = e.own_size_bytes;
            if opts.recursive {
                for child in probe::child_dirs(path) {
                    total = total.saturating_add(self.measure_dir(&child, opts));
                }
            }
            return total;
        }

        let own = probe::own_files_size(path);
        let mut total = own;
        if opts.recursive {
            for child in probe::child_dirs(path) {
                total = total.saturating_add(self.measure_dir(&child, opts));
            }
        }

        let new_total = if opts.recursive {
            total
        } else {
            // Children were not enumerated, so the subtree total is only
            // kept while the own size it was built on still holds.
            match &prior {
                Some(e) if e.own_size_bytes == own => e.total_size_bytes,
                _ => 0,
            }
        };

        let now_ticks = ticks::now();
        let entry = CacheEntry {
            own_size_bytes: own,
            total_size_bytes: new_total,
            directory_lwt_ticks: lwt_now.unwrap_or(now_ticks),
            updated_ticks: now_ticks,
            check_rate: adapt_check_rate(prior.as_ref(), own, new_total),
            visited: true,
        };
        if is_dirtying_change(prior.as_ref(), &entry) {
            self.store.mark_dirty();
        }
        self.store.insert(key, entry);
        total
    }

    fn measure_uncached(&mut self, path: &Path, opts: MeasureOptions) -> u64 {
        let mut total = probe::own_files_size(path);
        if opts.recursive {
            for child in probe::child_dirs(path) {
                total = total.saturating_add(self.measure_uncached(&child, opts));
            }
        }
        total
    }
}

/// Churn earns more frequent checks, quiescence exponentially fewer,
/// bounded on both sides.
fn adapt_check_rate(prior: Option<&CacheEntry>, new_own: u64, new_total: u64) -> f64 {
    let base = prior
        .map(|e| CacheEntry::clamp_check_rate(e.check_rate))
        .unwrap_or(DEFAULT_CHECK_RATE);
    match prior {
        Some(e) if e.own_size_bytes == new_own => {
            if e.total_size_bytes > 0 && e.total_size_bytes != new_total {
                // A child changed even though own files did not.
                (base * CHECK_RATE_GROWTH).min(MAX_CHECK_RATE)
            } else {
                (base * CHECK_RATE_DECAY).max(MIN_CHECK_RATE)
            }
        }
        _ => (base * CHECK_RATE_GROWTH).min(MAX_CHECK_RATE),
    }
}

/// `updated_ticks` alone never dirties the store; it only rides along when
/// a substantive field moved.
fn is_dirtying_change(prior: Option<&CacheEntry>, new: &CacheEntry) -> bool {
    match prior {
        None => true,
        Some(e) => {
            e.own_size_bytes != new.own_size_bytes
                || e.total_size_bytes != new.total_size_bytes
                || e.directory_lwt_ticks != new.directory_lwt_ticks
                || (e.check_rate - new.check_rate).abs() > CHECK_RATE_EPSILON
        }
    }
}
