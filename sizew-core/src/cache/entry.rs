use crate::ticks;

/// Current cache format version - increment when format changes
pub const CACHE_VERSION: i32 = 2;

/// Magic identifying a sizew cache file ("SCZ1" on disk, little-endian).
pub const CACHE_MAGIC: u32 = 0x315A_4353;

/// Lower bound on the per-directory re-scan probability.
pub const MIN_CHECK_RATE: f64 = 0.01;

/// Upper bound; at 1.0 the stability test never passes.
pub const MAX_CHECK_RATE: f64 = 1.0;

/// Check rate assigned when no usable prior value exists.
pub const DEFAULT_CHECK_RATE: f64 = 0.2;

/// Multiplier applied when a change was observed at a directory.
pub const CHECK_RATE_GROWTH: f64 = 1.5;

/// Multiplier applied when a directory was recomputed and nothing changed.
pub const CHECK_RATE_DECAY: f64 = 0.2;

/// Check-rate deltas at or below this do not mark the store dirty.
pub const CHECK_RATE_EPSILON: f64 = 1e-6;

/// Last-write-time slack: differences within 5 s count as "no change",
/// absorbing clock skew and filesystem timestamp quantization.
pub const LWT_TOLERANCE_TICKS: i64 = 5 * ticks::TICKS_PER_SECOND;

/// Cached measurement for one directory.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Sum of lengths of regular files directly in the directory.
    pub own_size_bytes: u64,
    /// Own size plus every transitive subdirectory's own size, as of the
    /// last recursive recompute. Zero means "subtree total unknown".
    pub total_size_bytes: u64,
    /// The directory's last-write time when these values were computed,
    /// in ticks; [`ticks::TICKS_NONE`] when the filesystem gave none.
    pub directory_lwt_ticks: i64,
    /// Wall-clock ticks when this entry was last written.
    pub updated_ticks: i64,
    /// Probability the engine re-scans this directory on the next visit.
    pub check_rate: f64,
    /// Set when the current invocation reaches this entry. Not serialized;
    /// recursive saves prune unvisited entries under the scan root.
    pub visited: bool,
}

impl CacheEntry {
    /// Clamp a stored or adapted rate into the legal band. Non-finite
    /// values (a corrupt or hand-edited cache file) fall back to the default.
    pub fn clamp_check_rate(rate: f64) -> f64 {
        if !rate.is_finite() {
            return DEFAULT_CHECK_RATE;
        }
        rate.clamp(MIN_CHECK_RATE, MAX_CHECK_RATE)
    }

    /// True when the stored last-write time is the "unknown" sentinel.
    pub fn lwt_unknown(&self) -> bool {
        self.directory_lwt_ticks == ticks::TICKS_NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes_spell_scz1_on_disk() {
        assert_eq!(&CACHE_MAGIC.to_le_bytes(), b"SCZ1");
    }

    #[test]
    fn check_rate_clamping() {
        assert_eq!(CacheEntry::clamp_check_rate(0.5), 0.5);
        assert_eq!(CacheEntry::clamp_check_rate(0.0), MIN_CHECK_RATE);
        assert_eq!(CacheEntry::clamp_check_rate(-3.0), MIN_CHECK_RATE);
        assert_eq!(CacheEntry::clamp_check_rate(7.0), MAX_CHECK_RATE);
        assert_eq!(CacheEntry::clamp_check_rate(f64::NAN), DEFAULT_CHECK_RATE);
        assert_eq!(
            CacheEntry::clamp_check_rate(f64::INFINITY),
            DEFAULT_CHECK_RATE
        );
    }

    #[test]
    fn lwt_tolerance_is_five_seconds() {
        assert_eq!(LWT_TOLERANCE_TICKS, 50_000_000);
    }
}
