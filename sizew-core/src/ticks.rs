//! Conversions between `SystemTime` and the cache file's tick unit:
//! 100-nanosecond intervals counted from 0001-01-01T00:00:00 UTC.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Ticks per second (one tick = 100 ns).
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Tick value of 1970-01-01T00:00:00 UTC.
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// Sentinel meaning "no timestamp known" (the minimum representable instant).
pub const TICKS_NONE: i64 = 0;

pub fn from_system_time(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => UNIX_EPOCH_TICKS.saturating_add((d.as_nanos() / 100) as i64),
        Err(e) => UNIX_EPOCH_TICKS.saturating_sub((e.duration().as_nanos() / 100) as i64),
    }
}

pub fn to_system_time(ticks: i64) -> SystemTime {
    let delta = ticks - UNIX_EPOCH_TICKS;
    if delta >= 0 {
        UNIX_EPOCH + Duration::from_nanos(delta as u64 * 100)
    } else {
        UNIX_EPOCH - Duration::from_nanos(delta.unsigned_abs() * 100)
    }
}

/// Current wall clock as ticks.
pub fn now() -> i64 {
    from_system_time(SystemTime::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_epoch_maps_to_epoch_ticks() {
        assert_eq!(from_system_time(UNIX_EPOCH), UNIX_EPOCH_TICKS);
    }

    #[test]
    fn round_trip_preserves_second_granularity() {
        let t = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_eq!(to_system_time(from_system_time(t)), t);
    }

    #[test]
    fn pre_epoch_times_convert() {
        let t = UNIX_EPOCH - Duration::from_secs(3600);
        let ticks = from_system_time(t);
        assert!(ticks < UNIX_EPOCH_TICKS);
        assert_eq!(to_system_time(ticks), t);
    }

    #[test]
    fn one_second_is_ten_million_ticks() {
        let a = from_system_time(UNIX_EPOCH);
        let b = from_system_time(UNIX_EPOCH + Duration::from_secs(1));
        assert_eq!(b - a, TICKS_PER_SECOND);
    }
}
