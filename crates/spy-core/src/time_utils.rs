//! Tick conversion and boot-epoch arithmetic.

use chrono::{DateTime, Local, TimeZone, Utc};

use crate::source::Clock;

/// Milliseconds per time-in-state tick (the kernel reports 1/100 s).
pub const MS_PER_TICK: u64 = 10;

/// Ticks per second.
pub const TICKS_PER_SECOND: u64 = 1000 / MS_PER_TICK;

/// How far two boot-epoch estimates may drift apart and still be treated as
/// the same boot. Wall clock and uptime are sampled at slightly different
/// moments and NTP may step the wall clock, so exact equality never holds.
pub const BOOT_EPOCH_TOLERANCE_MS: i64 = 30_000;

/// Deep-sleep ticks: time since boot minus time awake, converted to ticks.
pub fn deep_sleep_ticks(clock: &dyn Clock, ms_per_tick: u64) -> u64 {
    let asleep_ms = clock
        .elapsed_realtime_ms()
        .saturating_sub(clock.awake_uptime_ms());
    asleep_ms / ms_per_tick.max(1)
}

/// Estimated wall-clock time of the last boot, in ms since the Unix epoch.
pub fn boot_epoch_ms(clock: &dyn Clock) -> i64 {
    let elapsed = i64::try_from(clock.elapsed_realtime_ms()).unwrap_or(i64::MAX);
    clock.wall_clock_ms().saturating_sub(elapsed)
}

/// `true` when two boot-epoch estimates describe the same boot.
pub fn same_boot(saved_ms: i64, current_ms: i64, tolerance_ms: i64) -> bool {
    saved_ms.abs_diff(current_ms) <= tolerance_ms.unsigned_abs()
}

/// Convert a boot epoch to a local timestamp for display.
pub fn boot_time_local(boot_epoch_ms: i64) -> Option<DateTime<Local>> {
    Utc.timestamp_millis_opt(boot_epoch_ms)
        .single()
        .map(|utc| utc.with_timezone(&Local))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClock {
        elapsed: u64,
        awake: u64,
        wall: i64,
    }

    impl Clock for FixedClock {
        fn elapsed_realtime_ms(&self) -> u64 {
            self.elapsed
        }
        fn awake_uptime_ms(&self) -> u64 {
            self.awake
        }
        fn wall_clock_ms(&self) -> i64 {
            self.wall
        }
    }

    #[test]
    fn test_deep_sleep_ticks_divides_by_tick() {
        let clock = FixedClock {
            elapsed: 6000,
            awake: 5000,
            wall: 0,
        };
        assert_eq!(deep_sleep_ticks(&clock, MS_PER_TICK), 100);
    }

    #[test]
    fn test_deep_sleep_ticks_saturates() {
        let clock = FixedClock {
            elapsed: 5000,
            awake: 6000,
            wall: 0,
        };
        assert_eq!(deep_sleep_ticks(&clock, MS_PER_TICK), 0);
    }

    #[test]
    fn test_deep_sleep_ticks_zero_divisor_treated_as_one() {
        let clock = FixedClock {
            elapsed: 20,
            awake: 5,
            wall: 0,
        };
        assert_eq!(deep_sleep_ticks(&clock, 0), 15);
    }

    #[test]
    fn test_boot_epoch_subtracts_elapsed() {
        let clock = FixedClock {
            elapsed: 60_000,
            awake: 0,
            wall: 1_700_000_060_000,
        };
        assert_eq!(boot_epoch_ms(&clock), 1_700_000_000_000);
    }

    #[test]
    fn test_same_boot_tolerance_window() {
        assert!(same_boot(1_000_000, 1_000_000, BOOT_EPOCH_TOLERANCE_MS));
        assert!(same_boot(1_000_000, 1_029_999, BOOT_EPOCH_TOLERANCE_MS));
        assert!(same_boot(1_030_000, 1_000_000, BOOT_EPOCH_TOLERANCE_MS));
        assert!(!same_boot(1_000_000, 1_030_001, BOOT_EPOCH_TOLERANCE_MS));
        assert!(!same_boot(1_100_000, 1_000_000, BOOT_EPOCH_TOLERANCE_MS));
    }

    #[test]
    fn test_ticks_per_second() {
        assert_eq!(TICKS_PER_SECOND, 100);
    }

    #[test]
    fn test_boot_time_local_roundtrips_millis() {
        let local = boot_time_local(1_700_000_000_000).expect("valid timestamp");
        assert_eq!(local.timestamp_millis(), 1_700_000_000_000);
    }
}
