//! Host clocks for deep-sleep and boot-epoch estimation.
//!
//! On Linux (and Android) `CLOCK_BOOTTIME` keeps counting while suspended and
//! `CLOCK_MONOTONIC` does not, so their difference is time spent asleep.
//! Other platforms read `CLOCK_MONOTONIC` for both and report no sleep.

use chrono::Utc;
use spy_core::source::Clock;

/// [`Clock`] backed by `clock_gettime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn elapsed_realtime_ms(&self) -> u64 {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            clock_ms(libc::CLOCK_BOOTTIME)
        }
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        {
            clock_ms(libc::CLOCK_MONOTONIC)
        }
    }

    fn awake_uptime_ms(&self) -> u64 {
        clock_ms(libc::CLOCK_MONOTONIC)
    }

    fn wall_clock_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Read `clock` in whole milliseconds; `0` if the clock is unsupported.
fn clock_ms(clock: libc::clockid_t) -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec and `clock` is one of the
    // libc-provided clock ids.
    let rc = unsafe { libc::clock_gettime(clock, &mut ts) };
    if rc != 0 {
        return 0;
    }
    let secs = u64::try_from(ts.tv_sec).unwrap_or(0);
    let nanos = u64::try_from(ts.tv_nsec).unwrap_or(0);
    secs * 1000 + nanos / 1_000_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_not_less_than_awake() {
        let clock = SystemClock::new();
        let awake = clock.awake_uptime_ms();
        let elapsed = clock.elapsed_realtime_ms();
        // Sampled after `awake`, and includes suspend time on Linux.
        assert!(elapsed >= awake);
    }

    #[test]
    fn test_clocks_advance() {
        let clock = SystemClock::new();
        let first = clock.awake_uptime_ms();
        std::thread::sleep(std::time::Duration::from_millis(15));
        assert!(clock.awake_uptime_ms() > first);
    }

    #[test]
    fn test_boot_epoch_is_in_the_past() {
        let clock = SystemClock::new();
        let boot = spy_core::time_utils::boot_epoch_ms(&clock);
        assert!(boot <= clock.wall_clock_ms());
        assert!(boot > 0);
    }
}
