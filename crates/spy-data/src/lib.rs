//! Operating-system access for CPU Spy.
//!
//! Implements the time-in-state sources (direct file, `su` fallback), CPU
//! table discovery under sysfs, the host clock used for deep-sleep and
//! boot-epoch estimates, and the kernel version lookup.

pub mod clock;
pub mod kernel;
pub mod reader;

pub use spy_core as core;
