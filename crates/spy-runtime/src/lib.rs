//! Runtime layer for CPU Spy.
//!
//! Opens the monitor with its persisted offsets, runs refreshes off the
//! async executor, and drives the periodic watch loop.

pub mod lifecycle;
pub mod orchestrator;
pub mod worker;

pub use spy_core as core;
pub use spy_data as data;
