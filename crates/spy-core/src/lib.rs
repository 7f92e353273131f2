//! Core types and logic for CPU Spy.
//!
//! Holds the frequency-state model, the time-in-state parser, the
//! offset-tracking [`monitor::StateMonitor`], the persisted state file,
//! CLI settings and display formatting. Operating-system access goes through
//! the traits in [`source`].

pub mod error;
pub mod formatting;
pub mod models;
pub mod monitor;
pub mod offsets;
pub mod parser;
pub mod settings;
pub mod source;
pub mod store;
pub mod time_utils;
