//! Shared types for the amp control daemon: the status/command data model,
//! the debounced power state machine, and configuration.

pub mod config;
pub mod error;
pub mod platform;
pub mod protocol;
pub mod state;
