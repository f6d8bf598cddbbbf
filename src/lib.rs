//! Library interface for ble-battery.
//!
//! Holds the portable orchestration core: the bounded message channel,
//! the radio task state machine, the debug and indicator sinks, and the
//! interrupt producers.  None of it touches hardware directly, so the
//! whole core runs under host tests.
//!
//! Usage: `cargo test`
//!
//! Note: The embedded binary uses main.rs with #![no_std] and #![no_main]
//! and wires this core to the SoftDevice and board peripherals.

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible to every module.
#[macro_use]
mod fmt;

pub mod battery;
pub mod ble;
pub mod channel;
pub mod config;
pub mod debug;
pub mod error;
pub mod indicator;
pub mod timer;

pub use ble::orchestrator::{RadioOrchestrator, RadioState};
pub use ble::Command;
pub use error::{Error, Fault, StackError};
