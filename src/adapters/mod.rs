//! Infrastructure adapters. Implement outbound ports.
//!
//! SQLite, the code log file, the clock, terminal UI. Map errors to DomainError.

pub mod clock;
pub mod persistence;
pub mod ui;
