//! Personal task manager core.
//!
//! Tasks move through a lifecycle state machine, block each other through a
//! cycle-free dependency graph, recur on calendar patterns and are ordered by
//! Elo-style pairwise comparison. Every mutation is an undoable [`commands::Command`].

pub mod commands;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod priority;
pub mod recurrence;
pub mod types;

pub use commands::Command;
pub use engine::Engine;
pub use error::{Error, ErrorCode, Result};
