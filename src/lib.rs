//! Dispatch-to-technician matching with per-day capacity accounting and a
//! reversible change log, on SQLite.

pub mod availability;
pub mod cache;
pub mod capacity;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod history;
pub mod matching;
pub mod scheduler;

#[cfg(test)]
mod tests;

pub use config::EngineConfig;
pub use engine::DispatchEngine;
pub use errors::{EngineError, Result};
