//! Parley Engine - runs negotiations to completion
//!
//! The engine owns the one genuinely concurrent part of the system: it
//! drives a committed instance through its turn loop against the two agent
//! policies, persists every turn in order, and reports progress as an event
//! stream ending in exactly one terminal event.
//!
//! The engine never caches instance state across turns; every status change
//! goes through the store's guarded conditional transitions, which are the
//! only synchronization between concurrent callers. One instance runs as one
//! sequential task; many instances run independently side by side under the
//! [`RunManager`].

pub mod config;
pub mod engine;
pub mod manager;

pub use config::EngineConfig;
pub use engine::NegotiationEngine;
pub use manager::{terminal_event_for, EngineError, RunManager};
