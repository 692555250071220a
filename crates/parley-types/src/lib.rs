//! Parley Types - Canonical domain types for automated information trading
//!
//! This crate contains the foundational types for Parley with zero
//! dependencies on other parley crates:
//!
//! - Instance lifecycle types (status, create/commit inputs, timestamps)
//! - Transcript turn types
//! - Negotiation outcome and decision types
//! - Progress events emitted during a run
//! - Read views with the confidentiality boundary enforced at construction
//!
//! # Confidentiality Invariant
//!
//! `seller_info` and `seller_proof` are present on an instance only while a
//! negotiation can still end in acceptance, or after it has. Every other
//! terminal path redacts them, and no read view ever exposes them to anyone
//! but the buyer of an accepted instance.

pub mod event;
pub mod instance;
pub mod outcome;
pub mod turn;
pub mod view;

pub use event::*;
pub use instance::*;
pub use outcome::*;
pub use turn::*;
pub use view::*;
