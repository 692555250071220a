//! Parley LLM - Unified Completion-Service Abstraction
//!
//! One interface over the completion services that back the negotiation
//! agents:
//!
//! ## Providers
//! - OpenAI-compatible (default): any `/chat/completions` endpoint,
//!   including the hosted inference gateway the service ships against
//! - Ollama: local models, no API key
//! - Deterministic: canned fallback when no service is reachable
//!
//! ## Key Design Principles
//!
//! 1. Callers depend on nothing beyond "messages in, one completion out"
//! 2. Completions may be streamed; every provider also works whole
//! 3. All network failure modes surface as typed errors, never panics

pub mod providers;
pub mod router;
pub mod types;

pub use providers::*;
pub use router::*;
pub use types::*;
