//! Repositories over the SQLite store

pub mod instance;
pub mod transcript;
pub mod usage;

pub use instance::InstanceRepo;
pub use transcript::TranscriptRepo;
pub use usage::UsageRepo;
