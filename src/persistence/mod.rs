//! Durable commitment log.
//!
//! Admitted commitments are appended to a log so that group trees can be rebuilt after a
//! restart. The on-chain anchoring of the rebuilt roots is checked separately by the reconciler.

/// Log repositories (file-based, and in-memory for tests)
pub mod repositories;
/// Restore of the registry from the log
pub mod state_persistence;
/// Log records and errors
pub mod types;

#[cfg(test)]
pub use repositories::InMemoryCommitmentLog;
pub use repositories::CommitmentLogRepository;
pub use state_persistence::StatePersistenceService;
pub use types::*;
