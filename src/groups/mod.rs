//! Group registry module.
//!
//! Maps `(provider, name)` pairs to groups, each owning exactly one Merkle tree.

/// A group, its tree and its sync bookkeeping
pub mod group;
/// The process-scoped registry of groups
pub mod registry;
/// Group identifiers, reconciliation outcomes and errors
pub mod types;

pub use registry::GroupRegistry;
pub use types::*;
