//! Interep contract access.
//!
//! The synchronizer writes batched group roots through a [`ChainWriter`] and the reconciler reads
//! `OffchainGroupUpdated` events through a [`ChainReader`]. [`InterepContractClient`] implements
//! both over an alloy provider connected to a node's HTTP endpoint.

/// Contract ABI bindings
pub mod abi;
/// Provider-backed contract client
pub mod client;
/// Scripted chain for tests
#[cfg(test)]
pub mod mock;
/// Writer and reader traits
pub mod ports;
/// Chain records and errors
pub mod types;

pub use client::InterepContractClient;
pub use ports::{ChainReader, ChainWriter};
pub use types::*;
