//! Group synchronization module.
//!
//! - `synchronizer`: batches dirty group roots into `updateGroups` transactions and tracks each
//!   batch until it is confirmed or failed.
//! - `reconciler`: compares local trees with the latest on-chain events, at startup and on demand.
//! - `events`: sync events and the handlers observing them.
//! - `progress_tracker`: batch counters and summaries.

/// Event system for observing sync
pub mod events;
/// Batch statistics
pub mod progress_tracker;
/// Startup and on-demand reconciliation against contract events
pub mod reconciler;
/// Batch state machine and run loop
pub mod synchronizer;
/// Sync configuration, batch states and errors
pub mod types;

pub use events::{EventDispatcher, LoggingEventHandler};
pub use reconciler::EventReconciler;
pub use synchronizer::BatchSynchronizer;
pub use types::*;
