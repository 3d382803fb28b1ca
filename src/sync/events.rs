//! Event system for group synchronization.
//!
//! The synchronizer and the reconciler emit `SyncEvent`s for every batch transition and every
//! reconciled group. Registered handlers observe them independently of the sync logic; the
//! built-in `LoggingEventHandler` turns them into structured log lines.

use crate::chain::{FailureReason, GroupUpdate};
use crate::groups::{GroupKey, ReconcileStatus};

use alloy_primitives::B256;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Events that occur during group synchronization
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A batch transaction was broadcast
    BatchSubmitted {
        tx_hash: B256,
        updates: Vec<GroupUpdate>,
    },
    /// A batch reached the configured confirmation depth
    BatchConfirmed {
        tx_hash: B256,
        block_number: u64,
        cleared: usize,
        still_dirty: usize,
    },
    /// A batch was rejected, reverted or timed out
    BatchFailed { reason: FailureReason, groups: usize },
    /// A group was compared against its on-chain record
    GroupReconciled {
        group: GroupKey,
        status: ReconcileStatus,
    },
}

/// Trait for handling sync events.
#[async_trait::async_trait]
pub trait SyncEventHandler: Send + Sync {
    /// Handle a sync event.
    async fn handle(&mut self, event: &SyncEvent) -> Result<(), String>;

    /// Get the name of this handler for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Event dispatcher that manages multiple event handlers.
///
/// Handlers run in registration order. The dispatcher is shared between tasks, so handlers sit
/// behind an async mutex.
pub struct EventDispatcher {
    handlers: Mutex<Vec<Box<dyn SyncEventHandler>>>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    /// Create a new, empty event dispatcher.
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    pub async fn register_handler(&self, handler: Box<dyn SyncEventHandler>) {
        self.handlers.lock().await.push(handler);
    }

    /// Dispatch an event to all registered handlers.
    ///
    /// Errors from handlers are logged, but do not stop other handlers from running.
    pub async fn dispatch(&self, event: &SyncEvent) {
        let mut handlers = self.handlers.lock().await;
        for handler in handlers.iter_mut() {
            if let Err(e) = handler.handle(event).await {
                error!("Handler {} failed to process event: {}", handler.name(), e);
            }
        }
    }
}

/// Logs every sync event.
pub struct LoggingEventHandler;

#[async_trait::async_trait]
impl SyncEventHandler for LoggingEventHandler {
    async fn handle(&mut self, event: &SyncEvent) -> Result<(), String> {
        match event {
            SyncEvent::BatchSubmitted { tx_hash, updates } => {
                info!("Batch {} submitted with {} groups", tx_hash, updates.len());
            }
            SyncEvent::BatchConfirmed {
                tx_hash,
                block_number,
                cleared,
                still_dirty,
            } => {
                info!(
                    "Batch {} confirmed in block {}: {} groups clean, {} still dirty",
                    tx_hash, block_number, cleared, still_dirty
                );
            }
            SyncEvent::BatchFailed { reason, groups } => {
                warn!("Batch of {} groups failed: {}", groups, reason);
            }
            SyncEvent::GroupReconciled { group, status } => match status {
                ReconcileStatus::Mismatch { .. } => {
                    error!("Group {} reconciled: {:?}", group, status)
                }
                _ => info!("Group {} reconciled: {:?}", group, status),
            },
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "logging"
    }
}
