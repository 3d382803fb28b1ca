//! Batch synchronizer.
//!
//! Each cycle snapshots the roots of dirty groups, submits them in one `updateGroups` transaction
//! and walks the batch through `Collecting -> Submitted -> Confirmed | Failed`. Dirty flags are
//! only cleared on confirmation, and only for groups whose root did not move in the meantime.
//! Failed batches are retried by a later cycle with a fresh snapshot.

use crate::chain::{ChainError, ChainWriter, Confirmation, FailureReason, GroupUpdate};
use crate::groups::GroupRegistry;
use crate::sync::events::{EventDispatcher, SyncEvent};
use crate::sync::progress_tracker::{SyncProgressTracker, SyncStats};
use crate::sync::types::{BatchOutcome, BatchState, SyncConfig, SyncError};

use backoff::backoff::Backoff;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, watch};
use tracing::{debug, error, info, warn};

/// Drives dirty group roots on-chain. It is the only holder of the chain writer.
pub struct BatchSynchronizer {
	registry: Arc<GroupRegistry>,
	writer: Arc<dyn ChainWriter>,
	config: SyncConfig,
	/// Held for the whole lifetime of a batch.
	in_flight: Mutex<()>,
	trigger: Notify,
	dispatcher: Arc<EventDispatcher>,
	progress: Mutex<SyncProgressTracker>,
}

impl BatchSynchronizer {
	pub fn new(
		registry: Arc<GroupRegistry>,
		writer: Arc<dyn ChainWriter>,
		config: SyncConfig,
	) -> Self {
		Self::with_dispatcher(registry, writer, config, Arc::new(EventDispatcher::new()))
	}

	pub fn with_dispatcher(
		registry: Arc<GroupRegistry>,
		writer: Arc<dyn ChainWriter>,
		config: SyncConfig,
		dispatcher: Arc<EventDispatcher>,
	) -> Self {
		Self {
			registry,
			writer,
			config,
			in_flight: Mutex::new(()),
			trigger: Notify::new(),
			dispatcher,
			progress: Mutex::new(SyncProgressTracker::new()),
		}
	}

	/// Ask the run loop for a cycle now instead of at the next interval.
	pub fn trigger(&self) {
		self.trigger.notify_one();
	}

	pub async fn stats(&self) -> SyncStats {
		self.progress.lock().await.get_stats()
	}

	/// Run one batch cycle.
	///
	/// Returns `Skipped` without touching anything when another batch is still in flight.
	pub async fn sync_once(&self) -> Result<BatchOutcome, SyncError> {
		let Ok(_in_flight) = self.in_flight.try_lock() else {
			debug!("A batch is already in flight, skipping cycle");
			let outcome = BatchOutcome::Skipped;
			self.progress.lock().await.record_outcome(&outcome);
			return Ok(outcome);
		};

		let result = self.run_batch().await;

		let mut progress = self.progress.lock().await;
		match &result {
			Ok(outcome) => progress.record_outcome(outcome),
			Err(_) => progress.record_failure(),
		}
		result
	}

	async fn run_batch(&self) -> Result<BatchOutcome, SyncError> {
		let mut state = BatchState::Collecting;
		let mut batch_size = 0;

		loop {
			state = match state {
				BatchState::Collecting => {
					let batch = self.collect().await;
					if batch.is_empty() {
						return Ok(BatchOutcome::Idle);
					}
					batch_size = batch.len();
					debug!("Collected {} dirty groups", batch_size);

					match self.writer.submit_batch(&batch).await {
						Ok(tx) => {
							self.dispatcher
								.dispatch(&SyncEvent::BatchSubmitted {
									tx_hash: tx.hash,
									updates: batch.clone(),
								})
								.await;
							BatchState::Submitted { batch, tx }
						}
						Err(ChainError::Rejected(message)) => BatchState::Failed {
							reason: FailureReason::Rejected(message),
						},
						Err(e) => BatchState::Failed {
							reason: FailureReason::Rejected(e.to_string()),
						},
					}
				}
				BatchState::Submitted { batch, tx } => {
					let wait = self
						.writer
						.await_confirmation(&tx, self.config.confirmations);

					match tokio::time::timeout(self.config.confirmation_timeout, wait).await {
						Ok(Ok(Confirmation::Confirmed { block_number })) => BatchState::Confirmed {
							batch,
							tx,
							block_number,
						},
						Ok(Ok(Confirmation::Failed(reason))) => BatchState::Failed { reason },
						Ok(Err(e)) => BatchState::Failed {
							reason: FailureReason::ConfirmationError(e.to_string()),
						},
						Err(_) => {
							warn!(
								"Transaction {} not confirmed within {:?}, abandoning it",
								tx.hash, self.config.confirmation_timeout
							);
							BatchState::Failed {
								reason: FailureReason::TimedOut(self.config.confirmation_timeout),
							}
						}
					}
				}
				BatchState::Confirmed {
					batch,
					tx,
					block_number,
				} => {
					let cleared = self.apply_confirmation(&batch).await;
					let still_dirty = batch.len() - cleared;

					self.dispatcher
						.dispatch(&SyncEvent::BatchConfirmed {
							tx_hash: tx.hash,
							block_number,
							cleared,
							still_dirty,
						})
						.await;

					return Ok(BatchOutcome::Confirmed {
						tx_hash: tx.hash,
						block_number,
						groups: batch.len(),
						cleared,
						still_dirty,
					});
				}
				BatchState::Failed { reason } => {
					error!("Batch of {} groups failed: {}", batch_size, reason);
					self.dispatcher
						.dispatch(&SyncEvent::BatchFailed {
							reason: reason.clone(),
							groups: batch_size,
						})
						.await;
					return Err(SyncError::BatchFailed(reason));
				}
			};
		}
	}

	/// Snapshot the roots of every dirty, non-halted group.
	async fn collect(&self) -> Vec<GroupUpdate> {
		let mut batch = Vec::new();
		for group in self.registry.list_dirty().await {
			if let Some(update) = group.pending_update().await {
				batch.push(update);
			}
		}
		batch
	}

	/// Mark each submitted root as anchored; returns how many groups became clean.
	async fn apply_confirmation(&self, batch: &[GroupUpdate]) -> usize {
		let mut cleared = 0;
		for update in batch {
			match self.registry.get(&update.provider, &update.name).await {
				Ok(group) => {
					if group.mark_confirmed(update.root).await {
						cleared += 1;
					}
				}
				Err(e) => warn!("Confirmed update for unknown group: {}", e),
			}
		}
		cleared
	}

	/// Run batch cycles until `shutdown` flips to true or its sender is dropped.
	///
	/// A cycle starts every `batch_interval`, or earlier on `trigger()`. After a failed cycle the
	/// next one waits for the backoff delay and ignores triggers. A batch still in flight at
	/// shutdown is abandoned, not cancelled.
	pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
		let mut backoff = self.config.retry_backoff();
		let mut delay = self.config.batch_interval;
		let mut backing_off = false;

		info!(
			"Batch synchronizer started (interval {:?}, {} confirmations)",
			self.config.batch_interval, self.config.confirmations
		);

		loop {
			tokio::select! {
				_ = tokio::time::sleep(delay) => {}
				_ = self.trigger.notified(), if !backing_off => {
					debug!("Batch cycle triggered");
				}
				changed = shutdown.changed() => {
					if changed.is_err() || *shutdown.borrow() {
						break;
					}
					continue;
				}
			}

			let result = tokio::select! {
				result = self.sync_once() => result,
				_ = shutdown.changed() => {
					warn!("Shutting down with a batch in flight, abandoning it");
					break;
				}
			};

			match result {
				Ok(outcome) => {
					if let BatchOutcome::Confirmed { .. } = outcome {
						self.progress.lock().await.log_progress();
					}
					backoff.reset();
					backing_off = false;
					delay = self.config.batch_interval;
				}
				Err(e) => {
					delay = backoff
						.next_backoff()
						.unwrap_or(self.config.retry_max_interval);
					backing_off = true;
					warn!("Batch cycle failed ({}), retrying in {:?}", e, delay);
				}
			}
		}

		info!(
			"Batch synchronizer stopped: {}",
			self.progress.lock().await.get_stats().summary()
		);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::chain::mock::{MockChain, MockOutcome};
	use crate::sync::events::tests::RecordingHandler;
	use alloy_primitives::U256;
	use std::time::Duration;

	struct Fixture {
		registry: Arc<GroupRegistry>,
		chain: Arc<MockChain>,
		sync: Arc<BatchSynchronizer>,
	}

	fn fixture(config: SyncConfig) -> Fixture {
		let registry = Arc::new(GroupRegistry::new(4).unwrap());
		let chain = Arc::new(MockChain::new());
		let sync = Arc::new(BatchSynchronizer::new(
			registry.clone(),
			chain.clone(),
			config,
		));
		Fixture {
			registry,
			chain,
			sync,
		}
	}

	async fn admit(registry: &GroupRegistry, provider: &str, name: &str, leaf: u64) -> U256 {
		let group = registry.get_or_create(provider, name).await.unwrap();
		group.insert(U256::from(leaf), None).await.unwrap().root
	}

	#[tokio::test]
	async fn test_confirmed_batch_clears_groups() {
		let f = fixture(SyncConfig::default());
		let gold = admit(&f.registry, "twitter", "gold", 1).await;
		admit(&f.registry, "github", "silver", 2).await;

		let outcome = f.sync.sync_once().await.unwrap();
		assert!(matches!(
			outcome,
			BatchOutcome::Confirmed {
				groups: 2,
				cleared: 2,
				still_dirty: 0,
				..
			}
		));
		assert!(f.registry.list_dirty().await.is_empty());

		let submissions = f.chain.submissions();
		assert_eq!(submissions.len(), 1);
		assert_eq!(submissions[0].len(), 2);
		assert!(submissions[0].iter().any(|u| u.name == "gold" && u.root == gold));

		assert_eq!(f.sync.sync_once().await.unwrap(), BatchOutcome::Idle);
		assert_eq!(f.chain.submissions().len(), 1);
	}

	#[tokio::test]
	async fn test_configured_confirmation_depth_is_awaited() {
		let f = fixture(SyncConfig {
			confirmations: 12,
			..SyncConfig::default()
		});
		admit(&f.registry, "twitter", "gold", 1).await;

		f.sync.sync_once().await.unwrap();
		assert_eq!(f.chain.confirmations_requested(), vec![12]);
	}

	#[tokio::test]
	async fn test_admission_during_flight_keeps_group_dirty() {
		let f = fixture(SyncConfig::default());
		let submitted = admit(&f.registry, "twitter", "gold", 1).await;
		f.chain.set_gated(true);

		let handle = tokio::spawn({
			let sync = f.sync.clone();
			async move { sync.sync_once().await }
		});
		f.chain.confirmation_started().await;

		let newer = admit(&f.registry, "twitter", "gold", 2).await;
		f.chain.release();

		let outcome = handle.await.unwrap().unwrap();
		assert!(matches!(
			outcome,
			BatchOutcome::Confirmed {
				cleared: 0,
				still_dirty: 1,
				..
			}
		));

		let group = f.registry.get("twitter", "gold").await.unwrap();
		assert!(group.is_dirty().await);
		assert_eq!(group.confirmed_root().await, Some(submitted));

		f.chain.set_gated(false);
		f.sync.sync_once().await.unwrap();
		assert_eq!(f.chain.submissions()[1][0].root, newer);
		assert!(!group.is_dirty().await);
	}

	#[tokio::test]
	async fn test_cycle_during_flight_is_noop() {
		let f = fixture(SyncConfig::default());
		admit(&f.registry, "twitter", "gold", 1).await;
		f.chain.set_gated(true);

		let handle = tokio::spawn({
			let sync = f.sync.clone();
			async move { sync.sync_once().await }
		});
		f.chain.confirmation_started().await;

		assert_eq!(f.sync.sync_once().await.unwrap(), BatchOutcome::Skipped);
		assert_eq!(f.chain.submissions().len(), 1);

		f.chain.release();
		handle.await.unwrap().unwrap();
		assert_eq!(f.sync.stats().await.cycles_skipped, 1);
	}

	#[tokio::test]
	async fn test_reverted_batch_is_retried_with_fresh_snapshot() {
		let f = fixture(SyncConfig::default());
		admit(&f.registry, "twitter", "gold", 1).await;
		admit(&f.registry, "github", "silver", 2).await;
		f.chain.push_outcomes([MockOutcome::Revert]);

		let err = f.sync.sync_once().await.unwrap_err();
		assert!(matches!(
			err,
			SyncError::BatchFailed(FailureReason::Reverted(_))
		));
		assert_eq!(f.registry.list_dirty().await.len(), 2);

		let latest = admit(&f.registry, "twitter", "gold", 3).await;
		f.sync.sync_once().await.unwrap();
		let retry = &f.chain.submissions()[1];
		assert!(retry.iter().any(|u| u.name == "gold" && u.root == latest));
		assert!(f.registry.list_dirty().await.is_empty());
		assert_eq!(f.sync.stats().await.batches_failed, 1);
	}

	#[tokio::test]
	async fn test_rejected_submission_keeps_groups_dirty() {
		let f = fixture(SyncConfig::default());
		admit(&f.registry, "twitter", "gold", 1).await;
		f.chain.push_outcomes([MockOutcome::RejectSubmission]);

		let err = f.sync.sync_once().await.unwrap_err();
		assert!(matches!(
			err,
			SyncError::BatchFailed(FailureReason::Rejected(_))
		));
		assert!(f.chain.submissions().is_empty());
		assert_eq!(f.registry.list_dirty().await.len(), 1);
	}

	#[tokio::test]
	async fn test_confirmation_timeout_fails_batch() {
		let f = fixture(SyncConfig {
			confirmation_timeout: Duration::from_millis(50),
			..SyncConfig::default()
		});
		admit(&f.registry, "twitter", "gold", 1).await;
		f.chain.push_outcomes([MockOutcome::Hang]);

		let err = f.sync.sync_once().await.unwrap_err();
		assert!(matches!(
			err,
			SyncError::BatchFailed(FailureReason::TimedOut(_))
		));
		assert_eq!(f.registry.list_dirty().await.len(), 1);

		// the abandoned wait does not block the next cycle
		assert!(matches!(
			f.sync.sync_once().await.unwrap(),
			BatchOutcome::Confirmed { cleared: 1, .. }
		));
	}

	#[tokio::test]
	async fn test_halted_group_is_excluded() {
		let f = fixture(SyncConfig::default());
		admit(&f.registry, "twitter", "gold", 1).await;
		admit(&f.registry, "github", "silver", 2).await;
		let gold = f.registry.get("twitter", "gold").await.unwrap();
		gold.reconcile(Some(U256::from(999u64))).await;

		f.sync.sync_once().await.unwrap();
		let submitted = &f.chain.submissions()[0];
		assert_eq!(submitted.len(), 1);
		assert_eq!(submitted[0].name, "silver");
		assert!(gold.is_dirty().await);
	}

	#[tokio::test]
	async fn test_events_are_dispatched() {
		let registry = Arc::new(GroupRegistry::new(4).unwrap());
		let chain = Arc::new(MockChain::new());
		let dispatcher = Arc::new(EventDispatcher::new());
		let recorder = RecordingHandler::default();
		dispatcher.register_handler(Box::new(recorder.clone())).await;
		let sync = BatchSynchronizer::with_dispatcher(
			registry.clone(),
			chain.clone(),
			SyncConfig::default(),
			dispatcher,
		);

		admit(&registry, "twitter", "gold", 1).await;
		chain.push_outcomes([MockOutcome::Revert]);
		sync.sync_once().await.unwrap_err();
		sync.sync_once().await.unwrap();

		let events = recorder.events.lock().unwrap();
		assert!(matches!(events[0], SyncEvent::BatchSubmitted { .. }));
		assert!(matches!(events[1], SyncEvent::BatchFailed { groups: 1, .. }));
		assert!(matches!(events[2], SyncEvent::BatchSubmitted { .. }));
		assert!(matches!(
			events[3],
			SyncEvent::BatchConfirmed { cleared: 1, .. }
		));
	}

	#[tokio::test]
	async fn test_run_loop_syncs_on_trigger_and_stops() {
		let f = fixture(SyncConfig {
			batch_interval: Duration::from_secs(3600),
			..SyncConfig::default()
		});
		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		let handle = tokio::spawn(f.sync.clone().run(shutdown_rx));

		admit(&f.registry, "twitter", "gold", 1).await;
		f.sync.trigger();

		let gold = f.registry.get("twitter", "gold").await.unwrap();
		tokio::time::timeout(Duration::from_secs(5), async {
			while gold.is_dirty().await {
				tokio::time::sleep(Duration::from_millis(10)).await;
			}
		})
		.await
		.unwrap();

		shutdown_tx.send(true).unwrap();
		tokio::time::timeout(Duration::from_secs(5), handle)
			.await
			.unwrap()
			.unwrap();
		assert_eq!(f.sync.stats().await.batches_confirmed, 1);
	}
}
