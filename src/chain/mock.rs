//! Scripted in-memory chain used by tests.

use crate::chain::ports::{ChainReader, ChainWriter};
use crate::chain::types::*;
use crate::groups::GroupKey;

use alloy_primitives::{B256, U256};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;

/// What happens to the next submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOutcome {
    Confirm,
    Revert,
    RejectSubmission,
    /// Never confirms.
    Hang,
}

pub struct MockChain {
    outcomes: Mutex<VecDeque<MockOutcome>>,
    submissions: Mutex<Vec<Vec<GroupUpdate>>>,
    pending: Mutex<HashMap<B256, (Vec<GroupUpdate>, MockOutcome)>>,
    events: Mutex<Vec<OnchainGroupRecord>>,
    confirmations_requested: Mutex<Vec<u64>>,
    next_block: AtomicU64,
    next_tx: AtomicU64,
    gated: AtomicBool,
    confirmation_started: Notify,
    release: Notify,
}

impl MockChain {
    /// A chain confirming every batch unless told otherwise.
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            submissions: Mutex::new(Vec::new()),
            pending: Mutex::new(HashMap::new()),
            events: Mutex::new(Vec::new()),
            confirmations_requested: Mutex::new(Vec::new()),
            next_block: AtomicU64::new(1),
            next_tx: AtomicU64::new(1),
            gated: AtomicBool::new(false),
            confirmation_started: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Queue outcomes for the next batches; once exhausted batches confirm.
    pub fn push_outcomes(&self, outcomes: impl IntoIterator<Item = MockOutcome>) {
        self.outcomes.lock().unwrap().extend(outcomes);
    }

    /// Hold every confirmation until `release` is called.
    pub fn set_gated(&self, gated: bool) {
        self.gated.store(gated, Ordering::SeqCst);
    }

    /// Resolves once a confirmation wait has started.
    pub async fn confirmation_started(&self) {
        self.confirmation_started.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn submissions(&self) -> Vec<Vec<GroupUpdate>> {
        self.submissions.lock().unwrap().clone()
    }

    /// Confirmation depth asked for by each `await_confirmation` call, in call order.
    pub fn confirmations_requested(&self) -> Vec<u64> {
        self.confirmations_requested.lock().unwrap().clone()
    }

    /// Record an event as if another writer had anchored `root`.
    pub fn push_event(&self, provider: &str, name: &str, root: U256, order: BlockOrder) {
        self.events.lock().unwrap().push(OnchainGroupRecord {
            key: GroupKey::new(provider, name).unwrap(),
            root,
            depth: 20,
            order,
        });
    }
}

#[async_trait::async_trait]
impl ChainWriter for MockChain {
    async fn submit_batch(&self, records: &[GroupUpdate]) -> Result<TxHandle, ChainError> {
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(MockOutcome::Confirm);
        if outcome == MockOutcome::RejectSubmission {
            return Err(ChainError::Rejected("nonce too low".to_string()));
        }

        let hash = B256::left_padding_from(&self.next_tx.fetch_add(1, Ordering::SeqCst).to_be_bytes());
        self.submissions.lock().unwrap().push(records.to_vec());
        self.pending
            .lock()
            .unwrap()
            .insert(hash, (records.to_vec(), outcome));
        Ok(TxHandle { hash })
    }

    async fn await_confirmation(
        &self,
        tx: &TxHandle,
        confirmations: u64,
    ) -> Result<Confirmation, ChainError> {
        self.confirmations_requested
            .lock()
            .unwrap()
            .push(confirmations);
        self.confirmation_started.notify_one();
        if self.gated.load(Ordering::SeqCst) {
            self.release.notified().await;
        }

        let Some((records, outcome)) = self.pending.lock().unwrap().remove(&tx.hash) else {
            return Err(ChainError::InvalidResponse(format!(
                "unknown transaction {}",
                tx.hash
            )));
        };

        match outcome {
            MockOutcome::Confirm => {
                let block_number = self.next_block.fetch_add(1, Ordering::SeqCst);
                let mut events = self.events.lock().unwrap();
                for (log_index, record) in records.iter().enumerate() {
                    events.push(OnchainGroupRecord {
                        key: GroupKey::new(&record.provider, &record.name).unwrap(),
                        root: record.root,
                        depth: record.depth,
                        order: BlockOrder::new(block_number, log_index as u64),
                    });
                }
                Ok(Confirmation::Confirmed { block_number })
            }
            MockOutcome::Revert => Ok(Confirmation::Failed(FailureReason::Reverted(tx.hash))),
            MockOutcome::Hang => Ok(futures::future::pending::<Confirmation>().await),
            MockOutcome::RejectSubmission => unreachable!("rejected batches are never pending"),
        }
    }
}

#[async_trait::async_trait]
impl ChainReader for MockChain {
    async fn query_events(&self, event_name: &str) -> Result<Vec<OnchainGroupRecord>, ChainError> {
        if event_name != GROUP_UPDATED_EVENT {
            return Err(ChainError::UnsupportedEvent(event_name.to_string()));
        }
        let mut events = self.events.lock().unwrap().clone();
        events.sort_by_key(|event| event.order);
        Ok(events)
    }
}
