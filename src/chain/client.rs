//!
//! Provider-backed client for the Interep contract.
//!
//! This module provides an async client that submits batched group roots through the contract's
//! `updateGroups` call and reads `OffchainGroupUpdated` events back in fixed block windows.
//! The provider carries no wallet, so transactions go out through `eth_sendTransaction` and the
//! node signs them with the unlocked sender account. Confirmation tracking polls receipts and
//! the chain head.

use super::abi::{IInterep, decode_group_updated, offchain_groups};
use super::ports::{ChainReader, ChainWriter};
use super::types::*;

use alloy::primitives::{Address, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Interep contract client
pub struct InterepContractClient {
	/// Type-erased HTTP provider for the node.
	provider: DynProvider,
	/// Address of the deployed Interep contract.
	contract: Address,
	/// Node-managed account sending the batch transactions.
	sender: Address,
	/// Block the contract was deployed in; event scans start here.
	deployment_block: u64,
	/// Number of blocks covered by one `eth_getLogs` request.
	log_window: u64,
	/// Delay between receipt and head polls.
	poll_interval: Duration,
}

impl InterepContractClient {
	/// Create a new contract client.
	///
	/// # Arguments
	/// * `rpc_url` - The HTTP JSON-RPC endpoint of the node.
	/// * `contract` - Address of the Interep contract.
	/// * `sender` - Account unlocked on the node that pays for batch transactions.
	/// * `deployment_block` - First block scanned for events.
	/// * `log_window` - Blocks per event query.
	/// * `poll_interval` - Delay between confirmation polls.
	pub fn new(
		rpc_url: &str,
		contract: Address,
		sender: Address,
		deployment_block: u64,
		log_window: u64,
		poll_interval: Duration,
	) -> Result<Self, ChainError> {
		let provider = DynProvider::new(
			ProviderBuilder::new().connect_http(
				rpc_url
					.parse()
					.map_err(|e| ChainError::RpcError(format!("invalid RPC URL '{}': {}", rpc_url, e)))?,
			),
		);

		Ok(Self {
			provider,
			contract,
			sender,
			deployment_block,
			log_window,
			poll_interval,
		})
	}

	/// Block number and success flag of a mined transaction, or `None` while it is pending.
	async fn receipt(&self, hash: B256) -> Result<Option<(u64, bool)>, ChainError> {
		let receipt = self
			.provider
			.get_transaction_receipt(hash)
			.await
			.map_err(|e| ChainError::RpcError(format!("eth_getTransactionReceipt failed: {}", e)))?;

		Ok(receipt.and_then(|receipt| {
			receipt
				.block_number
				.map(|block_number| (block_number, receipt.status()))
		}))
	}

	async fn head(&self) -> Result<u64, ChainError> {
		self.provider
			.get_block_number()
			.await
			.map_err(|e| ChainError::RpcError(format!("eth_blockNumber failed: {}", e)))
	}
}

#[async_trait::async_trait]
impl ChainWriter for InterepContractClient {
	async fn submit_batch(&self, records: &[GroupUpdate]) -> Result<TxHandle, ChainError> {
		let groups = offchain_groups(records)?;
		let interep = IInterep::new(self.contract, &self.provider);

		let pending = interep
			.updateGroups(groups)
			.from(self.sender)
			.send()
			.await
			.map_err(|e| ChainError::Rejected(e.to_string()))?;
		let hash = *pending.tx_hash();

		info!(
			"Submitted updateGroups transaction {} with {} groups",
			hash,
			records.len()
		);
		Ok(TxHandle { hash })
	}

	async fn await_confirmation(
		&self,
		tx: &TxHandle,
		confirmations: u64,
	) -> Result<Confirmation, ChainError> {
		let mut included: Option<u64> = None;

		loop {
			// Head first, so a receipt read afterwards is never older than the head it is judged against
			let head = self.head().await?;
			let receipt = self.receipt(tx.hash).await?;

			match assess_confirmation(tx.hash, receipt, head, confirmations) {
				ConfirmationProgress::Settled(confirmation) => {
					if let Confirmation::Failed(reason) = &confirmation {
						warn!("Transaction {}: {}", tx.hash, reason);
					}
					return Ok(confirmation);
				}
				ConfirmationProgress::Waiting { block_number } => {
					if let Some(previous) = included.filter(|previous| *previous != block_number) {
						warn!(
							"Transaction {} moved from block {} to block {}",
							tx.hash, previous, block_number
						);
					}
					debug!(
						"Transaction {} has {} of {} confirmations",
						tx.hash,
						head.saturating_sub(block_number).saturating_add(1),
						confirmations.max(1)
					);
					included = Some(block_number);
				}
				ConfirmationProgress::Pending => {
					if let Some(previous) = included.take() {
						warn!(
							"Transaction {} left block {} before reaching {} confirmations",
							tx.hash, previous, confirmations
						);
					}
				}
			}

			tokio::time::sleep(self.poll_interval).await;
		}
	}
}

#[async_trait::async_trait]
impl ChainReader for InterepContractClient {
	async fn query_events(&self, event_name: &str) -> Result<Vec<OnchainGroupRecord>, ChainError> {
		if event_name != GROUP_UPDATED_EVENT {
			return Err(ChainError::UnsupportedEvent(event_name.to_string()));
		}

		let head = self.head().await?;
		let mut records = Vec::new();

		for (from, to) in block_windows(self.deployment_block, head, self.log_window) {
			let filter = Filter::new()
				.address(self.contract)
				.event_signature(IInterep::OffchainGroupUpdated::SIGNATURE_HASH)
				.from_block(from)
				.to_block(to);

			let logs = self.provider.get_logs(&filter).await.map_err(|e| {
				ChainError::RpcError(format!("eth_getLogs for blocks {}..={} failed: {}", from, to, e))
			})?;
			debug!("Blocks {}..={}: {} logs", from, to, logs.len());
			records.extend(parse_logs(&logs));
		}

		records.sort_by_key(|record| record.order);
		info!(
			"Fetched {} {} events from blocks {}..={}",
			records.len(),
			event_name,
			self.deployment_block,
			head
		);
		Ok(records)
	}
}

/// Where a submitted transaction stands after one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConfirmationProgress {
	/// Not in the canonical chain (yet, or any more).
	Pending,
	/// Mined in `block_number` but not deep enough.
	Waiting { block_number: u64 },
	Settled(Confirmation),
}

/// Head block at which a transaction mined in `block_number` has `confirmations` confirmations.
fn confirmation_target(block_number: u64, confirmations: u64) -> u64 {
	block_number.saturating_add(confirmations.max(1) - 1)
}

/// Judge the latest receipt (`Some((block, success))` once mined) against the current head.
fn assess_confirmation(
	hash: B256,
	receipt: Option<(u64, bool)>,
	head: u64,
	confirmations: u64,
) -> ConfirmationProgress {
	match receipt {
		None => ConfirmationProgress::Pending,
		Some((_, false)) => ConfirmationProgress::Settled(Confirmation::Failed(FailureReason::Reverted(hash))),
		Some((block_number, true)) if head >= confirmation_target(block_number, confirmations) => {
			ConfirmationProgress::Settled(Confirmation::Confirmed { block_number })
		}
		Some((block_number, true)) => ConfirmationProgress::Waiting { block_number },
	}
}

/// Inclusive ranges of at most `window` blocks covering `from..=to`.
fn block_windows(from: u64, to: u64, window: u64) -> Vec<(u64, u64)> {
	let mut windows = Vec::new();
	if from > to {
		return windows;
	}

	let span = window.max(1) - 1;
	let mut start = from;
	loop {
		let end = to.min(start.saturating_add(span));
		windows.push((start, end));
		if end >= to {
			return windows;
		}
		start = end + 1;
	}
}

/// Decode a page of logs, dropping removed or undecodable entries, ordered by block order.
fn parse_logs(logs: &[Log]) -> Vec<OnchainGroupRecord> {
	let mut records: Vec<_> = logs
		.iter()
		.filter(|log| {
			if log.removed {
				debug!("Skipping removed log at block {:?}", log.block_number);
			}
			!log.removed
		})
		.filter_map(|log| match decode_group_updated(log) {
			Ok(record) => Some(record),
			Err(e) => {
				warn!("Skipping undecodable {} log: {}", GROUP_UPDATED_EVENT, e);
				None
			}
		})
		.collect();
	records.sort_by_key(|record| record.order);
	records
}
