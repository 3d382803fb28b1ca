mod admission;
mod chain;
mod commands;
mod config;
mod groups;
mod merkle;
mod persistence;
mod sync;
mod utils;

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::admission::AdmissionService;
use crate::chain::{ChainError, InterepContractClient};
use crate::commands::CommandContext;
use crate::config::{ConfigError, ServiceConfig};
use crate::groups::{GroupError, GroupRegistry};
use crate::persistence::{PersistenceError, StatePersistenceService};
use crate::sync::{
	BatchSynchronizer, EventDispatcher, EventReconciler, LoggingEventHandler, SyncError,
};

/// Startup and I/O failures of the service
#[derive(Debug, thiserror::Error)]
enum ServiceError {
	#[error("Configuration error: {0}")]
	Config(#[from] ConfigError),

	#[error("Group error: {0}")]
	Group(#[from] GroupError),

	#[error("Persistence error: {0}")]
	Persistence(#[from] PersistenceError),

	#[error("Chain error: {0}")]
	Chain(#[from] ChainError),

	#[error("Sync error: {0}")]
	Sync(#[from] SyncError),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
	// Logs go to stderr; stdout carries command responses
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_writer(std::io::stderr)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.init();

	if let Err(e) = run().await {
		error!("Service failed: {}", e);
		std::process::exit(1);
	}
}

async fn run() -> Result<(), ServiceError> {
	let config = ServiceConfig::load()?;
	info!(
		"Starting Interep group sync (tree depth {}, node {})",
		config.tree_depth, config.rpc_url
	);

	let registry = Arc::new(GroupRegistry::new(config.tree_depth)?);

	let persistence = config.data_dir.clone().map(StatePersistenceService::new);
	match &persistence {
		Some(persistence) => {
			persistence.restore_registry(&registry).await?;
		}
		None => warn!("No data directory configured, admitted commitments will not survive a restart"),
	}

	let client = Arc::new(InterepContractClient::new(
		&config.rpc_url,
		config.contract_address()?,
		config.sender_address()?,
		config.deployment_block,
		config.log_window_blocks,
		config.poll_interval(),
	)?);

	let dispatcher = Arc::new(EventDispatcher::new());
	dispatcher
		.register_handler(Box::new(LoggingEventHandler))
		.await;

	let reconciler = Arc::new(
		EventReconciler::new(registry.clone(), client.clone()).with_dispatcher(dispatcher.clone()),
	);
	let report = reconciler.reconcile().await?;
	if let Err(e) = report.ensure_consistent() {
		warn!("{}; mismatched groups stay halted until resumed", e);
	}

	let synchronizer = Arc::new(BatchSynchronizer::with_dispatcher(
		registry.clone(),
		client,
		config.sync_config(),
		dispatcher,
	));
	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let sync_task = tokio::spawn(synchronizer.clone().run(shutdown_rx));
	// Push anything restored but not yet anchored right away
	synchronizer.trigger();

	let admission = match &persistence {
		Some(persistence) => AdmissionService::with_log(registry.clone(), persistence.log()),
		None => AdmissionService::new(registry.clone()),
	};
	let context = CommandContext::new(registry, admission, synchronizer, reconciler);

	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	let mut stdout = tokio::io::stdout();
	let mut stdin_open = true;
	let ctrl_c = tokio::signal::ctrl_c();
	tokio::pin!(ctrl_c);

	info!("Ready for commands on stdin");
	loop {
		tokio::select! {
			line = lines.next_line(), if stdin_open => match line? {
				Some(line) if line.trim().is_empty() => {}
				Some(line) => {
					let response = context.handle_line(&line).await;
					stdout.write_all(format!("{}\n", response).as_bytes()).await?;
					stdout.flush().await?;
				}
				None => {
					info!("stdin closed, running until interrupted");
					stdin_open = false;
				}
			},
			_ = &mut ctrl_c => {
				info!("Received shutdown signal");
				break;
			}
		}
	}

	let _ = shutdown_tx.send(true);
	if let Err(e) = sync_task.await {
		error!("Synchronizer task failed: {}", e);
	}
	info!("Interep group sync stopped");
	Ok(())
}
