//! Line commands accepted on stdin by the service.
//!
//! Each line is one command; each response is one JSON object on stdout, either
//! `{"ok": true, "result": ...}` or `{"ok": false, "error": "..."}`.
//!
//! ```text
//! admit <provider> <name> <commitment>
//! proof <provider> <name> <commitment>
//! resume <provider> <name>
//! sync | reconcile | stats
//! ```

use crate::admission::AdmissionService;
use crate::groups::GroupRegistry;
use crate::sync::{BatchSynchronizer, EventReconciler};

use serde_json::{Value, json};
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
	Admit {
		provider: String,
		name: String,
		commitment: String,
	},
	Proof {
		provider: String,
		name: String,
		commitment: String,
	},
	Resume {
		provider: String,
		name: String,
	},
	Sync,
	Reconcile,
	Stats,
}

impl FromStr for Command {
	type Err = String;

	fn from_str(line: &str) -> Result<Self, Self::Err> {
		let words: Vec<&str> = line.split_whitespace().collect();
		match words.as_slice() {
			["resume", provider, name] => Ok(Command::Resume {
				provider: provider.to_string(),
				name: name.to_string(),
			}),
			["admit", provider, name, commitment] => Ok(Command::Admit {
				provider: provider.to_string(),
				name: name.to_string(),
				commitment: commitment.to_string(),
			}),
			["proof", provider, name, commitment] => Ok(Command::Proof {
				provider: provider.to_string(),
				name: name.to_string(),
				commitment: commitment.to_string(),
			}),
			["sync"] => Ok(Command::Sync),
			["reconcile"] => Ok(Command::Reconcile),
			["stats"] => Ok(Command::Stats),
			_ => Err(format!("unrecognised command '{}'", line.trim())),
		}
	}
}

/// Services the commands operate on.
pub struct CommandContext {
	registry: Arc<GroupRegistry>,
	admission: AdmissionService,
	synchronizer: Arc<BatchSynchronizer>,
	reconciler: Arc<EventReconciler>,
}

impl CommandContext {
	pub fn new(
		registry: Arc<GroupRegistry>,
		admission: AdmissionService,
		synchronizer: Arc<BatchSynchronizer>,
		reconciler: Arc<EventReconciler>,
	) -> Self {
		Self {
			registry,
			admission,
			synchronizer,
			reconciler,
		}
	}

	/// Parse and execute one line, always producing a response object.
	pub async fn handle_line(&self, line: &str) -> Value {
		let result = match line.parse::<Command>() {
			Ok(command) => self.execute(command).await,
			Err(e) => Err(e),
		};

		match result {
			Ok(result) => json!({ "ok": true, "result": result }),
			Err(error) => json!({ "ok": false, "error": error }),
		}
	}

	pub async fn execute(&self, command: Command) -> Result<Value, String> {
		match command {
			Command::Admit {
				provider,
				name,
				commitment,
			} => {
				let receipt = self
					.admission
					.admit(&provider, &name, &commitment)
					.await
					.map_err(|e| e.to_string())?;
				serde_json::to_value(receipt).map_err(|e| e.to_string())
			}
			Command::Proof {
				provider,
				name,
				commitment,
			} => {
				let proof = self
					.admission
					.membership_proof(&provider, &name, &commitment)
					.await
					.map_err(|e| e.to_string())?;
				serde_json::to_value(proof).map_err(|e| e.to_string())
			}
			Command::Resume { provider, name } => {
				let group = self
					.registry
					.get(&provider, &name)
					.await
					.map_err(|e| e.to_string())?;
				let resumed = group.resume().await;
				if resumed {
					self.synchronizer.trigger();
				}
				Ok(json!({ "resumed": resumed }))
			}
			Command::Sync => {
				self.synchronizer.trigger();
				Ok(json!({ "triggered": true }))
			}
			Command::Reconcile => {
				let report = self.reconciler.reconcile().await.map_err(|e| e.to_string())?;
				let statuses: serde_json::Map<String, Value> = report
					.statuses
					.iter()
					.map(|(key, status)| (key.to_string(), json!(format!("{:?}", status))))
					.collect();
				Ok(json!({ "events": report.events, "groups": statuses }))
			}
			Command::Stats => {
				let stats = self.synchronizer.stats().await;
				Ok(json!({
					"groups": self.registry.len().await,
					"dirty": self.registry.list_dirty().await.len(),
					"summary": stats.summary(),
				}))
			}
		}
	}
}
