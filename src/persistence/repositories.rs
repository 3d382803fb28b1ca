use crate::persistence::types::{CommitmentRecord, PersistenceError};

use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// File name of the commitment log inside the data directory
pub const COMMITMENT_LOG_FILENAME: &str = "commitments.jsonl";

/// Repository for the append-only commitment log
#[async_trait::async_trait]
pub trait CommitmentLogRepository: Send + Sync {
	async fn append(&self, record: &CommitmentRecord) -> Result<(), PersistenceError>;
	async fn load_all(&self) -> Result<Vec<CommitmentRecord>, PersistenceError>;
}

/// File-based implementation of CommitmentLogRepository, one JSON record per line
///
/// Only newline-terminated lines count as records. A failed append is cut back off the file, and
/// an unterminated tail left by a crash is dropped on the next load.
pub struct FileCommitmentLogRepository {
	path: PathBuf,
	/// Serialises file access; holds the length to cut back to when a rollback itself failed
	writer: Mutex<Option<u64>>,
}

impl FileCommitmentLogRepository {
	pub fn new(data_dir: PathBuf) -> Self {
		Self {
			path: data_dir.join(COMMITMENT_LOG_FILENAME),
			writer: Mutex::new(None),
		}
	}

	#[cfg(test)]
	pub fn path(&self) -> &std::path::Path {
		&self.path
	}
}

/// Write one line and flush it to disk, undoing any partial write on failure.
///
/// Returns the length the file must be cut back to if the undo failed as well.
async fn append_line(file: &mut File, line: &[u8]) -> Result<(), (std::io::Error, Option<u64>)> {
	let committed = file.metadata().await.map_err(|e| (e, None))?.len();

	let written = async {
		file.write_all(line).await?;
		file.flush().await?;
		file.sync_data().await
	}
	.await;

	match written {
		Ok(()) => Ok(()),
		Err(e) => match truncate_to(file, committed).await {
			Ok(()) => Err((e, None)),
			Err(rollback) => {
				error!("Could not roll back failed commitment log append: {}", rollback);
				Err((e, Some(committed)))
			}
		},
	}
}

async fn truncate_to(file: &File, len: u64) -> std::io::Result<()> {
	file.set_len(len).await?;
	file.sync_data().await
}

#[async_trait::async_trait]
impl CommitmentLogRepository for FileCommitmentLogRepository {
	async fn append(&self, record: &CommitmentRecord) -> Result<(), PersistenceError> {
		let mut line = serde_json::to_string(record)?;
		line.push('\n');

		let mut repair = self.writer.lock().await;

		if let Some(parent) = self.path.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}

		let mut file = tokio::fs::OpenOptions::new()
			.create(true)
			.append(true)
			.open(&self.path)
			.await?;

		if let Some(len) = *repair {
			truncate_to(&file, len).await?;
			info!("Removed the remains of a failed append from {:?}", self.path);
			*repair = None;
		}

		if let Err((e, leftover)) = append_line(&mut file, line.as_bytes()).await {
			*repair = leftover;
			return Err(e.into());
		}

		debug!(
			"Logged commitment {} for {}/{} at index {}",
			record.commitment, record.provider, record.name, record.index
		);
		Ok(())
	}

	async fn load_all(&self) -> Result<Vec<CommitmentRecord>, PersistenceError> {
		let _guard = self.writer.lock().await;

		// Check if the log exists
		if !tokio::fs::try_exists(&self.path).await? {
			info!("No commitment log at {:?}", self.path);
			return Ok(Vec::new());
		}

		let bytes = tokio::fs::read(&self.path).await?;
		let complete = bytes
			.iter()
			.rposition(|b| *b == b'\n')
			.map_or(0, |last| last + 1);

		if complete < bytes.len() {
			warn!(
				"Dropping {} bytes of an unterminated record at the end of {:?}",
				bytes.len() - complete,
				self.path
			);
			let file = tokio::fs::OpenOptions::new()
				.write(true)
				.open(&self.path)
				.await?;
			truncate_to(&file, complete as u64).await?;
		}

		let content = std::str::from_utf8(&bytes[..complete])
			.map_err(|e| PersistenceError::Corrupt(format!("commitment log is not UTF-8: {}", e)))?;

		let mut records = Vec::new();
		for (line_number, line) in content.lines().enumerate() {
			if line.trim().is_empty() {
				continue;
			}
			let record: CommitmentRecord = serde_json::from_str(line).map_err(|e| {
				PersistenceError::Corrupt(format!("line {}: {}", line_number + 1, e))
			})?;
			records.push(record);
		}

		info!(
			"Loaded {} commitments from {:?}",
			records.len(),
			self.path
		);
		Ok(records)
	}
}

/// In-memory implementation of CommitmentLogRepository for tests
#[cfg(test)]
pub struct InMemoryCommitmentLog {
	records: std::sync::Mutex<Vec<CommitmentRecord>>,
	fail_appends: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl InMemoryCommitmentLog {
	pub fn new() -> Self {
		Self {
			records: std::sync::Mutex::new(Vec::new()),
			fail_appends: std::sync::atomic::AtomicBool::new(false),
		}
	}

	/// Make every following append fail with an IO error
	pub fn fail_appends(&self, fail: bool) {
		self.fail_appends
			.store(fail, std::sync::atomic::Ordering::SeqCst);
	}
}

#[cfg(test)]
#[async_trait::async_trait]
impl CommitmentLogRepository for InMemoryCommitmentLog {
	async fn append(&self, record: &CommitmentRecord) -> Result<(), PersistenceError> {
		if self.fail_appends.load(std::sync::atomic::Ordering::SeqCst) {
			return Err(std::io::Error::other("disk full").into());
		}
		self.records.lock().unwrap().push(record.clone());
		Ok(())
	}

	async fn load_all(&self) -> Result<Vec<CommitmentRecord>, PersistenceError> {
		Ok(self.records.lock().unwrap().clone())
	}
}
