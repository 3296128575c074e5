//! Durable vector store backed by an append-only JSONL log.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use companion_primitives::MessageId;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::MemoryResult;
use crate::vector_store_api::{
    LocalVectorStore, SemanticRecord, VectorMatch, VectorQuery, VectorStoreClient,
};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogEntry {
    Upsert { record: SemanticRecord },
    Remove { id: MessageId },
}

/// Vector store that keeps records in memory and mirrors every mutation to a
/// log file, replayed on open. The last entry for an id wins.
pub struct FileVectorStore {
    path: PathBuf,
    index: LocalVectorStore,
    file: Mutex<fs::File>,
}

impl FileVectorStore {
    /// Opens (or creates) the log at `path` and replays it.
    ///
    /// Lines that do not decode, such as a torn final append, are skipped with
    /// a warning.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures.
    pub async fn open(path: impl Into<PathBuf>) -> MemoryResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let index = LocalVectorStore::new();
        let mut torn_tail = false;
        if fs::try_exists(&path).await? {
            let data = fs::read(&path).await?;
            torn_tail = data.last().is_some_and(|byte| *byte != b'\n');
            let (mut replayed, mut skipped) = (0_usize, 0_usize);
            for (line_no, line) in data
                .split(|byte| *byte == b'\n')
                .enumerate()
                .filter(|(_, line)| !line.is_empty())
            {
                let applied = match serde_json::from_slice::<LogEntry>(line) {
                    Ok(LogEntry::Upsert { record }) => index.upsert(record).await,
                    Ok(LogEntry::Remove { id }) => index.remove(id).await,
                    Err(err) => Err(err.into()),
                };
                match applied {
                    Ok(()) => replayed += 1,
                    Err(err) => {
                        skipped += 1;
                        warn!(
                            path = %path.display(),
                            line = line_no + 1,
                            ?err,
                            "skipping unreadable vector log entry"
                        );
                    }
                }
            }
            debug!(path = %path.display(), replayed, skipped, "replayed vector log");
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        if torn_tail {
            // Terminate the partial line so the next append starts clean.
            file.write_all(b"\n").await?;
            file.flush().await?;
        }

        Ok(Self {
            path,
            index,
            file: Mutex::new(file),
        })
    }

    /// Returns the underlying path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrites the log so it holds exactly one entry per live record.
    ///
    /// # Errors
    ///
    /// Propagates I/O and serialization failures. The previous log is left in
    /// place if writing the replacement fails.
    pub async fn compact(&self) -> MemoryResult<()> {
        let mut guard = self.file.lock().await;
        let mut buffer = Vec::new();
        for record in self.index.records().await {
            serde_json::to_writer(&mut buffer, &LogEntry::Upsert { record })?;
            buffer.push(b'\n');
        }

        let tmp = self.path.with_extension("compact");
        fs::write(&tmp, &buffer).await?;
        fs::rename(&tmp, &self.path).await?;
        *guard = OpenOptions::new().append(true).open(&self.path).await?;
        Ok(())
    }

    async fn append(&self, entry: &LogEntry) -> MemoryResult<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut guard = self.file.lock().await;
        guard.write_all(&line).await?;
        guard.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl VectorStoreClient for FileVectorStore {
    async fn upsert(&self, record: SemanticRecord) -> MemoryResult<()> {
        // Index first so dimension mismatches never reach the log.
        self.index.upsert(record.clone()).await?;
        self.append(&LogEntry::Upsert { record }).await
    }

    async fn remove(&self, id: MessageId) -> MemoryResult<()> {
        self.index.remove(id).await?;
        self.append(&LogEntry::Remove { id }).await
    }

    async fn query(&self, query: &VectorQuery) -> MemoryResult<Vec<VectorMatch>> {
        self.index.query(query).await
    }

    async fn len(&self) -> usize {
        self.index.len().await
    }
}
