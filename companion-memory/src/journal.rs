//! Durable conversation history journal.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::warn;

use crate::MemoryResult;
use crate::message::Message;

/// Trait implemented by durable message journals.
#[async_trait]
pub trait Journal: Send + Sync {
    /// Appends a message to the journal.
    async fn append(&self, message: &Message) -> MemoryResult<()>;

    /// Returns the most recent `limit` messages, ordered oldest to newest.
    async fn tail(&self, limit: usize) -> MemoryResult<Vec<Message>>;

    /// Clears the journal contents.
    async fn clear(&self) -> MemoryResult<()>;
}

/// File-backed journal writing newline-delimited JSON entries.
pub struct FileJournal {
    path: PathBuf,
    file: Mutex<fs::File>,
}

impl FileJournal {
    /// Opens (or creates) a journal file at the provided path. Undecodable
    /// lines are skipped when reading.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors encountered while preparing the file.
    pub async fn open(path: impl Into<PathBuf>) -> MemoryResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .await?;

        // A torn final append leaves an unterminated line; close it so the
        // next entry starts on its own line.
        if file.metadata().await?.len() > 0 {
            file.seek(SeekFrom::End(-1)).await?;
            let mut last = [0_u8; 1];
            file.read_exact(&mut last).await?;
            if last[0] != b'\n' {
                file.write_all(b"\n").await?;
                file.flush().await?;
            }
        }

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Returns the underlying path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Journal for FileJournal {
    async fn append(&self, message: &Message) -> MemoryResult<()> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        let mut guard = self.file.lock().await;
        guard.write_all(&line).await?;
        guard.flush().await?;
        Ok(())
    }

    async fn tail(&self, limit: usize) -> MemoryResult<Vec<Message>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let _guard = self.file.lock().await;
        let data = fs::read(&self.path).await?;
        let mut messages = Vec::new();
        for (line_no, chunk) in data
            .split(|byte| *byte == b'\n')
            .enumerate()
            .filter(|(_, chunk)| !chunk.is_empty())
        {
            match serde_json::from_slice::<Message>(chunk) {
                Ok(message) => messages.push(message),
                Err(err) => warn!(
                    path = %self.path.display(),
                    line = line_no + 1,
                    ?err,
                    "skipping unreadable journal entry"
                ),
            }
        }

        let skip = messages.len().saturating_sub(limit);
        Ok(messages.split_off(skip))
    }

    async fn clear(&self) -> MemoryResult<()> {
        let mut guard = self.file.lock().await;
        guard.rewind().await?;
        guard.set_len(0).await?;
        guard.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_path() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("history-journal-{}.log", Uuid::new_v4()));
        path
    }

    #[tokio::test]
    async fn append_and_tail() {
        let path = temp_path();
        let journal = FileJournal::open(&path).await.unwrap();

        for content in ["one", "two", "three"] {
            journal.append(&Message::user(content)).await.unwrap();
        }

        let tail = journal.tail(2).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].content(), "two");
        assert_eq!(tail[1].content(), "three");

        journal.clear().await.unwrap();
        assert!(journal.tail(10).await.unwrap().is_empty());

        journal.append(&Message::assistant("after clear")).await.unwrap();
        let tail = journal.tail(10).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].content(), "after clear");

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn torn_line_does_not_block_tail() {
        let path = temp_path();
        {
            let journal = FileJournal::open(&path).await.unwrap();
            journal.append(&Message::user("before")).await.unwrap();
        }
        let mut contents = std::fs::read(&path).unwrap();
        contents.extend_from_slice(br#"{"id":"0b1c","role":"us"#);
        std::fs::write(&path, contents).unwrap();

        let journal = FileJournal::open(&path).await.unwrap();
        journal.append(&Message::assistant("after")).await.unwrap();

        let tail = journal.tail(10).await.unwrap();
        let contents: Vec<_> = tail.iter().map(Message::content).collect();
        assert_eq!(contents, ["before", "after"]);

        let _ = std::fs::remove_file(path);
    }
}
