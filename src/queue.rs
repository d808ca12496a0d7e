//! Message transport collaborator.
//!
//! The worker pulls one [`QueueMessage`] at a time, and either completes it
//! (the acknowledgment, after the output is stored) or abandons it so the
//! queue redelivers it later. Retries come only from redelivery.
//!
//! [`DirectoryQueue`] is a spool directory with peek-lock semantics:
//!
//! ```text
//! queue/
//! ├── 0001718000000000-00042-000000.json   # pending message envelopes
//! ├── processing/                            # claimed, awaiting complete/abandon
//! └── dead-letter/                           # exceeded max delivery count
//! ```
//!
//! Claiming is a rename into `processing/`, so two workers sharing a spool
//! never receive the same message. Anything left in `processing/` when a
//! queue is opened (a crashed worker) is moved back and redelivered.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt message envelope {path}: {source}")]
    Envelope {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Message body is not UTF-8")]
    InvalidBody,
    #[error("Message {0} is not locked by this receiver")]
    LockLost(String),
}

/// A received message, locked until completed or abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: String,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    /// Deliveries so far, including this one.
    pub delivery_count: u32,
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Claim the oldest pending message, if any.
    async fn receive(&self) -> QueueResult<Option<QueueMessage>>;

    /// Acknowledge: remove the message for good.
    async fn complete(&self, message: &QueueMessage) -> QueueResult<()>;

    /// Release the lock so the message is delivered again.
    async fn abandon(&self, message: &QueueMessage) -> QueueResult<()>;

    /// Enqueue a new message and return its id.
    async fn send(&self, body: &[u8], content_type: Option<&str>) -> QueueResult<String>;
}

/// On-disk message format.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    id: String,
    body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(default)]
    delivery_count: u32,
}

const PROCESSING_DIR: &str = "processing";
const DEAD_LETTER_DIR: &str = "dead-letter";

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Sortable, process-unique message id: `<micros>-<pid>-<seq>`.
fn next_message_id() -> String {
    let micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros())
        .unwrap_or_default();
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{micros:016}-{:05}-{seq:06}", std::process::id())
}

/// Spool-directory queue. See the [module docs](self) for the layout.
pub struct DirectoryQueue {
    root: PathBuf,
    max_delivery_count: u32,
}

impl DirectoryQueue {
    /// Open (creating if needed) a spool at `root`, returning in-flight
    /// messages from a previous run to the pending set.
    pub async fn open(root: impl Into<PathBuf>, max_delivery_count: u32) -> QueueResult<Self> {
        let queue = Self {
            root: root.into(),
            max_delivery_count: max_delivery_count.max(1),
        };
        fs::create_dir_all(queue.processing_dir()).await?;
        fs::create_dir_all(queue.dead_letter_dir()).await?;
        queue.recover_in_flight().await?;
        Ok(queue)
    }

    fn processing_dir(&self) -> PathBuf {
        self.root.join(PROCESSING_DIR)
    }

    fn dead_letter_dir(&self) -> PathBuf {
        self.root.join(DEAD_LETTER_DIR)
    }

    fn file_name(id: &str) -> String {
        format!("{id}.json")
    }

    async fn recover_in_flight(&self) -> QueueResult<()> {
        let mut entries = fs::read_dir(self.processing_dir()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            fs::rename(entry.path(), self.root.join(&name)).await?;
            info!(message = ?name, "Returned in-flight message to queue");
        }
        Ok(())
    }

    /// Pending envelope file names, oldest first.
    async fn pending(&self) -> QueueResult<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".json") && !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn read_envelope(path: &Path) -> QueueResult<Envelope> {
        let raw = fs::read(path).await?;
        serde_json::from_slice(&raw).map_err(|source| QueueError::Envelope {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write an envelope into `dir` via a dotted temp file and rename.
    async fn write_envelope(dir: &Path, envelope: &Envelope) -> QueueResult<()> {
        let name = Self::file_name(&envelope.id);
        let partial = dir.join(format!(".{name}.partial"));
        let json = serde_json::to_vec_pretty(envelope).map_err(|source| QueueError::Envelope {
            path: partial.clone(),
            source,
        })?;
        fs::write(&partial, json).await?;
        fs::rename(&partial, dir.join(name)).await?;
        Ok(())
    }

    /// Move a corrupt or exhausted envelope out of the way.
    async fn dead_letter(&self, claimed: &Path, name: &str) -> QueueResult<()> {
        fs::rename(claimed, self.dead_letter_dir().join(name)).await?;
        Ok(())
    }
}

#[async_trait]
impl MessageQueue for DirectoryQueue {
    async fn receive(&self) -> QueueResult<Option<QueueMessage>> {
        for name in self.pending().await? {
            let claimed = self.processing_dir().join(&name);
            match fs::rename(self.root.join(&name), &claimed).await {
                Ok(()) => {}
                // Another receiver got there first.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }

            let mut envelope = match Self::read_envelope(&claimed).await {
                Ok(envelope) => envelope,
                Err(QueueError::Envelope { source, .. }) => {
                    warn!(message = %name, error = %source, "Dead-lettering corrupt envelope");
                    self.dead_letter(&claimed, &name).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            // The file name is authoritative for the id.
            envelope.id = name.trim_end_matches(".json").to_string();
            envelope.delivery_count += 1;
            if envelope.delivery_count > self.max_delivery_count {
                warn!(
                    message = %envelope.id,
                    deliveries = envelope.delivery_count - 1,
                    "Max delivery count exceeded, dead-lettering"
                );
                self.dead_letter(&claimed, &name).await?;
                continue;
            }
            Self::write_envelope(&self.processing_dir(), &envelope).await?;

            debug!(message = %envelope.id, delivery = envelope.delivery_count, "Received message");
            return Ok(Some(QueueMessage {
                id: envelope.id,
                body: envelope.body.into_bytes(),
                content_type: envelope.content_type,
                delivery_count: envelope.delivery_count,
            }));
        }
        Ok(None)
    }

    async fn complete(&self, message: &QueueMessage) -> QueueResult<()> {
        let claimed = self.processing_dir().join(Self::file_name(&message.id));
        match fs::remove_file(&claimed).await {
            Ok(()) => {
                debug!(message = %message.id, "Completed message");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(QueueError::LockLost(message.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn abandon(&self, message: &QueueMessage) -> QueueResult<()> {
        let claimed = self.processing_dir().join(Self::file_name(&message.id));
        match fs::rename(&claimed, self.root.join(Self::file_name(&message.id))).await {
            Ok(()) => {
                debug!(message = %message.id, "Abandoned message");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(QueueError::LockLost(message.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn send(&self, body: &[u8], content_type: Option<&str>) -> QueueResult<String> {
        let body = String::from_utf8(body.to_vec()).map_err(|_| QueueError::InvalidBody)?;
        let envelope = Envelope {
            id: next_message_id(),
            body,
            content_type: content_type.map(str::to_string),
            delivery_count: 0,
        };
        Self::write_envelope(&self.root, &envelope).await?;
        debug!(message = %envelope.id, "Enqueued message");
        Ok(envelope.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn send_receive_complete() {
        let dir = tempdir().unwrap();
        let queue = DirectoryQueue::open(dir.path(), 5).await.unwrap();

        let id = queue
            .send(br#"{"FileName":"a.png"}"#, Some("application/json"))
            .await
            .unwrap();
        let msg = queue.receive().await.unwrap().unwrap();
        assert_eq!(msg.id, id);
        assert_eq!(msg.body, br#"{"FileName":"a.png"}"#);
        assert_eq!(msg.content_type.as_deref(), Some("application/json"));
        assert_eq!(msg.delivery_count, 1);

        // Locked: not visible to another receive.
        assert!(queue.receive().await.unwrap().is_none());

        queue.complete(&msg).await.unwrap();
        assert!(queue.receive().await.unwrap().is_none());
        assert!(matches!(
            queue.complete(&msg).await,
            Err(QueueError::LockLost(_))
        ));
    }

    #[tokio::test]
    async fn abandon_redelivers_with_higher_count() {
        let dir = tempdir().unwrap();
        let queue = DirectoryQueue::open(dir.path(), 5).await.unwrap();
        queue.send(b"{}", None).await.unwrap();

        let first = queue.receive().await.unwrap().unwrap();
        queue.abandon(&first).await.unwrap();
        let second = queue.receive().await.unwrap().unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.delivery_count, 2);
    }

    #[tokio::test]
    async fn receives_oldest_first() {
        let dir = tempdir().unwrap();
        let queue = DirectoryQueue::open(dir.path(), 5).await.unwrap();
        let a = queue.send(b"a", None).await.unwrap();
        let b = queue.send(b"b", None).await.unwrap();

        assert_eq!(queue.receive().await.unwrap().unwrap().id, a);
        assert_eq!(queue.receive().await.unwrap().unwrap().id, b);
    }

    #[tokio::test]
    async fn exhausted_messages_are_dead_lettered() {
        let dir = tempdir().unwrap();
        let queue = DirectoryQueue::open(dir.path(), 2).await.unwrap();
        let id = queue.send(b"poison", None).await.unwrap();

        for _ in 0..2 {
            let msg = queue.receive().await.unwrap().unwrap();
            queue.abandon(&msg).await.unwrap();
        }
        assert!(queue.receive().await.unwrap().is_none());
        assert!(
            dir.path()
                .join(DEAD_LETTER_DIR)
                .join(format!("{id}.json"))
                .is_file()
        );
    }

    #[tokio::test]
    async fn corrupt_envelope_is_dead_lettered() {
        let dir = tempdir().unwrap();
        let queue = DirectoryQueue::open(dir.path(), 5).await.unwrap();
        std::fs::write(dir.path().join("0000-bad.json"), b"not json").unwrap();
        let good = queue.send(b"ok", None).await.unwrap();

        assert_eq!(queue.receive().await.unwrap().unwrap().id, good);
        assert!(dir.path().join(DEAD_LETTER_DIR).join("0000-bad.json").is_file());
    }

    #[tokio::test]
    async fn reopen_recovers_in_flight_messages() {
        let dir = tempdir().unwrap();
        let id = {
            let queue = DirectoryQueue::open(dir.path(), 5).await.unwrap();
            queue.send(b"x", None).await.unwrap();
            queue.receive().await.unwrap().unwrap().id
        };

        let queue = DirectoryQueue::open(dir.path(), 5).await.unwrap();
        let msg = queue.receive().await.unwrap().unwrap();
        assert_eq!(msg.id, id);
        assert_eq!(msg.delivery_count, 2);
    }

    #[tokio::test]
    async fn non_utf8_body_is_rejected() {
        let dir = tempdir().unwrap();
        let queue = DirectoryQueue::open(dir.path(), 5).await.unwrap();
        assert!(matches!(
            queue.send(&[0xff, 0xfe], None).await,
            Err(QueueError::InvalidBody)
        ));
    }
}
