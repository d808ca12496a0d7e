//! Job orchestration: one queue message in, one stored image out.
//!
//! ```text
//! receive ─► parse ─► fetch ─► select encoder ─► resize+encode ─► store ─► complete
//!                │        │           │                 │            │
//!                └────────┴───────────┴─────────────────┴────────────┴──► abandon
//! ```
//!
//! [`run_job`] owns the middle of the pipeline and knows nothing about the
//! queue. [`Worker`] wraps it with receive, acknowledgment and the poll loop.
//! A message is completed only after its output is stored; on any failure it
//! is abandoned and the queue redelivers it. Jobs are deterministic, so a
//! redelivered job writes the same bytes under the same name.

use crate::error::JobError;
use crate::imaging::{DEFAULT_MAX_PIXELS, EncoderKind, ImageBackend, Quality, resize_and_encode};
use crate::output::{EncodedOutput, JobReport, MessageOutcome, RunStats};
use crate::queue::{MessageQueue, QueueMessage, QueueResult};
use crate::request::ResizeRequest;
use crate::storage::{BlobMetadata, StorageClient, StorageResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

pub const SOURCE_CONTAINER: &str = "images";
pub const DESTINATION_CONTAINER: &str = "resize-images";

/// Where a job reads its source and writes its output.
#[async_trait]
pub trait JobStorage: Send + Sync {
    async fn fetch_source(&self, name: &str) -> StorageResult<Vec<u8>>;

    async fn store_output(
        &self,
        name: &str,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> StorageResult<BlobMetadata>;
}

/// [`JobStorage`] over a source and a destination container of one client.
pub struct BlobContainers {
    client: Arc<StorageClient>,
    source: String,
    destination: String,
}

impl BlobContainers {
    pub fn new(client: Arc<StorageClient>) -> Self {
        Self::with_containers(client, SOURCE_CONTAINER, DESTINATION_CONTAINER)
    }

    pub fn with_containers(
        client: Arc<StorageClient>,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            client,
            source: source.into(),
            destination: destination.into(),
        }
    }
}

#[async_trait]
impl JobStorage for BlobContainers {
    async fn fetch_source(&self, name: &str) -> StorageResult<Vec<u8>> {
        self.client.fetch(&self.source, name).await
    }

    async fn store_output(
        &self,
        name: &str,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> StorageResult<BlobMetadata> {
        self.client
            .store(&self.destination, name, bytes, content_type)
            .await
    }
}

/// Encode settings applied to every job a worker runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSettings {
    pub quality: Quality,
    /// Largest output, in pixels, a job may produce.
    pub max_pixels: u64,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            quality: Quality::default(),
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }
}

/// Run one resize job.
///
/// Fetches the source, picks the encoder from its extension, resizes on a
/// blocking thread and stores the result exactly once. Nothing is stored
/// when any earlier step fails.
#[instrument(skip_all, fields(file = %request.source_file_name()))]
pub async fn run_job(
    request: &ResizeRequest,
    backend: Arc<dyn ImageBackend>,
    settings: JobSettings,
    storage: &dyn JobStorage,
) -> Result<JobReport, JobError> {
    let source_name = request.source_file_name();
    let raw = storage
        .fetch_source(source_name)
        .await
        .map_err(|source| JobError::Fetch {
            blob: source_name.to_string(),
            source,
        })?;

    let encoder = EncoderKind::from_file_name(source_name);
    if !encoder.is_supported() {
        return Err(JobError::UnsupportedFormat {
            file_name: source_name.to_string(),
        });
    }

    let target = request.target();
    debug!(size = raw.len(), %encoder, ?target, "Resizing");
    let encoded = tokio::task::spawn_blocking(move || {
        resize_and_encode(
            backend.as_ref(),
            &raw,
            target,
            encoder,
            settings.quality,
            settings.max_pixels,
        )
    })
    .await
    .map_err(|e| JobError::Internal(e.to_string()))??;

    let output = EncodedOutput::new(source_name, encoded);
    storage
        .store_output(&output.file_name, &output.bytes, encoder.content_type())
        .await
        .map_err(|source| JobError::Store {
            blob: output.file_name.clone(),
            source,
        })?;

    Ok(JobReport::from_output(source_name, &output))
}

/// Pulls messages from a queue and runs them as jobs, one at a time.
pub struct Worker {
    queue: Arc<dyn MessageQueue>,
    storage: Arc<dyn JobStorage>,
    backend: Arc<dyn ImageBackend>,
    settings: JobSettings,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        storage: Arc<dyn JobStorage>,
        backend: Arc<dyn ImageBackend>,
    ) -> Self {
        Self {
            queue,
            storage,
            backend,
            settings: JobSettings::default(),
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.settings.quality = quality;
        self
    }

    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.settings.max_pixels = max_pixels;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Handle one received message and settle it with the queue.
    ///
    /// Errors returned here are queue errors; job failures are reported in
    /// [`MessageOutcome::Abandoned`].
    #[instrument(skip_all, fields(message = %message.id, delivery = message.delivery_count))]
    pub async fn handle_message(&self, message: &QueueMessage) -> QueueResult<MessageOutcome> {
        info!(content_type = ?message.content_type, "Processing message");
        debug!(body = %String::from_utf8_lossy(&message.body), "Message body");

        let result = match ResizeRequest::from_message_body(&message.body) {
            Ok(request) => {
                run_job(
                    &request,
                    Arc::clone(&self.backend),
                    self.settings,
                    self.storage.as_ref(),
                )
                .await
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(report) => {
                self.queue.complete(message).await?;
                info!(
                    output = %report.output,
                    width = report.width,
                    height = report.height,
                    size = report.size,
                    digest = %report.digest,
                    "Job completed"
                );
                Ok(MessageOutcome::Completed {
                    message_id: message.id.clone(),
                    report,
                })
            }
            Err(error) => {
                warn!(kind = error.kind(), %error, "Job failed, abandoning message");
                self.queue.abandon(message).await?;
                Ok(MessageOutcome::Abandoned {
                    message_id: message.id.clone(),
                    delivery_count: message.delivery_count,
                    error,
                })
            }
        }
    }

    /// Receive and handle a single message. `None` when the queue is empty.
    pub async fn process_next(&self) -> QueueResult<Option<MessageOutcome>> {
        match self.queue.receive().await? {
            Some(message) => self.handle_message(&message).await.map(Some),
            None => Ok(None),
        }
    }

    /// Poll until `shutdown` turns true.
    ///
    /// The signal is checked between jobs; a job in progress always runs to
    /// completion or failure. Queue errors are logged and retried after the
    /// poll interval.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> RunStats {
        let mut stats = RunStats::default();
        info!(poll_interval_ms = self.poll_interval.as_millis() as u64, "Worker started");

        while !*shutdown.borrow() {
            let idle = match self.process_next().await {
                Ok(Some(outcome)) => {
                    stats.record(&outcome);
                    false
                }
                Ok(None) => true,
                Err(e) => {
                    error!(error = %e, "Queue error");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    changed = shutdown.changed() => {
                        // Sender dropped: nobody can stop us any more, so stop now.
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        info!(%stats, "Worker stopped");
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::RustBackend;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::queue::DirectoryQueue;
    use crate::storage::{MemoryBlobStore, StorageError};
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use tempfile::{TempDir, tempdir};

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
            .unwrap();
        buf
    }

    fn request(name: &str, width: i64, height: i64) -> ResizeRequest {
        ResizeRequest::new(name, width, height).unwrap()
    }

    fn containers(store: &Arc<MemoryBlobStore>) -> BlobContainers {
        BlobContainers::new(Arc::new(StorageClient::new(store.clone())))
    }

    /// Storage whose writes always fail.
    struct ReadOnlyStorage(Vec<u8>);

    #[async_trait]
    impl JobStorage for ReadOnlyStorage {
        async fn fetch_source(&self, _name: &str) -> StorageResult<Vec<u8>> {
            Ok(self.0.clone())
        }

        async fn store_output(
            &self,
            _name: &str,
            _bytes: &[u8],
            _content_type: Option<&str>,
        ) -> StorageResult<BlobMetadata> {
            Err(StorageError::Io(std::io::Error::other("disk full")))
        }
    }

    #[tokio::test]
    async fn run_job_stores_resized_output_once() {
        let store = Arc::new(MemoryBlobStore::new());
        store.insert("images", "wide.jpg", b"source".to_vec()).await;
        let backend = Arc::new(MockBackend::with_source(1920, 1080));

        let report = run_job(
            &request("wide.jpg", 300, 300),
            backend.clone(),
            JobSettings {
                quality: Quality::new(80),
                ..JobSettings::default()
            },
            &containers(&store),
        )
        .await
        .unwrap();

        assert_eq!(report.output, "resize_wide.jpg");
        assert_eq!((report.width, report.height), (300, 169));
        assert_eq!(store.write_count().await, 1);

        let stored = store.get("resize-images", "resize_wide.jpg").await.unwrap();
        assert_eq!(stored.data, b"jpeg:300x169");
        assert_eq!(stored.content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(
            backend.get_operations(),
            vec![
                RecordedOp::Decode { len: 6 },
                RecordedOp::Resize {
                    width: 300,
                    height: 169
                },
                RecordedOp::Encode {
                    encoder: EncoderKind::Jpeg,
                    quality: 80
                },
            ]
        );
    }

    #[tokio::test]
    async fn unsupported_extension_fails_without_store() {
        let store = Arc::new(MemoryBlobStore::new());
        store.insert("images", "scan.bmp", b"BM".to_vec()).await;
        let backend = Arc::new(MockBackend::with_source(10, 10));

        let err = run_job(
            &request("scan.bmp", 100, 100),
            backend.clone(),
            JobSettings::default(),
            &containers(&store),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, JobError::UnsupportedFormat { ref file_name } if file_name == "scan.bmp"));
        assert_eq!(store.write_count().await, 0);
        assert!(backend.get_operations().is_empty());
    }

    #[tokio::test]
    async fn corrupted_source_is_a_decode_error() {
        let store = Arc::new(MemoryBlobStore::new());
        store
            .insert("images", "broken.png", b"\x89PNG\r\n\x1a\ngarbage".to_vec())
            .await;

        let err = run_job(
            &request("broken.png", 100, 100),
            Arc::new(RustBackend::new()),
            JobSettings::default(),
            &containers(&store),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), "decode");
        assert_eq!(store.write_count().await, 0);
    }

    #[tokio::test]
    async fn missing_source_is_a_fetch_error() {
        let store = Arc::new(MemoryBlobStore::new());
        let err = run_job(
            &request("ghost.png", 10, 10),
            Arc::new(MockBackend::with_source(10, 10)),
            JobSettings::default(),
            &containers(&store),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, JobError::Fetch { ref blob, .. } if blob == "ghost.png"));
        // The source container is created on first use.
        assert_eq!(store.containers_created().await, vec!["images"]);
    }

    #[tokio::test]
    async fn store_failure_is_reported() {
        let err = run_job(
            &request("cat.gif", 10, 10),
            Arc::new(MockBackend::with_source(20, 20)),
            JobSettings::default(),
            &ReadOnlyStorage(b"gif".to_vec()),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, JobError::Store { ref blob, .. } if blob == "resize_cat.gif"));
    }

    #[tokio::test]
    async fn oversized_target_fails_without_store() {
        let store = Arc::new(MemoryBlobStore::new());
        let mut png = Vec::new();
        image::RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 255, 255]))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        store.insert("images", "dot.png", png).await;

        let err = run_job(
            &request("dot.png", 200_000, 200_000),
            Arc::new(RustBackend::new()),
            JobSettings::default(),
            &containers(&store),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            JobError::TooLarge {
                width: 200_000,
                height: 200_000,
                ..
            }
        ));
        assert_eq!(store.write_count().await, 0);
    }

    #[tokio::test]
    async fn real_jpeg_scenario_and_idempotence() {
        let store = Arc::new(MemoryBlobStore::new());
        store.insert("images", "photo.JPG", jpeg_bytes(1920, 1080)).await;
        let storage = containers(&store);
        let backend: Arc<dyn ImageBackend> = Arc::new(RustBackend::new());

        let first = run_job(
            &request("photo.JPG", 300, 300),
            backend.clone(),
            JobSettings::default(),
            &storage,
        )
        .await
        .unwrap();
        let stored = store.get("resize-images", "resize_photo.JPG").await.unwrap();
        let decoded = image::load_from_memory(&stored.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (300, 169));

        let second = run_job(
            &request("photo.JPG", 300, 300),
            backend,
            JobSettings::default(),
            &storage,
        )
        .await
        .unwrap();
        assert_eq!(first, second);
        assert_eq!(store.list("resize-images").await, vec!["resize_photo.JPG"]);
    }

    struct Harness {
        dir: TempDir,
        store: Arc<MemoryBlobStore>,
        queue: Arc<DirectoryQueue>,
        worker: Worker,
    }

    async fn harness(backend: Arc<dyn ImageBackend>) -> Harness {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryBlobStore::new());
        let queue = Arc::new(DirectoryQueue::open(dir.path(), 5).await.unwrap());
        let worker = Worker::new(queue.clone(), Arc::new(containers(&store)), backend)
            .with_poll_interval(Duration::from_millis(10));
        Harness {
            dir,
            store,
            queue,
            worker,
        }
    }

    async fn enqueue(queue: &DirectoryQueue, name: &str, width: i64, height: i64) -> String {
        queue
            .send(&request(name, width, height).to_message_body(), Some("application/json"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn success_completes_the_message() {
        let h = harness(Arc::new(MockBackend::with_source(500, 500))).await;
        h.store.insert("images", "square.png", b"png".to_vec()).await;
        let id = enqueue(&h.queue, "square.png", 800, 600).await;

        let outcome = h.worker.process_next().await.unwrap().unwrap();
        match outcome {
            MessageOutcome::Completed { message_id, report } => {
                assert_eq!(message_id, id);
                assert_eq!((report.width, report.height), (600, 600));
            }
            other => panic!("expected completion, got {other:?}"),
        }
        assert!(h.queue.receive().await.unwrap().is_none());
        assert!(h.worker.process_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failure_abandons_for_redelivery() {
        let h = harness(Arc::new(RustBackend::new())).await;
        h.store
            .insert("images", "broken.png", b"not an image".to_vec())
            .await;
        let id = enqueue(&h.queue, "broken.png", 50, 50).await;

        let outcome = h.worker.process_next().await.unwrap().unwrap();
        assert!(matches!(
            outcome,
            MessageOutcome::Abandoned { ref error, delivery_count: 1, .. } if error.kind() == "decode"
        ));

        let redelivered = h.queue.receive().await.unwrap().unwrap();
        assert_eq!(redelivered.id, id);
        assert_eq!(redelivered.delivery_count, 2);
        assert_eq!(h.store.write_count().await, 0);
    }

    #[tokio::test]
    async fn worker_pixel_limit_abandons_large_outputs() {
        let h = harness(Arc::new(MockBackend::with_source(500, 500))).await;
        let worker = h.worker.with_max_pixels(100 * 100);
        h.store.insert("images", "square.png", b"png".to_vec()).await;
        enqueue(&h.queue, "square.png", 200, 200).await;

        let outcome = worker.process_next().await.unwrap().unwrap();
        assert!(matches!(
            outcome,
            MessageOutcome::Abandoned { ref error, .. } if error.kind() == "too_large"
        ));
        assert_eq!(h.store.write_count().await, 0);
    }

    #[tokio::test]
    async fn malformed_body_is_abandoned() {
        let h = harness(Arc::new(MockBackend::with_source(10, 10))).await;
        h.queue
            .send(br#"{"FileName":"cat.png","Width":"wide"}"#, None)
            .await
            .unwrap();

        let outcome = h.worker.process_next().await.unwrap().unwrap();
        assert!(matches!(
            outcome,
            MessageOutcome::Abandoned { ref error, .. } if error.kind() == "malformed_request"
        ));
    }

    #[tokio::test]
    async fn run_drains_queue_until_shutdown() {
        let h = harness(Arc::new(MockBackend::with_source(64, 32))).await;
        h.store.insert("images", "a.png", b"a".to_vec()).await;
        h.store.insert("images", "b.gif", b"b".to_vec()).await;
        enqueue(&h.queue, "a.png", 32, 32).await;
        enqueue(&h.queue, "b.gif", 16, 16).await;
        let poison = enqueue(&h.queue, "c.bmp", 16, 16).await;
        let dead_letter = h
            .dir
            .path()
            .join("dead-letter")
            .join(format!("{poison}.json"));

        let Harness {
            dir: _dir,
            store,
            worker,
            ..
        } = h;
        let worker = Arc::new(worker);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn({
            let worker = Arc::clone(&worker);
            async move { worker.run(rx).await }
        });

        for _ in 0..500 {
            if store.write_count().await == 2 && dead_letter.is_file() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();
        let stats = handle.await.unwrap();

        // c.bmp is abandoned on each of its five deliveries, then dead-lettered.
        assert_eq!(
            stats,
            RunStats {
                completed: 2,
                abandoned: 5
            }
        );
        assert_eq!(
            store.list("resize-images").await,
            vec!["resize_a.png", "resize_b.gif"]
        );
    }

    #[tokio::test]
    async fn run_returns_immediately_when_already_stopped() {
        let h = harness(Arc::new(MockBackend::with_source(10, 10))).await;
        let (_tx, rx) = watch::channel(true);
        assert_eq!(h.worker.run(rx).await, RunStats::default());
    }
}
