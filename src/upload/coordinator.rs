//! Upload coordinator
//!
//! Drains the point buffer in batches and posts them to the server. Failed
//! batches go back to the front of the buffer and onto disk; nothing is ever
//! dropped. A successful upload notifies the mesh relay so cached peer
//! positions ride along on the same connectivity window.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use waymesh_shared::LocationBatch;

use crate::buffer::PointBuffer;
use crate::upload::api::{ApiError, LocationApi};

/// What prompted a flush; log-only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Buffer reached the configured batch size
    BatchSize,
    /// Periodic max-buffer-age timer
    MaxAge,
    /// The platform is about to suspend the process
    Suspend,
    /// Tracking is stopping
    Shutdown,
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlushReason::BatchSize => "batch size",
            FlushReason::MaxAge => "max buffer age",
            FlushReason::Suspend => "app suspending",
            FlushReason::Shutdown => "shutdown",
        };
        write!(f, "{s}")
    }
}

/// Upload health, published for observers
#[derive(Debug, Clone, Default)]
pub struct UploadStatus {
    /// Most recent upload error, cleared on the next success
    pub last_error: Option<String>,
    /// Total points accepted by the server this run
    pub points_uploaded: u64,
    /// Total failed flush attempts this run
    pub failures: u64,
}

/// Drains the buffer into the server with retry-by-requeue semantics
pub struct UploadCoordinator {
    buffer: Arc<PointBuffer>,
    api: Arc<dyn LocationApi>,
    device_id: u64,
    status_tx: watch::Sender<UploadStatus>,
    relay_tx: mpsc::UnboundedSender<()>,
}

impl UploadCoordinator {
    /// Create a coordinator. Returns the upload-success notification stream
    /// (consumed by the mesh relay) and the status watch.
    pub fn new(
        buffer: Arc<PointBuffer>,
        api: Arc<dyn LocationApi>,
        device_id: u64,
    ) -> (
        Arc<Self>,
        mpsc::UnboundedReceiver<()>,
        watch::Receiver<UploadStatus>,
    ) {
        let (status_tx, status_rx) = watch::channel(UploadStatus::default());
        let (relay_tx, relay_rx) = mpsc::unbounded_channel();

        let coordinator = Arc::new(Self {
            buffer,
            api,
            device_id,
            status_tx,
            relay_tx,
        });
        (coordinator, relay_rx, status_rx)
    }

    /// Drain the buffer and upload one batch. Empty buffer is a no-op.
    ///
    /// On failure the exact batch is prepended back onto the buffer and
    /// persisted, and the error is surfaced for observability.
    pub async fn flush(&self, reason: FlushReason) -> Result<usize, ApiError> {
        let locations = self.buffer.drain_all();
        if locations.is_empty() {
            return Ok(0);
        }
        let count = locations.len();
        debug!("Flushing {count} samples ({reason})");

        let batch = LocationBatch {
            device_id: self.device_id,
            locations,
        };

        match self.api.upload_locations(&batch).await {
            Ok(resp) => {
                if let Err(e) = self.buffer.clear_persisted().await {
                    warn!("Failed to clear spill file after upload: {e}");
                }
                info!(
                    "Uploaded {count} samples (batch {}, {} visits detected)",
                    resp.batch_id, resp.visits_detected
                );
                self.status_tx.send_modify(|s| {
                    s.last_error = None;
                    s.points_uploaded += count as u64;
                });
                // Mesh relay rides the same connectivity window; best-effort
                let _ = self.relay_tx.send(());
                Ok(count)
            }
            Err(e) => {
                warn!("Upload of {count} samples failed, requeueing: {e}");
                self.buffer.requeue_front(batch.locations);
                if let Err(pe) = self.buffer.persist().await {
                    warn!("Failed to persist requeued batch: {pe}");
                }
                self.status_tx.send_modify(|s| {
                    s.last_error = Some(e.to_string());
                    s.failures += 1;
                });
                Err(e)
            }
        }
    }

    /// Run the flush loop: a periodic timer at the max-buffer-age interval
    /// plus on-demand requests from the tracking supervisor. The single
    /// consumer loop means flushes never overlap.
    pub fn spawn(
        self: &Arc<Self>,
        mut flush_rx: mpsc::Receiver<FlushReason>,
        max_buffer_age: Duration,
    ) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(max_buffer_age);
            // The immediate first tick would flush an empty buffer; skip it
            ticker.tick().await;

            loop {
                let reason = tokio::select! {
                    _ = ticker.tick() => FlushReason::MaxAge,
                    maybe_reason = flush_rx.recv() => match maybe_reason {
                        Some(reason) => reason,
                        None => break,
                    },
                };
                // Errors are already requeued and surfaced on the status watch
                let _ = coordinator.flush(reason).await;
            }

            info!("Upload loop stopped");
        })
    }
}
