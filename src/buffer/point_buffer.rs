//! Thread-safe sample queue with disk spill/restore

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{debug, info, warn};

use waymesh_shared::LocationPoint;

/// Ordered queue of pending location samples.
///
/// One short-held mutex guards all mutation; no I/O happens under the lock.
/// The sensor side only appends, the upload side only drains, and failed
/// batches come back via [`requeue_front`](PointBuffer::requeue_front) so
/// original order is preserved.
pub struct PointBuffer {
    inner: Mutex<VecDeque<LocationPoint>>,
    path: PathBuf,
}

impl PointBuffer {
    /// Create an empty buffer backed by the given spill file
    pub fn new(path: PathBuf) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            path,
        }
    }

    /// Append a sample
    pub fn add(&self, sample: LocationPoint) {
        self.lock().push_back(sample);
    }

    /// Number of buffered samples
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Atomically remove and return the entire contents
    pub fn drain_all(&self) -> Vec<LocationPoint> {
        self.lock().drain(..).collect()
    }

    /// Atomically prepend a previously drained batch, preserving its order
    pub fn requeue_front(&self, batch: Vec<LocationPoint>) {
        let mut queue = self.lock();
        for sample in batch.into_iter().rev() {
            queue.push_front(sample);
        }
    }

    /// Write the current contents to the spill file.
    ///
    /// Snapshot is taken under the lock, the write happens outside it. The
    /// file is replaced atomically via a temp-and-rename so a crash mid-write
    /// leaves the previous checkpoint intact.
    pub async fn persist(&self) -> Result<()> {
        let snapshot: Vec<LocationPoint> = self.lock().iter().cloned().collect();

        if snapshot.is_empty() {
            return self.clear_persisted().await;
        }

        let json = serde_json::to_vec(&snapshot).context("serializing pending buffer")?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;

        debug!("Persisted {} pending samples", snapshot.len());
        Ok(())
    }

    /// Restore persisted samples, prepending them ahead of anything added
    /// since process start, then delete the file so a crash mid-restore
    /// cannot duplicate data on the next boot.
    ///
    /// Call once at startup. Returns the number of recovered samples.
    pub async fn restore(&self) -> Result<usize> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e).with_context(|| format!("reading {}", self.path.display())),
        };

        let recovered: Vec<LocationPoint> = match serde_json::from_slice(&data) {
            Ok(points) => points,
            Err(e) => {
                // A corrupt spill file must not take tracking down
                warn!("Discarding unreadable spill file: {e}");
                let _ = fs::remove_file(&self.path).await;
                return Ok(0);
            }
        };

        let count = recovered.len();
        self.requeue_front(recovered);
        fs::remove_file(&self.path)
            .await
            .with_context(|| format!("deleting {}", self.path.display()))?;

        if count > 0 {
            info!("Restored {count} pending samples from previous run");
        }
        Ok(count)
    }

    /// Delete the spill file after a successful upload
    pub async fn clear_persisted(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("deleting {}", self.path.display())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<LocationPoint>> {
        // Samples are plain data; a poisoned lock means a panic mid-push,
        // and the queue is still structurally sound.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample(n: u32) -> LocationPoint {
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
            + chrono::Duration::seconds(n as i64);
        LocationPoint::new(59.0 + n as f64 * 0.001, 10.0, ts)
    }

    fn temp_buffer() -> (tempfile::TempDir, PointBuffer) {
        let dir = tempfile::tempdir().unwrap();
        let buffer = PointBuffer::new(dir.path().join("pending.json"));
        (dir, buffer)
    }

    #[test]
    fn test_drain_returns_everything_in_order() {
        let (_dir, buffer) = temp_buffer();
        for n in 0..5 {
            buffer.add(sample(n));
        }
        let drained = buffer.drain_all();
        assert_eq!(drained.len(), 5);
        assert_eq!(drained[0], sample(0));
        assert_eq!(drained[4], sample(4));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_empty_returns_empty() {
        let (_dir, buffer) = temp_buffer();
        assert!(buffer.drain_all().is_empty());
    }

    #[test]
    fn test_requeue_then_drain_restores_exact_batch() {
        let (_dir, buffer) = temp_buffer();
        let batch: Vec<_> = (0..5).map(sample).collect();
        buffer.requeue_front(batch.clone());
        assert_eq!(buffer.drain_all(), batch);
    }

    #[test]
    fn test_requeued_batch_sits_ahead_of_new_samples() {
        let (_dir, buffer) = temp_buffer();
        buffer.add(sample(10));
        buffer.requeue_front(vec![sample(0), sample(1)]);
        let drained = buffer.drain_all();
        assert_eq!(drained, vec![sample(0), sample(1), sample(10)]);
    }

    #[tokio::test]
    async fn test_persist_restore_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");

        let buffer = PointBuffer::new(path.clone());
        for n in 0..3 {
            buffer.add(sample(n));
        }
        buffer.persist().await.unwrap();

        // New process: samples added before restore runs
        let reborn = PointBuffer::new(path.clone());
        reborn.add(sample(99));
        let recovered = reborn.restore().await.unwrap();
        assert_eq!(recovered, 3);

        // Persisted samples come strictly before the new ones
        let drained = reborn.drain_all();
        assert_eq!(drained.len(), 4);
        assert_eq!(drained[0], sample(0));
        assert_eq!(drained[2], sample(2));
        assert_eq!(drained[3], sample(99));

        // Replay once: the file is gone
        assert!(!path.exists());
        assert_eq!(reborn.restore().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_restore_missing_file_is_noop() {
        let (_dir, buffer) = temp_buffer();
        assert_eq!(buffer.restore().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_restore_corrupt_file_discards_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");
        fs::write(&path, b"not json").await.unwrap();

        let buffer = PointBuffer::new(path.clone());
        assert_eq!(buffer.restore().await.unwrap(), 0);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_persist_empty_buffer_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");

        let buffer = PointBuffer::new(path.clone());
        buffer.add(sample(0));
        buffer.persist().await.unwrap();
        assert!(path.exists());

        buffer.drain_all();
        buffer.persist().await.unwrap();
        assert!(!path.exists());
    }
}
