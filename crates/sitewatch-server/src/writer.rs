//! Background writer applying queued store operations in order.

use crate::metrics::MetricsRegistry;
use crate::store::{StoreError, TargetStore};
use crate::types::StoreOp;
use sitewatch::{PersistHook, Target, TargetId};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Cheap handle for enqueueing store operations
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreOp>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl StoreHandle {
    /// Enqueue without waiting. A full queue drops the op; the next check
    /// of that target re-persists it.
    pub fn enqueue(&self, op: StoreOp) {
        if let Err(e) = self.tx.try_send(op) {
            let reason = e.to_string();
            let op = e.into_inner();
            warn!(op = op.name(), error = %reason, "Dropped store operation");
            if let Some(ref m) = self.metrics {
                m.record_store_error(op.name());
            }
        }
    }

    pub fn save(&self, target: &Target) {
        self.enqueue(StoreOp::Save(target.clone()));
    }

    /// Queue a delete, waiting for room when the queue is full.
    ///
    /// A dropped delete would leave the record to be replayed on restart,
    /// and no later check re-persists a removed target.
    pub async fn delete(&self, id: TargetId) {
        if self.tx.send(StoreOp::Delete(id)).await.is_err() {
            warn!(id, "Store writer gone, delete not persisted");
            if let Some(ref m) = self.metrics {
                m.record_store_error("delete");
            }
        }
    }

    /// Wait until everything queued so far is applied and flushed.
    ///
    /// Returns false if the writer is gone.
    pub async fn flush(&self) -> bool {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(StoreOp::Flush(done_tx)).await.is_err() {
            return false;
        }
        done_rx.await.is_ok()
    }

    /// Persistence hook for the monitor
    pub fn hook(&self) -> PersistHook {
        let handle = self.clone();
        Arc::new(move |target: &Target| handle.save(target))
    }
}

/// Drains the store queue into the durable store
pub struct StoreWriter {
    rx: mpsc::Receiver<StoreOp>,
    store: TargetStore,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl StoreWriter {
    /// Create a writer and the handle feeding it
    pub fn new(
        store: TargetStore,
        queue_size: usize,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> (Self, StoreHandle) {
        let (tx, rx) = mpsc::channel(queue_size);
        let handle = StoreHandle {
            tx,
            metrics: metrics.clone(),
        };
        (Self { rx, store, metrics }, handle)
    }

    /// Run until every handle is dropped, then flush
    pub async fn run(mut self) {
        info!("Store writer started");

        while let Some(op) = self.rx.recv().await {
            self.apply(op).await;
        }

        if let Err(e) = self.store.flush().await {
            warn!(error = %e, "Failed to flush store");
        }
        info!("Store writer stopped");
    }

    async fn apply(&self, op: StoreOp) {
        let op_name = op.name();
        let result: Result<(), StoreError> = match op {
            StoreOp::Save(target) => {
                debug!(id = target.id, "Saving target");
                self.store.save(&target)
            }
            StoreOp::Delete(id) => {
                debug!(id, "Deleting target");
                self.store.delete(id)
            }
            StoreOp::Flush(done) => {
                let result = self.store.flush().await;
                let _ = done.send(());
                result
            }
        };

        if let Err(e) = result {
            warn!(op = op_name, error = %e, "Error writing target to store");
            if let Some(ref m) = self.metrics {
                m.record_store_error(op_name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, TargetStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TargetStore::open(dir.path().join("websites.db")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_ops_applied_in_order() {
        let (_dir, store) = open_temp();
        let (writer, handle) = StoreWriter::new(store.clone(), 16, None);
        tokio::spawn(writer.run());

        let mut target = Target::new(1, "http://a.test", "A", None);
        handle.save(&target);
        target.last_status_code = 200;
        handle.save(&target);
        handle.save(&Target::new(2, "http://b.test", "B", None));
        handle.delete(2).await;

        assert!(handle.flush().await);
        assert_eq!(store.load_all().unwrap(), vec![target]);
    }

    #[tokio::test]
    async fn test_hook_enqueues_save() {
        let (_dir, store) = open_temp();
        let (writer, handle) = StoreWriter::new(store.clone(), 16, None);
        tokio::spawn(writer.run());

        let hook = handle.hook();
        hook(&Target::new(7, "http://a.test", "A", None));

        assert!(handle.flush().await);
        assert_eq!(store.load_all().unwrap()[0].id, 7);
    }

    #[tokio::test]
    async fn test_full_queue_drops_and_counts() {
        let (_dir, store) = open_temp();
        let metrics = Arc::new(MetricsRegistry::new());
        // Writer not running, so the queue never drains
        let (_writer, handle) = StoreWriter::new(store, 1, Some(metrics.clone()));

        handle.save(&Target::new(1, "http://a.test", "A", None));
        handle.save(&Target::new(2, "http://b.test", "B", None));

        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"sitewatch_store_errors_total{op="save"} 1"#));
    }

    #[tokio::test]
    async fn test_delete_waits_for_room_in_full_queue() {
        let (_dir, store) = open_temp();
        store.save(&Target::new(1, "http://a.test", "A", None)).unwrap();
        let metrics = Arc::new(MetricsRegistry::new());
        let (writer, handle) = StoreWriter::new(store.clone(), 1, Some(metrics.clone()));

        // One pending save fills the queue
        handle.save(&Target::new(2, "http://b.test", "B", None));

        let deleting = tokio::spawn({
            let handle = handle.clone();
            async move { handle.delete(1).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!deleting.is_finished());

        tokio::spawn(writer.run());
        deleting.await.unwrap();
        assert!(handle.flush().await);

        let ids: Vec<_> = store.load_all().unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2]);
        assert!(!metrics.encode().unwrap().contains("sitewatch_store_errors_total{"));
    }

    #[tokio::test]
    async fn test_delete_without_writer_counts_error() {
        let (_dir, store) = open_temp();
        let metrics = Arc::new(MetricsRegistry::new());
        let (writer, handle) = StoreWriter::new(store, 1, Some(metrics.clone()));
        drop(writer);

        handle.delete(1).await;
        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"sitewatch_store_errors_total{op="delete"} 1"#));
    }

    #[tokio::test]
    async fn test_flush_without_writer() {
        let (_dir, store) = open_temp();
        let (writer, handle) = StoreWriter::new(store, 16, None);
        drop(writer);

        assert!(!handle.flush().await);
    }

    #[tokio::test]
    async fn test_writer_stops_when_handles_dropped() {
        let (_dir, store) = open_temp();
        let (writer, handle) = StoreWriter::new(store.clone(), 16, None);
        let task = tokio::spawn(writer.run());

        handle.save(&Target::new(3, "http://a.test", "A", None));
        drop(handle);

        task.await.unwrap();
        assert_eq!(store.load_all().unwrap().len(), 1);
    }
}
