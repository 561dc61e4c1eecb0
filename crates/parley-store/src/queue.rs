//! Durable retry queue.
//!
//! Payloads that could not be delivered because of a transport failure are
//! kept in order and retried by [`OfflineQueue::flush`]. The queue is
//! persisted as one JSON document after every change.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::storage::{load_json, save_json, Result, Storage};

/// Default storage key for the queue document.
pub const QUEUE_KEY: &str = "parley.queue";

/// A queued payload with retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedItem<T> {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Number of failed deliveries so far
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub payload: T,
}

/// Outcome of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// Items delivered and removed
    pub processed: usize,
    /// Items whose handler failed; they stay queued
    pub failed: usize,
    /// Items left in the queue afterwards
    pub remaining: usize,
}

/// Persistent FIFO of payloads awaiting delivery.
pub struct OfflineQueue<T> {
    storage: Arc<dyn Storage>,
    key: String,
    items: Mutex<Vec<QueuedItem<T>>>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> OfflineQueue<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// Load the queue stored under [`QUEUE_KEY`].
    pub async fn load(storage: Arc<dyn Storage>) -> Result<Self> {
        Self::load_with_key(storage, QUEUE_KEY).await
    }

    /// Load a queue stored under a custom key.
    pub async fn load_with_key(storage: Arc<dyn Storage>, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let items: Vec<QueuedItem<T>> = load_json(storage.as_ref(), &key)
            .await?
            .unwrap_or_default();
        debug!(key = %key, count = items.len(), "Loaded offline queue");
        Ok(Self {
            storage,
            key,
            items: Mutex::new(items),
            _payload: PhantomData,
        })
    }

    async fn persist(&self, items: &[QueuedItem<T>]) -> Result<()> {
        save_json(self.storage.as_ref(), &self.key, items).await
    }

    /// Append a payload. Returns the new item's id.
    pub async fn enqueue(&self, payload: T) -> Result<String> {
        let item = QueuedItem {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            attempts: 0,
            last_error: None,
            payload,
        };
        let id = item.id.clone();

        let mut items = self.items.lock().await;
        items.push(item);
        self.persist(&items).await?;

        info!(id = %id, queued = items.len(), "Request queued");
        Ok(id)
    }

    /// Deliver every queued item in order.
    ///
    /// Successful items are removed. Failed items stay queued with their
    /// attempt count incremented and the error recorded. Items enqueued while
    /// the flush is running are kept and not delivered in this pass.
    pub async fn flush<F, Fut, E>(&self, mut handler: F) -> Result<FlushReport>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
        E: fmt::Display,
    {
        let snapshot = self.items.lock().await.clone();
        if snapshot.is_empty() {
            return Ok(FlushReport::default());
        }

        let mut delivered = Vec::new();
        let mut failures = Vec::new();
        for item in snapshot {
            match handler(item.payload).await {
                Ok(()) => delivered.push(item.id),
                Err(e) => {
                    warn!(id = %item.id, attempts = item.attempts + 1, error = %e, "Queued request failed");
                    failures.push((item.id, e.to_string()));
                }
            }
        }

        let mut items = self.items.lock().await;
        items.retain(|item| !delivered.contains(&item.id));
        for (id, error) in &failures {
            if let Some(item) = items.iter_mut().find(|item| &item.id == id) {
                item.attempts += 1;
                item.last_error = Some(error.clone());
            }
        }
        self.persist(&items).await?;

        let report = FlushReport {
            processed: delivered.len(),
            failed: failures.len(),
            remaining: items.len(),
        };
        info!(
            processed = report.processed,
            failed = report.failed,
            remaining = report.remaining,
            "Offline queue flushed"
        );
        Ok(report)
    }

    /// Snapshot of queued items, oldest first.
    pub async fn list(&self) -> Vec<QueuedItem<T>> {
        self.items.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    /// Remove an item by id.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let mut items = self.items.lock().await;
        let before = items.len();
        items.retain(|item| item.id != id);
        let removed = items.len() < before;
        if removed {
            self.persist(&items).await?;
        }
        Ok(removed)
    }

    pub async fn clear(&self) -> Result<()> {
        let mut items = self.items.lock().await;
        items.clear();
        self.persist(&items).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryStorage, SqliteStorage};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        text: String,
    }

    fn payload(text: &str) -> Payload {
        Payload { text: text.into() }
    }

    async fn create_test_queue() -> (OfflineQueue<Payload>, Arc<InMemoryStorage>) {
        let storage = Arc::new(InMemoryStorage::new());
        let queue = OfflineQueue::load(storage.clone()).await.unwrap();
        (queue, storage)
    }

    #[tokio::test]
    async fn test_flush_partial_failure() {
        let (queue, _) = create_test_queue().await;
        queue.enqueue(payload("first")).await.unwrap();
        let second_id = queue.enqueue(payload("second")).await.unwrap();

        let report = queue
            .flush(|p: Payload| async move {
                if p.text == "first" {
                    Ok(())
                } else {
                    Err("connection refused")
                }
            })
            .await
            .unwrap();

        assert_eq!(
            report,
            FlushReport {
                processed: 1,
                failed: 1,
                remaining: 1
            }
        );

        let remaining = queue.list().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, second_id);
        assert_eq!(remaining[0].payload, payload("second"));
        assert_eq!(remaining[0].attempts, 1);
        assert_eq!(remaining[0].last_error.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_flush_preserves_order() {
        let (queue, _) = create_test_queue().await;
        for text in ["a", "b", "c"] {
            queue.enqueue(payload(text)).await.unwrap();
        }

        let mut seen = Vec::new();
        let report = queue
            .flush(|p: Payload| {
                seen.push(p.text);
                async { Ok::<(), String>(()) }
            })
            .await
            .unwrap();

        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(report.processed, 3);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_flush_empty_queue() {
        let (queue, _) = create_test_queue().await;
        let report = queue
            .flush(|_p: Payload| async { Ok::<(), String>(()) })
            .await
            .unwrap();
        assert_eq!(report, FlushReport::default());
    }

    #[tokio::test]
    async fn test_queue_survives_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let storage: Arc<dyn Storage> =
            Arc::new(SqliteStorage::open(dir.path().join("parley.db")).unwrap());

        let queue: OfflineQueue<Payload> = OfflineQueue::load(storage.clone()).await.unwrap();
        let id = queue.enqueue(payload("keep")).await.unwrap();
        drop(queue);

        let queue: OfflineQueue<Payload> = OfflineQueue::load(storage).await.unwrap();
        assert_eq!(queue.len().await, 1);
        assert!(queue.remove(&id).await.unwrap());
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_clear() {
        let (queue, storage) = create_test_queue().await;
        queue.enqueue(payload("x")).await.unwrap();
        queue.clear().await.unwrap();

        let reloaded: OfflineQueue<Payload> = OfflineQueue::load(storage).await.unwrap();
        assert!(reloaded.is_empty().await);
    }
}
