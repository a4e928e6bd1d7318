//! Append-only collection of every entry seen during a session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use super::entry::{Entry, SharedEntry};
use crate::metrics;

#[derive(Debug, Default)]
struct Inner {
    entries: RwLock<Vec<SharedEntry>>,
    complete: AtomicBool,
    done: Notify,
}

/// Shared, append-only entry set.
///
/// Clones share the same storage. Appends are serialized; readers get
/// point-in-time snapshots and never observe a half-written entry.
#[derive(Debug, Clone, Default)]
pub struct CollectedStore {
    inner: Arc<Inner>,
}

impl CollectedStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry.
    pub fn append(&self, entry: Entry) {
        let len = {
            let mut entries = self.inner.entries.write();
            entries.push(Arc::new(entry));
            entries.len()
        };
        metrics::ENTRIES_COLLECTED.set(i64::try_from(len).unwrap_or(i64::MAX));
    }

    /// Number of entries collected so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Whether nothing has been collected yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current entries, in arrival order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SharedEntry> {
        self.inner.entries.read().clone()
    }

    /// Whether the scan feeding this store has finished.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.inner.complete.load(Ordering::Acquire)
    }

    /// Wait until the scan feeding this store has finished.
    pub async fn wait_complete(&self) {
        loop {
            let notified = self.inner.done.notified();
            if self.is_complete() {
                return;
            }
            notified.await;
        }
    }

    /// Drain `rx` into the store until it closes or `cancel` fires, then
    /// mark the scan complete. Returns the number of entries collected.
    pub async fn collect(
        &self,
        mut rx: mpsc::Receiver<Entry>,
        cancel: CancellationToken,
    ) -> usize {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!(collected = self.len(), "Collection cancelled");
                    break;
                }
                entry = rx.recv() => match entry {
                    Some(entry) => self.append(entry),
                    None => {
                        tracing::info!(collected = self.len(), "Scan complete");
                        break;
                    }
                },
            }
        }
        self.mark_complete();
        self.len()
    }

    fn mark_complete(&self) {
        self.inner.complete.store(true, Ordering::Release);
        self.inner.done.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_append_and_snapshot() {
        let store = CollectedStore::new();
        assert!(store.is_empty());

        store.append(Entry::container("A"));
        let before = store.snapshot();
        store.append(Entry::container("B"));

        assert_eq!(before.len(), 1);
        assert_eq!(store.len(), 2);
        let paths: Vec<String> = store
            .snapshot()
            .iter()
            .map(|e| e.path().to_string())
            .collect();
        assert_eq!(paths, vec!["A", "B"]);
    }

    #[test]
    fn test_clones_share_storage() {
        let store = CollectedStore::new();
        let other = store.clone();
        other.append(Entry::container("A"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_collect_drains_and_completes() {
        let store = CollectedStore::new();
        let (tx, rx) = mpsc::channel(1);

        let collector = {
            let store = store.clone();
            tokio::spawn(async move { store.collect(rx, CancellationToken::new()).await })
        };

        for i in 0..20 {
            tx.send(Entry::container(format!("K{i}"))).await.unwrap();
        }
        assert!(!store.is_complete());
        drop(tx);

        tokio::time::timeout(Duration::from_secs(5), store.wait_complete())
            .await
            .unwrap();
        assert_eq!(collector.await.unwrap(), 20);
        assert!(store.is_complete());
    }

    #[tokio::test]
    async fn test_collect_stops_on_cancel() {
        let store = CollectedStore::new();
        let (tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(store.collect(rx, cancel).await, 0);
        assert!(store.is_complete());
        assert!(tx.send(Entry::container("late")).await.is_err());
    }
}
