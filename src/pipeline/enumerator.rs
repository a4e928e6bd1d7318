//! Depth-first enumeration of one root.
//!
//! A walk is a lazy iterator over [`Entry`] values driven by an explicit
//! work-list, so deep hierarchies never grow the call stack. Failures stay
//! local: an unreadable key drops its subtree, an unreadable value drops
//! that value, and the walk carries on.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::entry::Entry;
use crate::error::StoreError;
use crate::metrics;
use crate::observability::spans;
use crate::store::{join_path, render_lossy, render_raw, KeyStore, RawRead};

/// Default size of the first buffer offered for a value read.
pub const DEFAULT_READ_BUFFER: usize = 1024;

/// Enumeration statistics.
#[derive(Debug, Default)]
pub struct EnumerationStats {
    pub containers: AtomicU64,
    pub entries: AtomicU64,
    pub values_skipped: AtomicU64,
    pub unknown_types: AtomicU64,
    pub subtrees_abandoned: AtomicU64,
}

impl EnumerationStats {
    /// Create new stats.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get a snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> EnumerationStatsSnapshot {
        EnumerationStatsSnapshot {
            containers: self.containers.load(Ordering::Relaxed),
            entries: self.entries.load(Ordering::Relaxed),
            values_skipped: self.values_skipped.load(Ordering::Relaxed),
            unknown_types: self.unknown_types.load(Ordering::Relaxed),
            subtrees_abandoned: self.subtrees_abandoned.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of enumeration stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnumerationStatsSnapshot {
    pub containers: u64,
    pub entries: u64,
    pub values_skipped: u64,
    pub unknown_types: u64,
    pub subtrees_abandoned: u64,
}

/// Walks one root of a store.
pub struct Enumerator<S: KeyStore> {
    store: Arc<S>,
    root: String,
    initial_buffer: usize,
    stats: Arc<EnumerationStats>,
}

impl<S: KeyStore> Enumerator<S> {
    /// Create an enumerator for `root`.
    pub fn new(store: Arc<S>, root: impl Into<String>) -> Self {
        Self {
            store,
            root: root.into(),
            initial_buffer: DEFAULT_READ_BUFFER,
            stats: EnumerationStats::new(),
        }
    }

    /// Set the size of the first buffer offered for each value read.
    #[must_use]
    pub fn with_initial_buffer(mut self, size: usize) -> Self {
        self.initial_buffer = size.max(1);
        self
    }

    /// Root name, also the first path segment of every entry.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Shared stats for this enumerator.
    #[must_use]
    pub fn stats(&self) -> Arc<EnumerationStats> {
        Arc::clone(&self.stats)
    }

    /// Start a fresh walk.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RootUnavailable`] if the root cannot be opened.
    pub fn walk(&self) -> Result<Walk<'_, S>, StoreError> {
        let key = self.open_root()?;
        Ok(self.walk_from(key))
    }

    /// Start the walk on a blocking worker, streaming into a bounded channel.
    ///
    /// Returns `None` when the root cannot be opened; the caller treats that
    /// as a source that is already closed. The worker stops when the channel
    /// receiver is dropped or `cancel` fires.
    pub fn spawn(
        self,
        capacity: usize,
        cancel: CancellationToken,
    ) -> Option<mpsc::Receiver<Entry>> {
        let key = match self.open_root() {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(root = %self.root, error = %e, "Skipping unavailable root");
                metrics::ROOTS_UNAVAILABLE.inc();
                return None;
            }
        };

        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::task::spawn_blocking(move || self.stream(key, &tx, &cancel));
        Some(rx)
    }

    fn open_root(&self) -> Result<S::Key, StoreError> {
        self.store
            .open_root(&self.root)
            .map_err(|e| StoreError::root_unavailable(&self.root, e))
    }

    fn walk_from(&self, key: S::Key) -> Walk<'_, S> {
        Walk {
            enumerator: self,
            stack: vec![Pending {
                key: PendingKey::Open(key),
                path: self.root.clone(),
            }],
            current: None,
            buf: vec![0; self.initial_buffer],
        }
    }

    fn stream(&self, key: S::Key, tx: &mpsc::Sender<Entry>, cancel: &CancellationToken) {
        let span = spans::root_span(&self.root);
        let _guard = span.enter();
        tracing::info!("Starting root enumeration");

        for entry in self.walk_from(key) {
            if cancel.is_cancelled() {
                tracing::debug!("Enumeration cancelled");
                break;
            }
            if tx.blocking_send(entry).is_err() {
                tracing::debug!("Entry channel closed during enumeration");
                break;
            }
        }

        let snapshot = self.stats.snapshot();
        tracing::info!(
            containers = snapshot.containers,
            entries = snapshot.entries,
            values_skipped = snapshot.values_skipped,
            unknown_types = snapshot.unknown_types,
            subtrees_abandoned = snapshot.subtrees_abandoned,
            "Root enumeration complete"
        );
    }
}

enum PendingKey<K> {
    Open(K),
    Child { parent: Rc<K>, name: String },
}

struct Pending<K> {
    key: PendingKey<K>,
    path: String,
}

struct OpenKey<K> {
    key: Rc<K>,
    path: String,
    values: std::vec::IntoIter<String>,
}

/// A lazy, single-use walk of one root.
///
/// Pre-order: a container's sentinel, then its values, then each child
/// subtree in store order.
pub struct Walk<'a, S: KeyStore> {
    enumerator: &'a Enumerator<S>,
    stack: Vec<Pending<S::Key>>,
    current: Option<OpenKey<S::Key>>,
    buf: Vec<u8>,
}

impl<S: KeyStore> Walk<'_, S> {
    /// Open and inspect a pending key. Returns its sentinel, or `None` when
    /// the subtree has to be abandoned before anything was emitted.
    fn visit(&mut self, pending: Pending<S::Key>) -> Option<Entry> {
        let store = &self.enumerator.store;
        let stats = &self.enumerator.stats;
        let Pending { key, path } = pending;

        let key = match key {
            PendingKey::Open(key) => key,
            PendingKey::Child { parent, name } => match store.open_child(&parent, &name) {
                Ok(key) => key,
                Err(e) => {
                    abandon(stats, &StoreError::subtree_unreadable(&path, e));
                    return None;
                }
            },
        };

        let stat = match store.stat(&key) {
            Ok(stat) => stat,
            Err(e) => {
                abandon(stats, &StoreError::subtree_unreadable(&path, e));
                return None;
            }
        };

        let children = if stat.subkey_count == 0 {
            Vec::new()
        } else {
            match store.subkey_names(&key) {
                Ok(names) => names,
                Err(e) => {
                    abandon(stats, &StoreError::subtree_unreadable(&path, e));
                    return None;
                }
            }
        };

        stats.containers.fetch_add(1, Ordering::Relaxed);
        let sentinel = Entry::container(path.clone());

        let values = if stat.value_count == 0 {
            Vec::new()
        } else {
            match store.value_names(&key) {
                Ok(names) => names,
                Err(e) => {
                    abandon(stats, &StoreError::subtree_unreadable(&path, e));
                    return Some(sentinel);
                }
            }
        };

        let key = Rc::new(key);
        for name in children.into_iter().rev() {
            let child_path = join_path(&path, &name);
            self.stack.push(Pending {
                key: PendingKey::Child {
                    parent: Rc::clone(&key),
                    name,
                },
                path: child_path,
            });
        }

        if !values.is_empty() {
            self.current = Some(OpenKey {
                key,
                path,
                values: values.into_iter(),
            });
        }

        Some(sentinel)
    }

    /// Read a value, retrying once with an exactly-sized buffer.
    fn read(&mut self, key: &S::Key, path: &str, name: &str) -> Result<RawRead, StoreError> {
        let store = &self.enumerator.store;
        match store.read_value(key, name, &mut self.buf) {
            Ok(read) => Ok(read),
            Err(StoreError::BufferTooSmall { required }) => {
                let mut exact = vec![0; required];
                let read = store
                    .read_value(key, name, &mut exact)
                    .map_err(|e| StoreError::value_unreadable(path, name, e))?;
                self.buf = exact;
                Ok(read)
            }
            Err(e) => Err(StoreError::value_unreadable(path, name, e)),
        }
    }

    fn value_entry(&mut self, key: &S::Key, path: &str, name: &str) -> Result<Entry, StoreError> {
        let read = self.read(key, path, name)?;
        let data = self.buf.get(..read.len).ok_or_else(|| {
            StoreError::value_unreadable(path, name, "store reported more bytes than it wrote")
        })?;
        let Some(rendered) = render_raw(read.kind_code, data) else {
            let err = StoreError::UnsupportedValueType {
                path: path.to_string(),
                name: name.to_string(),
                code: read.kind_code,
            };
            tracing::debug!(error = %err, "Rendering value best-effort");
            self.enumerator
                .stats
                .unknown_types
                .fetch_add(1, Ordering::Relaxed);
            return Ok(Entry::new(path, name, "", render_lossy(data)));
        };
        Ok(Entry::new(path, name, rendered.kind.tag(), rendered.text))
    }

    fn next_value(&mut self) -> Option<Entry> {
        let mut open = self.current.take()?;
        while let Some(name) = open.values.next() {
            match self.value_entry(&open.key, &open.path, &name) {
                Ok(entry) => {
                    self.current = Some(open);
                    return Some(entry);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping value");
                    self.enumerator
                        .stats
                        .values_skipped
                        .fetch_add(1, Ordering::Relaxed);
                    metrics::VALUES_SKIPPED.inc();
                }
            }
        }
        None
    }
}

impl<S: KeyStore> Iterator for Walk<'_, S> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        let entry = loop {
            if let Some(entry) = self.next_value() {
                break entry;
            }
            let pending = self.stack.pop()?;
            if let Some(sentinel) = self.visit(pending) {
                break sentinel;
            }
        };
        self.enumerator.stats.entries.fetch_add(1, Ordering::Relaxed);
        Some(entry)
    }
}

fn abandon(stats: &EnumerationStats, err: &StoreError) {
    tracing::debug!(error = %err, "Abandoning subtree");
    stats.subtrees_abandoned.fetch_add(1, Ordering::Relaxed);
    metrics::SUBTREES_ABANDONED.inc();
}
