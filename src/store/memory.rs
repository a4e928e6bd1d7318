//! In-memory key/value store.
//!
//! Backs the CLI (loaded from a JSON snapshot) and the tests. Keys live in an
//! arena and handles are arena indices, so a `MemoryStore` is cheap to share
//! behind an `Arc`. Faults can be injected per key or per value to exercise
//! every failure path of a walk.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::kind::ValueKind;
use super::traits::{KeyStat, KeyStore, RawRead};
use crate::error::StoreError;

/// Handle to a key in a [`MemoryStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Failures to inject on a key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyFaults {
    /// Opening the key fails.
    pub open: bool,
    /// `stat` fails.
    pub stat: bool,
    /// Listing child names fails.
    pub subkeys: bool,
    /// Listing value names fails.
    pub values: bool,
}

/// A stored value.
#[derive(Debug, Clone)]
pub struct StoredValue {
    pub name: String,
    pub code: u32,
    pub data: Vec<u8>,
    /// Every read fails.
    pub unreadable: bool,
    /// Every read reports a buffer one byte too small, as if the value kept
    /// growing between calls.
    pub growing: bool,
}

impl StoredValue {
    /// Create a value of a known kind.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ValueKind, data: Vec<u8>) -> Self {
        Self::raw(name, kind.code(), data)
    }

    /// Create a value with an arbitrary kind code.
    #[must_use]
    pub fn raw(name: impl Into<String>, code: u32, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            code,
            data,
            unreadable: false,
            growing: false,
        }
    }

    /// Make every read of this value fail.
    #[must_use]
    pub fn unreadable(mut self) -> Self {
        self.unreadable = true;
        self
    }

    /// Make every read of this value report a short buffer.
    #[must_use]
    pub fn growing(mut self) -> Self {
        self.growing = true;
        self
    }
}

#[derive(Debug, Default)]
struct Node {
    name: String,
    values: Vec<StoredValue>,
    children: Vec<NodeId>,
    by_name: HashMap<String, NodeId>,
    faults: KeyFaults,
}

/// Arena-backed store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    nodes: Vec<Node>,
    roots: HashMap<String, NodeId>,
    reads: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root key. Re-adding a name returns the existing root.
    pub fn add_root(&mut self, name: impl Into<String>) -> NodeId {
        let name = name.into();
        if let Some(id) = self.roots.get(&name) {
            return *id;
        }
        let id = self.push_node(name.clone());
        self.roots.insert(name, id);
        id
    }

    /// Add a child key under `parent`. Re-adding a name returns the
    /// existing child, so sibling names stay unique.
    pub fn add_key(&mut self, parent: NodeId, name: impl Into<String>) -> NodeId {
        let name = name.into();
        if let Some(id) = self.child(parent, &name) {
            return id;
        }
        let id = self.push_node(name.clone());
        let node = &mut self.nodes[parent.0];
        node.children.push(id);
        node.by_name.insert(name, id);
        id
    }

    /// Child of `parent` named `name`, if any.
    #[must_use]
    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.nodes.get(parent.0)?.by_name.get(name).copied()
    }

    /// Add a value to a key.
    pub fn add_value(&mut self, key: NodeId, value: StoredValue) {
        self.nodes[key.0].values.push(value);
    }

    /// Inject failures on a key.
    pub fn set_faults(&mut self, key: NodeId, faults: KeyFaults) {
        self.nodes[key.0].faults = faults;
    }

    /// Names of all roots, sorted.
    #[must_use]
    pub fn root_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.roots.keys().cloned().collect();
        names.sort();
        names
    }

    /// Total number of keys in the store.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of `read_value` calls served so far.
    #[must_use]
    pub fn read_attempts(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    fn push_node(&mut self, name: String) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name,
            ..Node::default()
        });
        id
    }

    fn node(&self, id: NodeId) -> Result<&Node, StoreError> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| StoreError::access(format!("invalid handle {}", id.0)))
    }
}

impl KeyStore for MemoryStore {
    type Key = NodeId;

    fn open_root(&self, root: &str) -> Result<NodeId, StoreError> {
        let id = *self
            .roots
            .get(root)
            .ok_or_else(|| StoreError::access(format!("no such root '{root}'")))?;
        if self.node(id)?.faults.open {
            return Err(StoreError::access("access denied"));
        }
        Ok(id)
    }

    fn open_child(&self, parent: &NodeId, name: &str) -> Result<NodeId, StoreError> {
        let id = *self
            .node(*parent)?
            .by_name
            .get(name)
            .ok_or_else(|| StoreError::access(format!("no such key '{name}'")))?;
        if self.node(id)?.faults.open {
            return Err(StoreError::access("access denied"));
        }
        Ok(id)
    }

    fn stat(&self, key: &NodeId) -> Result<KeyStat, StoreError> {
        let node = self.node(*key)?;
        if node.faults.stat {
            return Err(StoreError::access("stat failed"));
        }
        Ok(KeyStat {
            value_count: node.values.len(),
            subkey_count: node.children.len(),
        })
    }

    fn subkey_names(&self, key: &NodeId) -> Result<Vec<String>, StoreError> {
        let node = self.node(*key)?;
        if node.faults.subkeys {
            return Err(StoreError::access("cannot enumerate subkeys"));
        }
        Ok(node
            .children
            .iter()
            .map(|c| self.nodes[c.0].name.clone())
            .collect())
    }

    fn value_names(&self, key: &NodeId) -> Result<Vec<String>, StoreError> {
        let node = self.node(*key)?;
        if node.faults.values {
            return Err(StoreError::access("cannot enumerate values"));
        }
        Ok(node.values.iter().map(|v| v.name.clone()).collect())
    }

    fn read_value(
        &self,
        key: &NodeId,
        name: &str,
        buf: &mut [u8],
    ) -> Result<RawRead, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        let value = self
            .node(*key)?
            .values
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| StoreError::access(format!("no such value '{name}'")))?;

        if value.unreadable {
            return Err(StoreError::access("read failed"));
        }
        if value.growing {
            return Err(StoreError::BufferTooSmall {
                required: buf.len().max(value.data.len()) + 1,
            });
        }
        if buf.len() < value.data.len() {
            return Err(StoreError::BufferTooSmall {
                required: value.data.len(),
            });
        }

        buf[..value.data.len()].copy_from_slice(&value.data);
        Ok(RawRead {
            len: value.data.len(),
            kind_code: value.code,
        })
    }
}
