//! JSON store snapshots.
//!
//! A snapshot describes roots, keys and typed values; loading one builds a
//! [`MemoryStore`] the pipeline can walk exactly like a host store.

use std::path::Path;

use serde::Deserialize;

use super::kind::ValueKind;
use super::memory::{MemoryStore, NodeId, StoredValue};
use super::render::{encode_multi_text, encode_text, parse_hex};
use super::join_path;
use super::traits::KeyStore;
use crate::{Error, Result};

/// Top-level snapshot document.
#[derive(Debug, Deserialize)]
pub struct StoreSnapshot {
    pub roots: Vec<SnapshotKey>,
}

/// A key with its values and children.
#[derive(Debug, Deserialize)]
pub struct SnapshotKey {
    pub name: String,
    #[serde(default)]
    pub values: Vec<SnapshotValue>,
    #[serde(default)]
    pub keys: Vec<SnapshotKey>,
}

/// A named, typed value.
#[derive(Debug, Deserialize)]
pub struct SnapshotValue {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SnapshotKind,
    #[serde(default)]
    pub data: Option<SnapshotData>,
}

/// Value kind, as a display tag or a raw code.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SnapshotKind {
    Code(u32),
    Tag(String),
}

/// Value payload.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SnapshotData {
    Integer(u64),
    Text(String),
    List(Vec<String>),
}

impl StoreSnapshot {
    /// Parse a snapshot from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid snapshot document.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Build a store holding this snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if a value type is unknown or its data does not fit
    /// the type.
    pub fn into_store(self) -> Result<MemoryStore> {
        let mut store = MemoryStore::new();
        for root in self.roots {
            let name = root.name.clone();
            if store.open_root(&name).is_ok() {
                return Err(Error::snapshot(format!("duplicate root '{name}'")));
            }
            let id = store.add_root(name.clone());
            fill_key(&mut store, id, &name, root)?;
        }
        Ok(store)
    }
}

/// Load a snapshot file into a store.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid snapshot.
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<MemoryStore> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let store = StoreSnapshot::from_json(&text)?.into_store()?;
    tracing::info!(
        path = %path.display(),
        roots = store.root_names().len(),
        keys = store.key_count(),
        "Loaded store snapshot"
    );
    Ok(store)
}

fn fill_key(store: &mut MemoryStore, id: NodeId, path: &str, key: SnapshotKey) -> Result<()> {
    for value in key.values {
        let stored = encode_value(path, value)?;
        store.add_value(id, stored);
    }
    for child in key.keys {
        let child_path = join_path(path, &child.name);
        if store.child(id, &child.name).is_some() {
            return Err(Error::snapshot(format!("duplicate key '{child_path}'")));
        }
        let child_id = store.add_key(id, child.name.clone());
        fill_key(store, child_id, &child_path, child)?;
    }
    Ok(())
}

fn encode_value(path: &str, value: SnapshotValue) -> Result<StoredValue> {
    let code = match &value.kind {
        SnapshotKind::Code(code) => *code,
        SnapshotKind::Tag(tag) => ValueKind::from_tag(tag)
            .ok_or_else(|| {
                Error::snapshot(format!(
                    "unknown value type '{tag}' for '{}' under '{path}'",
                    value.name
                ))
            })?
            .code(),
    };

    let mismatch = || {
        Error::snapshot(format!(
            "data does not fit type code {code} for '{}' under '{path}'",
            value.name
        ))
    };

    let data = match (ValueKind::from_code(code), value.data.as_ref()) {
        (_, None) => Vec::new(),
        (
            Some(ValueKind::String | ValueKind::ExpandString | ValueKind::Link),
            Some(SnapshotData::Text(text)),
        ) => encode_text(text),
        (
            Some(ValueKind::Binary | ValueKind::FullResourceDescriptor),
            Some(SnapshotData::Text(hex)),
        ) => parse_hex(hex).ok_or_else(mismatch)?,
        (Some(ValueKind::Dword), Some(SnapshotData::Integer(n))) => u32::try_from(*n)
            .map_err(|_| mismatch())?
            .to_le_bytes()
            .to_vec(),
        (Some(ValueKind::DwordBigEndian), Some(SnapshotData::Integer(n))) => u32::try_from(*n)
            .map_err(|_| mismatch())?
            .to_be_bytes()
            .to_vec(),
        (Some(ValueKind::Qword), Some(SnapshotData::Integer(n))) => n.to_le_bytes().to_vec(),
        (Some(ValueKind::MultiString), Some(SnapshotData::List(parts))) => {
            encode_multi_text(parts)
        }
        (Some(ValueKind::MultiString), Some(SnapshotData::Text(text))) => {
            encode_multi_text(&[text])
        }
        (
            Some(ValueKind::ResourceList | ValueKind::ResourceRequirementsList) | None,
            Some(SnapshotData::Text(text)),
        ) => text.as_bytes().to_vec(),
        _ => return Err(mismatch()),
    };

    Ok(StoredValue::raw(value.name, code, data))
}
