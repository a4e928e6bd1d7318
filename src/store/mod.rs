//! Key/value store access.
//!
//! This module provides:
//! - The host store contract ([`KeyStore`])
//! - The closed set of value kinds and their rendering
//! - An in-memory store with fault injection, loadable from JSON snapshots

mod kind;
mod memory;
mod render;
mod snapshot;
mod traits;

pub use kind::ValueKind;
pub use memory::{KeyFaults, MemoryStore, NodeId, StoredValue};
pub use render::{
    decode_multi_text, decode_text, encode_multi_text, encode_text, parse_hex, render,
    render_lossy, render_raw, to_hex, RenderedValue, MULTI_STRING_SEPARATOR,
};
pub use snapshot::{
    load_snapshot, SnapshotData, SnapshotKey, SnapshotKind, SnapshotValue, StoreSnapshot,
};
pub use traits::{KeyStat, KeyStore, RawRead};

/// Separator between path segments.
pub const PATH_SEPARATOR: char = '\\';

/// Roots enumerated when none are configured, in scan order.
pub const DEFAULT_ROOTS: [&str; 5] = [
    "HKEY_CLASSES_ROOT",
    "HKEY_CURRENT_USER",
    "HKEY_LOCAL_MACHINE",
    "HKEY_USERS",
    "HKEY_CURRENT_CONFIG",
];

/// Join a parent path and a child name.
#[must_use]
pub fn join_path(parent: &str, child: &str) -> String {
    let mut path = String::with_capacity(parent.len() + child.len() + 1);
    path.push_str(parent);
    path.push(PATH_SEPARATOR);
    path.push_str(child);
    path
}
