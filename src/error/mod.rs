//! Error types and Result aliases for regfind.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.
//!
//! Store failures met while walking are never fatal to a session: the
//! pipeline logs them and carries on with whatever it can still read.

use thiserror::Error;

/// Result type alias using regfind's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for regfind operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Key/value store access error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Pipeline wiring error.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Store snapshot could not be turned into a store.
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// An entry could not be handed to the activation command.
    #[error("cannot activate '{path}': {reason}")]
    Activation { path: String, reason: String },

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Store access errors.
///
/// The first four variants classify how far a failure reaches during a walk;
/// the others are what a store implementation reports for a single call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A root could not be opened.
    #[error("root '{root}' unavailable: {reason}")]
    RootUnavailable { root: String, reason: String },

    /// A key could not be inspected or listed.
    #[error("subtree '{path}' unreadable: {reason}")]
    SubtreeUnreadable { path: String, reason: String },

    /// A value's bytes could not be fetched.
    #[error("value '{name}' under '{path}' unreadable: {reason}")]
    ValueUnreadable {
        path: String,
        name: String,
        reason: String,
    },

    /// A value carries a kind code outside the known set.
    #[error("value '{name}' under '{path}' has unsupported type code {code}")]
    UnsupportedValueType { path: String, name: String, code: u32 },

    /// The caller's buffer cannot hold the value.
    #[error("buffer too small, {required} bytes required")]
    BufferTooSmall { required: usize },

    /// Host-level access failure.
    #[error("access failed: {0}")]
    Access(String),
}

/// Pipeline errors.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Fan-in requested over an empty source list.
    #[error("merger needs at least one source")]
    NoSources,

    /// A worker task panicked or was aborted.
    #[error("worker '{worker}' failed: {reason}")]
    WorkerFailed { worker: &'static str, reason: String },
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a snapshot error.
    pub fn snapshot(msg: impl Into<String>) -> Self {
        Self::Snapshot(msg.into())
    }
}

impl StoreError {
    /// Create a host access error.
    pub fn access(msg: impl Into<String>) -> Self {
        Self::Access(msg.into())
    }

    /// Create a root-unavailable error.
    pub fn root_unavailable(root: impl Into<String>, reason: impl ToString) -> Self {
        Self::RootUnavailable {
            root: root.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a subtree-unreadable error.
    pub fn subtree_unreadable(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::SubtreeUnreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a value-unreadable error.
    pub fn value_unreadable(
        path: impl Into<String>,
        name: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::ValueUnreadable {
            path: path.into(),
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

impl PipelineError {
    /// Create a worker failure from a join error or similar.
    pub fn worker_failed(worker: &'static str, reason: impl ToString) -> Self {
        Self::WorkerFailed {
            worker,
            reason: reason.to_string(),
        }
    }
}
