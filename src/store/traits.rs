//! Host store contract.

use crate::error::StoreError;

/// Counts reported for an open key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyStat {
    /// Number of named values held by the key.
    pub value_count: usize,
    /// Number of direct child keys.
    pub subkey_count: usize,
}

/// Outcome of a successful value read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRead {
    /// Bytes written into the caller's buffer.
    pub len: usize,
    /// Raw kind code of the value.
    pub kind_code: u32,
}

/// Read-only access to a hierarchical key/value store.
///
/// Implementations are shared across enumeration workers, one per root,
/// so they must be `Send + Sync`. Every call may fail; the pipeline decides
/// how far a failure reaches.
pub trait KeyStore: Send + Sync + 'static {
    /// Handle to an open key.
    type Key: Send;

    /// Open one of the top-level roots by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the root does not exist or cannot be opened.
    fn open_root(&self, root: &str) -> Result<Self::Key, StoreError>;

    /// Open a direct child of an open key.
    ///
    /// # Errors
    ///
    /// Returns an error if the child cannot be opened.
    fn open_child(&self, parent: &Self::Key, name: &str) -> Result<Self::Key, StoreError>;

    /// Query value and child counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the key metadata cannot be read.
    fn stat(&self, key: &Self::Key) -> Result<KeyStat, StoreError>;

    /// List direct child names, in store order.
    ///
    /// # Errors
    ///
    /// Returns an error if the children cannot be listed.
    fn subkey_names(&self, key: &Self::Key) -> Result<Vec<String>, StoreError>;

    /// List value names, in store order.
    ///
    /// # Errors
    ///
    /// Returns an error if the values cannot be listed.
    fn value_names(&self, key: &Self::Key) -> Result<Vec<String>, StoreError>;

    /// Read a value's bytes into `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BufferTooSmall`] with the required size when
    /// `buf` cannot hold the value, or another error if the read fails.
    fn read_value(
        &self,
        key: &Self::Key,
        name: &str,
        buf: &mut [u8],
    ) -> Result<RawRead, StoreError>;
}
