//! Entry data model.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::Serialize;

/// One reported row: a container sentinel or a named value.
///
/// Entries are immutable. The folded search text is computed on first use
/// and does not take part in equality.
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    path: String,
    name: String,
    #[serde(rename = "type")]
    kind: String,
    value: String,
    #[serde(skip)]
    folded: OnceCell<String>,
}

/// Entries are shared between the collected set, snapshots and views.
pub type SharedEntry = Arc<Entry>;

impl Entry {
    /// Create a value entry.
    pub fn new(
        path: impl Into<String>,
        name: impl Into<String>,
        kind: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            kind: kind.into(),
            value: value.into(),
            folded: OnceCell::new(),
        }
    }

    /// Create the sentinel entry marking a container.
    pub fn container(path: impl Into<String>) -> Self {
        Self::new(path, String::new(), String::new(), String::new())
    }

    /// Full hierarchical location.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Value name, empty for a container sentinel.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value kind tag, empty for a container sentinel.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Rendered value text.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether this entry marks a container rather than a value.
    #[must_use]
    pub fn is_container(&self) -> bool {
        self.name.is_empty() && self.kind.is_empty() && self.value.is_empty()
    }

    /// Path, name and value concatenated and folded for keyword matching.
    #[must_use]
    pub fn search_text(&self) -> &str {
        self.folded.get_or_init(|| {
            let mut text =
                String::with_capacity(self.path.len() + self.name.len() + self.value.len());
            text.push_str(&self.path);
            text.push_str(&self.name);
            text.push_str(&self.value);
            fold(&text)
        })
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.name == other.name
            && self.kind == other.kind
            && self.value == other.value
    }
}

impl Eq for Entry {}

/// Fold text for matching: lowercase, whitespace removed.
#[must_use]
pub fn fold(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}
