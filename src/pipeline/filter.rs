//! Keyword, key-path and type filtering over a collected snapshot.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use super::entry::{fold, SharedEntry};
use crate::{Error, Result};

/// Number of distinct folded keywords kept.
const KEYWORD_CACHE_SIZE: usize = 16;

/// How a key filter is compared with an entry path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyMatch {
    /// Path starts with the filter text.
    #[default]
    Prefix,
    /// Path contains the filter text.
    Contains,
}

impl KeyMatch {
    fn matches(self, path: &str, filter: &str) -> bool {
        match self {
            Self::Prefix => path.starts_with(filter),
            Self::Contains => path.contains(filter),
        }
    }
}

impl FromStr for KeyMatch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "prefix" => Ok(Self::Prefix),
            "contains" => Ok(Self::Contains),
            other => Err(Error::config(format!(
                "invalid key match '{other}', expected 'prefix' or 'contains'"
            ))),
        }
    }
}

impl fmt::Display for KeyMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prefix => f.write_str("prefix"),
            Self::Contains => f.write_str("contains"),
        }
    }
}

/// User-controlled search parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchState {
    pub keyword: String,
    pub key_filter: Option<String>,
    pub type_filter: Option<String>,
}

impl SearchState {
    /// State with only a keyword set.
    pub fn keyword(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            ..Self::default()
        }
    }

    /// Set the key filter.
    #[must_use]
    pub fn with_key_filter(mut self, filter: impl Into<String>) -> Self {
        self.key_filter = Some(filter.into());
        self
    }

    /// Set the type filter.
    #[must_use]
    pub fn with_type_filter(mut self, filter: impl Into<String>) -> Self {
        self.type_filter = Some(filter.into());
        self
    }
}

/// Filters snapshots of the collected set.
///
/// Filtering is a pure function of the snapshot and the search state; the
/// engine only keeps a small cache of folded keywords.
#[derive(Debug, Default)]
pub struct FilterEngine {
    key_match: KeyMatch,
    keywords: Mutex<VecDeque<(String, Arc<str>)>>,
}

impl FilterEngine {
    /// Create an engine using `key_match` for key filters.
    #[must_use]
    pub fn new(key_match: KeyMatch) -> Self {
        Self {
            key_match,
            keywords: Mutex::new(VecDeque::with_capacity(KEYWORD_CACHE_SIZE)),
        }
    }

    /// Key filter mode.
    #[must_use]
    pub const fn key_match(&self) -> KeyMatch {
        self.key_match
    }

    /// Entries of `snapshot` matching `state`, in snapshot order.
    #[must_use]
    pub fn filter(&self, snapshot: &[SharedEntry], state: &SearchState) -> Vec<SharedEntry> {
        let needle = self.folded_keyword(&state.keyword);
        let key_filter = state.key_filter.as_deref().filter(|f| !f.is_empty());
        let type_filter = state.type_filter.as_deref().filter(|f| !f.is_empty());

        snapshot
            .iter()
            .filter(|entry| {
                key_filter.map_or(true, |f| self.key_match.matches(entry.path(), f))
                    && type_filter.map_or(true, |t| entry.kind() == t)
                    && (needle.is_empty() || entry.search_text().contains(&*needle))
            })
            .cloned()
            .collect()
    }

    fn folded_keyword(&self, keyword: &str) -> Arc<str> {
        let mut cache = self.keywords.lock();
        if let Some(pos) = cache.iter().position(|(raw, _)| raw == keyword) {
            if let Some(hit) = cache.remove(pos) {
                let folded = Arc::clone(&hit.1);
                cache.push_front(hit);
                return folded;
            }
        }

        let folded: Arc<str> = Arc::from(fold(keyword));
        if cache.len() == KEYWORD_CACHE_SIZE {
            cache.pop_back();
        }
        cache.push_front((keyword.to_string(), Arc::clone(&folded)));
        folded
    }
}
