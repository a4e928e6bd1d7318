//! Streaming enumeration and filtered views.
//!
//! Data flows one way: per-root [`Enumerator`]s feed the [`merge`] fan-in,
//! which feeds the [`CollectedStore`]. Independently, search changes and a
//! periodic tick drive the [`FilterEngine`] through a [`Debouncer`] and
//! hand the result to a [`Presenter`].

mod collected;
mod debounce;
mod entry;
mod enumerator;
mod filter;
mod merger;
mod session;

pub use collected::CollectedStore;
pub use debounce::{DebounceState, Debouncer};
pub use entry::{fold, Entry, SharedEntry};
pub use enumerator::{
    EnumerationStats, EnumerationStatsSnapshot, Enumerator, Walk, DEFAULT_READ_BUFFER,
};
pub use filter::{FilterEngine, KeyMatch, SearchState};
pub use merger::merge;
pub use session::{
    stream_entries, stream_entries_with, FilteredView, Presenter, Session, SessionHandle, Trigger,
};
