//! Line-oriented console front end.
//!
//! [`ConsolePresenter`] prints each filtered view as a numbered table and
//! remembers its rows so `:open N` can refer to them. [`parse_line`] turns
//! one input line into a [`InputCommand`].

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::pipeline::{FilteredView, Presenter, SharedEntry};
use crate::Result;

/// Rows of the most recently printed view.
pub type ShownRows = Arc<Mutex<Vec<SharedEntry>>>;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    /// Plain text: the new keyword.
    Keyword(String),
    /// `:key [PREFIX]`
    KeyFilter(Option<String>),
    /// `:type [TAG]`
    TypeFilter(Option<String>),
    /// `:open N`
    Open(usize),
    /// `:quit`
    Quit,
    /// Anything else starting with `:`.
    Unknown(String),
}

/// Parse one input line.
///
/// A leading `::` escapes a keyword that itself starts with `:`.
#[must_use]
pub fn parse_line(line: &str) -> InputCommand {
    let line = line.trim_end_matches(['\r', '\n']);
    if let Some(escaped) = line.strip_prefix("::") {
        return InputCommand::Keyword(format!(":{escaped}"));
    }
    let Some(command) = line.strip_prefix(':') else {
        return InputCommand::Keyword(line.to_string());
    };

    let command = command.trim();
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
        None => (command, None),
    };

    match (name, arg) {
        ("key", arg) => InputCommand::KeyFilter(arg.map(str::to_string)),
        ("type", arg) => InputCommand::TypeFilter(arg.map(str::to_string)),
        ("open", Some(n)) => n
            .parse()
            .map_or_else(|_| InputCommand::Unknown(line.to_string()), InputCommand::Open),
        ("quit" | "q", None) => InputCommand::Quit,
        _ => InputCommand::Unknown(line.to_string()),
    }
}

/// Prints filtered views to a writer.
pub struct ConsolePresenter<W: Write + Send + 'static> {
    out: W,
    max_rows: usize,
    shown: ShownRows,
}

impl<W: Write + Send + 'static> ConsolePresenter<W> {
    /// Create a presenter printing at most `max_rows` rows per view.
    pub fn new(out: W, max_rows: usize) -> Self {
        Self {
            out,
            max_rows,
            shown: ShownRows::default(),
        }
    }

    /// Shared handle to the rows of the last printed view.
    #[must_use]
    pub fn shown_rows(&self) -> ShownRows {
        Arc::clone(&self.shown)
    }

    fn print(&mut self, view: &FilteredView) -> std::io::Result<()> {
        writeln!(
            self.out,
            "-- {} of {} entries ({}, #{}) --",
            view.entries.len(),
            view.collected,
            view.trigger.as_str(),
            view.generation
        )?;
        for (row, entry) in view.entries.iter().take(self.max_rows).enumerate() {
            if entry.is_container() {
                writeln!(self.out, "{row:>5}  {}", entry.path())?;
            } else {
                writeln!(
                    self.out,
                    "{row:>5}  {}  {}  {}  {}",
                    entry.path(),
                    entry.name(),
                    entry.kind(),
                    entry.value()
                )?;
            }
        }
        if view.entries.len() > self.max_rows {
            writeln!(self.out, "  ... {} more", view.entries.len() - self.max_rows)?;
        }
        self.out.flush()
    }
}

impl<W: Write + Send + 'static> Presenter for ConsolePresenter<W> {
    fn on_filtered_view_changed(&mut self, view: FilteredView) {
        if let Err(e) = self.print(&view) {
            tracing::warn!(error = %e, "Failed to print view");
        }
        let mut shown = self.shown.lock();
        shown.clear();
        shown.extend(view.entries.into_iter().take(self.max_rows));
    }
}

/// Write entries as JSON lines.
///
/// # Errors
///
/// Returns an error if encoding or writing fails.
pub fn write_json_lines<W: Write>(out: &mut W, entries: &[SharedEntry]) -> Result<()> {
    for entry in entries {
        serde_json::to_writer(&mut *out, entry.as_ref())?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}
