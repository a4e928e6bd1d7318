//! regfind - streaming, keyword-filterable key/value store enumerator
//!
//! Entry point for the regfind CLI.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use regfind::activate::{Activator, CommandActivator, LogActivator};
use regfind::config::DEFAULT_LOG_LEVEL;
use regfind::console::{parse_line, write_json_lines, ConsolePresenter, InputCommand};
use regfind::metrics::{init_metrics, render_metrics};
use regfind::observability::init_tracing;
use regfind::pipeline::{
    stream_entries_with, CollectedStore, FilterEngine, KeyMatch, SearchState, Session,
};
use regfind::store::{load_snapshot, MemoryStore, ValueKind, DEFAULT_ROOTS};
use regfind::{Config, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// regfind - search a key/value store snapshot as it is enumerated
#[derive(Parser, Debug)]
#[command(name = "regfind")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Store snapshot (JSON) to enumerate
    #[arg(short, long, env = "REGFIND_SNAPSHOT")]
    snapshot: PathBuf,

    /// Roots to enumerate, in order (default: the five standard hives)
    #[arg(short, long, env = "REGFIND_ROOTS", value_delimiter = ',')]
    root: Vec<String>,

    /// Print entries matching this keyword as JSON lines once the scan ends
    #[arg(short, long)]
    query: Option<String>,

    /// Only show entries whose path matches this text
    #[arg(long, env = "REGFIND_KEY_FILTER")]
    key_filter: Option<String>,

    /// Only show entries of this value type (e.g. `REG_SZ`)
    #[arg(long, env = "REGFIND_TYPE_FILTER")]
    type_filter: Option<String>,

    /// How the key filter matches paths (prefix, contains)
    #[arg(long, env = "REGFIND_KEY_MATCH", default_value = "prefix")]
    key_match: KeyMatch,

    /// Quiet period before a keyword change is applied, in milliseconds
    #[arg(long, env = "REGFIND_QUIET_MS", default_value = "250")]
    quiet_ms: u64,

    /// Period of the catch-up refresh, in milliseconds
    #[arg(long, env = "REGFIND_REFRESH_MS", default_value = "250")]
    refresh_ms: u64,

    /// Maximum rows printed per view
    #[arg(long, env = "REGFIND_MAX_ROWS", default_value = "50")]
    max_rows: usize,

    /// Command run with an entry path as its last argument on `:open`
    #[arg(long, env = "REGFIND_OPEN_COMMAND")]
    open_command: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "REGFIND_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "REGFIND_LOG_JSON")]
    log_json: bool,

    /// Print pipeline metrics to stderr on exit
    #[arg(long, env = "REGFIND_METRICS")]
    metrics: bool,
}

impl Cli {
    fn config(&self) -> Config {
        let roots = if self.root.is_empty() {
            DEFAULT_ROOTS.iter().map(|r| (*r).to_string()).collect()
        } else {
            self.root.clone()
        };
        Config {
            roots,
            log_level: self.log_level.clone(),
            quiet_period: Duration::from_millis(self.quiet_ms),
            refresh_interval: Duration::from_millis(self.refresh_ms),
            key_match: self.key_match,
            ..Config::default()
        }
    }

    fn search_state(&self, keyword: &str) -> SearchState {
        SearchState {
            keyword: keyword.to_string(),
            key_filter: self.key_filter.clone(),
            type_filter: self.type_filter.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.log_json);
    init_metrics();

    tracing::info!("regfind v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = cli.config();
    tracing::debug!(?config, "Configuration loaded");
    config.validate()?;

    if let Some(tag) = cli.type_filter.as_deref() {
        if ValueKind::from_tag(tag).is_none() {
            tracing::warn!(
                type_filter = %tag,
                known = %ValueKind::tags().join(", "),
                "Type filter matches no known value type"
            );
        }
    }

    let store = Arc::new(load_snapshot(&cli.snapshot)?);

    let outcome = match cli.query.as_deref() {
        Some(keyword) => run_query(store, &config, &cli.search_state(keyword)).await,
        None => run_interactive(store, &config, &cli).await,
    };

    if cli.metrics {
        eprint!("{}", render_metrics());
    }
    outcome
}

/// Enumerate everything, then print the matches once.
async fn run_query(store: Arc<MemoryStore>, config: &Config, state: &SearchState) -> Result<()> {
    let cancel = CancellationToken::new();
    let rx = stream_entries_with(&store, config, &cancel)?;
    let collected = CollectedStore::new();

    tokio::select! {
        total = collected.collect(rx, cancel.clone()) => {
            tracing::info!(total, "Enumeration finished");
        }
        () = shutdown_signal() => {
            cancel.cancel();
            return Ok(());
        }
    }

    let matches = FilterEngine::new(config.key_match).filter(&collected.snapshot(), state);
    tracing::info!(matches = matches.len(), "Query complete");

    let stdout = std::io::stdout();
    write_json_lines(&mut stdout.lock(), &matches)
}

/// Run a live session driven by stdin lines.
async fn run_interactive(store: Arc<MemoryStore>, config: &Config, cli: &Cli) -> Result<()> {
    let activator: Arc<dyn Activator> = match cli.open_command.as_deref() {
        Some(command) => Arc::new(CommandActivator::parse(command)?),
        None => Arc::new(LogActivator::new()),
    };

    let presenter = ConsolePresenter::new(std::io::stdout(), cli.max_rows);
    let shown = presenter.shown_rows();
    let session = Session::start(store, config, presenter, activator)?;

    if cli.key_filter.is_some() {
        session.set_key_filter(cli.key_filter.clone());
    }
    if cli.type_filter.is_some() {
        session.set_type_filter(cli.type_filter.clone());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::debug!("Input closed");
                    break;
                };
                match parse_line(&line) {
                    InputCommand::Keyword(keyword) => session.set_keyword(keyword),
                    InputCommand::KeyFilter(filter) => session.set_key_filter(filter),
                    InputCommand::TypeFilter(filter) => session.set_type_filter(filter),
                    InputCommand::Open(row) => {
                        let entry = shown.lock().get(row).cloned();
                        match entry {
                            Some(entry) => {
                                if let Err(e) = session.activate(&entry) {
                                    eprintln!("{e}");
                                }
                            }
                            None => eprintln!("no row {row} in the current view"),
                        }
                    }
                    InputCommand::Quit => break,
                    InputCommand::Unknown(text) => {
                        eprintln!("unknown command '{text}' (try :key, :type, :open N, :quit)");
                    }
                }
            }
        }
    }

    session.shutdown().await
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
