//! Session wiring: enumeration, collection, debounced recompute and the
//! presenter bridge.
//!
//! A session runs these tasks:
//! - one blocking enumerator per root, feeding the merger
//! - a collector draining the merged stream into the [`CollectedStore`]
//! - a recompute worker owning the debouncer and the search state
//! - a presenter task delivering [`FilteredView`]s
//!
//! The recompute worker is the only place the search state and the quiet
//! deadline live; handles talk to it through a command channel.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::collected::CollectedStore;
use super::debounce::Debouncer;
use super::entry::{Entry, SharedEntry};
use super::enumerator::{Enumerator, DEFAULT_READ_BUFFER};
use super::filter::{FilterEngine, SearchState};
use super::merger::merge;
use crate::activate::Activator;
use crate::config::Config;
use crate::error::PipelineError;
use crate::metrics;
use crate::observability::spans;
use crate::Result;

/// What caused a recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// A search change passed its quiet period.
    Explicit,
    /// The catch-up tick.
    Periodic,
}

impl Trigger {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Periodic => "periodic",
        }
    }
}

/// One recomputed filtered view, replacing the previous one wholesale.
#[derive(Debug, Clone)]
pub struct FilteredView {
    /// Matching entries, in collection order.
    pub entries: Vec<SharedEntry>,
    /// What caused this recompute.
    pub trigger: Trigger,
    /// Increases by one with every delivered view.
    pub generation: u64,
    /// Size of the collected set the view was computed from.
    pub collected: usize,
    /// Search state the view was computed with.
    pub state: SearchState,
}

/// Receives filtered views.
///
/// Called from the session's presenter task only, one view at a time.
pub trait Presenter: Send + 'static {
    /// Replace whatever is displayed with `view`.
    fn on_filtered_view_changed(&mut self, view: FilteredView);
}

#[derive(Debug)]
enum Command {
    Keyword(String),
    KeyFilter(Option<String>),
    TypeFilter(Option<String>),
}

/// Enumerate `roots` of `store` into one combined, finite stream.
///
/// Roots that cannot be opened are logged and skipped.
///
/// # Errors
///
/// Returns [`PipelineError::NoSources`] if `roots` is empty.
pub fn stream_entries<S: crate::store::KeyStore>(
    store: &Arc<S>,
    roots: &[String],
    cancel: &CancellationToken,
) -> std::result::Result<mpsc::Receiver<Entry>, PipelineError> {
    spawn_stream(store, roots, 1, DEFAULT_READ_BUFFER, cancel)
}

/// Like [`stream_entries`], with roots, channel capacity and read buffer
/// size taken from `config`.
///
/// # Errors
///
/// Returns [`PipelineError::NoSources`] if `config` lists no roots.
pub fn stream_entries_with<S: crate::store::KeyStore>(
    store: &Arc<S>,
    config: &Config,
    cancel: &CancellationToken,
) -> std::result::Result<mpsc::Receiver<Entry>, PipelineError> {
    spawn_stream(
        store,
        &config.roots,
        config.channel_capacity,
        config.initial_read_buffer,
        cancel,
    )
}

fn spawn_stream<S: crate::store::KeyStore>(
    store: &Arc<S>,
    roots: &[String],
    capacity: usize,
    initial_buffer: usize,
    cancel: &CancellationToken,
) -> std::result::Result<mpsc::Receiver<Entry>, PipelineError> {
    let sources = roots
        .iter()
        .map(|root| {
            Enumerator::new(Arc::clone(store), root.as_str())
                .with_initial_buffer(initial_buffer)
                .spawn(capacity, cancel.clone())
        })
        .collect();
    merge(sources, capacity, cancel.clone())
}

/// Entry point for a running session.
pub struct Session;

impl Session {
    /// Start enumerating `store` and serving filtered views to `presenter`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn start<S, P>(
        store: Arc<S>,
        config: &Config,
        presenter: P,
        activator: Arc<dyn Activator>,
    ) -> Result<SessionHandle>
    where
        S: crate::store::KeyStore,
        P: Presenter,
    {
        config.validate()?;
        let cancel = CancellationToken::new();

        let rx = stream_entries_with(&store, config, &cancel)?;

        let collected = CollectedStore::new();
        let collector = {
            let collected = collected.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                collected.collect(rx, cancel).await;
            })
        };

        let engine = Arc::new(FilterEngine::new(config.key_match));
        let (commands, recompute, presenting) = spawn_recompute(
            collected.clone(),
            engine,
            config.quiet_period,
            config.refresh_interval,
            presenter,
            cancel.clone(),
        );

        tracing::info!(
            roots = config.roots.len(),
            quiet_ms = config.quiet_period.as_millis(),
            refresh_ms = config.refresh_interval.as_millis(),
            "Session started"
        );

        Ok(SessionHandle {
            commands,
            collected,
            activator,
            cancel,
            tasks: vec![
                ("collector", collector),
                ("recompute", recompute),
                ("presenter", presenting),
            ],
        })
    }
}

/// Handle to a running session.
///
/// Dropping the handle cancels the session without waiting for it.
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    collected: CollectedStore,
    activator: Arc<dyn Activator>,
    cancel: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl SessionHandle {
    /// Change the keyword; applied once typing pauses for the quiet period.
    pub fn set_keyword(&self, keyword: impl Into<String>) {
        self.send(Command::Keyword(keyword.into()));
    }

    /// Set or clear the key-path filter; applied immediately.
    pub fn set_key_filter(&self, filter: Option<String>) {
        self.send(Command::KeyFilter(filter));
    }

    /// Set or clear the value-type filter; applied immediately.
    pub fn set_type_filter(&self, filter: Option<String>) {
        self.send(Command::TypeFilter(filter));
    }

    /// Hand `entry`'s path to the activator.
    ///
    /// # Errors
    ///
    /// Returns the activator's error.
    pub fn activate(&self, entry: &Entry) -> Result<()> {
        self.activator.activate(entry.path())
    }

    /// The session's collected set.
    #[must_use]
    pub fn collected(&self) -> &CollectedStore {
        &self.collected
    }

    /// Wait until every root has been enumerated.
    pub async fn wait_scan_complete(&self) {
        self.collected.wait_complete().await;
    }

    /// Cancel the session and wait for its tasks.
    ///
    /// Remaining enumeration work is dropped; entries already collected
    /// stay in the collected set.
    ///
    /// # Errors
    ///
    /// Returns an error if a session task panicked.
    pub async fn shutdown(mut self) -> Result<()> {
        self.cancel.cancel();
        let mut failure = None;
        for (worker, task) in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                tracing::error!(worker, error = %e, "Session task failed");
                failure.get_or_insert(PipelineError::worker_failed(worker, e));
            }
        }
        tracing::info!(collected = self.collected.len(), "Session stopped");
        failure.map_or(Ok(()), |e| Err(e.into()))
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Recompute worker gone, dropping search change");
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn spawn_recompute<P: Presenter>(
    collected: CollectedStore,
    engine: Arc<FilterEngine>,
    quiet: Duration,
    refresh: Duration,
    mut presenter: P,
    cancel: CancellationToken,
) -> (mpsc::UnboundedSender<Command>, JoinHandle<()>, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (view_tx, mut view_rx) = mpsc::channel::<FilteredView>(1);

    let presenting = tokio::spawn(async move {
        while let Some(view) = view_rx.recv().await {
            presenter.on_filtered_view_changed(view);
        }
    });

    let worker = RecomputeWorker {
        collected,
        engine,
        debouncer: Debouncer::new(quiet),
        pending_keyword: String::new(),
        applied: SearchState::default(),
        displayed: 0,
        last_seen: None,
        generation: 0,
        views: view_tx,
    };
    let recompute = tokio::spawn(worker.run(command_rx, refresh, cancel));

    (command_tx, recompute, presenting)
}

struct RecomputeWorker {
    collected: CollectedStore,
    engine: Arc<FilterEngine>,
    debouncer: Debouncer,
    /// Keyword typed but not yet past its quiet period.
    pending_keyword: String,
    applied: SearchState,
    /// Row count of the last delivered view.
    displayed: usize,
    /// Collected size seen by the last recompute.
    last_seen: Option<usize>,
    generation: u64,
    views: mpsc::Sender<FilteredView>,
}

impl RecomputeWorker {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        refresh: Duration,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.debouncer.deadline();
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.apply(command).await,
                    None => break,
                },
                () = wait_until(deadline) => {
                    if self.debouncer.fire(Instant::now()) {
                        self.applied.keyword = self.pending_keyword.clone();
                        self.recompute(Trigger::Explicit).await;
                    }
                }
                _ = ticker.tick() => self.periodic().await,
            }
        }
        tracing::debug!(generation = self.generation, "Recompute worker stopped");
    }

    /// Keywords wait out the quiet period; filters commit on their own and
    /// leave a pending keyword and its deadline alone.
    async fn apply(&mut self, command: Command) {
        match command {
            Command::Keyword(keyword) => {
                self.pending_keyword = keyword;
                self.debouncer.on_quiet_change(Instant::now());
            }
            Command::KeyFilter(filter) => {
                self.applied.key_filter = filter;
                self.recompute(Trigger::Explicit).await;
            }
            Command::TypeFilter(filter) => {
                self.applied.type_filter = filter;
                self.recompute(Trigger::Explicit).await;
            }
        }
    }

    async fn periodic(&mut self) {
        if self.collected.is_complete() && self.last_seen == Some(self.collected.len()) {
            metrics::RECOMPUTES_SKIPPED
                .with_label_values(&["unchanged"])
                .inc();
            return;
        }
        self.recompute(Trigger::Periodic).await;
    }

    async fn recompute(&mut self, trigger: Trigger) {
        let span = spans::recompute_span(trigger.as_str(), self.generation + 1);
        let started = std::time::Instant::now();

        let snapshot = self.collected.snapshot();
        let collected = snapshot.len();
        let engine = Arc::clone(&self.engine);
        let state = self.applied.clone();
        let entries =
            match tokio::task::spawn_blocking(move || engine.filter(&snapshot, &state)).await {
                Ok(entries) => entries,
                Err(e) => {
                    span.in_scope(|| tracing::error!(error = %e, "Filter task failed"));
                    return;
                }
            };

        metrics::RECOMPUTES.with_label_values(&[trigger.as_str()]).inc();
        metrics::RECOMPUTE_LATENCY
            .with_label_values(&[trigger.as_str()])
            .observe(started.elapsed().as_secs_f64());
        self.last_seen = Some(collected);

        if trigger == Trigger::Periodic && entries.len() <= self.displayed {
            metrics::RECOMPUTES_SKIPPED
                .with_label_values(&["not_grown"])
                .inc();
            return;
        }

        self.generation += 1;
        self.displayed = entries.len();
        span.in_scope(|| {
            tracing::debug!(matched = entries.len(), collected, "Delivering filtered view");
        });

        let view = FilteredView {
            entries,
            trigger,
            generation: self.generation,
            collected,
            state: self.applied.clone(),
        };
        if self.views.send(view).await.is_err() {
            tracing::debug!("Presenter gone, dropping view");
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::activate::LogActivator;
    use crate::store::{encode_text, MemoryStore, StoredValue, ValueKind};

    type Log = Arc<Mutex<Vec<(Instant, FilteredView)>>>;

    struct Recorder(Log);

    impl Presenter for Recorder {
        fn on_filtered_view_changed(&mut self, view: FilteredView) {
            self.0.lock().push((Instant::now(), view));
        }
    }

    fn recorder() -> (Recorder, Log) {
        let log = Log::default();
        (Recorder(Arc::clone(&log)), log)
    }

    fn explicit(log: &Log) -> Vec<(Instant, FilteredView)> {
        log.lock()
            .iter()
            .filter(|(_, v)| v.trigger == Trigger::Explicit)
            .cloned()
            .collect()
    }

    fn periodic_sizes(log: &Log) -> Vec<usize> {
        log.lock()
            .iter()
            .filter(|(_, v)| v.trigger == Trigger::Periodic)
            .map(|(_, v)| v.entries.len())
            .collect()
    }

    fn store() -> Arc<MemoryStore> {
        let mut store = MemoryStore::new();
        let user = store.add_root("HKEY_CURRENT_USER");
        let foo = store.add_key(user, "Foo");
        store.add_value(
            foo,
            StoredValue::new("Bar", ValueKind::String, encode_text("hello world")),
        );
        let machine = store.add_root("HKEY_LOCAL_MACHINE");
        store.add_value(
            machine,
            StoredValue::new("Flag", ValueKind::Dword, vec![1, 0, 0, 0]),
        );
        Arc::new(store)
    }

    fn config(quiet_ms: u64, refresh_ms: u64) -> Config {
        Config {
            roots: vec![
                "HKEY_CURRENT_USER".to_string(),
                "HKEY_LOCAL_MACHINE".to_string(),
            ],
            quiet_period: Duration::from_millis(quiet_ms),
            refresh_interval: Duration::from_millis(refresh_ms),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_stream_entries_combines_roots() {
        let roots = vec![
            "HKEY_CURRENT_USER".to_string(),
            "HKEY_MISSING".to_string(),
            "HKEY_LOCAL_MACHINE".to_string(),
        ];
        let mut rx = stream_entries(&store(), &roots, &CancellationToken::new()).unwrap();
        let mut paths = Vec::new();
        while let Some(entry) = rx.recv().await {
            paths.push(format!("{}|{}", entry.path(), entry.name()));
        }
        paths.sort();
        assert_eq!(
            paths,
            vec![
                "HKEY_CURRENT_USER\\Foo|",
                "HKEY_CURRENT_USER\\Foo|Bar",
                "HKEY_CURRENT_USER|",
                "HKEY_LOCAL_MACHINE|",
                "HKEY_LOCAL_MACHINE|Flag",
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_entries_without_roots() {
        let err = stream_entries(&store(), &[], &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, PipelineError::NoSources));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keyword_burst_gives_one_explicit_recompute() {
        let (presenter, log) = recorder();
        let handle = Session::start(
            store(),
            &config(300, 3_600_000),
            presenter,
            Arc::new(LogActivator::new()),
        )
        .unwrap();
        handle.wait_scan_complete().await;

        for keyword in ["h", "he", "hel", "hell", "hello"] {
            handle.set_keyword(keyword);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let last_event = Instant::now() - Duration::from_millis(50);

        tokio::time::sleep_until(last_event + Duration::from_millis(299)).await;
        assert!(explicit(&log).is_empty());

        tokio::time::sleep(Duration::from_secs(1)).await;
        let views = explicit(&log);
        assert_eq!(views.len(), 1);
        let (at, view) = &views[0];
        assert!(*at >= last_event + Duration::from_millis(300));
        assert_eq!(view.state.keyword, "hello");
        assert_eq!(view.entries.len(), 1);
        assert_eq!(view.entries[0].name(), "Bar");

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_filter_changes_apply_without_quiet_period() {
        let (presenter, log) = recorder();
        let handle = Session::start(
            store(),
            &config(300, 3_600_000),
            presenter,
            Arc::new(LogActivator::new()),
        )
        .unwrap();
        handle.wait_scan_complete().await;

        handle.set_type_filter(Some("REG_DWORD".to_string()));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let views = explicit(&log);
        assert_eq!(views.len(), 1);
        let names: Vec<&str> = views[0].1.entries.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["Flag"]);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_filter_change_leaves_pending_keyword_alone() {
        let (presenter, log) = recorder();
        let handle = Session::start(
            store(),
            &config(300, 3_600_000),
            presenter,
            Arc::new(LogActivator::new()),
        )
        .unwrap();
        handle.wait_scan_complete().await;

        let typed = Instant::now();
        handle.set_keyword("hel");
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.set_type_filter(Some("REG_SZ".to_string()));
        tokio::time::sleep(Duration::from_millis(10)).await;

        // The filter is live right away, the half-typed keyword is not.
        let views = explicit(&log);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].1.state.keyword, "");
        assert_eq!(views[0].1.state.type_filter.as_deref(), Some("REG_SZ"));

        // A keystroke right after the filter change does not hold it back.
        handle.set_keyword("hello");
        handle.set_key_filter(Some("HKEY_CURRENT_USER".to_string()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        let views = explicit(&log);
        assert_eq!(views.len(), 2);
        assert_eq!(views[1].1.state.keyword, "");
        assert_eq!(views[1].1.state.key_filter.as_deref(), Some("HKEY_CURRENT_USER"));

        tokio::time::sleep(Duration::from_secs(1)).await;
        let views = explicit(&log);
        assert_eq!(views.len(), 3);
        let (at, view) = &views[2];
        assert!(*at >= typed + Duration::from_millis(400));
        assert_eq!(view.state.keyword, "hello");
        assert_eq!(view.state.type_filter.as_deref(), Some("REG_SZ"));
        let names: Vec<&str> = view.entries.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["Bar"]);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_catch_up_only_grows() {
        let collected = CollectedStore::new();
        collected.append(Entry::container("A"));

        let (presenter, log) = recorder();
        let cancel = CancellationToken::new();
        let (commands, worker, presenting) = spawn_recompute(
            collected.clone(),
            Arc::new(FilterEngine::default()),
            Duration::from_millis(300),
            Duration::from_millis(250),
            presenter,
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        collected.append(Entry::container("B"));
        collected.append(Entry::container("C"));
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(periodic_sizes(&log), vec![1, 3]);

        commands
            .send(Command::Keyword("zzz".to_string()))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;

        let views = explicit(&log);
        assert_eq!(views.len(), 1);
        assert!(views[0].1.entries.is_empty());
        assert_eq!(periodic_sizes(&log), vec![1, 3]);

        let generations: Vec<u64> = log.lock().iter().map(|(_, v)| v.generation).collect();
        assert_eq!(generations, vec![1, 2, 3]);

        cancel.cancel();
        worker.await.unwrap();
        drop(commands);
        presenting.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_explicit_views_carry_applied_state() {
        let collected = CollectedStore::new();
        let (presenter, log) = recorder();
        let cancel = CancellationToken::new();
        let (commands, worker, _presenting) = spawn_recompute(
            collected.clone(),
            Arc::new(FilterEngine::default()),
            Duration::from_millis(300),
            Duration::from_millis(250),
            presenter,
            cancel.clone(),
        );

        commands
            .send(Command::Keyword("match".to_string()))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        // Typed but not yet applied: periodic views keep the applied keyword.
        commands
            .send(Command::Keyword("other".to_string()))
            .unwrap();
        collected.append(Entry::new("K", "match", "REG_SZ", ""));
        tokio::time::sleep(Duration::from_millis(260)).await;

        let log_now = log.lock().clone();
        let periodic: Vec<&FilteredView> = log_now
            .iter()
            .map(|(_, v)| v)
            .filter(|v| v.trigger == Trigger::Periodic)
            .collect();
        assert_eq!(periodic.len(), 1);
        assert_eq!(periodic[0].state.keyword, "match");
        assert_eq!(periodic[0].entries.len(), 1);

        cancel.cancel();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_activate_passes_path() {
        let (presenter, _log) = recorder();
        let activator = Arc::new(LogActivator::new());
        let handle = Session::start(
            store(),
            &config(10, 10),
            presenter,
            Arc::clone(&activator) as Arc<dyn Activator>,
        )
        .unwrap();

        let entry = Entry::new("HKEY_CURRENT_USER\\Foo", "Bar", "REG_SZ", "hello world");
        handle.activate(&entry).unwrap();
        assert_eq!(activator.last().as_deref(), Some("HKEY_CURRENT_USER\\Foo"));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_keeps_collected_entries() {
        let (presenter, _log) = recorder();
        let handle = Session::start(
            store(),
            &config(10, 10),
            presenter,
            Arc::new(LogActivator::new()),
        )
        .unwrap();
        handle.wait_scan_complete().await;
        let collected = handle.collected().clone();
        handle.shutdown().await.unwrap();
        assert_eq!(collected.len(), 5);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let (presenter, _log) = recorder();
        let mut config = config(10, 10);
        config.roots.clear();
        assert!(Session::start(store(), &config, presenter, Arc::new(LogActivator::new())).is_err());
    }
}
