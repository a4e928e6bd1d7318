//! Structured logging and tracing configuration.
//!
//! Logs go to stderr so the interactive console and query output on stdout
//! stay clean. Output is plain text or JSON, filtered by level or by
//! `RUST_LOG` when set.

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

/// Initialize tracing with the given level and format.
///
/// # Panics
///
/// Panics if tracing subscriber has already been initialized in this process.
pub fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        let json_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default().with(env_filter).with(json_layer).init();
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true);

        Registry::default().with(env_filter).with(fmt_layer).init();
    }

    tracing::debug!("Tracing initialized: level={}, json={}", level, json);
}

/// Spans shared by the pipeline workers.
pub mod spans {
    use tracing::{info_span, Span};

    /// Span covering the walk of one root.
    #[must_use]
    pub fn root_span(root: &str) -> Span {
        info_span!("root_walk", root = %root)
    }

    /// Span covering one filtered view recompute.
    #[must_use]
    pub fn recompute_span(trigger: &str, generation: u64) -> Span {
        info_span!("recompute", trigger = %trigger, generation)
    }
}
