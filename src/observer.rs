//! Diagnostic sink for commit and discovery internals.
//!
//! Retry loops and commit phases occasionally need to tell somebody what they
//! are doing. Rather than a process-global print target, components accept an
//! [`InfoSink`] at construction; the caller owns its lifecycle.

use std::fmt;
use std::sync::Arc;

/// Receives diagnostic messages from catalog components.
///
/// Implementations must be cheap to call; messages are already formatted.
pub trait InfoSink: Send + Sync + fmt::Debug {
    /// Record one diagnostic message from the named component.
    fn message(&self, component: &str, message: &str);
}

/// Discards every message. The default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl InfoSink for NoopSink {
    fn message(&self, _component: &str, _message: &str) {}
}

/// Writes messages to stderr. Used by the CLI in verbose mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl InfoSink for StderrSink {
    fn message(&self, component: &str, message: &str) {
        eprintln!("{component}: {message}");
    }
}

/// Convenience constructor for the default sink.
pub fn noop_sink() -> Arc<dyn InfoSink> {
    Arc::new(NoopSink)
}
