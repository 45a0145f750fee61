//! Progress events emitted during a run, and sinks that consume them.
//!
//! The engine reports to a [`ProgressReporter`] and never cares how events are shown.
//! Reporting is fire-and-forget; events arrive in emission order.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warn,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Success => write!(f, "success"),
            Severity::Warn => write!(f, "warn"),
            Severity::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub severity: Severity,
    pub message: String,
    /// 0-based line of the batch the event is about, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl ProgressEvent {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            line: None,
        }
    }

    pub fn for_line(severity: Severity, line: usize, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            line: Some(line),
        }
    }
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

impl<R: ProgressReporter + ?Sized> ProgressReporter for Arc<R> {
    fn report(&self, event: ProgressEvent) {
        (**self).report(event)
    }
}

/// Forwards events to `tracing`, mapping severities onto levels.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: ProgressEvent) {
        let line = event.line.map(|l| l + 1);
        match event.severity {
            Severity::Info => tracing::info!(line, "{}", event.message),
            Severity::Success => tracing::info!(line, success = true, "{}", event.message),
            Severity::Warn => tracing::warn!(line, "{}", event.message),
            Severity::Error => tracing::error!(line, "{}", event.message),
        }
    }
}

/// Keeps every event in memory, for tests and for printing after the run.
#[derive(Debug, Clone, Default)]
pub struct CollectingReporter {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }

    pub fn with_severity(&self, severity: Severity) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.severity == severity)
            .cloned()
            .collect()
    }
}

impl ProgressReporter for CollectingReporter {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().push(event);
    }
}

/// Sends events down an unbounded channel to a renderer running elsewhere.
///
/// A dropped receiver is not an error: events are discarded.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressReporter for ChannelReporter {
    fn report(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

/// Fans every event out to two reporters, in order.
pub struct Tee<A, B>(pub A, pub B);

impl<A: ProgressReporter, B: ProgressReporter> ProgressReporter for Tee<A, B> {
    fn report(&self, event: ProgressEvent) {
        self.0.report(event.clone());
        self.1.report(event);
    }
}
