//! # Event Log
//!
//! The logging collaborator every handler step reports through. Each entry
//! is `(message, direction, queue, owner, severity)`. Entries are always
//! mirrored into `tracing`; additional sinks (such as the AMQP log queue
//! publisher) are best-effort and their failures never reach the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::messaging::MessagingError;

/// Which side of the bridge an entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogDirection {
    Input,
    Output,
}

impl fmt::Display for LogDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogDirection::Input => write!(f, "input"),
            LogDirection::Output => write!(f, "output"),
        }
    }
}

/// Severity as the log consumers expect it: 0 = info, 1 = error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", from = "u8")]
pub enum Severity {
    Info,
    Error,
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Info => 0,
            Severity::Error => 1,
        }
    }
}

impl From<u8> for Severity {
    fn from(value: u8) -> Self {
        match value {
            0 => Severity::Info,
            _ => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: String,
    pub direction: LogDirection,
    pub queue: String,
    pub owner: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

/// Destination for event-log entries
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn emit(&self, entry: &LogEntry) -> Result<(), MessagingError>;

    fn sink_name(&self) -> &'static str;
}

/// Owner- and queue-scoped front end to the configured sinks
///
/// ```rust
/// use bpm_bridge::event_log::{EventLogger, LogDirection, Severity};
/// use bpm_bridge::testing::RecordingLogSink;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let sink = Arc::new(RecordingLogSink::new());
/// let logger = EventLogger::new("bpm_listener", "camunda-listener").with_sink(sink.clone());
///
/// logger.error(LogDirection::Input, "Incoming message is dropped").await;
///
/// let entries = sink.entries_with_severity(Severity::Error);
/// assert_eq!(entries.len(), 1);
/// assert_eq!(entries[0].queue, "bpm_listener");
/// # });
/// ```
#[derive(Clone)]
pub struct EventLogger {
    queue: String,
    owner: String,
    sinks: Vec<Arc<dyn LogSink>>,
}

impl fmt::Debug for EventLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLogger")
            .field("queue", &self.queue)
            .field("owner", &self.owner)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl EventLogger {
    pub fn new(queue: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            owner: owner.into(),
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub async fn info(&self, direction: LogDirection, message: impl Into<String>) {
        self.log(direction, Severity::Info, message.into()).await;
    }

    pub async fn error(&self, direction: LogDirection, message: impl Into<String>) {
        self.log(direction, Severity::Error, message.into()).await;
    }

    pub async fn log(&self, direction: LogDirection, severity: Severity, message: String) {
        match severity {
            Severity::Info => info!(
                queue = %self.queue,
                owner = %self.owner,
                direction = %direction,
                "{message}"
            ),
            Severity::Error => error!(
                queue = %self.queue,
                owner = %self.owner,
                direction = %direction,
                "{message}"
            ),
        }

        if self.sinks.is_empty() {
            return;
        }

        let entry = LogEntry {
            message,
            direction,
            queue: self.queue.clone(),
            owner: self.owner.clone(),
            severity,
            timestamp: Utc::now(),
        };

        for sink in &self.sinks {
            if let Err(e) = sink.emit(&entry).await {
                warn!(sink = sink.sink_name(), error = %e, "Event log sink failed; entry dropped");
            }
        }
    }
}
