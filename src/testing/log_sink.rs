use async_trait::async_trait;
use parking_lot::Mutex;

use crate::event_log::{LogEntry, LogSink, Severity};
use crate::messaging::MessagingError;

/// Keeps every emitted entry in memory
#[derive(Debug, Default)]
pub struct RecordingLogSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl RecordingLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Whether any recorded message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|entry| entry.message.contains(needle))
    }

    pub fn entries_with_severity(&self, severity: Severity) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.severity == severity)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LogSink for RecordingLogSink {
    async fn emit(&self, entry: &LogEntry) -> Result<(), MessagingError> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "recording"
    }
}
