//! AMQP sink for the event log.
//!
//! Publishes each entry as JSON to the log queue on the log vhost. The
//! session is opened on first use and dropped after any failure. After a
//! failure no reconnect is attempted until the cooldown has passed; entries
//! emitted in the meantime fail fast.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::connection::AmqpSession;
use super::errors::{MessagingError, MessagingResult};
use crate::config::BrokerConfig;
use crate::event_log::{LogEntry, LogSink};

/// Cooldown between reconnect attempts unless configured otherwise
pub const DEFAULT_LOG_RECONNECT_COOLDOWN: Duration = Duration::from_secs(3);

#[derive(Default)]
struct SinkState {
    session: Option<AmqpSession>,
    retry_at: Option<Instant>,
}

pub struct AmqpLogSink {
    config: BrokerConfig,
    reconnect_cooldown: Duration,
    state: Mutex<SinkState>,
    open_attempts: AtomicU64,
}

impl std::fmt::Debug for AmqpLogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpLogSink")
            .field("vhost", &self.config.vhost)
            .field("queue", &self.config.queue)
            .finish()
    }
}

impl AmqpLogSink {
    /// `config.queue` is the log queue; `config.vhost` the log vhost
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            reconnect_cooldown: DEFAULT_LOG_RECONNECT_COOLDOWN,
            state: Mutex::new(SinkState::default()),
            open_attempts: AtomicU64::new(0),
        }
    }

    pub fn with_reconnect_cooldown(mut self, cooldown: Duration) -> Self {
        self.reconnect_cooldown = cooldown;
        self
    }

    pub fn queue(&self) -> &str {
        &self.config.queue
    }

    /// Number of session opens attempted so far
    pub fn open_attempts(&self) -> u64 {
        self.open_attempts.load(Ordering::Relaxed)
    }

    async fn publish(&self, body: &[u8]) -> MessagingResult<()> {
        let mut state = self.state.lock().await;

        if state.session.is_none() {
            if let Some(retry_at) = state.retry_at {
                if Instant::now() < retry_at {
                    return Err(MessagingError::connection(
                        "event log broker unavailable, waiting before reconnecting",
                    ));
                }
            }

            debug!(vhost = %self.config.vhost, "Opening event log session");
            self.open_attempts.fetch_add(1, Ordering::Relaxed);
            match AmqpSession::open(&self.config, "bpm-bridge-log").await {
                Ok(session) => {
                    state.session = Some(session);
                    state.retry_at = None;
                }
                Err(e) => {
                    self.start_cooldown(&mut state);
                    return Err(e);
                }
            }
        }

        let result = match state.session.as_ref() {
            Some(session) => {
                session
                    .publish_json(&self.config.queue, None, None, body)
                    .await
            }
            None => Err(MessagingError::connection("event log session unavailable")),
        };

        if result.is_err() {
            state.session = None;
            self.start_cooldown(&mut state);
        }
        result
    }

    fn start_cooldown(&self, state: &mut SinkState) {
        warn!(
            vhost = %self.config.vhost,
            cooldown_ms = self.reconnect_cooldown.as_millis() as u64,
            "Event log broker unavailable"
        );
        state.retry_at = Some(Instant::now() + self.reconnect_cooldown);
    }
}

#[async_trait]
impl LogSink for AmqpLogSink {
    async fn emit(&self, entry: &LogEntry) -> Result<(), MessagingError> {
        let body = serde_json::to_vec(entry)?;
        self.publish(&body).await
    }

    fn sink_name(&self) -> &'static str {
        "amqp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::{EventLogger, LogDirection, Severity};
    use chrono::Utc;
    use std::sync::Arc;

    fn unreachable_broker() -> BrokerConfig {
        BrokerConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            connection_timeout_seconds: 1,
            queue: "bpm_logs".to_string(),
            ..BrokerConfig::default()
        }
    }

    #[test]
    fn test_sink_targets_log_queue() {
        let sink = AmqpLogSink::new(unreachable_broker());
        assert_eq!(sink.queue(), "bpm_logs");
        assert_eq!(sink.sink_name(), "amqp");
    }

    #[tokio::test]
    async fn test_unreachable_log_broker_never_fails_the_caller() {
        let logger = EventLogger::new("bpm_listener", "bpm-listener")
            .with_sink(Arc::new(AmqpLogSink::new(unreachable_broker())));

        // only the tracing mirror receives the entry
        logger.info(LogDirection::Input, "Received {}").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_open_is_not_retried_during_cooldown() {
        let sink = AmqpLogSink::new(unreachable_broker())
            .with_reconnect_cooldown(Duration::from_secs(3));
        let entry = LogEntry {
            message: "Received {}".to_string(),
            direction: LogDirection::Input,
            queue: "bpm_listener".to_string(),
            owner: "bpm-listener".to_string(),
            severity: Severity::Info,
            timestamp: Utc::now(),
        };

        assert!(sink.emit(&entry).await.is_err());
        assert!(sink.emit(&entry).await.is_err());
        assert!(sink.emit(&entry).await.is_err());
        assert_eq!(sink.open_attempts(), 1);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(sink.emit(&entry).await.is_err());
        assert_eq!(sink.open_attempts(), 2);
    }
}
