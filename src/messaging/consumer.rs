//! # Consumption Loop
//!
//! Pulls one delivery at a time from the input queue and hands it to the
//! delivery handler. Any connection-level failure tears the session down,
//! waits `reconnect_delay` and starts over; the loop only ends when the
//! shutdown future resolves.
//!
//! ```text
//! Connected --error--> Reconnecting --delay--> Connected
//! ```

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use super::connection::{BrokerConnector, BrokerSession, ReplyPublisher};
use super::envelope::Delivery;
use super::errors::MessagingError;
use crate::bridge::{HandlerOutcome, MessageHandler};
use crate::config::{BrokerConfig, ConsumerConfig};
use crate::error::{BridgeError, BridgeResult};

/// Seam between the loop and the per-message pipeline
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle_delivery(
        &self,
        delivery: &Delivery,
        publisher: &dyn ReplyPublisher,
    ) -> BridgeResult<HandlerOutcome>;
}

#[async_trait]
impl DeliveryHandler for MessageHandler {
    async fn handle_delivery(
        &self,
        delivery: &Delivery,
        publisher: &dyn ReplyPublisher,
    ) -> BridgeResult<HandlerOutcome> {
        self.handle(delivery, publisher).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerState {
    /// Not started yet
    Idle,
    Connected,
    Reconnecting,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub queue: String,
    pub consumer_tag: String,
    pub tick_interval: Duration,
    pub reconnect_delay: Duration,
    pub ack_before_process: bool,
}

impl ConsumerSettings {
    pub fn from_config(broker: &BrokerConfig, consumer: &ConsumerConfig) -> Self {
        Self {
            queue: broker.queue.clone(),
            consumer_tag: broker.consumer_tag.clone(),
            tick_interval: consumer.tick_interval(),
            reconnect_delay: consumer.reconnect_delay(),
            ack_before_process: consumer.ack_before_process,
        }
    }
}

/// Counters for consumer observability
#[derive(Debug, Default)]
pub struct ConsumerStats {
    pub deliveries_received: AtomicU64,
    pub deliveries_acked: AtomicU64,
    pub malformed: AtomicU64,
    pub rejected: AtomicU64,
    pub correlated: AtomicU64,
    pub correlation_failures: AtomicU64,
    pub replies_sent: AtomicU64,
    pub handler_errors: AtomicU64,
    pub connection_attempts: AtomicU64,
    pub reconnects: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConsumerStatsSnapshot {
    pub deliveries_received: u64,
    pub deliveries_acked: u64,
    pub malformed: u64,
    pub rejected: u64,
    pub correlated: u64,
    pub correlation_failures: u64,
    pub replies_sent: u64,
    pub handler_errors: u64,
    pub connection_attempts: u64,
    pub reconnects: u64,
}

impl ConsumerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_outcome(&self, outcome: &HandlerOutcome) {
        let (counter, replied) = match outcome {
            HandlerOutcome::Malformed => (&self.malformed, false),
            HandlerOutcome::Rejected { .. } => (&self.rejected, false),
            HandlerOutcome::Correlated { replied } => (&self.correlated, *replied),
            HandlerOutcome::CorrelationFailed { replied, .. } => {
                (&self.correlation_failures, *replied)
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if replied {
            self.replies_sent.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        ConsumerStatsSnapshot {
            deliveries_received: load(&self.deliveries_received),
            deliveries_acked: load(&self.deliveries_acked),
            malformed: load(&self.malformed),
            rejected: load(&self.rejected),
            correlated: load(&self.correlated),
            correlation_failures: load(&self.correlation_failures),
            replies_sent: load(&self.replies_sent),
            handler_errors: load(&self.handler_errors),
            connection_attempts: load(&self.connection_attempts),
            reconnects: load(&self.reconnects),
        }
    }
}

pub struct ConsumptionLoop {
    connector: Arc<dyn BrokerConnector>,
    handler: Arc<dyn DeliveryHandler>,
    settings: ConsumerSettings,
    stats: Arc<ConsumerStats>,
    state: watch::Sender<ConsumerState>,
}

impl ConsumptionLoop {
    pub fn new(
        connector: Arc<dyn BrokerConnector>,
        handler: Arc<dyn DeliveryHandler>,
        settings: ConsumerSettings,
    ) -> Self {
        let (state, _) = watch::channel(ConsumerState::Idle);
        Self {
            connector,
            handler,
            settings,
            stats: Arc::new(ConsumerStats::new()),
            state,
        }
    }

    pub fn stats(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.stats)
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    /// Run until `shutdown` resolves, reconnecting after every failure
    #[instrument(skip_all, fields(queue = %self.settings.queue))]
    pub async fn run_until_shutdown<F>(&self, shutdown: F) -> ConsumerStatsSnapshot
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            tick_interval_ms = self.settings.tick_interval.as_millis() as u64,
            reconnect_delay_ms = self.settings.reconnect_delay.as_millis() as u64,
            ack_before_process = self.settings.ack_before_process,
            "Starting consumption loop"
        );

        loop {
            let connected = tokio::select! {
                biased;
                () = &mut shutdown => break,
                connected = self.connector.connect() => connected,
            };
            self.stats.connection_attempts.fetch_add(1, Ordering::Relaxed);

            let failure: BridgeError = match connected {
                Ok(mut session) => {
                    let failure = tokio::select! {
                        biased;
                        () = &mut shutdown => None,
                        failure = self.consume(session.as_mut()) => Some(failure),
                    };
                    session.close().await;
                    match failure {
                        Some(failure) => failure,
                        None => break,
                    }
                }
                Err(e) => e.into(),
            };

            self.set_state(ConsumerState::Reconnecting);
            self.stats.reconnects.fetch_add(1, Ordering::Relaxed);
            error!(
                error = %failure,
                retry_in_ms = self.settings.reconnect_delay.as_millis() as u64,
                "Consumer failed; reconnecting"
            );

            tokio::select! {
                biased;
                () = &mut shutdown => break,
                () = tokio::time::sleep(self.settings.reconnect_delay) => {}
            }
        }

        self.set_state(ConsumerState::Stopped);
        let snapshot = self.stats.snapshot();
        info!(stats = ?snapshot, "Consumption loop stopped");
        snapshot
    }

    /// Consume until the session fails; always returns the failure
    async fn consume(&self, session: &mut dyn BrokerSession) -> BridgeError {
        match self.consume_deliveries(session).await {
            Ok(()) => MessagingError::consume(&self.settings.queue, "consumer was cancelled by the broker")
                .into(),
            Err(e) => e,
        }
    }

    async fn consume_deliveries(&self, session: &mut dyn BrokerSession) -> BridgeResult<()> {
        session
            .start_consuming(&self.settings.queue, &self.settings.consumer_tag)
            .await?;
        self.set_state(ConsumerState::Connected);
        info!(queue = %self.settings.queue, "Waiting for messages");

        loop {
            match tokio::time::timeout(self.settings.tick_interval, session.next_delivery()).await {
                Err(_) => {
                    if !session.is_connected() {
                        return Err(MessagingError::connection("broker connection lost").into());
                    }
                }
                Ok(Ok(Some(delivery))) => self.dispatch(session, delivery).await?,
                Ok(Ok(None)) => return Ok(()),
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }

    async fn dispatch(&self, session: &mut dyn BrokerSession, delivery: Delivery) -> BridgeResult<()> {
        self.stats.deliveries_received.fetch_add(1, Ordering::Relaxed);
        let delivery_tag = delivery.delivery_tag;
        debug!(
            delivery_tag,
            redelivered = delivery.redelivered,
            "Delivery received"
        );

        if self.settings.ack_before_process {
            self.ack(session, delivery_tag).await?;
        }

        let handled = AssertUnwindSafe(
            self.handler
                .handle_delivery(&delivery, session.reply_publisher()),
        )
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            Err(BridgeError::Internal(format!(
                "message handler panicked: {}",
                panic_message(panic.as_ref())
            )))
        });

        match handled {
            Ok(outcome) => self.stats.record_outcome(&outcome),
            Err(e) if !e.requires_reconnect() => {
                self.stats.handler_errors.fetch_add(1, Ordering::Relaxed);
                warn!(delivery_tag, error = %e, "Message handling failed");
            }
            Err(e) => {
                self.stats.handler_errors.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        }

        if !self.settings.ack_before_process {
            self.ack(session, delivery_tag).await?;
        }
        Ok(())
    }

    async fn ack(&self, session: &dyn BrokerSession, delivery_tag: u64) -> BridgeResult<()> {
        session.ack(delivery_tag).await?;
        self.stats.deliveries_acked.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn set_state(&self, state: ConsumerState) {
        self.state.send_replace(state);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
