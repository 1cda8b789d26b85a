//! Scripted broker doubles.
//!
//! [`ScriptedBroker`] is a [`BrokerConnector`] whose sessions all share one
//! in-memory queue, so a test can push deliveries, fail connects, drop the
//! connection and then inspect acknowledgements and replies. Deliveries a
//! session hands out but never acks go back to the front of the queue,
//! flagged as redelivered, once that session is closed or replaced.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::messaging::{
    BrokerConnector, BrokerSession, Delivery, MessagingError, MessagingResult, ReplyPublisher,
};

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedReply {
    pub reply_to: String,
    pub correlation_id: String,
    pub body: Vec<u8>,
}

impl PublishedReply {
    pub fn body_json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

/// Standalone publisher that records replies
#[derive(Debug, Default)]
pub struct RecordingReplyPublisher {
    replies: Mutex<Vec<PublishedReply>>,
    fail: bool,
}

impl RecordingReplyPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A publisher whose every publish is rejected
    pub fn failing() -> Self {
        Self {
            replies: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn replies(&self) -> Vec<PublishedReply> {
        self.replies.lock().clone()
    }
}

#[async_trait]
impl ReplyPublisher for RecordingReplyPublisher {
    async fn publish_reply(
        &self,
        reply_to: &str,
        correlation_id: &str,
        body: &[u8],
    ) -> MessagingResult<()> {
        if self.fail {
            return Err(MessagingError::publish(reply_to, "publisher rejected"));
        }
        self.replies.lock().push(PublishedReply {
            reply_to: reply_to.to_string(),
            correlation_id: correlation_id.to_string(),
            body: body.to_vec(),
        });
        Ok(())
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    pending: VecDeque<Delivery>,
    /// Handed out and not yet acked, keyed by session generation
    unacked: Vec<(u64, Delivery)>,
    redelivered: usize,
    acked: Vec<u64>,
    replies: Vec<PublishedReply>,
    connect_attempts: Vec<Instant>,
    consumed_queues: Vec<String>,
    failures_remaining: usize,
    generation: u64,
    connected: bool,
    closed_sessions: usize,
    fail_publish: bool,
    fail_ack: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedBroker {
    state: Arc<Mutex<BrokerState>>,
    notify: Arc<Notify>,
}

impl ScriptedBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_delivery(&self, delivery: Delivery) {
        self.state.lock().pending.push_back(delivery);
        self.notify.notify_one();
    }

    /// Make the next `count` connect attempts fail
    pub fn fail_next_connects(&self, count: usize) {
        self.state.lock().failures_remaining = count;
    }

    /// Mark the current session as disconnected
    pub fn drop_connection(&self) {
        self.state.lock().connected = false;
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.state.lock().fail_publish = fail;
    }

    pub fn fail_acks(&self, fail: bool) {
        self.state.lock().fail_ack = fail;
    }

    pub fn connect_attempts(&self) -> Vec<Instant> {
        self.state.lock().connect_attempts.clone()
    }

    pub fn acked(&self) -> Vec<u64> {
        self.state.lock().acked.clone()
    }

    pub fn replies(&self) -> Vec<PublishedReply> {
        self.state.lock().replies.clone()
    }

    pub fn consumed_queues(&self) -> Vec<String> {
        self.state.lock().consumed_queues.clone()
    }

    pub fn closed_sessions(&self) -> usize {
        self.state.lock().closed_sessions
    }

    pub fn pending_deliveries(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Deliveries put back on the queue because their session went away unacked
    pub fn redelivered(&self) -> usize {
        self.state.lock().redelivered
    }
}

impl BrokerState {
    fn requeue_unacked(&mut self, generation: Option<u64>) {
        let (requeue, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut self.unacked)
            .into_iter()
            .partition(|(owner, _)| generation.map_or(true, |g| g == *owner));
        self.unacked = keep;
        for (_, mut delivery) in requeue.into_iter().rev() {
            delivery.redelivered = true;
            self.redelivered += 1;
            self.pending.push_front(delivery);
        }
    }
}

#[async_trait]
impl BrokerConnector for ScriptedBroker {
    async fn connect(&self) -> MessagingResult<Box<dyn BrokerSession>> {
        let mut state = self.state.lock();
        state.connect_attempts.push(Instant::now());

        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(MessagingError::connection("scripted connection refusal"));
        }

        state.requeue_unacked(None);
        state.generation += 1;
        state.connected = true;
        if !state.pending.is_empty() {
            self.notify.notify_one();
        }
        Ok(Box::new(ScriptedSession {
            state: Arc::clone(&self.state),
            notify: Arc::clone(&self.notify),
            generation: state.generation,
            closed: false,
        }))
    }
}

/// Session handed out by [`ScriptedBroker`]
#[derive(Debug)]
pub struct ScriptedSession {
    state: Arc<Mutex<BrokerState>>,
    notify: Arc<Notify>,
    generation: u64,
    closed: bool,
}

impl ScriptedSession {
    fn pop_pending(&self) -> Option<Delivery> {
        let mut state = self.state.lock();
        let delivery = state.pending.pop_front()?;
        state.unacked.push((self.generation, delivery.clone()));
        Some(delivery)
    }
}

#[async_trait]
impl ReplyPublisher for ScriptedSession {
    async fn publish_reply(
        &self,
        reply_to: &str,
        correlation_id: &str,
        body: &[u8],
    ) -> MessagingResult<()> {
        let mut state = self.state.lock();
        if state.fail_publish {
            return Err(MessagingError::publish(reply_to, "scripted publish failure"));
        }
        state.replies.push(PublishedReply {
            reply_to: reply_to.to_string(),
            correlation_id: correlation_id.to_string(),
            body: body.to_vec(),
        });
        Ok(())
    }
}

#[async_trait]
impl BrokerSession for ScriptedSession {
    async fn start_consuming(&mut self, queue: &str, _consumer_tag: &str) -> MessagingResult<()> {
        self.state.lock().consumed_queues.push(queue.to_string());
        Ok(())
    }

    async fn next_delivery(&mut self) -> MessagingResult<Option<Delivery>> {
        loop {
            if let Some(delivery) = self.pop_pending() {
                return Ok(Some(delivery));
            }
            self.notify.notified().await;
        }
    }

    async fn ack(&self, delivery_tag: u64) -> MessagingResult<()> {
        let mut state = self.state.lock();
        if state.fail_ack {
            return Err(MessagingError::ack(delivery_tag, "scripted ack failure"));
        }
        let generation = self.generation;
        state
            .unacked
            .retain(|(owner, delivery)| !(*owner == generation && delivery.delivery_tag == delivery_tag));
        state.acked.push(delivery_tag);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        let state = self.state.lock();
        !self.closed && state.connected && state.generation == self.generation
    }

    fn reply_publisher(&self) -> &dyn ReplyPublisher {
        self
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut state = self.state.lock();
        state.closed_sessions += 1;
        state.requeue_unacked(Some(self.generation));
        if !state.pending.is_empty() {
            self.notify.notify_one();
        }
        if state.generation == self.generation {
            state.connected = false;
        }
    }
}
