//! # Broker Connection Manager
//!
//! One AMQP connection/channel pair per session, in publisher-confirm mode
//! with a prefetch of exactly one. The consumption loop owns the session and
//! rebuilds it wholesale after any error; nothing here retries on its own.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::types::{FieldTable, ShortString};
use lapin::uri::AMQPUri;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use tracing::{debug, info, warn};

use super::envelope::Delivery;
use super::errors::{MessagingError, MessagingResult};
use crate::config::BrokerConfig;

/// Unacknowledged deliveries the broker may push to one consumer
pub const PREFETCH_COUNT: u16 = 1;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Publishing side of a session, as used by the reply responder
#[async_trait]
pub trait ReplyPublisher: Send + Sync {
    /// Publish `body` to the default exchange with `reply_to` as routing key
    /// and wait for the broker confirm
    async fn publish_reply(
        &self,
        reply_to: &str,
        correlation_id: &str,
        body: &[u8],
    ) -> MessagingResult<()>;
}

/// A live connection/channel pair
#[async_trait]
pub trait BrokerSession: ReplyPublisher {
    /// Register the single consumer on `queue` with manual acknowledgement
    async fn start_consuming(&mut self, queue: &str, consumer_tag: &str) -> MessagingResult<()>;

    /// Next delivery; `Ok(None)` once the broker cancelled the consumer
    async fn next_delivery(&mut self) -> MessagingResult<Option<Delivery>>;

    async fn ack(&self, delivery_tag: u64) -> MessagingResult<()>;

    fn is_connected(&self) -> bool;

    fn reply_publisher(&self) -> &dyn ReplyPublisher;

    /// Close the session; safe to call more than once
    async fn close(&mut self);
}

#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self) -> MessagingResult<Box<dyn BrokerSession>>;
}

/// Build the connection URI, carrying the heartbeat and connect timeout
pub fn amqp_uri(config: &BrokerConfig) -> AMQPUri {
    let mut uri = AMQPUri::default();
    uri.authority.host = config.host.clone();
    uri.authority.port = config.port;
    uri.authority.userinfo.username = config.user.clone();
    uri.authority.userinfo.password = config.password.clone();
    uri.vhost = config.vhost.clone();
    uri.query.heartbeat = Some(config.heartbeat_seconds);
    uri.query.connection_timeout = Some(config.connection_timeout().as_millis() as u64);
    uri
}

/// Connects to RabbitMQ with the broker settings it was built from
#[derive(Debug, Clone)]
pub struct AmqpConnector {
    config: BrokerConfig,
    connection_name: String,
}

impl AmqpConnector {
    pub fn new(config: BrokerConfig, connection_name: impl Into<String>) -> Self {
        Self {
            config,
            connection_name: connection_name.into(),
        }
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    async fn connect(&self) -> MessagingResult<Box<dyn BrokerSession>> {
        let session = AmqpSession::open(&self.config, &self.connection_name).await?;
        Ok(Box::new(session))
    }
}

pub struct AmqpSession {
    connection: Connection,
    channel: Channel,
    consumer: Option<Consumer>,
    queue: String,
    closed: bool,
}

impl std::fmt::Debug for AmqpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpSession")
            .field("connected", &self.connection.status().connected())
            .field("consuming", &self.consumer.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}

impl AmqpSession {
    /// Open a connection and channel with confirms enabled and prefetch 1
    pub async fn open(config: &BrokerConfig, connection_name: &str) -> MessagingResult<Self> {
        debug!(
            host = %config.host,
            port = config.port,
            vhost = %config.vhost,
            "Connecting to RabbitMQ"
        );

        let connect_timeout = config.connection_timeout();
        let connect = Connection::connect_uri(
            amqp_uri(config),
            ConnectionProperties::default().with_connection_name(connection_name.into()),
        );
        let connection = tokio::time::timeout(connect_timeout, connect)
            .await
            .map_err(|_| MessagingError::timeout("connect", connect_timeout.as_millis() as u64))?
            .map_err(|e| MessagingError::connection(format!("RabbitMQ connection failed: {e}")))?;

        let channel = connection.create_channel().await.map_err(|e| {
            MessagingError::connection(format!("RabbitMQ channel creation failed: {e}"))
        })?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| MessagingError::channel("confirm_select", e.to_string()))?;

        channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await
            .map_err(|e| MessagingError::channel("basic_qos", e.to_string()))?;

        info!(
            host = %config.host,
            vhost = %config.vhost,
            prefetch = PREFETCH_COUNT,
            "Connected to RabbitMQ"
        );

        Ok(Self {
            connection,
            channel,
            consumer: None,
            queue: String::new(),
            closed: false,
        })
    }

    /// Publish a JSON body to the default exchange and wait for the confirm
    pub async fn publish_json(
        &self,
        routing_key: &str,
        correlation_id: Option<&str>,
        reply_to: Option<&str>,
        body: &[u8],
    ) -> MessagingResult<()> {
        let mut properties =
            BasicProperties::default().with_content_type(ShortString::from(JSON_CONTENT_TYPE));
        if let Some(correlation_id) = correlation_id {
            properties = properties.with_correlation_id(ShortString::from(correlation_id));
        }
        if let Some(reply_to) = reply_to {
            properties = properties.with_reply_to(ShortString::from(reply_to));
        }

        let confirm = self
            .channel
            .basic_publish(
                "",
                routing_key,
                BasicPublishOptions::default(),
                body,
                properties,
            )
            .await
            .map_err(|e| MessagingError::publish(routing_key, format!("Publish failed: {e}")))?;

        let confirmation = confirm.await.map_err(|e| {
            MessagingError::publish(routing_key, format!("Publish confirmation failed: {e}"))
        })?;

        if confirmation.is_nack() {
            return Err(MessagingError::publish(
                routing_key,
                "broker rejected the message",
            ));
        }
        Ok(())
    }

    /// Declare a server-named, exclusive, auto-deleted queue
    pub async fn declare_reply_queue(&self) -> MessagingResult<String> {
        let queue = self
            .channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::channel("queue_declare", e.to_string()))?;
        Ok(queue.name().as_str().to_string())
    }
}

#[async_trait]
impl ReplyPublisher for AmqpSession {
    async fn publish_reply(
        &self,
        reply_to: &str,
        correlation_id: &str,
        body: &[u8],
    ) -> MessagingResult<()> {
        self.publish_json(reply_to, Some(correlation_id), None, body)
            .await
    }
}

#[async_trait]
impl BrokerSession for AmqpSession {
    async fn start_consuming(&mut self, queue: &str, consumer_tag: &str) -> MessagingResult<()> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::consume(queue, e.to_string()))?;

        debug!(queue = %queue, consumer_tag = %consumer_tag, "Consumer registered");
        self.consumer = Some(consumer);
        self.queue = queue.to_string();
        Ok(())
    }

    async fn next_delivery(&mut self) -> MessagingResult<Option<Delivery>> {
        let consumer = self
            .consumer
            .as_mut()
            .ok_or_else(|| MessagingError::consume("", "consumer was not started"))?;

        match consumer.next().await {
            Some(Ok(delivery)) => Ok(Some(Delivery {
                delivery_tag: delivery.delivery_tag,
                correlation_id: delivery
                    .properties
                    .correlation_id()
                    .as_ref()
                    .map(|id| id.as_str().to_string()),
                reply_to: delivery
                    .properties
                    .reply_to()
                    .as_ref()
                    .map(|queue| queue.as_str().to_string()),
                redelivered: delivery.redelivered,
                body: delivery.data,
            })),
            Some(Err(e)) => Err(MessagingError::consume(self.queue.as_str(), e.to_string())),
            None => Ok(None),
        }
    }

    async fn ack(&self, delivery_tag: u64) -> MessagingResult<()> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| MessagingError::ack(delivery_tag, e.to_string()))
    }

    fn is_connected(&self) -> bool {
        !self.closed && self.connection.status().connected()
    }

    fn reply_publisher(&self) -> &dyn ReplyPublisher {
        self
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.consumer = None;

        if !self.connection.status().connected() {
            return;
        }
        if let Err(e) = self.connection.close(200, "Bye").await {
            warn!(error = %e, "Error while closing RabbitMQ connection");
        }
    }
}
