//! # Messaging Module
//!
//! RabbitMQ plumbing for the bridge: the connection manager, the
//! consumption loop, the event-log queue sink and the RPC request client.

pub mod connection;
pub mod consumer;
pub mod envelope;
pub mod errors;
pub mod log_publisher;
pub mod rpc_client;

pub use connection::{
    AmqpConnector, AmqpSession, BrokerConnector, BrokerSession, ReplyPublisher, PREFETCH_COUNT,
};
pub use consumer::{
    ConsumerSettings, ConsumerState, ConsumerStats, ConsumerStatsSnapshot, ConsumptionLoop,
    DeliveryHandler,
};
pub use envelope::{Delivery, InboundEnvelope, RpcMetadata};
pub use errors::{MessagingError, MessagingResult};
pub use log_publisher::{AmqpLogSink, DEFAULT_LOG_RECONNECT_COOLDOWN};
pub use rpc_client::{listener_request, RpcClient, RpcReply};
