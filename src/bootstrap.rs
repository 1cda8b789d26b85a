//! # Bridge Bootstrap
//!
//! Wires a validated [`BridgeConfig`] into a runnable consumption loop: the
//! engine client, the event logger and its sinks, the handler for the
//! configured profile, and the AMQP connector.

use std::future::Future;
use std::sync::Arc;
use tracing::info;

use crate::bridge::MessageHandler;
use crate::config::BridgeConfig;
use crate::engine::{CamundaClient, ProcessEngine};
use crate::error::BridgeResult;
use crate::event_log::EventLogger;
use crate::messaging::{
    AmqpConnector, AmqpLogSink, BrokerConnector, ConsumerSettings, ConsumerStatsSnapshot,
    ConsumptionLoop,
};

pub struct BridgeSystem {
    config: BridgeConfig,
    consumption_loop: ConsumptionLoop,
}

impl BridgeSystem {
    /// Build the production system against RabbitMQ and the Camunda REST API
    pub fn from_config(config: BridgeConfig) -> BridgeResult<Self> {
        config.validate()?;
        let engine: Arc<dyn ProcessEngine> = Arc::new(CamundaClient::new(&config.engine)?);
        let connector: Arc<dyn BrokerConnector> = Arc::new(AmqpConnector::new(
            config.broker.clone(),
            "bpm-listener",
        ));
        Ok(Self::with_collaborators(config, engine, connector))
    }

    /// Build the system around caller-supplied engine and broker
    pub fn with_collaborators(
        config: BridgeConfig,
        engine: Arc<dyn ProcessEngine>,
        connector: Arc<dyn BrokerConnector>,
    ) -> Self {
        let profile = config.handler.profile();
        let mut logger = EventLogger::new(config.broker.queue.clone(), profile.owner_tag.clone());
        if config.logging.enabled {
            let log_broker = config.logging.broker_config(&config.broker);
            let sink = AmqpLogSink::new(log_broker)
                .with_reconnect_cooldown(config.consumer.reconnect_delay());
            logger = logger.with_sink(Arc::new(sink));
        }

        info!(
            profile = %profile.kind,
            owner = %profile.owner_tag,
            queue = %config.broker.queue,
            event_log_queue = config.logging.enabled.then_some(config.logging.queue.as_str()),
            "Bridge configured"
        );

        let handler = Arc::new(MessageHandler::new(
            profile,
            engine,
            logger,
            config.consumer.reply_on_success,
        ));
        let settings = ConsumerSettings::from_config(&config.broker, &config.consumer);

        Self {
            consumption_loop: ConsumptionLoop::new(connector, handler, settings),
            config,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn consumption_loop(&self) -> &ConsumptionLoop {
        &self.consumption_loop
    }

    pub async fn run_until_shutdown<F>(&self, shutdown: F) -> ConsumerStatsSnapshot
    where
        F: Future<Output = ()>,
    {
        self.consumption_loop.run_until_shutdown(shutdown).await
    }
}
