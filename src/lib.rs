#![allow(clippy::doc_markdown)] // Allow technical terms like RabbitMQ, Camunda in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # BPM Bridge
//!
//! Message-driven bridge between RabbitMQ and a Camunda process engine.
//!
//! ## Overview
//!
//! The bridge consumes task-completion events from an input queue, merges
//! them with the variables the engine already holds for the target process
//! instance, and correlates the result as an engine message. Requests that
//! carry RPC metadata get their failure answered on the indicated reply
//! queue.
//!
//! ## Module Organization
//!
//! - [`messaging`] - Broker connection, consumption loop, log sink, RPC client
//! - [`bridge`] - Validation, variable merge, correlation and replies
//! - [`engine`] - Process engine contract and the Camunda REST client
//! - [`event_log`] - Event-log collaborator and its sinks
//! - [`config`] - Layered configuration loading
//! - [`error`] - Structured error handling
//! - [`testing`] - In-memory doubles for the broker and engine
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bpm_bridge::{config::ConfigLoader, BridgeSystem};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new().load()?;
//! let system = BridgeSystem::from_config(config)?;
//! let stats = system
//!     .run_until_shutdown(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await;
//! println!("processed {} deliveries", stats.deliveries_received);
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod event_log;
pub mod logging;
pub mod messaging;
pub mod testing;

pub use bootstrap::BridgeSystem;
pub use bridge::{HandlerOutcome, HandlerProfile, MessageHandler};
pub use config::{BridgeConfig, ConfigLoader};
pub use engine::{CamundaClient, CorrelationOutcome, ProcessEngine};
pub use error::{BridgeError, BridgeResult};
pub use event_log::{EventLogger, LogDirection, LogEntry, LogSink, Severity};
pub use messaging::{ConsumptionLoop, Delivery, InboundEnvelope, MessagingError};
