//! # Testing Infrastructure
//!
//! In-memory stand-ins for the bridge's collaborators, usable from unit and
//! integration tests without a broker or a process engine.
//!
//! ## Modules
//!
//! - `broker` - Scripted broker connector and session
//! - `engine` - Mock process engine with queued responses
//! - `log_sink` - Event-log sink that records every entry

pub mod broker;
pub mod engine;
pub mod log_sink;

pub use broker::{PublishedReply, RecordingReplyPublisher, ScriptedBroker, ScriptedSession};
pub use engine::MockProcessEngine;
pub use log_sink::RecordingLogSink;
