//! # Bridge
//!
//! The per-message pipeline between the inbound queue and the process
//! engine: validate, merge variables, correlate, reply.

pub mod dispatcher;
pub mod handler;
pub mod merge;
pub mod profile;
pub mod responder;
pub mod validator;

pub use dispatcher::CorrelationDispatcher;
pub use handler::{HandlerOutcome, MessageContext, MessageHandler};
pub use merge::VariableMerger;
pub use profile::{HandlerProfile, MergeStrategy, MissingFieldPolicy, ProfileKind};
pub use responder::{ReplyBody, ReplyResponder};
pub use validator::{MessageValidator, ValidationDecision, ValidationIssue, ValidationResult};
