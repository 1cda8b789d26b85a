//! # Structured Logging Module
//!
//! Environment-aware `tracing` initialisation shared by both binaries.
//! `RUST_LOG` overrides the environment's default level and
//! `BPM_BRIDGE_LOG_FORMAT=json` switches the console output to JSON lines.

use std::collections::HashMap;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::loader::detect_environment;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Console output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_value(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Initialize structured logging once per process
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let variables: HashMap<String, String> = std::env::vars().collect();
        let environment = detect_environment(&variables);
        let filter = variables
            .get("RUST_LOG")
            .cloned()
            .unwrap_or_else(|| log_level(&environment).to_string());
        let format = LogFormat::from_value(
            variables.get("BPM_BRIDGE_LOG_FORMAT").map(String::as_str),
        );

        let layer = match format {
            LogFormat::Json => fmt::layer()
                .with_target(true)
                .with_level(true)
                .json()
                .with_filter(EnvFilter::new(&filter))
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(EnvFilter::new(&filter))
                .boxed(),
        };

        // Use try_init to avoid panic if global subscriber already set
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            filter = %filter,
            format = ?format,
            "Structured logging initialized"
        );
    });
}

/// Default filter for an environment
fn log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "debug",
        _ => "debug,lapin=info,reqwest=info",
    }
}
