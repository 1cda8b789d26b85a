//! # BPM Request
//!
//! Test sender for the RPC protocol: publishes one listener event with a
//! temporary reply queue and prints whatever the bridge answers.

use anyhow::{bail, Context};
use bpm_bridge::logging::init_structured_logging;
use bpm_bridge::messaging::{listener_request, RpcClient, RpcReply};
use bpm_bridge::ConfigLoader;
use clap::Parser;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "bpm-request")]
#[command(about = "Send a synchronous listener event and wait for the reply")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Engine message name (camundaListenerMessageName)
    #[arg(short, long)]
    name: String,

    /// Process instance id (camundaProcessInstanceId)
    #[arg(short, long)]
    id: String,

    /// Data parameter as key=value; values are parsed as JSON when possible
    #[arg(short, long = "param", value_parser = parse_param)]
    params: Vec<(String, Value)>,

    /// Seconds to wait for a reply
    #[arg(short, long, default_value_t = 10)]
    timeout: u64,

    /// Queue to publish to (default: the configured input queue)
    #[arg(short, long)]
    queue: Option<String>,

    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(format!("expected key=value, got `{raw}`"));
    };
    if key.is_empty() {
        return Err("parameter name must not be empty".to_string());
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_structured_logging();

    let mut loader = ConfigLoader::new();
    if let Some(file) = cli.config {
        loader = loader.config_file(file);
    }
    let config = loader.load().context("failed to load configuration")?;
    let queue = cli.queue.unwrap_or_else(|| config.broker.queue.clone());

    let data: Map<String, Value> = cli.params.into_iter().collect();
    let body = listener_request(&cli.name, &cli.id, data);

    let mut client = RpcClient::connect(&config.broker)
        .await
        .context("failed to connect to RabbitMQ")?;
    let reply = client
        .call(&queue, &body, Duration::from_secs(cli.timeout))
        .await;
    client.close().await;

    match reply.context("request failed")? {
        RpcReply::Received(reply) => {
            println!("{}", serde_json::to_string_pretty(&reply)?);
            if reply.get("success").and_then(Value::as_bool) == Some(false) {
                bail!("bridge reported a failure");
            }
        }
        RpcReply::NoReply => println!("No reply within {}s", cli.timeout),
    }
    Ok(())
}
