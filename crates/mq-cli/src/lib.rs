//! # MQ CLI
//!
//! Command-line interface for the message-queue client.
//!
//! This module provides commands for:
//! - Running immediate and delay-queue workers
//! - Publishing immediate and delayed messages
//! - Validating and displaying the resolved configuration
//!
//! Configuration is loaded from YAML files plus `MQ__`-prefixed environment
//! variables (double-underscore separator), applied in order: system-wide
//! file, deployment-local file, explicit `--config` path, environment.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use mq_runtime::{
    shutdown_channel, Message, MessageHandler, MessageQueue, MessageQueueConfig, QueueError,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// CLI Structure
// ============================================================================

/// MQ CLI - workers and publishing for the message-queue client
#[derive(Parser)]
#[command(name = "mq-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run message-queue workers and publish messages")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MQ_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level (overrides the configured level)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the immediate-queue consumer until interrupted
    Worker {
        /// Exchange name
        #[arg(short, long)]
        exchange: String,

        /// Queue name
        #[arg(short, long)]
        queue: String,

        /// Route key
        #[arg(short, long)]
        route: String,
    },

    /// Run the delay-queue consumer until interrupted
    DelayWorker {
        /// Exchange name
        #[arg(short, long)]
        exchange: String,

        /// Queue name
        #[arg(short, long)]
        queue: String,

        /// Route key
        #[arg(short, long)]
        route: String,
    },

    /// Publish one message and print its assigned id
    Publish {
        /// Exchange name
        #[arg(short, long)]
        exchange: String,

        /// Queue name
        #[arg(short, long)]
        queue: String,

        /// Route key
        #[arg(short, long)]
        route: String,

        /// Message body
        #[arg(short, long)]
        body: String,

        /// Delay delivery by this many seconds
        #[arg(short, long)]
        delay: Option<u64>,
    },

    /// Load and validate the configuration
    Config {
        /// Show the resolved configuration
        #[arg(short, long)]
        show: bool,
    },
}

/// CLI error type with exit-code mapping in `main`
#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

// ============================================================================
// Entry point
// ============================================================================

/// Parse arguments, load configuration, and dispatch the command
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.log.level.clone());
    init_tracing(&level, cli.json_logs || config.log.json);

    match cli.command {
        Commands::Worker {
            exchange,
            queue,
            route,
        } => run_worker(config, &exchange, &queue, &route, false).await,
        Commands::DelayWorker {
            exchange,
            queue,
            route,
        } => run_worker(config, &exchange, &queue, &route, true).await,
        Commands::Publish {
            exchange,
            queue,
            route,
            body,
            delay,
        } => run_publish(config, &exchange, &queue, &route, body, delay).await,
        Commands::Config { show } => run_config(&config, show),
    }
}

// ============================================================================
// Configuration loading
// ============================================================================

/// Load configuration from files and environment.
///
/// Sources (later sources override earlier ones):
///  1. /etc/mq/message_queue.yaml    - system-wide defaults
///  2. ./config/message_queue.yaml   - deployment-local override
///  3. Explicit `--config` path      - operator-specified file
///  4. Environment variables prefixed `MQ__` (double-underscore separator),
///     e.g. `MQ__CONNECTIONS__REDIS__HOST=cache.internal`
///
/// Every field carries a serde default, so absent files produce a valid
/// configuration; a malformed file or an un-coercible environment value is
/// a hard error.
pub fn load_config(path: Option<&Path>) -> Result<MessageQueueConfig, CliError> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/mq/message_queue")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/message_queue")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Some(path) = path {
        builder = builder.add_source(
            config::File::from(path)
                .required(true)
                .format(config::FileFormat::Yaml),
        );
    }

    let settings = builder
        .add_source(config::Environment::with_prefix("MQ").separator("__"))
        .build()
        .map_err(|e| CliError::Configuration(e.to_string()))?;

    let config: MessageQueueConfig = settings
        .try_deserialize()
        .map_err(|e| CliError::Configuration(e.to_string()))?;
    config
        .validate()
        .map_err(|e| CliError::Configuration(e.to_string()))?;

    Ok(config)
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(format!("mq_runtime={level},mq_cli={level}"))
        });

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Default worker callback: log the delivery and acknowledge it.
///
/// Application deployments wire their own [`MessageHandler`] through the
/// library; the bundled worker makes queues observable without one.
pub struct EchoHandler;

#[async_trait]
impl MessageHandler for EchoHandler {
    async fn handle(&self, message: &Message) -> bool {
        info!(
            message_id = %message.id(),
            exchange = %message.exchange(),
            queue = %message.queue(),
            route_key = %message.route_key(),
            body = %message.body_text(),
            "received message"
        );
        true
    }
}

async fn run_worker(
    config: MessageQueueConfig,
    exchange: &str,
    queue: &str,
    route: &str,
    delayed: bool,
) -> Result<(), CliError> {
    let client = MessageQueue::connect(config).await?;
    info!(
        driver = %client.driver_kind(),
        exchange,
        queue,
        route,
        delayed,
        "starting consumer, press Ctrl+C to stop"
    );

    let (handle, signal) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            handle.shutdown();
        }
    });

    let handler: Arc<dyn MessageHandler> = Arc::new(EchoHandler);
    if delayed {
        client
            .delay_consumer(handler, exchange, queue, route, signal)
            .await?;
    } else {
        client
            .consumer(handler, exchange, queue, route, signal)
            .await?;
    }

    info!("consumer stopped");
    Ok(())
}

async fn run_publish(
    config: MessageQueueConfig,
    exchange: &str,
    queue: &str,
    route: &str,
    body: String,
    delay: Option<u64>,
) -> Result<(), CliError> {
    let client = MessageQueue::connect(config).await?;

    let message = match delay {
        Some(seconds) => {
            client
                .delay_queue(exchange, queue, route, body, Duration::from_secs(seconds))
                .await?
        }
        None => client.queue(exchange, queue, route, body).await?,
    };

    println!("{}", message.id());
    Ok(())
}

fn run_config(config: &MessageQueueConfig, show: bool) -> Result<(), CliError> {
    if show {
        let rendered = serde_json::to_string_pretty(config)
            .map_err(|e| CliError::Configuration(e.to_string()))?;
        println!("{rendered}");
    } else {
        println!("configuration OK ({} driver)", config.driver);
    }
    Ok(())
}
