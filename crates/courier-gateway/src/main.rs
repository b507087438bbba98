// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Courier Gateway - delivery status API
//!
//! Wires the delivery tracker to a transport, runs the retry scheduler and
//! serves delivery statistics over HTTP.
//!
//! # Usage
//!
//! ```bash
//! # Simulated broker, 20% acknowledgment loss
//! courier-gateway --mock --ack-loss 0.2
//!
//! # Using configuration file
//! courier-gateway --config courier.toml --mock
//!
//! # Generate / check a configuration file
//! courier-gateway gen-config --output courier.toml
//! courier-gateway validate --config courier.toml
//! ```
//!
//! # Endpoints
//!
//! - `GET /api/v1/health` - Health check
//! - `GET /api/v1/status` - Delivery statistics
//! - `GET /api/v1/info` - Gateway info
//! - `POST /api/v1/publish` - Publish with tracked delivery

mod handlers;
mod routes;
mod simulator;

use anyhow::{bail, Context};
use axum::Router;
use clap::{Parser, Subcommand};
use courier::{CourierConfig, DeliveryService, LoopbackTransport, ServiceHandle, Transport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::simulator::{Simulator, SimulatorConfig};

/// Courier delivery status gateway
#[derive(Parser, Debug)]
#[command(name = "courier-gateway")]
#[command(about = "Courier delivery status gateway")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides the config file)
    #[arg(short, long)]
    bind: Option<String>,

    /// HTTP server port (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Run against a simulated in-process broker
    #[arg(long)]
    mock: bool,

    /// Share of acknowledgments the simulated broker drops (0.0 - 1.0)
    #[arg(long, default_value = "0.1")]
    ack_loss: f64,

    /// Synthetic sensor publish interval in milliseconds (0 to disable)
    #[arg(long, default_value = "500")]
    publish_interval_ms: u64,

    /// Simulated link flap interval in seconds (0 to disable)
    #[arg(long, default_value = "30")]
    flap_interval_secs: u64,

    /// Statistics logging interval in seconds (0 to disable)
    #[arg(long, default_value = "10")]
    stats_interval: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "courier.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Shared application state
pub struct AppState {
    pub service: ServiceHandle<Arc<dyn Transport>>,
    pub config: CourierConfig,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: ServiceHandle<Arc<dyn Transport>>, config: CourierConfig) -> Self {
        Self {
            service,
            config,
            started_at: Instant::now(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Some(cmd) = args.command {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let config = build_config(&args)?;

    if !args.mock {
        bail!(
            "no broker client is bundled; run with --mock to use the simulated broker at {}",
            config.broker.address()
        );
    }
    if !(0.0..=1.0).contains(&args.ack_loss) {
        bail!("--ack-loss must be between 0.0 and 1.0, got {}", args.ack_loss);
    }

    let filters = courier::inbound::parse_filters(config.broker.subscriptions.as_slice())
        .context("invalid subscription filter")?;
    let (transport, events) = LoopbackTransport::with_subscriptions(filters);
    let transport = Arc::new(transport);
    let dyn_transport: Arc<dyn Transport> = transport.clone();

    let service = DeliveryService::start(&config, dyn_transport, events)?;
    let handle = service.handle();
    handle.set_inbound_handler(Arc::new(|msg: courier::InboundMessage| {
        tracing::trace!(
            topic = %msg.topic,
            device = ?msg.str_field("device_id"),
            "inbound message"
        );
    }));

    let simulator = Simulator::spawn(
        Arc::clone(&transport),
        handle.clone(),
        SimulatorConfig {
            ack_loss: args.ack_loss,
            publish_interval: Duration::from_millis(args.publish_interval_ms),
            flap_interval: Duration::from_secs(args.flap_interval_secs),
            ..SimulatorConfig::default()
        },
    );

    if args.stats_interval > 0 {
        let stats_handle = handle.clone();
        let period = Duration::from_secs(args.stats_interval);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                info!("{}", stats_handle.stats().format_summary());
            }
        });
    }

    let addr = format!("{}:{}", config.gateway.bind, config.gateway.port);
    let state = Arc::new(AppState::new(handle, config.clone()));
    let app = build_router(state);

    info!("Courier Gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("HTTP server: http://{}", addr);
    info!(
        "Simulated broker: ack loss {:.0}%, retry delay {}s, max retries {}",
        args.ack_loss * 100.0,
        config.tracker.retry_delay_seconds,
        config.tracker.max_retries
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Shutting down...");
        })
        .await
        .context("server error")?;

    simulator.shutdown().await;
    let stats = service.shutdown().await;

    println!();
    println!("Final Statistics:");
    print_stats(&stats);

    Ok(())
}

fn build_config(args: &Args) -> anyhow::Result<CourierConfig> {
    let mut config = match args.config {
        Some(ref path) => CourierConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => CourierConfig::default(),
    };

    config.apply_env()?;
    if let Some(ref bind) = args.bind {
        config.gateway.bind = bind.clone();
    }
    if let Some(port) = args.port {
        config.gateway.port = port;
    }
    config.validate()?;
    Ok(config)
}

pub(crate) fn build_router(state: Arc<AppState>) -> Router {
    routes::api_routes()
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn print_stats(stats: &courier::DeliveryStats) {
    println!("  Published:    {}", stats.total_published);
    println!("  Acknowledged: {}", stats.total_acknowledged);
    println!("  Failed:       {}", stats.total_failed);
    println!("  Retried:      {}", stats.total_retried);
    println!("  Received:     {}", stats.total_received);
    println!("  Pending:      {}", stats.pending_count);
    println!("  Reliability:  {:.2}%", stats.reliability_percentage());
}

fn cmd_gen_config(output: PathBuf) -> anyhow::Result<()> {
    let config = CourierConfig::default();
    let toml_str = toml::to_string_pretty(&config)?;

    let content = format!(
        r#"# Courier Gateway Configuration
# Generated by courier-gateway gen-config
#
# Broker settings can be overridden with MQTT_BROKER_HOST, MQTT_BROKER_PORT,
# MQTT_USERNAME and MQTT_PASSWORD.

{}
"#,
        toml_str
    );

    std::fs::write(&output, content)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> anyhow::Result<()> {
    match CourierConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!(
                "Tracker: qos {}, retry delay {}s, max retries {}",
                config.tracker.qos_level,
                config.tracker.retry_delay_seconds,
                config.tracker.max_retries
            );
            println!("Broker:  {}", config.broker.address());
            println!("Subscriptions: {}", config.broker.subscriptions.len());
            for filter in &config.broker.subscriptions {
                println!("  - {}", filter);
            }
            println!("Gateway: {}:{}", config.gateway.bind, config.gateway.port);
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}
