//! snmp-gatewayd: run a gateway from a properties file.
//!
//! Serves a small set of in-memory attributes describing the daemon itself,
//! which makes it usable as a standalone agent for testing managers.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use chrono::Utc;
use clap::Parser;
use snmp_gateway::attribute::{
    AttributeDescriptor, AttributeType, AttributeValue, ColumnDescriptor, MemoryAttribute,
    OPTION_USE_ROW_STATUS, TableValue,
};
use snmp_gateway::config::parse_properties;
use snmp_gateway::notification::{
    NotificationDescriptor, NotificationEvent, OPTION_RECEIVER_ADDRESS,
};
use snmp_gateway::{GatewayConfig, SnmpGateway};
use tracing_subscriber::EnvFilter;

/// Run an SNMP gateway configured from a properties file.
#[derive(Debug, Parser)]
#[command(name = "snmp-gatewayd", version, about)]
struct Args {
    /// Properties file with the gateway parameters.
    #[arg(value_name = "FILE")]
    config: PathBuf,

    /// Send a `lifecycle` notification to this receiver on start and stop.
    #[arg(long, value_name = "ADDRESS")]
    receiver: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn init_tracing(&self) {
        let level = match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("snmp_gateway={}", level)));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    args.init_tracing();

    let text = match std::fs::read_to_string(&args.config) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error: cannot read {}: {}", args.config.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let config = match GatewayConfig::from_params(&parse_properties(&text)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(config, args.receiver.as_deref()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: GatewayConfig, receiver: Option<&str>) -> snmp_gateway::Result<()> {
    let started = Instant::now();
    let gateway = SnmpGateway::new(config);

    let uptime = MemoryAttribute::new(
        AttributeDescriptor::new("uptimeSeconds", AttributeType::Long).read_only(),
        AttributeValue::Long(0),
    );
    gateway.add_attribute(uptime.clone())?;
    gateway.add_attribute(MemoryAttribute::new(
        AttributeDescriptor::new("startedAt", AttributeType::Date).read_only(),
        AttributeValue::Date(Utc::now()),
    ))?;
    gateway.add_attribute(MemoryAttribute::new(
        AttributeDescriptor::new("description", AttributeType::String),
        AttributeValue::String(env!("CARGO_PKG_DESCRIPTION").to_string()),
    ))?;
    gateway.add_attribute(MemoryAttribute::new(
        AttributeDescriptor::new(
            "contacts",
            AttributeType::Table(vec![
                ColumnDescriptor::new("name", AttributeType::String),
                ColumnDescriptor::new("priority", AttributeType::Int),
            ]),
        )
        .with_option(OPTION_USE_ROW_STATUS, "true"),
        AttributeValue::Table(TableValue::new(vec!["name".into(), "priority".into()])),
    ))?;

    let lifecycle = match receiver {
        Some(address) => Some(gateway.add_notification(
            &NotificationDescriptor::new("lifecycle").with_option(OPTION_RECEIVER_ADDRESS, address),
        )?),
        None => None,
    };

    let local_addr = gateway.start().await?;
    tracing::info!(snmp.local_addr = %local_addr, "gateway serving, Ctrl-C to stop");
    if let Some(binding) = &lifecycle {
        binding
            .send(&NotificationEvent::new("lifecycle", "gateway started"))
            .await;
    }

    let mut tick = tokio::time::interval(std::time::Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tick.tick() => {
                uptime.replace(AttributeValue::Long(started.elapsed().as_secs() as i64));
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    tracing::error!(error = %err, "signal handler failed");
                }
                break;
            }
        }
    }

    if let Some(binding) = &lifecycle {
        binding
            .send(&NotificationEvent::new("lifecycle", "gateway stopping").with_severity(1))
            .await;
    }
    gateway.stop().await;
    Ok(())
}
