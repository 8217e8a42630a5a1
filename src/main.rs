//! imessage-relay CLI entry point.
//!
//! `serve` runs the webhook server (the default). `send`, `validate` and
//! `check-config` are one-shot helpers for local testing.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use imessage_relay::backend::build_backend;
use imessage_relay::config::RelayConfig;
use imessage_relay::delivery::{validate, DeliveryController, DeliveryRequest};
use imessage_relay::logging;
use imessage_relay::webhook::server;
use imessage_relay::webhook::WebhookResponse;

/// Deliver webhook payloads to iMessage.
#[derive(Parser)]
#[command(name = "imessage-relay", version, about)]
struct Cli {
    /// Subcommand to execute (defaults to `serve`).
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the webhook server.
    Serve,
    /// Deliver one message through the configured backend and print the outcome.
    Send {
        /// Message text.
        #[arg(long, short)]
        message: String,
        /// Recipient phone number; repeat for several. Defaults to PHONE_NUMBERS.
        #[arg(long = "to", short)]
        to: Vec<String>,
        /// Group chat name substring to try first.
        #[arg(long, short)]
        group: Option<String>,
    },
    /// Validate phone numbers and print the normalized list.
    Validate {
        /// Phone numbers to check.
        #[arg(required = true)]
        numbers: Vec<String>,
    },
    /// Print the effective configuration.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; real env vars still apply.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = RelayConfig::load().context("failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => handle_serve(config).await,
        Command::Send { message, to, group } => handle_send(config, message, to, group).await,
        Command::Validate { numbers } => handle_validate(&config, &numbers),
        Command::CheckConfig => handle_check_config(&config),
    }
}

fn build_controller(config: &RelayConfig) -> DeliveryController {
    let backend = build_backend(&config.backend);
    info!(backend = backend.name(), "messaging backend ready");
    DeliveryController::new(backend)
        .with_default_addressees(config.delivery.default_phone_numbers.clone())
        .with_fallback_policy(config.delivery.fallback_policy)
}

async fn handle_serve(config: RelayConfig) -> anyhow::Result<()> {
    let _logging_guard = match &config.logging.logs_dir {
        Some(dir) => Some(logging::init_production(dir, &config.logging.level)?),
        None => {
            logging::init_cli(&config.logging.level);
            None
        }
    };

    let controller = Arc::new(build_controller(&config));
    info!(
        fallback_policy = ?config.delivery.fallback_policy,
        default_recipients = controller.default_addressees().len(),
        "imessage-relay starting"
    );

    server::serve(&config.server, controller).await
}

async fn handle_send(
    config: RelayConfig,
    message: String,
    to: Vec<String>,
    group: Option<String>,
) -> anyhow::Result<()> {
    logging::init_cli(&config.logging.level);

    let controller = build_controller(&config);
    let request = DeliveryRequest {
        message,
        addressees: to,
        conversation_hint: group,
    };
    let outcome = controller.deliver(&request).await?;

    let body = serde_json::to_string_pretty(&WebhookResponse::from(&outcome))
        .context("failed to serialize delivery outcome")?;
    println!("{body}");
    Ok(())
}

fn handle_validate(config: &RelayConfig, numbers: &[String]) -> anyhow::Result<()> {
    logging::init_cli(&config.logging.level);

    for addressee in validate(numbers)? {
        println!("{addressee}");
    }
    Ok(())
}

fn handle_check_config(config: &RelayConfig) -> anyhow::Result<()> {
    let rendered = toml::to_string_pretty(config).context("failed to render configuration")?;
    println!("{rendered}");
    Ok(())
}
