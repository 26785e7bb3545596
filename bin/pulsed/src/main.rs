//! ---
//! pulse_section: "01-core-functionality"
//! pulse_subsection: "binary"
//! pulse_type: "source"
//! pulse_scope: "code"
//! pulse_description: "Binary entrypoint for the Pulse daemon."
//! pulse_version: "v0.0.0-prealpha"
//! pulse_owner: "tbd"
//! ---
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pulse_api::handlers::{create_data, get_data, health_check};
use pulse_api::{build_router, termination_signals, ApiListener, ApiState, SignalBridge};
use pulse_common::logging::init_tracing;
use pulse_common::time::iso_timestamp;
use pulse_common::{AppConfig, SERVICE_NAME};
use pulse_logging::{call_instrumented, TraceContext, TracingObserver};
use serde_json::json;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(author, version, about = "Pulse service daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "IP", help = "Override the listen address")]
    host: Option<IpAddr>,

    #[arg(long, value_name = "PORT", help = "Override the listen port")]
    port: Option<u16>,

    #[arg(long, value_name = "LEVEL", help = "Minimum log level (trace, debug, info, warning, error, critical)")]
    log_level: Option<String>,

    #[arg(long = "env", value_name = "NAME", help = "Override the environment label")]
    environment: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
enum Commands {
    #[command(about = "Serve HTTP until a termination signal arrives")]
    Serve,
    #[command(about = "Run the health, read and create operations once and exit")]
    SelfCheck,
}

impl Cli {
    fn apply_overrides(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(host) = self.host {
            config.api.host = host;
        }
        if let Some(port) = self.port {
            config.api.port = port;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(environment) = &self.environment {
            config.environment = environment.clone();
        }
        config.validate()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config)?;
    let _logging = init_tracing(SERVICE_NAME, &config.logging)?;

    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&config).await,
        Commands::SelfCheck => self_check(&config),
    };
    if let Err(err) = &result {
        error!(exception = ?err, "Unhandled exception: {err}");
    }
    result
}

async fn serve(config: &AppConfig) -> Result<()> {
    // Installed before binding: from here on SIGINT/SIGTERM drain instead of killing the process.
    let signals = termination_signals().context("unable to install termination signal handlers")?;

    let state = Arc::new(ApiState::from_config(config));
    let listener = Arc::new(ApiListener::new(build_router(state)));
    let addr = listener
        .start(config.api.listen_addr())
        .context("listener failed to start")?;
    info!(
        address = %addr,
        environment = %config.environment,
        "Pulse running; waiting for termination signal"
    );

    let signal = SignalBridge::new(listener).park_on(signals).await?;
    match signal {
        Some(signal) => info!(signal = %signal, "shutdown complete; exiting"),
        None => info!("signal source closed; exiting"),
    }
    Ok(())
}

fn self_check(config: &AppConfig) -> Result<()> {
    TraceContext::generate().sync_scope(|| -> Result<()> {
        info!("Starting Pulse self-check");
        info!("Running in {} environment", config.environment);

        let health = call_instrumented(&TracingObserver, "health_check", (), |()| health_check())?;
        info!("Health check status: {}", health.status);

        let listing = call_instrumented(&TracingObserver, "get_data", (), |()| get_data())?;
        info!("Retrieved {} items", listing.count);

        let item = json!({"name": "New Item", "created_at": iso_timestamp()});
        let created = call_instrumented(&TracingObserver, "create_data", item, create_data)?;
        info!("Created new item with ID: {}", created.id);

        info!("Self-check completed successfully");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_serve() {
        let cli = Cli::try_parse_from(["pulsed"]).unwrap();
        assert_eq!(cli.command, None);
        assert_eq!(cli.command.unwrap_or(Commands::Serve), Commands::Serve);
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "pulsed",
            "--host",
            "127.0.0.1",
            "--port",
            "9191",
            "--log-level",
            "debug",
            "--env",
            "staging",
            "self-check",
        ])
        .unwrap();
        assert_eq!(cli.command, Some(Commands::SelfCheck));

        let mut config = AppConfig::default();
        cli.apply_overrides(&mut config).unwrap();
        assert_eq!(config.api.listen_addr(), "127.0.0.1:9191".parse().unwrap());
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.environment, "staging");
    }

    #[test]
    fn invalid_level_flag_is_rejected() {
        let cli = Cli::try_parse_from(["pulsed", "--log-level", "shouty"]).unwrap();
        let mut config = AppConfig::default();
        assert!(cli.apply_overrides(&mut config).is_err());
    }

    #[test]
    fn self_check_succeeds() {
        self_check(&AppConfig::default()).unwrap();
    }
}
