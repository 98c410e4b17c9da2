#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # panelbridge
//!
//! Keeps one authenticated session open against each configured SMS panel
//! and serves the panels' message logs and number inventories as JSON.
//!
//! ## Subcommands
//!
//! - `panelbridge serve` (default) — run the HTTP server
//! - `panelbridge fetch <panel> <sms|numbers>` — log in, query once, print the envelope
//! - `panelbridge presets` — list the built-in panel presets
//!
//! See [`panelbridge::routes`] for the API surface.
//!
//! ## Architecture
//!
//! ```text
//! main.rs          — entry point, clap subcommands, graceful shutdown
//! config.rs        — TOML + env-var configuration
//! panel/
//!   preset.rs      — built-in parameter sets per panel deployment
//!   profile.rs     — PanelProfile, QuerySpec, token policy
//!   window.rs      — date windows rendered to fdate1/fdate2
//! scrape.rs        — captcha, token, HTML and block detection
//! transport.rs     — Transport trait, reqwest client with clearable cookies
//! session.rs       — SessionClient state machine, login, retry, cooldown
//! normalize.rs     — DataTables envelope and row remapping
//! registry.rs      — one SessionClient per configured panel
//! auth.rs          — API key middleware, constant-time comparison
//! routes/
//!   health.rs      — GET /api/health
//!   panels.rs      — panel status, reports, session reset
//! ```

use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use panelbridge::panel::preset;
use panelbridge::{routes, AppState, Config, PanelRegistry, Report};

/// Session-keeping JSON bridge for SMS reseller panels.
#[derive(Parser)]
#[command(name = "panelbridge", version)]
struct Cli {
    /// Path to TOML config file.
    #[arg(long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default when no subcommand given).
    Serve,
    /// Log in to one panel, run one report query and print the result.
    Fetch {
        /// Panel id from the config file.
        panel: String,
        /// Which report to fetch.
        #[arg(value_enum)]
        report: ReportArg,
    },
    /// List the built-in panel presets.
    Presets,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportArg {
    Sms,
    Numbers,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Presets) => {
            for name in preset::NAMES {
                println!("{name:<14} {}", preset::describe(name));
            }
            ExitCode::SUCCESS
        }
        Some(Commands::Fetch { panel, report }) => {
            run_fetch(cli.config.as_deref(), &panel, report).await
        }
        Some(Commands::Serve) | None => run_server(cli.config.as_deref()).await,
    }
}

/// Load config and initialise tracing. Errors go to stderr since logging
/// isn't up yet.
fn init(config_path: Option<&str>) -> Option<Config> {
    let config = match Config::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("panelbridge: {e}");
            return None;
        }
    };

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_writer(std::io::stderr)
        .init();
    Some(config)
}

async fn run_fetch(config_path: Option<&str>, panel: &str, report: ReportArg) -> ExitCode {
    let Some(config) = init(config_path) else {
        return ExitCode::FAILURE;
    };
    let registry = match PanelRegistry::from_config(&config) {
        Ok(r) => r,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let Some(client) = registry.get(panel) else {
        error!("no panel named {panel:?} in config");
        return ExitCode::FAILURE;
    };

    let result = match report {
        ReportArg::Sms => client.fetch_message_log().await,
        ReportArg::Numbers => client.fetch_number_inventory().await,
    };
    match result {
        Ok(Report::Normalized(envelope)) => match serde_json::to_string_pretty(&envelope) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("failed to encode report: {e}");
                ExitCode::FAILURE
            }
        },
        Ok(Report::Raw(body)) => {
            warn!(panel = %panel, "panel returned a non-envelope body, printing verbatim");
            println!("{body}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(panel = %panel, code = e.code(), "{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(config_path: Option<&str>) -> ExitCode {
    let Some(config) = init(config_path) else {
        return ExitCode::FAILURE;
    };

    info!("panelbridge v{} starting", env!("CARGO_PKG_VERSION"));

    let panels = match PanelRegistry::from_config(&config) {
        Ok(p) => p,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if panels.is_empty() {
        warn!("No panels configured; only /api/health will be useful");
    }
    if config.auth.api_key.is_none() {
        warn!("No API key configured; panel routes are open to anyone who can reach {}", config.server.listen);
    }

    let state = AppState::new(config, panels);
    let app = routes::router(state.clone());

    let listener = match TcpListener::bind(&state.config.server.listen).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {}: {e}", state.config.server.listen);
            return ExitCode::FAILURE;
        }
    };
    info!("Listening on {}", state.config.server.listen);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Goodbye");
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {e}");
                ctrl_c.await.ok();
                info!("Received SIGINT");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received SIGINT");
    }
}
