//! # Scrollback soak driver
//!
//! Exercises the terminal scrollback engine the way a multi-session terminal
//! does: every session archives rows from its own thread while a background
//! task keeps querying the shared memory total.
//!
//! ## Usage
//!
//! ```text
//! scrollback [--config <path>] [--json]
//! scrollback --schema
//! ```
//!
//! `--schema` prints the JSON Schema of the configuration file and exits.
//! `RUST_LOG` overrides the configured log level.

use anyhow::Context;
use scrollback_core::ScrollbackConfig;
use scrollback_engine::Backlog;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|arg| arg == "--schema") {
        let schema = ScrollbackConfig::json_schema();
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }
    let json_output = args.iter().any(|arg| arg == "--json");
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .map(|idx| {
            args.get(idx + 1)
                .map(String::as_str)
                .context("--config requires a path")
        })
        .transpose()?;

    let config = scrollback::load_config(config_path)
        .with_context(|| format!("loading configuration from {config_path:?}"))?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Scrollback soak v{} starting...", env!("CARGO_PKG_VERSION"));

    let outcome = scrollback::run(Backlog::global(), &config).await;
    // The global backlog is never dropped, so release it explicitly.
    Backlog::global().teardown();
    let report = outcome.map_err(|e| {
        tracing::error!("Soak run failed: {:#}", e);
        e
    })?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }

    tracing::info!("Scrollback soak shutting down");

    Ok(())
}
