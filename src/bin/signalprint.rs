//! signalprint command-line binary.
//!
//! Runs one collection session against the local machine and prints the
//! session report as JSON on stdout. Log lines go to stderr.
//!
//! # Environment Variables
//!
//! - `SIGNALPRINT_*`: session overrides, see [`SessionConfig::from_lookup`]
//! - `RUST_LOG`: tracing filter (default: "info,signalprint=debug")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin signalprint
//! SIGNALPRINT_SORT_KEYS=1 SIGNALPRINT_DEADLINE_MS=2000 cargo run --bin signalprint
//! ```

use std::sync::Arc;

use anyhow::Context;
use signalprint::{Orchestrator, SessionConfig, SystemHost, TracingSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,signalprint=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = SessionConfig::from_env().context("invalid SIGNALPRINT_* configuration")?;
    let orchestrator =
        Orchestrator::with_default_sources(config).context("failed to set up providers")?;
    tracing::info!(sources = ?orchestrator.source_names(), "signalprint starting");

    let report = orchestrator
        .run(&SystemHost::new(), Arc::new(TracingSink))
        .await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
