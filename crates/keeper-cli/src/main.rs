//! `keeper`, the sync client for the keeper secret store.
//!
//! # Usage
//!
//! ```
//! keeper --config client.yml
//! KEEPER_CLIENT__ADDRESS__PORT=9000 keeper
//! ```
//!
//! Signs in or up, mirrors the account's records into the local store, then
//! either lists them or sends a new one.

mod app;
mod client;
mod prompt;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use app::{Flow, Outcome};
use clap::Parser;
use client::{ApiClient, ApiConfig};
use keeper_core::settings::Settings;
use keeper_store_sqlite::SqliteGateway;
use prompt::TerminalPrompt;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "keeper", about = "Sync client for the keeper secret store")]
struct Args {
  /// Path to the configuration file.
  #[arg(short, long, value_name = "FILE", default_value = "client.yml")]
  config: PathBuf,

  /// PEM root certificate for the server. Overrides `client.certificate`.
  #[arg(long, env = "KEEPER_CLIENT_CERT", hide_env_values = true)]
  client_cert: Option<String>,
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();

  let mut settings = Settings::load(&args.config)
    .with_context(|| format!("failed to load settings from {}", args.config.display()))?
    .client;
  if let Some(cert) = args.client_cert {
    settings.certificate = Some(cert);
  }

  let api = ApiClient::new(ApiConfig::from_settings(&settings))
    .context("failed to build HTTP client")?;
  let local = SqliteGateway::open(&settings.database_url)
    .await
    .with_context(|| format!("failed to open local store at {}", settings.database_url))?;

  match Flow::new(api, Arc::new(local), TerminalPrompt).run().await? {
    Outcome::Shown { records, report } => {
      if records.is_empty() {
        println!("No records.");
      }
      for record in records {
        println!("{record}");
      }
      if report.skipped > 0 || report.failed > 0 {
        println!(
          "Synced {} records; {} unreadable, {} not stored locally.",
          report.saved, report.skipped, report.failed
        );
      }
    }
    Outcome::Written(wire) => {
      println!("Saved [{}] {}", wire.detail_type, wire.metadata);
    }
  }

  Ok(())
}
