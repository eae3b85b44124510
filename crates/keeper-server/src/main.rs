//! keeper-server binary.
//!
//! Reads `server.yml` (or the path given with `--config`) overlaid by
//! `KEEPER_*` environment variables, migrates the SQLite store, and serves
//! the keeper RPC surface. TLS is enabled when both a certificate and a
//! private key are configured; otherwise the server speaks plain HTTP.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Context as _;
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use keeper_core::settings::Settings;
use keeper_server::{AppState, TokenAuthority};
use keeper_store_sqlite::SqliteGateway;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Keeper secret server")]
struct Cli {
  /// Path to the configuration file.
  #[arg(short, long, default_value = "server.yml")]
  config: PathBuf,

  /// Token signing key. Overrides `server.sign_key`.
  #[arg(long, env = "KEEPER_SIGN", hide_env_values = true)]
  sign: Option<String>,

  /// PEM private key. Overrides `server.private_key`.
  #[arg(long, env = "KEEPER_PRIVATE_KEY", hide_env_values = true)]
  private_key: Option<String>,

  /// PEM certificate chain. Overrides `server.certificate`.
  #[arg(long, env = "KEEPER_SERVER_CERT", hide_env_values = true)]
  server_cert: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let mut settings = Settings::load(&cli.config)
    .with_context(|| format!("failed to load settings from {:?}", cli.config))?
    .server;
  if let Some(sign) = cli.sign {
    settings.sign_key = sign;
  }
  if let Some(key) = cli.private_key {
    settings.private_key = Some(key);
  }
  if let Some(cert) = cli.server_cert {
    settings.certificate = Some(cert);
  }

  let tokens = TokenAuthority::new(&settings.sign_key).context("invalid token configuration")?;

  // A migration failure stops the process here, before anything is served.
  let store = SqliteGateway::open(&settings.database_url)
    .await
    .with_context(|| format!("failed to open store at {}", settings.database_url))?;

  let state = AppState::new(store, tokens);
  let shutdown = state.shutdown.clone();
  let app = keeper_server::router(state).layer(TraceLayer::new_for_http());

  let address = settings.address.to_string();
  let addr: SocketAddr = tokio::net::lookup_host(&address)
    .await
    .with_context(|| format!("failed to resolve {address}"))?
    .next()
    .with_context(|| format!("{address} resolved to nothing"))?;

  match (settings.certificate, settings.private_key) {
    (Some(cert), Some(key)) => {
      let _ = rustls::crypto::ring::default_provider().install_default();
      let tls = RustlsConfig::from_pem(cert.into_bytes(), key.into_bytes())
        .await
        .context("invalid TLS certificate or key")?;

      let handle = axum_server::Handle::new();
      tokio::spawn({
        let handle = handle.clone();
        async move {
          shutdown_signal(shutdown).await;
          handle.graceful_shutdown(Some(Duration::from_secs(10)));
        }
      });

      tracing::info!("Listening on https://{addr}");
      axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .context("server error")?;
    }
    (cert, key) => {
      if cert.is_some() || key.is_some() {
        tracing::warn!("TLS needs both a certificate and a private key; serving plain HTTP");
      }
      let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

      tracing::info!("Listening on http://{addr}");
      axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("server error")?;
    }
  }

  Ok(())
}

/// Resolve on Ctrl+C or SIGTERM, cancelling `shutdown` so in-flight sync
/// streams stop.
async fn shutdown_signal(shutdown: CancellationToken) {
  let ctrl_c = tokio::signal::ctrl_c();
  #[cfg(unix)]
  {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut sigterm) => {
        tokio::select! {
          _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
          _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
        }
      }
      Err(e) => {
        tracing::warn!(error = %e, "failed to install SIGTERM handler");
        ctrl_c.await.ok();
        tracing::info!("Received Ctrl+C, shutting down...");
      }
    }
  }
  #[cfg(not(unix))]
  {
    ctrl_c.await.ok();
    tracing::info!("Received Ctrl+C, shutting down...");
  }
  shutdown.cancel();
}
