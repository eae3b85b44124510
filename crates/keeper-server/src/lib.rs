//! The keeper secret service.
//!
//! Exposes an axum [`Router`] serving the keeper RPC surface, backed by any
//! [`SecretStore`] and guarded by a [`TokenAuthority`]. TLS and process
//! lifecycle are handled by the `keeper-server` binary.

pub mod error;
pub mod handlers;
pub mod token;

pub use error::RpcError;
pub use token::{TokenAuthority, TokenError};

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use keeper_core::store::SecretStore;
use tokio_util::sync::CancellationToken;

use handlers::{health, records, sign_in};

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<S> {
  pub store:    Arc<S>,
  pub tokens:   Arc<TokenAuthority>,
  /// Cancelled when the server begins shutting down.
  pub shutdown: CancellationToken,
}

impl<S> AppState<S> {
  pub fn new(store: S, tokens: TokenAuthority) -> Self {
    Self {
      store:    Arc::new(store),
      tokens:   Arc::new(tokens),
      shutdown: CancellationToken::new(),
    }
  }
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:    self.store.clone(),
      tokens:   self.tokens.clone(),
      shutdown: self.shutdown.clone(),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the RPC router.
pub fn router<S: SecretStore + 'static>(state: AppState<S>) -> Router {
  Router::new()
    .route("/health",            get(health))
    .route("/rpc/register",      post(sign_in::register::<S>))
    .route("/rpc/authenticate",  post(sign_in::authenticate::<S>))
    .route("/rpc/token",         post(sign_in::refresh::<S>))
    .route("/rpc/records",       post(records::add::<S>))
    .route("/rpc/records/sync",  post(records::sync::<S>))
    .with_state(state)
}
