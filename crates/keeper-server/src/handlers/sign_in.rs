//! Registration, authentication and access-token refresh.

use axum::{Json, extract::State, extract::rejection::JsonRejection};
use keeper_core::{
  store::{FailureKind, SecretStore, StoreError as _},
  user::User,
  wire::{SignInRequest, SignInResponse, Token},
};

use crate::{
  AppState,
  error::RpcError,
  token::{ACCESS_TTL, TokenError},
};

fn signing_failed(e: TokenError) -> RpcError { RpcError::InvalidArgument(e.to_string()) }

/// `POST /rpc/register`
pub async fn register<S: SecretStore + 'static>(
  State(state): State<AppState<S>>,
  body: Result<Json<SignInRequest>, JsonRejection>,
) -> Result<Json<SignInResponse>, RpcError> {
  let Json(req) = body?;
  let user = User::from(req);
  user.validate().map_err(|e| RpcError::InvalidArgument(e.to_string()))?;

  let username = user.username.clone();
  let user = user.hashed().map_err(|e| RpcError::Internal(e.to_string()))?;
  state
    .store
    .register_user(user)
    .await
    .map_err(|e| RpcError::InvalidArgument(e.to_string()))?;

  tracing::info!(%username, "user registered");
  state.tokens.issue_pair(&username).map(Json).map_err(signing_failed)
}

/// `POST /rpc/authenticate`
pub async fn authenticate<S: SecretStore + 'static>(
  State(state): State<AppState<S>>,
  body: Result<Json<SignInRequest>, JsonRejection>,
) -> Result<Json<SignInResponse>, RpcError> {
  let Json(req) = body?;
  let password = req.password.clone();

  let stored = state
    .store
    .login_user(User::from(req))
    .await
    .map_err(|e| match e.kind() {
      FailureKind::NotFound => RpcError::NotFound(e.to_string()),
      _ => RpcError::InvalidArgument(e.to_string()),
    })?;
  stored
    .verify_password(&password)
    .map_err(|e| RpcError::InvalidArgument(e.to_string()))?;

  tracing::debug!(username = %stored.username, "user authenticated");
  state.tokens.issue_pair(&stored.username).map(Json).map_err(signing_failed)
}

/// `POST /rpc/token`: exchange any valid token for a fresh access token.
pub async fn refresh<S: SecretStore + 'static>(
  State(state): State<AppState<S>>,
  body: Result<Json<Token>, JsonRejection>,
) -> Result<Json<Token>, RpcError> {
  let Json(token) = body?;
  let username = state
    .tokens
    .verify(&token.value)
    .map_err(|e| RpcError::InvalidArgument(e.to_string()))?;

  state.tokens.issue(&username, ACCESS_TTL).map(Json).map_err(signing_failed)
}
