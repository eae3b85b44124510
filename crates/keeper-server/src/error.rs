//! RPC error classes and their HTTP rendering.

use axum::{
  Json,
  extract::rejection::JsonRejection,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use keeper_core::wire::{Code, Status};
use thiserror::Error;

/// An error returned by an RPC handler.
#[derive(Debug, Error)]
pub enum RpcError {
  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("internal: {0}")]
  Internal(String),
}

impl RpcError {
  pub fn code(&self) -> Code {
    match self {
      Self::InvalidArgument(_) => Code::InvalidArgument,
      Self::NotFound(_) => Code::NotFound,
      Self::Internal(_) => Code::Internal,
    }
  }

  fn status(&self) -> StatusCode {
    match self {
      Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
      Self::NotFound(_) => StatusCode::NOT_FOUND,
      Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl From<JsonRejection> for RpcError {
  fn from(rejection: JsonRejection) -> Self { Self::InvalidArgument(rejection.body_text()) }
}

impl IntoResponse for RpcError {
  fn into_response(self) -> Response {
    let status = self.status();
    let message = match &self {
      Self::InvalidArgument(m) | Self::NotFound(m) | Self::Internal(m) => m.clone(),
    };
    if status.is_server_error() {
      tracing::error!(%message, "rpc failed");
    } else {
      tracing::debug!(%message, code = %self.code(), "rpc rejected");
    }
    (status, Json(Status { code: self.code(), message })).into_response()
  }
}
