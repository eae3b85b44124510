//! Record upload and streaming sync.

use axum::{
  Json,
  body::Body,
  extract::{State, rejection::JsonRejection},
  http::header,
  response::{IntoResponse, Response},
};
use bytes::Bytes;
use keeper_core::{
  record::Record,
  store::SecretStore,
  wire::{Token, WireRecord},
};

use crate::{AppState, error::RpcError};

/// Content type of the sync response: one JSON [`WireRecord`] per line.
pub const NDJSON: &str = "application/x-ndjson";

/// `POST /rpc/records`
///
/// Token and storage failures are `Internal`; a record that cannot be
/// mapped is rejected as `InvalidArgument` before the store is touched.
/// Echoes the request on success.
pub async fn add<S: SecretStore + 'static>(
  State(state): State<AppState<S>>,
  body: Result<Json<WireRecord>, JsonRejection>,
) -> Result<Json<WireRecord>, RpcError> {
  let Json(wire) = body?;
  let username = state
    .tokens
    .verify(&wire.access_token.value)
    .map_err(|e| RpcError::Internal(e.to_string()))?;

  let record =
    Record::try_from_wire(&wire).map_err(|e| RpcError::InvalidArgument(e.to_string()))?;

  let saved = state
    .store
    .save_record(username.clone(), record)
    .await
    .map_err(|e| RpcError::Internal(e.to_string()))?;

  tracing::debug!(%username, id = ?saved.id, detail_type = %saved.detail_type(), "record saved");
  Ok(Json(wire))
}

/// `POST /rpc/records/sync`
///
/// The token is checked and the record set loaded before the response
/// starts, so those failures still get a status. After that each record is
/// one line of the body; the body ends early if the server starts shutting
/// down.
pub async fn sync<S: SecretStore + 'static>(
  State(state): State<AppState<S>>,
  body: Result<Json<Token>, JsonRejection>,
) -> Result<Response, RpcError> {
  let Json(token) = body?;
  let username = state
    .tokens
    .verify(&token.value)
    .map_err(|e| RpcError::InvalidArgument(e.to_string()))?;

  let records = state
    .store
    .user_records(username.clone())
    .await
    .map_err(|e| RpcError::InvalidArgument(e.to_string()))?;

  let shutdown = state.shutdown.clone();
  let total = records.len();

  let stream = async_stream::stream! {
    let mut sent = 0usize;
    for record in records {
      if shutdown.is_cancelled() {
        tracing::warn!(%username, sent, total, "sync interrupted by shutdown");
        return;
      }
      match serde_json::to_vec(&record.to_wire(token.clone())) {
        Ok(mut line) => {
          line.push(b'\n');
          sent += 1;
          yield Ok(Bytes::from(line));
        }
        Err(e) => {
          tracing::warn!(%username, sent, total, error = %e, "sync aborted");
          yield Err(std::io::Error::other(e));
          return;
        }
      }
    }
    tracing::info!(%username, sent, "sync complete");
  };

  Ok(([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(stream)).into_response())
}
