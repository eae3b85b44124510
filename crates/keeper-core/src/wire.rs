//! Messages exchanged between the sync client and the secret service.
//!
//! Every operation speaks JSON. A record's payload is a one-of: exactly one of
//! `text`, `blob`, `login` or `card` is present, and `detail_type` names which.
//! `detail_type` is kept as a plain string on the wire so that a client can
//! send a tag the server does not know and receive a validation error rather
//! than a decode failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Tokens ──────────────────────────────────────────────────────────────────

/// A signed bearer token, opaque to everyone except the token authority.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Token {
  pub value: String,
}

impl Token {
  pub fn new(value: impl Into<String>) -> Self {
    Self { value: value.into() }
  }
}

// ─── Sign-in ─────────────────────────────────────────────────────────────────

/// Body of both `Register` and `Authenticate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInRequest {
  pub login:    String,
  pub password: String,
}

/// Token pair issued on every successful sign-in or sign-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInResponse {
  pub access:  Token,
  pub refresh: Token,
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// A secret record as it travels over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
  pub access_token: Token,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id:           Option<i64>,
  #[serde(default)]
  pub metadata:     String,
  pub detail_type:  String,
  #[serde(default)]
  pub payload:      Option<WirePayload>,
}

/// The payload slot of a [`WireRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WirePayload {
  Text {
    text: String,
  },
  Blob {
    #[serde(with = "base64_bytes")]
    blob: Vec<u8>,
  },
  Login {
    login:    String,
    password: String,
  },
  Card {
    number:     String,
    cardholder: String,
    cvc:        u32,
    #[serde(default)]
    expiration: Option<DateTime<Utc>>,
  },
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// Failure class of a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
  InvalidArgument,
  NotFound,
  Internal,
}

impl std::fmt::Display for Code {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self {
      Self::InvalidArgument => "invalid argument",
      Self::NotFound => "not found",
      Self::Internal => "internal",
    })
  }
}

/// Error body returned by every failing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
  pub code:    Code,
  pub message: String,
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Blob bytes travel as standard base64.
mod base64_bytes {
  use base64::Engine as _;
  use base64::engine::general_purpose::STANDARD as B64;
  use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

  pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&B64.encode(bytes))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(d)?;
    B64.decode(encoded).map_err(D::Error::custom)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn payload_is_a_single_keyed_object() {
    let payload = WirePayload::Text { text: "hello".into() };
    assert_eq!(
      serde_json::to_value(&payload).unwrap(),
      json!({ "text": { "text": "hello" } })
    );
  }

  #[test]
  fn blob_travels_as_base64() {
    let payload = WirePayload::Blob { blob: vec![0, 1, 2, 255] };
    let value = serde_json::to_value(&payload).unwrap();
    assert_eq!(value, json!({ "blob": { "blob": "AAEC/w==" } }));

    let back: WirePayload = serde_json::from_value(value).unwrap();
    assert_eq!(back, payload);
  }

  #[test]
  fn record_without_payload_or_id_decodes() {
    let record: WireRecord = serde_json::from_value(json!({
      "access_token": { "value": "t" },
      "metadata": "m",
      "detail_type": "PHOTO",
    }))
    .unwrap();
    assert_eq!(record.detail_type, "PHOTO");
    assert!(record.payload.is_none());
    assert!(record.id.is_none());
  }

  #[test]
  fn status_code_is_snake_case() {
    let status = Status { code: Code::InvalidArgument, message: "bad".into() };
    assert_eq!(
      serde_json::to_value(&status).unwrap(),
      json!({ "code": "invalid_argument", "message": "bad" })
    );
  }
}
