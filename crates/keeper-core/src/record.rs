//! Secret records, the unit of storage and synchronisation.
//!
//! A record carries free-form metadata and exactly one typed payload. The
//! payload kind is a closed set; the `detail_type` tag of a record is derived
//! from the payload variant, so a record whose tag disagrees with its payload
//! cannot be constructed.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};

use crate::{
  Error, Result,
  wire::{Token, WirePayload, WireRecord},
};

// ─── Detail type ─────────────────────────────────────────────────────────────

/// The tag selecting which payload variant a record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetailType {
  Text,
  Blob,
  Card,
  /// Login/password pair. The tag is `DETAIL` for historical reasons.
  Login,
}

impl DetailType {
  pub const ALL: [Self; 4] = [Self::Text, Self::Blob, Self::Card, Self::Login];

  /// The string stored in the `detail` column and sent as `detail_type`.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Text => "TEXT",
      Self::Blob => "BLOB",
      Self::Card => "CARD",
      Self::Login => "DETAIL",
    }
  }
}

impl fmt::Display for DetailType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for DetailType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    Self::ALL
      .into_iter()
      .find(|t| t.as_str() == s)
      .ok_or_else(|| {
        Error::Validation(format!(
          "detail type must be one of TEXT, BLOB, CARD, DETAIL; got {s:?}"
        ))
      })
  }
}

// ─── Capability contract ─────────────────────────────────────────────────────

/// Behaviour shared by the four payload kinds.
///
/// Payload values are immutable once built: binding a record id returns a new
/// value instead of mutating the existing one.
pub trait Details: Sized {
  const DETAIL_TYPE: DetailType;

  /// Render this payload into the wire record's payload slot.
  fn to_wire(&self) -> WirePayload;

  /// A copy of this payload owned by the record with id `record_id`.
  fn with_record_id(self, record_id: i64) -> Self;

  fn record_id(&self) -> Option<i64>;
}

// ─── Payload kinds ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextDetails {
  pub id:        Option<i64>,
  pub record_id: Option<i64>,
  pub data:      String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlobDetails {
  pub id:        Option<i64>,
  pub record_id: Option<i64>,
  pub data:      Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoginDetails {
  pub id:        Option<i64>,
  pub record_id: Option<i64>,
  pub login:     String,
  pub password:  String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CardDetails {
  pub id:         Option<i64>,
  pub record_id:  Option<i64>,
  pub number:     String,
  pub cardholder: String,
  pub cvc:        u32,
  pub expiration: Option<DateTime<Utc>>,
}

impl TextDetails {
  pub fn new(data: impl Into<String>) -> Self {
    Self { data: data.into(), ..Self::default() }
  }
}

impl BlobDetails {
  pub fn new(data: impl Into<Vec<u8>>) -> Self {
    Self { data: data.into(), ..Self::default() }
  }
}

impl LoginDetails {
  pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
    Self { login: login.into(), password: password.into(), ..Self::default() }
  }
}

impl CardDetails {
  pub fn new(
    number: impl Into<String>,
    cardholder: impl Into<String>,
    cvc: u32,
    expiration: Option<DateTime<Utc>>,
  ) -> Self {
    Self {
      number: number.into(),
      cardholder: cardholder.into(),
      cvc,
      expiration,
      ..Self::default()
    }
  }
}

impl Details for TextDetails {
  const DETAIL_TYPE: DetailType = DetailType::Text;

  fn to_wire(&self) -> WirePayload { WirePayload::Text { text: self.data.clone() } }

  fn with_record_id(self, record_id: i64) -> Self {
    Self { record_id: Some(record_id), ..self }
  }

  fn record_id(&self) -> Option<i64> { self.record_id }
}

impl Details for BlobDetails {
  const DETAIL_TYPE: DetailType = DetailType::Blob;

  fn to_wire(&self) -> WirePayload { WirePayload::Blob { blob: self.data.clone() } }

  fn with_record_id(self, record_id: i64) -> Self {
    Self { record_id: Some(record_id), ..self }
  }

  fn record_id(&self) -> Option<i64> { self.record_id }
}

impl Details for LoginDetails {
  const DETAIL_TYPE: DetailType = DetailType::Login;

  fn to_wire(&self) -> WirePayload {
    WirePayload::Login {
      login:    self.login.clone(),
      password: self.password.clone(),
    }
  }

  fn with_record_id(self, record_id: i64) -> Self {
    Self { record_id: Some(record_id), ..self }
  }

  fn record_id(&self) -> Option<i64> { self.record_id }
}

impl Details for CardDetails {
  const DETAIL_TYPE: DetailType = DetailType::Card;

  fn to_wire(&self) -> WirePayload {
    WirePayload::Card {
      number:     self.number.clone(),
      cardholder: self.cardholder.clone(),
      cvc:        self.cvc,
      expiration: self.expiration,
    }
  }

  fn with_record_id(self, record_id: i64) -> Self {
    Self { record_id: Some(record_id), ..self }
  }

  fn record_id(&self) -> Option<i64> { self.record_id }
}

// ─── Payload ─────────────────────────────────────────────────────────────────

/// The payload of a record: exactly one of the four kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
  Text(TextDetails),
  Blob(BlobDetails),
  Card(CardDetails),
  Login(LoginDetails),
}

impl Payload {
  pub fn detail_type(&self) -> DetailType {
    match self {
      Self::Text(_) => TextDetails::DETAIL_TYPE,
      Self::Blob(_) => BlobDetails::DETAIL_TYPE,
      Self::Card(_) => CardDetails::DETAIL_TYPE,
      Self::Login(_) => LoginDetails::DETAIL_TYPE,
    }
  }

  pub fn to_wire(&self) -> WirePayload {
    match self {
      Self::Text(d) => d.to_wire(),
      Self::Blob(d) => d.to_wire(),
      Self::Card(d) => d.to_wire(),
      Self::Login(d) => d.to_wire(),
    }
  }

  pub fn with_record_id(self, record_id: i64) -> Self {
    match self {
      Self::Text(d) => Self::Text(d.with_record_id(record_id)),
      Self::Blob(d) => Self::Blob(d.with_record_id(record_id)),
      Self::Card(d) => Self::Card(d.with_record_id(record_id)),
      Self::Login(d) => Self::Login(d.with_record_id(record_id)),
    }
  }

  pub fn record_id(&self) -> Option<i64> {
    match self {
      Self::Text(d) => d.record_id(),
      Self::Blob(d) => d.record_id(),
      Self::Card(d) => d.record_id(),
      Self::Login(d) => d.record_id(),
    }
  }

  /// Build the payload named by `detail_type` from a wire payload slot.
  ///
  /// Fails if the slot holds a different kind than the tag announces.
  pub fn from_wire(detail_type: DetailType, wire: &WirePayload) -> Result<Self> {
    match (detail_type, wire) {
      (DetailType::Text, WirePayload::Text { text }) => {
        Ok(Self::Text(TextDetails::new(text.clone())))
      }
      (DetailType::Blob, WirePayload::Blob { blob }) => {
        Ok(Self::Blob(BlobDetails::new(blob.clone())))
      }
      (DetailType::Login, WirePayload::Login { login, password }) => {
        Ok(Self::Login(LoginDetails::new(login.clone(), password.clone())))
      }
      (DetailType::Card, WirePayload::Card { number, cardholder, cvc, expiration }) => {
        Ok(Self::Card(CardDetails::new(
          number.clone(),
          cardholder.clone(),
          *cvc,
          *expiration,
        )))
      }
      (tag, _) => Err(Error::Validation(format!(
        "payload does not match detail type {tag}"
      ))),
    }
  }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// One secret entry owned by a user.
///
/// `id` and `user_id` are assigned by the store; a record built by a client is
/// unbound until it is saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
  pub id:       Option<i64>,
  pub user_id:  Option<i64>,
  pub metadata: String,
  pub payload:  Payload,
}

impl Record {
  pub fn new(metadata: impl Into<String>, payload: Payload) -> Self {
    Self { id: None, user_id: None, metadata: metadata.into(), payload }
  }

  pub fn detail_type(&self) -> DetailType { self.payload.detail_type() }

  /// Map a wire record into a record, explaining any rejection.
  pub fn try_from_wire(wire: &WireRecord) -> Result<Self> {
    let detail_type: DetailType = wire.detail_type.parse()?;
    let slot = wire.payload.as_ref().ok_or_else(|| {
      Error::Validation(format!("{detail_type} record carries no payload"))
    })?;

    let mut payload = Payload::from_wire(detail_type, slot)?;
    if let Some(id) = wire.id {
      payload = payload.with_record_id(id);
    }

    Ok(Self {
      id: wire.id,
      user_id: None,
      metadata: wire.metadata.clone(),
      payload,
    })
  }

  /// Map a wire record into a record, or `None` if it is unusable.
  ///
  /// Callers treat `None` as "skip this message", not as a failure.
  pub fn parse(wire: &WireRecord) -> Option<Self> { Self::try_from_wire(wire).ok() }

  /// The wire form of this record, carrying `access_token`.
  pub fn to_wire(&self, access_token: Token) -> WireRecord {
    WireRecord {
      access_token,
      id: self.id,
      metadata: self.metadata.clone(),
      detail_type: self.detail_type().as_str().to_owned(),
      payload: Some(self.payload.to_wire()),
    }
  }

  /// Structural checks that the type system does not already guarantee.
  pub fn validate(&self) -> Result<()> {
    match (self.id, self.payload.record_id()) {
      (Some(id), Some(bound)) if id != bound => Err(Error::Validation(format!(
        "payload is bound to record {bound} but the record id is {id}"
      ))),
      _ => Ok(()),
    }
  }

  /// The same record with store-assigned identity removed, ready to be saved
  /// into another store.
  pub fn unbound(self) -> Self {
    let payload = match self.payload {
      Payload::Text(d) => Payload::Text(TextDetails { id: None, record_id: None, ..d }),
      Payload::Blob(d) => Payload::Blob(BlobDetails { id: None, record_id: None, ..d }),
      Payload::Card(d) => Payload::Card(CardDetails { id: None, record_id: None, ..d }),
      Payload::Login(d) => Payload::Login(LoginDetails { id: None, record_id: None, ..d }),
    };
    Self { id: None, user_id: None, metadata: self.metadata, payload }
  }
}

impl fmt::Display for Record {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}] {}: ", self.detail_type(), self.metadata)?;
    match &self.payload {
      Payload::Text(d) => write!(f, "{}", d.data),
      Payload::Blob(d) => write!(f, "<{} bytes>", d.data.len()),
      Payload::Login(d) => write!(f, "{} / {}", d.login, d.password),
      Payload::Card(d) => {
        write!(f, "{} {} cvc {}", d.number, d.cardholder, d.cvc)?;
        if let Some(exp) = d.expiration {
          write!(f, " exp {}", exp.format("%Y-%m-%d"))?;
        }
        Ok(())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone as _;

  fn samples() -> Vec<Payload> {
    vec![
      Payload::Text(TextDetails::new("hello")),
      Payload::Blob(BlobDetails::new(vec![0xde, 0xad, 0xbe, 0xef])),
      Payload::Login(LoginDetails::new("alice", "hunter2")),
      Payload::Card(CardDetails::new(
        "4111111111111111",
        "ALICE LIDDELL",
        123,
        Some(Utc.with_ymd_and_hms(2030, 1, 31, 0, 0, 0).unwrap()),
      )),
    ]
  }

  #[test]
  fn wire_round_trip_for_every_kind() {
    for payload in samples() {
      let record = Record::new("meta", payload);
      let parsed = Record::parse(&record.to_wire(Token::new("t"))).unwrap();
      assert_eq!(parsed, record);
    }
  }

  #[test]
  fn every_kind_is_covered() {
    let tags: Vec<_> = samples().iter().map(Payload::detail_type).collect();
    for t in DetailType::ALL {
      assert!(tags.contains(&t), "no sample for {t}");
    }
  }

  #[test]
  fn detail_type_strings() {
    for t in DetailType::ALL {
      assert_eq!(t.as_str().parse::<DetailType>().unwrap(), t);
    }
    assert_eq!(DetailType::Login.as_str(), "DETAIL");
    assert!(matches!("PHOTO".parse::<DetailType>(), Err(Error::Validation(_))));
    assert!("text".parse::<DetailType>().is_err());
  }

  #[test]
  fn unknown_tag_parses_to_none() {
    let wire = WireRecord {
      access_token: Token::default(),
      id:           None,
      metadata:     "m".into(),
      detail_type:  "PHOTO".into(),
      payload:      Some(WirePayload::Text { text: "x".into() }),
    };
    assert!(Record::parse(&wire).is_none());
    assert!(matches!(Record::try_from_wire(&wire), Err(Error::Validation(_))));
  }

  #[test]
  fn mismatched_payload_is_rejected() {
    let wire = WireRecord {
      access_token: Token::default(),
      id:           None,
      metadata:     "m".into(),
      detail_type:  "CARD".into(),
      payload:      Some(WirePayload::Text { text: "x".into() }),
    };
    assert!(Record::try_from_wire(&wire).is_err());
  }

  #[test]
  fn missing_payload_is_rejected() {
    let wire = WireRecord {
      access_token: Token::default(),
      id:           None,
      metadata:     "m".into(),
      detail_type:  "TEXT".into(),
      payload:      None,
    };
    assert!(Record::parse(&wire).is_none());
  }

  #[test]
  fn wire_id_binds_the_payload() {
    let mut wire = Record::new("m", Payload::Text(TextDetails::new("x")))
      .to_wire(Token::default());
    wire.id = Some(7);

    let record = Record::parse(&wire).unwrap();
    assert_eq!(record.id, Some(7));
    assert_eq!(record.payload.record_id(), Some(7));
    assert!(record.validate().is_ok());
  }

  #[test]
  fn binding_returns_a_new_value() {
    let original = TextDetails::new("x");
    let bound = original.clone().with_record_id(3);
    assert_eq!(original.record_id, None);
    assert_eq!(bound.record_id, Some(3));
    assert_eq!(bound.data, original.data);
  }

  #[test]
  fn validate_catches_foreign_binding() {
    let mut record = Record::new("m", Payload::Text(TextDetails::new("x").with_record_id(1)));
    record.id = Some(2);
    assert!(record.validate().is_err());
  }

  #[test]
  fn unbound_strips_identity() {
    let mut record = Record::new("m", Payload::Login(LoginDetails::new("a", "b").with_record_id(9)));
    record.id = Some(9);
    record.user_id = Some(1);

    let fresh = record.unbound();
    assert_eq!(fresh.id, None);
    assert_eq!(fresh.user_id, None);
    assert_eq!(fresh.payload.record_id(), None);
    assert_eq!(fresh.metadata, "m");
  }
}
