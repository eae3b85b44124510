//! Mapping between records and their SQLite rows.
//!
//! Payload kinds are dispatched through one closed table keyed by
//! [`DetailType`]: each entry names its lookup and insert scripts and knows
//! how to read a row and how to produce insert parameters. A new payload kind
//! needs exactly one new entry here.

use chrono::{DateTime, Utc};
use keeper_core::record::{
  BlobDetails, CardDetails, DetailType, LoginDetails, Payload, TextDetails,
};
use rusqlite::{
  Row, ToSql,
  types::{Type, Value},
};

use crate::scripts::Script;

/// A named SQL parameter, e.g. `(":login", Value::Text(..))`.
pub type Param = (&'static str, Value);

/// Borrow owned parameters in the form `rusqlite` binds.
pub fn named(params: &[Param]) -> Vec<(&str, &dyn ToSql)> {
  params.iter().map(|(name, value)| (*name, value as &dyn ToSql)).collect()
}

pub fn text(s: impl Into<String>) -> Value { Value::Text(s.into()) }

// ─── Records ─────────────────────────────────────────────────────────────────

/// A `records` row before its payload is attached.
#[derive(Debug)]
pub struct RawRecord {
  pub id:       i64,
  pub user_id:  i64,
  pub metadata: String,
  pub detail:   String,
}

impl RawRecord {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:       row.get(0)?,
      user_id:  row.get(1)?,
      metadata: row.get(2)?,
      detail:   row.get(3)?,
    })
  }
}

// ─── Payload dispatch ────────────────────────────────────────────────────────

/// One entry of the payload dispatch table.
pub struct PayloadTable {
  pub detail_type: DetailType,
  /// Looks a payload up by `:record_id`.
  pub select:      Script,
  pub insert:      Script,
  pub read:        fn(&Row<'_>) -> rusqlite::Result<Payload>,
  /// `None` if the payload is of another kind.
  pub params:      fn(&Payload) -> Option<Vec<Param>>,
}

pub const TABLES: [PayloadTable; 4] = [
  PayloadTable {
    detail_type: DetailType::Text,
    select:      Script::Details(DetailType::Text),
    insert:      Script::CreateDetails(DetailType::Text),
    read:        read_text,
    params:      text_params,
  },
  PayloadTable {
    detail_type: DetailType::Blob,
    select:      Script::Details(DetailType::Blob),
    insert:      Script::CreateDetails(DetailType::Blob),
    read:        read_blob,
    params:      blob_params,
  },
  PayloadTable {
    detail_type: DetailType::Card,
    select:      Script::Details(DetailType::Card),
    insert:      Script::CreateDetails(DetailType::Card),
    read:        read_card,
    params:      card_params,
  },
  PayloadTable {
    detail_type: DetailType::Login,
    select:      Script::Details(DetailType::Login),
    insert:      Script::CreateDetails(DetailType::Login),
    read:        read_login,
    params:      login_params,
  },
];

/// Read path: the entry for a stored `detail` tag, if it is known.
pub fn lookup(tag: &str) -> Option<&'static PayloadTable> {
  TABLES.iter().find(|t| t.detail_type.as_str() == tag)
}

/// Write path: the entry for a detail type.
pub fn table(detail_type: DetailType) -> Option<&'static PayloadTable> {
  TABLES.iter().find(|t| t.detail_type == detail_type)
}

// ─── Readers ─────────────────────────────────────────────────────────────────

fn read_text(row: &Row<'_>) -> rusqlite::Result<Payload> {
  Ok(Payload::Text(TextDetails {
    id:        row.get(0)?,
    record_id: row.get(1)?,
    data:      row.get(2)?,
  }))
}

fn read_blob(row: &Row<'_>) -> rusqlite::Result<Payload> {
  Ok(Payload::Blob(BlobDetails {
    id:        row.get(0)?,
    record_id: row.get(1)?,
    data:      row.get(2)?,
  }))
}

fn read_login(row: &Row<'_>) -> rusqlite::Result<Payload> {
  Ok(Payload::Login(LoginDetails {
    id:        row.get(0)?,
    record_id: row.get(1)?,
    login:     row.get(2)?,
    password:  row.get(3)?,
  }))
}

fn read_card(row: &Row<'_>) -> rusqlite::Result<Payload> {
  let expiration: Option<String> = row.get(5)?;
  let expiration = expiration
    .map(|s| {
      DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))
    })
    .transpose()?;

  Ok(Payload::Card(CardDetails {
    id: row.get(0)?,
    record_id: row.get(1)?,
    number: row.get(2)?,
    cardholder: row.get(3)?,
    cvc: row.get(4)?,
    expiration,
  }))
}

// ─── Writers ─────────────────────────────────────────────────────────────────

fn record_id(id: Option<i64>) -> Value { id.map_or(Value::Null, Value::Integer) }

fn text_params(payload: &Payload) -> Option<Vec<Param>> {
  let Payload::Text(d) = payload else { return None };
  Some(vec![(":record_id", record_id(d.record_id)), (":data", text(d.data.clone()))])
}

fn blob_params(payload: &Payload) -> Option<Vec<Param>> {
  let Payload::Blob(d) = payload else { return None };
  Some(vec![
    (":record_id", record_id(d.record_id)),
    (":data", Value::Blob(d.data.clone())),
  ])
}

fn login_params(payload: &Payload) -> Option<Vec<Param>> {
  let Payload::Login(d) = payload else { return None };
  Some(vec![
    (":record_id", record_id(d.record_id)),
    (":login", text(d.login.clone())),
    (":password", text(d.password.clone())),
  ])
}

fn card_params(payload: &Payload) -> Option<Vec<Param>> {
  let Payload::Card(d) = payload else { return None };
  Some(vec![
    (":record_id", record_id(d.record_id)),
    (":number", text(d.number.clone())),
    (":cardholder", text(d.cardholder.clone())),
    (":cvc", Value::Integer(i64::from(d.cvc))),
    (":expiration", d.expiration.map_or(Value::Null, |dt| text(dt.to_rfc3339()))),
  ])
}
