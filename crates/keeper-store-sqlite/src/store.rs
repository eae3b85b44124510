//! [`SqliteGateway`], the SQLite implementation of [`SecretStore`].

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use keeper_core::{
  record::{DetailType, Record},
  store::SecretStore,
  user::User,
};
use rusqlite::OptionalExtension as _;
use tokio_rusqlite::Connection;

use crate::{
  Error, Result,
  connection::{ConnectionStrategy, Connector},
  encode::{RawRecord, lookup, named, table, text},
  scripts::{Script, ScriptCatalogue},
};

// ─── Gateway ─────────────────────────────────────────────────────────────────

/// Runs the named script catalogue against handles from a
/// [`ConnectionStrategy`].
pub struct SqliteGateway<C = Connector> {
  strategy: C,
  scripts:  ScriptCatalogue,
}

impl SqliteGateway<Connector> {
  /// Open a gateway on a configured database URL and migrate it.
  pub async fn open(url: &str) -> Result<Self> {
    Self::new(Connector::from_url(url).await?).await
  }
}

impl<C: ConnectionStrategy> SqliteGateway<C> {
  /// Build a gateway and migrate its schema. A migration failure is
  /// returned and no gateway is built.
  pub async fn new(strategy: C) -> Result<Self> {
    strategy.migrate().await?;
    Ok(Self { strategy, scripts: ScriptCatalogue::default() })
  }

  /// Read scripts from `dir` instead of the embedded catalogue where present.
  pub fn with_script_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.scripts = ScriptCatalogue::new(Some(dir.into()));
    self
  }

  pub fn strategy(&self) -> &C { &self.strategy }

  /// Run `f` on a fresh handle, releasing the handle whatever the outcome.
  async fn execute<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&mut rusqlite::Connection) -> tokio_rusqlite::Result<T> + Send + 'static,
    T: Send + 'static,
  {
    let conn: Connection = self.strategy.create().await?;
    let result = conn.call(f).await;
    let closed = self.strategy.close(conn).await;

    let value = result?;
    closed?;
    Ok(value)
  }
}

// ─── SecretStore impl ────────────────────────────────────────────────────────

impl<C: ConnectionStrategy> SecretStore for SqliteGateway<C> {
  type Error = Error;

  async fn register_user(&self, user: User) -> Result<()> {
    user.validate()?;
    let sql = self.scripts.get(Script::CreateUser).await?;
    let params = vec![(":login", text(user.username.clone())), (":password", text(user.password))];

    self
      .execute(move |conn| {
        conn.execute(&sql, named(&params).as_slice())?;
        Ok(())
      })
      .await?;

    tracing::debug!(username = %user.username, "registered user");
    Ok(())
  }

  async fn login_user(&self, user: User) -> Result<User> {
    let sql = self.scripts.get(Script::User).await?;
    let username = user.username;

    self
      .execute(move |conn| {
        let found = conn
          .query_row(&sql, named(&[(":login", text(username.clone()))]).as_slice(), |r| {
            Ok(User { id: Some(r.get(0)?), username: r.get(1)?, password: r.get(2)? })
          })
          .optional()?;
        found.ok_or_else(|| Error::NotFound(format!("user {username:?}")).raise())
      })
      .await
  }

  async fn user_records(&self, username: String) -> Result<Vec<Record>> {
    let user_sql = self.scripts.get(Script::User).await?;
    let records_sql = self.scripts.get(Script::Records).await?;
    let mut detail_sql: HashMap<DetailType, Arc<str>> = HashMap::new();
    for t in DetailType::ALL {
      if let Some(entry) = table(t) {
        detail_sql.insert(t, self.scripts.get(entry.select).await?);
      }
    }

    let records = self
      .execute(move |conn| {
        let user_id: i64 = conn
          .query_row(&user_sql, named(&[(":login", text(username.clone()))]).as_slice(), |r| {
            r.get(0)
          })
          .optional()?
          .ok_or_else(|| Error::NotFound(format!("user {username:?}")).raise())?;

        let raw: Vec<RawRecord> = {
          let mut stmt = conn.prepare(&records_sql)?;
          let rows = stmt.query_map(
            named(&[(":user_id", rusqlite::types::Value::Integer(user_id))]).as_slice(),
            RawRecord::from_row,
          )?;
          rows.collect::<rusqlite::Result<_>>()?
        };

        let mut records = Vec::with_capacity(raw.len());
        for row in raw {
          let entry = lookup(&row.detail)
            .ok_or_else(|| Error::UnknownDetailType(row.detail.clone()).raise())?;
          let sql = detail_sql
            .get(&entry.detail_type)
            .ok_or_else(|| Error::UnknownDetailType(row.detail.clone()).raise())?;

          let payload = conn
            .query_row(
              sql,
              named(&[(":record_id", rusqlite::types::Value::Integer(row.id))]).as_slice(),
              entry.read,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("payload of record {}", row.id)).raise())?;

          records.push(Record {
            id: Some(row.id),
            user_id: Some(row.user_id),
            metadata: row.metadata,
            payload,
          });
        }
        Ok(records)
      })
      .await?;

    tracing::debug!(count = records.len(), "loaded user records");
    Ok(records)
  }

  async fn save_record(&self, username: String, record: Record) -> Result<Record> {
    record.validate()?;
    let detail_type = record.detail_type();
    let entry = table(detail_type)
      .ok_or_else(|| Error::UnknownDetailType(detail_type.as_str().to_owned()))?;

    let user_sql = self.scripts.get(Script::User).await?;
    let record_sql = self.scripts.get(Script::CreateRecord).await?;
    let insert_sql = self.scripts.get(entry.insert).await?;
    let params_of = entry.params;

    self
      .execute(move |conn| {
        let tx = conn.transaction()?;

        let user_id: i64 = tx
          .query_row(&user_sql, named(&[(":login", text(username.clone()))]).as_slice(), |r| {
            r.get(0)
          })
          .optional()?
          .ok_or_else(|| Error::NotFound(format!("user {username:?}")).raise())?;

        let record_id: i64 = tx.query_row(
          &record_sql,
          named(&[
            (":user_id", rusqlite::types::Value::Integer(user_id)),
            (":metadata", text(record.metadata.clone())),
            (":detail", text(detail_type.as_str())),
          ])
          .as_slice(),
          |r| r.get(0),
        )?;

        let payload = record.payload.with_record_id(record_id);
        let params = params_of(&payload).ok_or_else(|| {
          Error::Core(keeper_core::Error::Validation(format!(
            "payload does not match detail type {detail_type}"
          )))
          .raise()
        })?;
        tx.execute(&insert_sql, named(&params).as_slice())?;
        tx.commit()?;

        Ok(Record {
          id: Some(record_id),
          user_id: Some(user_id),
          metadata: record.metadata,
          payload,
        })
      })
      .await
  }

  async fn truncate(&self) -> Result<()> {
    let sql = self.scripts.get(Script::Truncate).await?;
    self
      .execute(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await?;
    tracing::debug!("truncated records");
    Ok(())
  }
}
