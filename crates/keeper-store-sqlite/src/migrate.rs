//! Embedded schema migrations, tracked with `PRAGMA user_version`.
//!
//! Migration `n` (1-based) brings the schema from version `n - 1` to `n`.
//! Each runs in its own transaction together with its version bump.

use tokio_rusqlite::Connection;

use crate::{Error, Result};

const MIGRATIONS: &[&str] = &[include_str!("../scripts/migrations/0001_init.sql")];

/// Bring the schema on `conn` up to date.
///
/// Returns the number of migrations applied; zero means there was nothing
/// pending.
pub async fn run(conn: &Connection) -> Result<usize> {
  conn
    .call(|conn| {
      conn.pragma_update(None, "foreign_keys", "ON")?;

      let current: i64 = conn.pragma_query_value(None, "user_version", |r| r.get(0))?;
      let current = usize::try_from(current).unwrap_or(usize::MAX);
      if current > MIGRATIONS.len() {
        return Err(
          Error::Migration(format!(
            "schema version {current} is newer than this build ({})",
            MIGRATIONS.len()
          ))
          .raise(),
        );
      }

      let mut applied = 0;
      for (index, sql) in MIGRATIONS.iter().enumerate().skip(current) {
        let version = i64::try_from(index + 1).unwrap_or(i64::MAX);
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        applied += 1;
      }
      Ok(applied)
    })
    .await
    .map_err(|e| match Error::from(e) {
      e @ Error::Migration(_) => e,
      other => Error::Migration(other.to_string()),
    })
}

/// The schema version this build migrates to.
pub fn latest() -> usize { MIGRATIONS.len() }
