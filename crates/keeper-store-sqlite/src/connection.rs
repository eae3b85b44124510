//! Connection strategies.
//!
//! A strategy hands out a [`tokio_rusqlite::Connection`] per operation, takes
//! it back afterwards, and knows how to bring the schema up to date.

use std::{future::Future, path::PathBuf, time::Duration};

use tokio_rusqlite::Connection;

use crate::{Result, migrate};

/// How the gateway obtains and releases database handles.
pub trait ConnectionStrategy: Send + Sync + 'static {
  /// Obtain a handle for one operation.
  fn create(&self) -> impl Future<Output = Result<Connection>> + Send + '_;

  /// Release a handle obtained from [`create`](Self::create).
  fn close(&self, conn: Connection) -> impl Future<Output = Result<()>> + Send + '_;

  /// Apply pending schema migrations. Having none pending is success.
  fn migrate(&self) -> impl Future<Output = Result<()>> + Send + '_;
}

// ─── Path ────────────────────────────────────────────────────────────────────

/// Opens a fresh handle on a database file for every operation.
#[derive(Debug, Clone)]
pub struct PathConnection {
  path: PathBuf,
}

impl PathConnection {
  pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

  /// Accepts `sqlite://path`, `sqlite:path` or a bare path.
  pub fn from_url(url: &str) -> Self {
    let path = url
      .strip_prefix("sqlite://")
      .or_else(|| url.strip_prefix("sqlite:"))
      .unwrap_or(url);
    Self::new(path)
  }

  async fn open(&self) -> Result<Connection> {
    let conn = Connection::open(&self.path).await?;
    conn
      .call(|conn| {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(())
      })
      .await?;
    Ok(conn)
  }
}

impl ConnectionStrategy for PathConnection {
  async fn create(&self) -> Result<Connection> { self.open().await }

  async fn close(&self, conn: Connection) -> Result<()> {
    conn.close().await?;
    Ok(())
  }

  async fn migrate(&self) -> Result<()> {
    let conn = self.open().await?;
    conn
      .call(|conn| {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Ok(())
      })
      .await?;
    let applied = migrate::run(&conn).await;
    self.close(conn).await?;

    let applied = applied?;
    tracing::info!(path = %self.path.display(), applied, version = migrate::latest(), "schema ready");
    Ok(())
  }
}

// ─── Handle ──────────────────────────────────────────────────────────────────

/// Shares one pre-established handle across all operations.
///
/// Closing is a no-op; the handle lives as long as the strategy.
#[derive(Clone)]
pub struct HandleConnection {
  conn: Connection,
}

impl HandleConnection {
  pub fn new(conn: Connection) -> Self { Self { conn } }

  /// A private in-memory database. Useful for tests.
  pub async fn in_memory() -> Result<Self> {
    Ok(Self::new(Connection::open_in_memory().await?))
  }

  /// The wrapped handle.
  pub fn handle(&self) -> &Connection { &self.conn }
}

impl ConnectionStrategy for HandleConnection {
  async fn create(&self) -> Result<Connection> { Ok(self.conn.clone()) }

  async fn close(&self, _conn: Connection) -> Result<()> { Ok(()) }

  async fn migrate(&self) -> Result<()> {
    let applied = migrate::run(&self.conn).await?;
    tracing::debug!(applied, "in-process schema ready");
    Ok(())
  }
}

// ─── Selection ───────────────────────────────────────────────────────────────

/// Strategy chosen from a configured database URL.
///
/// `:memory:` (with or without a `sqlite:` prefix) gets a single shared
/// in-memory handle, since a fresh in-memory handle per operation would see
/// an empty database every time. Anything else is a file path.
#[derive(Clone)]
pub enum Connector {
  Path(PathConnection),
  Handle(HandleConnection),
}

impl Connector {
  pub async fn from_url(url: &str) -> Result<Self> {
    let bare = url
      .strip_prefix("sqlite://")
      .or_else(|| url.strip_prefix("sqlite:"))
      .unwrap_or(url);
    if bare == ":memory:" {
      Ok(Self::Handle(HandleConnection::in_memory().await?))
    } else {
      Ok(Self::Path(PathConnection::from_url(url)))
    }
  }
}

impl ConnectionStrategy for Connector {
  async fn create(&self) -> Result<Connection> {
    match self {
      Self::Path(c) => c.create().await,
      Self::Handle(c) => c.create().await,
    }
  }

  async fn close(&self, conn: Connection) -> Result<()> {
    match self {
      Self::Path(c) => c.close(conn).await,
      Self::Handle(c) => c.close(conn).await,
    }
  }

  async fn migrate(&self) -> Result<()> {
    match self {
      Self::Path(c) => c.migrate().await,
      Self::Handle(c) => c.migrate().await,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn url_prefixes_are_stripped() {
    assert_eq!(PathConnection::from_url("sqlite://a/b.db").path, PathBuf::from("a/b.db"));
    assert_eq!(PathConnection::from_url("sqlite:c.db").path, PathBuf::from("c.db"));
    assert_eq!(PathConnection::from_url("/tmp/d.db").path, PathBuf::from("/tmp/d.db"));
  }

  #[tokio::test]
  async fn memory_url_selects_a_shared_handle() {
    assert!(matches!(Connector::from_url(":memory:").await.unwrap(), Connector::Handle(_)));
    assert!(matches!(
      Connector::from_url("sqlite://:memory:").await.unwrap(),
      Connector::Handle(_)
    ));
    assert!(matches!(Connector::from_url("x.db").await.unwrap(), Connector::Path(_)));
  }

  #[tokio::test]
  async fn migrate_is_idempotent() {
    let strategy = HandleConnection::in_memory().await.unwrap();
    strategy.migrate().await.unwrap();
    strategy.migrate().await.unwrap();
    assert_eq!(migrate::run(strategy.handle()).await.unwrap(), 0);
  }
}
