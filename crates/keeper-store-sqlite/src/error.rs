//! Error type for `keeper-store-sqlite`.

use keeper_core::store::{FailureKind, StoreError};
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] keeper_core::Error),

  #[error("database error: {0}")]
  Database(tokio_rusqlite::Error),

  /// A uniqueness or foreign-key constraint rejected the write.
  #[error("constraint violated: {0}")]
  Constraint(String),

  #[error("not found: {0}")]
  NotFound(String),

  /// A stored record carries a detail tag with no registered reader.
  #[error("unknown detail type: {0:?}")]
  UnknownDetailType(String),

  #[error("migration failed: {0}")]
  Migration(String),

  #[error("failed to read script {name}: {source}")]
  Script {
    name:   &'static str,
    #[source]
    source: std::io::Error,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  /// Carry a gateway error out of a `tokio_rusqlite` closure. The
  /// [`From`] conversion below unwraps it again.
  pub(crate) fn raise(self) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Other(Box::new(self))
  }
}

impl From<tokio_rusqlite::Error> for Error {
  fn from(err: tokio_rusqlite::Error) -> Self {
    match err {
      tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, msg))
        if e.code == ErrorCode::ConstraintViolation =>
      {
        Self::Constraint(msg.unwrap_or_else(|| e.to_string()))
      }
      tokio_rusqlite::Error::Other(other) => match other.downcast::<Error>() {
        Ok(inner) => *inner,
        Err(other) => Self::Database(tokio_rusqlite::Error::Other(other)),
      },
      other => Self::Database(other),
    }
  }
}

impl From<rusqlite::Error> for Error {
  fn from(err: rusqlite::Error) -> Self { tokio_rusqlite::Error::Rusqlite(err).into() }
}

impl StoreError for Error {
  fn kind(&self) -> FailureKind {
    match self {
      Self::Core(keeper_core::Error::Validation(_)) => FailureKind::Validation,
      Self::Constraint(_) => FailureKind::Constraint,
      Self::NotFound(_) => FailureKind::NotFound,
      Self::UnknownDetailType(_) => FailureKind::UnknownDetailType,
      _ => FailureKind::Other,
    }
  }
}
