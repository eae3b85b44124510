//! The `SecretStore` trait.
//!
//! Implemented by the SQLite gateway (`keeper-store-sqlite`). The secret
//! service and the sync client depend on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use crate::{record::Record, user::User};

// ─── Failure classification ──────────────────────────────────────────────────

/// Coarse classification of a store failure.
///
/// Callers map these onto their own error surface (RPC status codes, CLI
/// messages) without needing to know the backend's error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
  /// The input failed a structural check; nothing was executed.
  Validation,
  /// A uniqueness or foreign-key constraint rejected the write.
  Constraint,
  /// A lookup matched no row.
  NotFound,
  /// A stored record carries a detail tag outside the known set.
  UnknownDetailType,
  Other,
}

/// Backend errors expose a [`FailureKind`].
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn kind(&self) -> FailureKind;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a keeper storage backend.
///
/// All methods return `Send` futures so the trait can be used from axum
/// handlers and spawned tasks.
pub trait SecretStore: Send + Sync {
  type Error: StoreError;

  /// Persist a new user. The password is stored exactly as given; callers
  /// hash it first.
  ///
  /// Fails with [`FailureKind::Constraint`] if the username is taken.
  fn register_user(
    &self,
    user: User,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Look up a user by username and return the stored row, id and password
  /// hash included. The `password` of the argument is not compared.
  ///
  /// Fails with [`FailureKind::NotFound`] if no such user exists.
  fn login_user(
    &self,
    user: User,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  /// All records owned by `username`, each with its payload loaded.
  ///
  /// An unknown username yields an empty list.
  fn user_records(
    &self,
    username: String,
  ) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + '_;

  /// Save a record and its payload for `username`, returning the record
  /// with its assigned id and owner.
  fn save_record(
    &self,
    username: String,
    record: Record,
  ) -> impl Future<Output = Result<Record, Self::Error>> + Send + '_;

  /// Delete every record and payload row. Users are kept.
  fn truncate(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
