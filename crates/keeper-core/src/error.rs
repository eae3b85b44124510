//! Error types for `keeper-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A user or record failed a structural check before reaching storage.
  #[error("validation error: {0}")]
  Validation(String),

  #[error("credential error: {0}")]
  Credential(String),

  #[error("configuration error: {0}")]
  Config(#[from] config::ConfigError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
