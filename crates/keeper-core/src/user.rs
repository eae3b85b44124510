//! Account credentials and their argon2 hardening.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, wire::SignInRequest};

/// A keeper account.
///
/// `password` holds whatever the caller put there: the clear-text password on
/// its way in from a sign-in request, or the argon2 PHC string once it has
/// been through [`User::hashed`]. Stores only ever persist the latter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub id:       Option<i64>,
  pub username: String,
  pub password: String,
}

impl User {
  pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
    Self { id: None, username: username.into(), password: password.into() }
  }

  /// Both fields must be non-empty.
  pub fn validate(&self) -> Result<()> {
    if self.username.is_empty() {
      return Err(Error::Validation("username must not be empty".into()));
    }
    if self.password.is_empty() {
      return Err(Error::Validation("password must not be empty".into()));
    }
    Ok(())
  }

  /// Replace the clear-text password with its argon2 PHC string.
  pub fn hashed(self) -> Result<Self> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(self.password.as_bytes(), &salt)
      .map_err(|e| Error::Credential(format!("argon2 error: {e}")))?
      .to_string();
    Ok(Self { password: hash, ..self })
  }

  /// Check a clear-text `password` against this user's stored hash.
  pub fn verify_password(&self, password: &str) -> Result<()> {
    let parsed_hash = PasswordHash::new(&self.password)
      .map_err(|e| Error::Credential(format!("stored hash is malformed: {e}")))?;

    Argon2::default()
      .verify_password(password.as_bytes(), &parsed_hash)
      .map_err(|_| Error::Credential("password does not match".into()))
  }
}

impl From<SignInRequest> for User {
  fn from(req: SignInRequest) -> Self { Self::new(req.login, req.password) }
}

impl From<&User> for SignInRequest {
  fn from(user: &User) -> Self {
    Self { login: user.username.clone(), password: user.password.clone() }
  }
}
