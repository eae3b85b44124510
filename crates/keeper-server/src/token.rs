//! The token authority: issues and verifies signed, time-limited bearer
//! tokens bound to a username.
//!
//! Tokens are HS256 JWTs. Verification pins the algorithm and allows no
//! clock leeway, so a token is rejected the second it expires.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use keeper_core::wire::{SignInResponse, Token};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ACCESS_TTL: Duration = Duration::from_secs(60 * 60);
pub const REFRESH_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error)]
pub enum TokenError {
  /// The authority is misconfigured or the claims could not be signed.
  #[error("signing error: {0}")]
  Signing(String),

  /// Bad signature, unexpected algorithm, malformed or expired token.
  #[error("invalid token: {0}")]
  Invalid(#[source] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
  sub: String,
  iss: String,
  exp: i64,
}

/// Holds the process-wide signing key.
pub struct TokenAuthority {
  encoding:   EncodingKey,
  decoding:   DecodingKey,
  validation: Validation,
}

impl std::fmt::Debug for TokenAuthority {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TokenAuthority").finish_non_exhaustive()
  }
}

impl TokenAuthority {
  pub fn new(sign_key: &str) -> Result<Self, TokenError> {
    if sign_key.is_empty() {
      return Err(TokenError::Signing("signing key is empty".into()));
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    Ok(Self {
      encoding: EncodingKey::from_secret(sign_key.as_bytes()),
      decoding: DecodingKey::from_secret(sign_key.as_bytes()),
      validation,
    })
  }

  /// Sign a token for `username` that expires `ttl` from now.
  pub fn issue(&self, username: &str, ttl: Duration) -> Result<Token, TokenError> {
    let ttl = i64::try_from(ttl.as_secs())
      .map_err(|_| TokenError::Signing(format!("ttl {ttl:?} is out of range")))?;
    let claims = Claims {
      sub: username.to_owned(),
      iss: username.to_owned(),
      exp: Utc::now().timestamp() + ttl,
    };

    encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
      .map(Token::new)
      .map_err(|e| TokenError::Signing(e.to_string()))
  }

  /// Issue the access/refresh pair returned by sign-in and sign-up.
  pub fn issue_pair(&self, username: &str) -> Result<SignInResponse, TokenError> {
    Ok(SignInResponse {
      access:  self.issue(username, ACCESS_TTL)?,
      refresh: self.issue(username, REFRESH_TTL)?,
    })
  }

  /// Check signature, algorithm and expiry and return the bound username.
  pub fn verify(&self, token: &str) -> Result<String, TokenError> {
    decode::<Claims>(token, &self.decoding, &self.validation)
      .map(|data| data.claims.sub)
      .map_err(TokenError::Invalid)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn authority() -> TokenAuthority { TokenAuthority::new("test-key").unwrap() }

  fn forge(key: &str, alg: Algorithm, exp: i64) -> String {
    let claims = Claims { sub: "alice".into(), iss: "alice".into(), exp };
    encode(&Header::new(alg), &claims, &EncodingKey::from_secret(key.as_bytes())).unwrap()
  }

  #[test]
  fn issue_then_verify() {
    let auth = authority();
    let token = auth.issue("alice", ACCESS_TTL).unwrap();
    assert_eq!(auth.verify(&token.value).unwrap(), "alice");
  }

  #[test]
  fn pair_is_distinct_and_both_verify() {
    let auth = authority();
    let pair = auth.issue_pair("bob").unwrap();
    assert_ne!(pair.access, pair.refresh);
    assert_eq!(auth.verify(&pair.access.value).unwrap(), "bob");
    assert_eq!(auth.verify(&pair.refresh.value).unwrap(), "bob");
  }

  #[test]
  fn expired_token_is_rejected() {
    let token = forge("test-key", Algorithm::HS256, Utc::now().timestamp() - 5);
    assert!(matches!(authority().verify(&token), Err(TokenError::Invalid(_))));
  }

  #[test]
  fn foreign_key_is_rejected() {
    let other = TokenAuthority::new("other-key").unwrap();
    let token = other.issue("alice", ACCESS_TTL).unwrap();
    assert!(authority().verify(&token.value).is_err());
  }

  #[test]
  fn unexpected_algorithm_is_rejected() {
    let token = forge("test-key", Algorithm::HS512, Utc::now().timestamp() + 60);
    assert!(authority().verify(&token).is_err());
  }

  #[test]
  fn garbage_is_rejected() {
    assert!(authority().verify("not-a-token").is_err());
    assert!(authority().verify("").is_err());
  }

  #[test]
  fn empty_key_is_a_signing_error() {
    assert!(matches!(TokenAuthority::new(""), Err(TokenError::Signing(_))));
  }
}
