//! Layered configuration shared by the server and the sync client.
//!
//! Values come from an optional YAML (or TOML/JSON) file, overlaid by
//! `KEEPER_`-prefixed environment variables with `__` separating nested keys,
//! e.g. `KEEPER_SERVER__ADDRESS__PORT=9000`.

use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub server: ServerSettings,
  pub client: ClientSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
  pub host: String,
  pub port: u16,
}

impl Default for Address {
  fn default() -> Self {
    Self { host: "127.0.0.1".to_string(), port: 8080 }
  }
}

impl fmt::Display for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.host, self.port)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
  pub address:      Address,
  /// `sqlite://path`, a bare path, or `:memory:`.
  pub database_url: String,
  /// HMAC key for the token authority.
  pub sign_key:     String,
  /// PEM-encoded private key. TLS is enabled when this and `certificate`
  /// are both present.
  pub private_key:  Option<String>,
  /// PEM-encoded certificate chain.
  pub certificate:  Option<String>,
}

impl Default for ServerSettings {
  fn default() -> Self {
    Self {
      address:      Address::default(),
      database_url: "sqlite://keeper-server.db".to_string(),
      sign_key:     String::new(),
      private_key:  None,
      certificate:  None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
  pub address:      Address,
  pub database_url: String,
  /// PEM-encoded root certificate trusted for the server. Without it the
  /// client talks plain HTTP.
  pub certificate:  Option<String>,
}

impl Default for ClientSettings {
  fn default() -> Self {
    Self {
      address:      Address::default(),
      database_url: "sqlite://keeper-client.db".to_string(),
      certificate:  None,
    }
  }
}

impl Settings {
  /// Load settings from `path` (which need not exist) and the environment.
  pub fn load(path: &Path) -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("KEEPER")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()?;

    Ok(settings.try_deserialize()?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_yields_defaults() {
    let settings = Settings::load(Path::new("/nonexistent/keeper.yml")).unwrap();
    assert_eq!(settings.server.address, Address::default());
    assert_eq!(settings.client.database_url, "sqlite://keeper-client.db");
    assert!(settings.server.private_key.is_none());
  }

  #[test]
  fn partial_yaml_keeps_defaults_for_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("server.yml");
    std::fs::write(
      &path,
      "server:\n  sign_key: abc\n  address:\n    port: 9443\n",
    )
    .unwrap();

    let settings = Settings::load(&path).unwrap();
    assert_eq!(settings.server.sign_key, "abc");
    assert_eq!(settings.server.address.port, 9443);
    assert_eq!(settings.server.address.host, "127.0.0.1");
  }

  #[test]
  fn address_display() {
    let addr = Address { host: "localhost".into(), port: 1 };
    assert_eq!(addr.to_string(), "localhost:1");
  }
}
