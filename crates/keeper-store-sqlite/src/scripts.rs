//! The named SQL script catalogue.
//!
//! Script names are part of the storage contract: an override directory must
//! provide `<dir>/<name>.sql` for every script it wants to replace. Scripts
//! missing from the override directory fall back to the embedded text.

use std::{
  collections::HashMap,
  path::PathBuf,
  sync::{Arc, Mutex, PoisonError},
};

use keeper_core::record::DetailType;

use crate::{Error, Result};

/// One entry of the catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Script {
  CreateUser,
  User,
  Records,
  CreateRecord,
  Truncate,
  /// Payload lookup by `:record_id`.
  Details(DetailType),
  /// Payload insert.
  CreateDetails(DetailType),
}

impl Script {
  /// Every script in the catalogue.
  pub fn all() -> Vec<Self> {
    let mut all = vec![
      Self::CreateUser,
      Self::User,
      Self::Records,
      Self::CreateRecord,
      Self::Truncate,
    ];
    for t in DetailType::ALL {
      all.push(Self::Details(t));
      all.push(Self::CreateDetails(t));
    }
    all
  }

  /// Stable name, relative to the script directory, without extension.
  pub fn name(self) -> &'static str {
    use DetailType::*;
    match self {
      Self::CreateUser => "create_user",
      Self::User => "user",
      Self::Records => "records",
      Self::CreateRecord => "create_record",
      Self::Truncate => "truncate",
      Self::Details(Text) => "details/text",
      Self::Details(Blob) => "details/blob",
      Self::Details(Card) => "details/card",
      Self::Details(Login) => "details/login",
      Self::CreateDetails(Text) => "details/create_text",
      Self::CreateDetails(Blob) => "details/create_blob",
      Self::CreateDetails(Card) => "details/create_card",
      Self::CreateDetails(Login) => "details/create_login",
    }
  }

  fn embedded(self) -> &'static str {
    use DetailType::*;
    match self {
      Self::CreateUser => include_str!("../scripts/query/create_user.sql"),
      Self::User => include_str!("../scripts/query/user.sql"),
      Self::Records => include_str!("../scripts/query/records.sql"),
      Self::CreateRecord => include_str!("../scripts/query/create_record.sql"),
      Self::Truncate => include_str!("../scripts/query/truncate.sql"),
      Self::Details(Text) => include_str!("../scripts/query/details/text.sql"),
      Self::Details(Blob) => include_str!("../scripts/query/details/blob.sql"),
      Self::Details(Card) => include_str!("../scripts/query/details/card.sql"),
      Self::Details(Login) => include_str!("../scripts/query/details/login.sql"),
      Self::CreateDetails(Text) => {
        include_str!("../scripts/query/details/create_text.sql")
      }
      Self::CreateDetails(Blob) => {
        include_str!("../scripts/query/details/create_blob.sql")
      }
      Self::CreateDetails(Card) => {
        include_str!("../scripts/query/details/create_card.sql")
      }
      Self::CreateDetails(Login) => {
        include_str!("../scripts/query/details/create_login.sql")
      }
    }
  }
}

/// Loads script text on first use and caches it by name.
#[derive(Debug, Default)]
pub struct ScriptCatalogue {
  dir:   Option<PathBuf>,
  cache: Mutex<HashMap<Script, Arc<str>>>,
}

impl ScriptCatalogue {
  pub fn new(dir: Option<PathBuf>) -> Self {
    Self { dir, cache: Mutex::default() }
  }

  /// The text of `script`.
  pub async fn get(&self, script: Script) -> Result<Arc<str>> {
    let cached = self.lock().get(&script).cloned();
    if let Some(text) = cached {
      return Ok(text);
    }

    let text: Arc<str> = match &self.dir {
      Some(dir) => {
        let path = dir.join(format!("{}.sql", script.name()));
        match tokio::fs::read_to_string(&path).await {
          Ok(text) => {
            tracing::debug!(script = script.name(), path = %path.display(), "loaded script override");
            text.into()
          }
          Err(e) if e.kind() == std::io::ErrorKind::NotFound => script.embedded().into(),
          Err(source) => return Err(Error::Script { name: script.name(), source }),
        }
      }
      None => script.embedded().into(),
    };

    Ok(self.lock().entry(script).or_insert(text).clone())
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Script, Arc<str>>> {
    self.cache.lock().unwrap_or_else(PoisonError::into_inner)
  }
}
