//! The sync flow.
//!
//! ```text
//! choose sign in | sign up -> tokens -> truncate local -> ensure local user
//!   -> spawn pull -> choose show | write
//! ```
//!
//! The pull task always finishes before the flow returns: "show" waits for
//! it before reading the local store and fails if the pull failed, "write"
//! waits for it after the record has been sent.

use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use chrono::NaiveDate;
use futures_util::StreamExt as _;
use keeper_core::{
  record::{BlobDetails, CardDetails, DetailType, LoginDetails, Payload, Record, TextDetails},
  store::{FailureKind, SecretStore, StoreError as _},
  user::User,
  wire::{SignInRequest, Token, WireRecord},
};
use tokio::task::JoinHandle;

use crate::{client::ApiClient, prompt::Prompt};

const SIGN_IN: [&str; 2] = ["Sign in", "Sign up"];
const ACTIONS: [&str; 2] = ["Show data", "Write data"];

/// What a completed flow did.
#[derive(Debug)]
pub enum Outcome {
  /// The user's records as mirrored into the local store.
  Shown { records: Vec<Record>, report: PullReport },
  /// The record the server accepted.
  Written(WireRecord),
}

/// Counters from one pull.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PullReport {
  pub saved:   usize,
  /// Messages that did not map to a record.
  pub skipped: usize,
  /// Records the local store refused.
  pub failed:  usize,
}

pub struct Flow<S, P> {
  api:    ApiClient,
  local:  Arc<S>,
  prompt: P,
}

impl<S, P> Flow<S, P>
where
  S: SecretStore + 'static,
  P: Prompt,
{
  pub fn new(api: ApiClient, local: Arc<S>, prompt: P) -> Self { Self { api, local, prompt } }

  pub async fn run(mut self) -> Result<Outcome> {
    let sign_up = self.prompt.choose("Action", &SIGN_IN)? == 1;
    let username = self.prompt.ask("Username")?;
    let password = self.prompt.ask("Password")?;
    let user = User::new(username, password);
    user.validate()?;

    let request = SignInRequest::from(&user);
    let tokens = if sign_up {
      self.api.register(&request).await.context("sign up failed")?
    } else {
      self.api.authenticate(&request).await.context("sign in failed")?
    };
    tracing::info!(username = %user.username, "signed in");

    self.local.truncate().await.context("failed to reset local store")?;
    self.ensure_local_user(&user).await?;

    let pull = tokio::spawn(pull(
      self.api.clone(),
      self.local.clone(),
      user.username.clone(),
      tokens.access.clone(),
    ));

    if self.prompt.choose("Data", &ACTIONS)? == 0 {
      let report = join(pull).await?;
      let records = self
        .local
        .user_records(user.username)
        .await
        .context("failed to read local records")?;
      return Ok(Outcome::Shown { records, report });
    }

    let sent = match self.compose().await {
      Ok(record) => self.send(record, &tokens.refresh).await,
      Err(e) => Err(e),
    };
    if let Err(e) = join(pull).await {
      tracing::warn!("sync failed: {e:#}");
    }
    Ok(Outcome::Written(sent?))
  }

  /// Send `record` under a freshly refreshed access token, since composing
  /// it may have taken the operator a while.
  async fn send(&self, record: Record, refresh: &Token) -> Result<WireRecord> {
    let access = self.api.refresh(refresh).await.context("failed to refresh access token")?;
    self
      .api
      .add_record(&record.to_wire(access))
      .await
      .context("failed to add record")
  }

  /// Make sure the local store has a row for `user`, creating it on a miss.
  async fn ensure_local_user(&self, user: &User) -> Result<()> {
    match self.local.login_user(user.clone()).await {
      Ok(_) => Ok(()),
      Err(e) if e.kind() == FailureKind::NotFound => {
        let hashed = user.clone().hashed()?;
        self.local.register_user(hashed).await.context("failed to create local user")?;
        tracing::debug!(username = %user.username, "created local user");
        Ok(())
      }
      Err(e) => Err(e).context("failed to look up local user"),
    }
  }

  /// Prompt for a new record.
  async fn compose(&mut self) -> Result<Record> {
    let metadata = self.prompt.ask("Metadata")?;
    let detail_type: DetailType = self
      .prompt
      .ask("Detail type (TEXT, BLOB, CARD, DETAIL)")?
      .trim()
      .to_uppercase()
      .parse()?;

    let payload = match detail_type {
      DetailType::Text => Payload::Text(TextDetails::new(self.prompt.ask("Text")?)),
      DetailType::Login => {
        let login = self.prompt.ask("Login")?;
        let password = self.prompt.ask("Password")?;
        Payload::Login(LoginDetails::new(login, password))
      }
      DetailType::Card => {
        let number = self.prompt.ask("Number")?;
        let cardholder = self.prompt.ask("Cardholder")?;
        let cvc = self.prompt.ask("CVC")?;
        let cvc: u32 = cvc.trim().parse().with_context(|| format!("cvc {cvc:?} is not a number"))?;
        let expiration = parse_expiration(&self.prompt.ask("Expiration (YYYY-MM-DD)")?)?;
        Payload::Card(CardDetails::new(number, cardholder, cvc, expiration))
      }
      DetailType::Blob => {
        let path = self.prompt.ask("File path")?;
        let data = tokio::fs::read(path.trim())
          .await
          .with_context(|| format!("failed to read {path:?}"))?;
        Payload::Blob(BlobDetails::new(data))
      }
    };

    Ok(Record::new(metadata, payload))
  }
}

fn parse_expiration(input: &str) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
  let input = input.trim();
  if input.is_empty() {
    return Ok(None);
  }
  let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
    .with_context(|| format!("expiration {input:?} is not YYYY-MM-DD"))?;
  match date.and_hms_opt(0, 0, 0) {
    Some(midnight) => Ok(Some(midnight.and_utc())),
    None => bail!("expiration {input:?} is out of range"),
  }
}

/// Drain the sync stream into the local store.
///
/// A rejected call or a broken stream is an error; records saved before the
/// break stay saved. Nothing is retried.
async fn pull<S: SecretStore>(
  api: ApiClient,
  local: Arc<S>,
  username: String,
  token: Token,
) -> Result<PullReport> {
  let mut report = PullReport::default();

  let mut stream = api.sync_records(&token).await.context("sync rejected")?;

  while let Some(item) = stream.next().await {
    let wire = match item {
      Ok(wire) => wire,
      Err(e) => {
        tracing::warn!(error = %e, saved = report.saved, "sync stream ended early");
        return Err(e).with_context(|| format!("sync broke off after {} records", report.saved));
      }
    };
    let Some(record) = Record::parse(&wire) else {
      tracing::warn!(detail_type = %wire.detail_type, "skipping unusable record");
      report.skipped += 1;
      continue;
    };
    match local.save_record(username.clone(), record.unbound()).await {
      Ok(_) => report.saved += 1,
      Err(e) => {
        tracing::warn!(error = %e, "failed to store synced record");
        report.failed += 1;
      }
    }
  }

  tracing::info!(saved = report.saved, skipped = report.skipped, failed = report.failed, "sync finished");
  Ok(report)
}

async fn join(pull: JoinHandle<Result<PullReport>>) -> Result<PullReport> {
  pull.await.context("sync task failed")?
}

#[cfg(test)]
mod tests {
  use keeper_core::wire::Code;
  use keeper_server::{AppState, TokenAuthority};
  use keeper_store_sqlite::{HandleConnection, SqliteGateway};

  use super::*;
  use crate::{
    client::{ApiConfig, ClientError, ndjson_server, text_line},
    prompt::ScriptedPrompt,
  };

  /// A server store that cannot list records.
  struct RefusingSync(SqliteGateway<HandleConnection>);

  impl SecretStore for RefusingSync {
    type Error = keeper_store_sqlite::Error;

    async fn register_user(&self, user: User) -> std::result::Result<(), Self::Error> {
      self.0.register_user(user).await
    }

    async fn login_user(&self, user: User) -> std::result::Result<User, Self::Error> {
      self.0.login_user(user).await
    }

    async fn user_records(&self, _: String) -> std::result::Result<Vec<Record>, Self::Error> {
      Err(keeper_store_sqlite::Error::Constraint("records unavailable".into()))
    }

    async fn save_record(
      &self,
      username: String,
      record: Record,
    ) -> std::result::Result<Record, Self::Error> {
      self.0.save_record(username, record).await
    }

    async fn truncate(&self) -> std::result::Result<(), Self::Error> { self.0.truncate().await }
  }

  /// Serve a fresh keeper server on an ephemeral port.
  async fn spawn_server() -> ApiClient {
    let strategy = HandleConnection::in_memory().await.unwrap();
    let store = SqliteGateway::new(strategy).await.unwrap();
    let state = AppState::new(store, TokenAuthority::new("e2e-key").unwrap());
    let app = keeper_server::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    ApiClient::new(ApiConfig { base_url: format!("http://{addr}"), certificate: None }).unwrap()
  }

  async fn local_store() -> Arc<SqliteGateway<HandleConnection>> {
    let strategy = HandleConnection::in_memory().await.unwrap();
    Arc::new(SqliteGateway::new(strategy).await.unwrap())
  }

  async fn run(
    api: &ApiClient,
    local: &Arc<SqliteGateway<HandleConnection>>,
    answers: &[&str],
  ) -> Result<Outcome> {
    Flow::new(api.clone(), local.clone(), ScriptedPrompt::new(answers.iter().copied()))
      .run()
      .await
  }

  fn shown(outcome: Outcome) -> Vec<Record> {
    match outcome {
      Outcome::Shown { records, .. } => records,
      other => panic!("expected Shown, got {other:?}"),
    }
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn sign_up_write_then_sign_in_show() {
    let api = spawn_server().await;
    let local = local_store().await;

    let outcome = run(&api, &local, &[
      "Sign up", "alice", "pw", "Write data", "greeting", "text", "hello",
    ])
    .await
    .unwrap();
    let Outcome::Written(wire) = outcome else { panic!("expected Written") };
    assert_eq!(wire.metadata, "greeting");
    assert_eq!(wire.detail_type, "TEXT");

    let records = shown(run(&api, &local, &["Sign in", "alice", "pw", "Show data"]).await.unwrap());
    assert_eq!(records.len(), 1);
    assert_eq!(
      records[0].clone().unbound(),
      Record::new("greeting", Payload::Text(TextDetails::new("hello")))
    );
    assert_eq!(records[0].payload.record_id(), records[0].id);
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn show_reflects_every_kind_after_resync() {
    let api = spawn_server().await;
    let local = local_store().await;

    run(&api, &local, &["Sign up", "bob", "pw", "Write data", "site", "DETAIL", "bob@x", "s3cret"])
      .await
      .unwrap();
    run(&api, &local, &[
      "Sign in", "bob", "pw", "Write data", "visa", "CARD", "4111", "BOB", "123", "2030-01-31",
    ])
    .await
    .unwrap();

    let records = shown(run(&api, &local, &["Sign in", "bob", "pw", "Show data"]).await.unwrap());
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].detail_type(), DetailType::Login);
    let Payload::Card(card) = &records[1].payload else { panic!("expected a card") };
    assert_eq!(card.cvc, 123);
    assert_eq!(card.expiration.map(|d| d.date_naive().to_string()).as_deref(), Some("2030-01-31"));
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn unknown_detail_type_writes_nothing() {
    let api = spawn_server().await;
    let local = local_store().await;

    let err = run(&api, &local, &["Sign up", "carol", "pw", "Write data", "m", "PHOTO"])
      .await
      .unwrap_err();
    assert!(err.to_string().contains("detail type"), "got {err:#}");

    let records = shown(run(&api, &local, &["Sign in", "carol", "pw", "Show data"]).await.unwrap());
    assert!(records.is_empty());
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn bad_cvc_is_rejected() {
    let api = spawn_server().await;
    let local = local_store().await;

    let err = run(&api, &local, &[
      "Sign up", "dave", "pw", "Write data", "m", "CARD", "4111", "DAVE", "abc",
    ])
    .await
    .unwrap_err();
    assert!(err.to_string().contains("cvc"), "got {err:#}");
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn wrong_password_stops_the_flow() {
    let api = spawn_server().await;
    let local = local_store().await;
    run(&api, &local, &["Sign up", "erin", "pw", "Show data"]).await.unwrap();

    let err = run(&api, &local, &["Sign in", "erin", "nope", "Show data"]).await.unwrap_err();
    let client = err.downcast_ref::<ClientError>().expect("client error");
    assert!(matches!(client, ClientError::Rpc { code: Code::InvalidArgument, .. }), "got {client:?}");
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn unknown_user_is_not_found() {
    let api = spawn_server().await;
    let local = local_store().await;

    let err = run(&api, &local, &["Sign in", "nobody", "pw", "Show data"]).await.unwrap_err();
    let client = err.downcast_ref::<ClientError>().expect("client error");
    assert!(matches!(client, ClientError::Rpc { code: Code::NotFound, .. }), "got {client:?}");
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn refused_sync_fails_show() {
    let strategy = HandleConnection::in_memory().await.unwrap();
    let store = RefusingSync(SqliteGateway::new(strategy).await.unwrap());
    let state = AppState::new(store, TokenAuthority::new("e2e-key").unwrap());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = keeper_server::router(state);
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    let api =
      ApiClient::new(ApiConfig { base_url: format!("http://{addr}"), certificate: None }).unwrap();
    let local = local_store().await;

    let err = run(&api, &local, &["Sign up", "alice", "pw", "Show data"]).await.unwrap_err();
    let client = err.downcast_ref::<ClientError>().expect("client error");
    assert!(matches!(client, ClientError::Rpc { code: Code::InvalidArgument, .. }), "got {client:?}");
  }

  #[tokio::test]
  async fn pull_skips_unusable_records() {
    let body = format!(
      "{}\n{}\n{}\n",
      text_line("TEXT", "a"),
      text_line("PHOTO", "b"),
      text_line("TEXT", "c")
    );
    let api = ndjson_server(vec![body], false).await;
    let local = local_store().await;
    local.register_user(User::new("alice", "pw")).await.unwrap();

    let report = pull(api, local.clone(), "alice".into(), Token::new("t")).await.unwrap();
    assert_eq!(report, PullReport { saved: 2, skipped: 1, failed: 0 });
    assert_eq!(local.user_records("alice".into()).await.unwrap().len(), 2);
  }

  #[tokio::test]
  async fn pull_counts_records_the_local_store_refuses() {
    let api = ndjson_server(vec![format!("{}\n", text_line("TEXT", "a"))], false).await;
    let local = local_store().await;

    // No local user row, so every save fails.
    let report = pull(api, local, "alice".into(), Token::new("t")).await.unwrap();
    assert_eq!(report, PullReport { saved: 0, skipped: 0, failed: 1 });
  }

  #[tokio::test]
  async fn broken_pull_fails_but_keeps_what_arrived() {
    let api = ndjson_server(vec![format!("{}\n", text_line("TEXT", "a"))], true).await;
    let local = local_store().await;
    local.register_user(User::new("alice", "pw")).await.unwrap();

    let err = pull(api, local.clone(), "alice".into(), Token::new("t")).await.unwrap_err();
    assert!(err.downcast_ref::<ClientError>().is_some(), "got {err:#}");
    assert_eq!(local.user_records("alice".into()).await.unwrap().len(), 1);
  }

  #[test]
  fn expiration_parsing() {
    assert!(parse_expiration("").unwrap().is_none());
    assert!(parse_expiration("  ").unwrap().is_none());
    assert!(parse_expiration("2030-12-31").unwrap().is_some());
    assert!(parse_expiration("12/30").is_err());
  }
}
