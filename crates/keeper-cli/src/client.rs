//! Async HTTP client for the keeper RPC surface.

use std::time::Duration;

use futures_util::{StreamExt as _, stream::BoxStream};
use keeper_core::{
  settings::ClientSettings,
  wire::{Code, SignInRequest, SignInResponse, Status, Token, WireRecord},
};
use reqwest::{Certificate, Client, Response};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
  #[error("transport error: {0}")]
  Transport(#[from] reqwest::Error),

  /// The server answered with an error status.
  #[error("{code}: {message}")]
  Rpc { code: Code, message: String },

  #[error("malformed response: {0}")]
  Decode(#[from] serde_json::Error),
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Connection settings for the keeper server.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url:    String,
  /// PEM root certificate to trust for the server.
  pub certificate: Option<String>,
}

impl ApiConfig {
  /// `https` when a certificate is configured, plain `http` otherwise.
  pub fn from_settings(settings: &ClientSettings) -> Self {
    let scheme = if settings.certificate.is_some() { "https" } else { "http" };
    Self {
      base_url:    format!("{scheme}://{}", settings.address),
      certificate: settings.certificate.clone(),
    }
  }
}

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client:   Client,
  base_url: String,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let mut builder = Client::builder().connect_timeout(Duration::from_secs(10));
    if let Some(pem) = &config.certificate {
      builder = builder.add_root_certificate(Certificate::from_pem(pem.as_bytes())?);
    }
    Ok(Self {
      client:   builder.build()?,
      base_url: config.base_url.trim_end_matches('/').to_owned(),
    })
  }

  fn url(&self, path: &str) -> String { format!("{}{path}", self.base_url) }

  async fn send<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
    let resp = self.client.post(self.url(path)).json(body).send().await?;
    if resp.status().is_success() {
      return Ok(resp);
    }

    let status = resp.status();
    let bytes = resp.bytes().await?;
    Err(match serde_json::from_slice::<Status>(&bytes) {
      Ok(s) => ClientError::Rpc { code: s.code, message: s.message },
      Err(_) => ClientError::Rpc {
        code:    Code::Internal,
        message: format!("{status}: {}", String::from_utf8_lossy(&bytes)),
      },
    })
  }

  async fn call<B, R>(&self, path: &str, body: &B) -> Result<R>
  where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
  {
    let bytes = self.send(path, body).await?.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
  }

  // ── Sign-in ───────────────────────────────────────────────────────────────

  /// `POST /rpc/register`
  pub async fn register(&self, req: &SignInRequest) -> Result<SignInResponse> {
    self.call("/rpc/register", req).await
  }

  /// `POST /rpc/authenticate`
  pub async fn authenticate(&self, req: &SignInRequest) -> Result<SignInResponse> {
    self.call("/rpc/authenticate", req).await
  }

  /// `POST /rpc/token`
  pub async fn refresh(&self, token: &Token) -> Result<Token> {
    self.call("/rpc/token", token).await
  }

  // ── Records ───────────────────────────────────────────────────────────────

  /// `POST /rpc/records`
  pub async fn add_record(&self, record: &WireRecord) -> Result<WireRecord> {
    self.call("/rpc/records", record).await
  }

  /// `POST /rpc/records/sync`
  ///
  /// Fails up front if the server rejects the call. Afterwards the stream
  /// yields one item per record line and ends at the first error.
  pub async fn sync_records(
    &self,
    token: &Token,
  ) -> Result<BoxStream<'static, Result<WireRecord>>> {
    let mut body = self.send("/rpc/records/sync", token).await?.bytes_stream();

    let stream = async_stream::stream! {
      let mut buf: Vec<u8> = Vec::new();
      while let Some(chunk) = body.next().await {
        match chunk {
          Ok(chunk) => buf.extend_from_slice(&chunk),
          Err(e) => {
            yield Err(ClientError::Transport(e));
            return;
          }
        }
        while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
          let line: Vec<u8> = buf.drain(..=pos).collect();
          let line = line.trim_ascii();
          if line.is_empty() {
            continue;
          }
          match serde_json::from_slice::<WireRecord>(line) {
            Ok(record) => {
              yield Ok(record);
            }
            Err(e) => {
              yield Err(ClientError::Decode(e));
              return;
            }
          }
        }
      }
      let rest = buf.trim_ascii();
      if !rest.is_empty() {
        yield serde_json::from_slice::<WireRecord>(rest).map_err(ClientError::Decode);
      }
    };

    Ok(stream.boxed())
  }
}

/// Serve `chunks` as the body of every sync call, then break the connection
/// if `cut` is set.
#[cfg(test)]
pub(crate) async fn ndjson_server(chunks: Vec<String>, cut: bool) -> ApiClient {
  use axum::{Router, body::Body, routing::post};

  let app = Router::new().route(
    "/rpc/records/sync",
    post(move || {
      let chunks = chunks.clone();
      async move {
        let stream = async_stream::stream! {
          for chunk in chunks {
            yield Ok::<_, std::io::Error>(chunk);
          }
          if cut {
            // Let the chunks above reach the client first.
            tokio::time::sleep(Duration::from_millis(50)).await;
            yield Err(std::io::Error::other("connection cut"));
          }
        };
        Body::from_stream(stream)
      }
    }),
  );

  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

  ApiClient::new(ApiConfig { base_url: format!("http://{addr}"), certificate: None }).unwrap()
}

/// One NDJSON line carrying a text record, without the trailing newline.
#[cfg(test)]
pub(crate) fn text_line(detail_type: &str, text: &str) -> String {
  serde_json::to_string(&WireRecord {
    access_token: Token::new("t"),
    id:           None,
    metadata:     "m".into(),
    detail_type:  detail_type.into(),
    payload:      Some(keeper_core::wire::WirePayload::Text { text: text.into() }),
  })
  .unwrap()
}

#[cfg(test)]
mod tests {
  use keeper_core::{settings::Address, wire::WirePayload};

  use super::*;

  async fn drain(api: &ApiClient) -> Vec<Result<WireRecord>> {
    api.sync_records(&Token::new("t")).await.unwrap().collect().await
  }

  fn text_of(item: &Result<WireRecord>) -> &str {
    match item {
      Ok(WireRecord { payload: Some(WirePayload::Text { text }), .. }) => text,
      other => panic!("expected a text record, got {other:?}"),
    }
  }

  #[test]
  fn scheme_follows_certificate() {
    let mut settings = ClientSettings {
      address: Address { host: "example.org".into(), port: 9000 },
      ..ClientSettings::default()
    };
    assert_eq!(ApiConfig::from_settings(&settings).base_url, "http://example.org:9000");

    settings.certificate = Some("pem".into());
    assert_eq!(ApiConfig::from_settings(&settings).base_url, "https://example.org:9000");
  }

  #[tokio::test]
  async fn lines_split_across_chunks_are_joined() {
    let first = text_line("TEXT", "one");
    let second = text_line("TEXT", "two");
    let (head, tail) = first.split_at(first.len() / 2);
    let chunks = vec![
      head.to_owned(),
      format!("{tail}\n\n{}", &second[..3]),
      format!("{}\n", &second[3..]),
    ];

    let items = drain(&ndjson_server(chunks, false).await).await;
    assert_eq!(items.len(), 2);
    assert_eq!(text_of(&items[0]), "one");
    assert_eq!(text_of(&items[1]), "two");
  }

  #[tokio::test]
  async fn final_line_needs_no_newline() {
    let items = drain(&ndjson_server(vec![text_line("TEXT", "last")], false).await).await;
    assert_eq!(items.len(), 1);
    assert_eq!(text_of(&items[0]), "last");
  }

  #[tokio::test]
  async fn truncated_final_line_is_a_decode_error() {
    let line = text_line("TEXT", "whole");
    let chunks = vec![format!("{line}\n{}", &line[..10])];

    let items = drain(&ndjson_server(chunks, false).await).await;
    assert_eq!(items.len(), 2);
    assert_eq!(text_of(&items[0]), "whole");
    assert!(matches!(items[1], Err(ClientError::Decode(_))), "got {:?}", items[1]);
  }

  #[tokio::test]
  async fn broken_connection_ends_the_stream_with_an_error() {
    let chunks = vec![format!("{}\n", text_line("TEXT", "kept"))];

    let items = drain(&ndjson_server(chunks, true).await).await;
    assert_eq!(items.len(), 2);
    assert_eq!(text_of(&items[0]), "kept");
    assert!(matches!(items[1], Err(ClientError::Transport(_))), "got {:?}", items[1]);
  }
}
