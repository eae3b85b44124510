//! RPC handlers.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | `POST` | `/rpc/register` | [`sign_in::register`] |
//! | `POST` | `/rpc/authenticate` | [`sign_in::authenticate`] |
//! | `POST` | `/rpc/token` | [`sign_in::refresh`] |
//! | `POST` | `/rpc/records` | [`records::add`] |
//! | `POST` | `/rpc/records/sync` | [`records::sync`] |
//! | `GET`  | `/health` | [`health`] |

pub mod records;
pub mod sign_in;

/// `GET /health`
pub async fn health() -> &'static str { "ok" }
