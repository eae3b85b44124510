//! SQLite persistence gateway for the keeper secret store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Handles come from a pluggable
//! [`ConnectionStrategy`]; every operation acquires one and releases it on
//! every exit path.
//!
//! SQL text is not written inline. Each operation runs a named script from a
//! fixed catalogue (see [`Script`]), embedded at build time and optionally
//! overridden from a directory on disk.

mod encode;
mod migrate;
mod store;

pub mod connection;
pub mod error;
pub mod scripts;

pub use connection::{ConnectionStrategy, Connector, HandleConnection, PathConnection};
pub use error::{Error, Result};
pub use scripts::Script;
pub use store::SqliteGateway;
