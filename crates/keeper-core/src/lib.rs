//! Core types and trait definitions for the keeper secret store.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! server, the SQLite gateway and the sync client all depend on it; it
//! depends on none of them.

pub mod error;
pub mod record;
pub mod settings;
pub mod store;
pub mod user;
pub mod wire;

pub use error::{Error, Result};
