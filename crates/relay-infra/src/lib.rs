//! Infrastructure layer for Relay.
//!
//! Contains implementations of the repository traits defined in `relay-core`
//! (SQLite storage), the configuration and data-directory loaders, and the
//! built-in integration handlers that talk to external HTTP APIs.

pub mod config;
pub mod filesystem;
pub mod integrations;
pub mod sqlite;
