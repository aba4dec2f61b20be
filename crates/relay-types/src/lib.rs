//! Shared domain types for Relay.
//!
//! This crate contains the core domain types used across the Relay engine:
//! Workflow, handler descriptors, service credentials, reaction outputs,
//! configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod compare;
pub mod config;
pub mod credential;
pub mod error;
pub mod reaction;
pub mod workflow;
