//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (relay-infra) implements. The core crate never depends on any
//! specific storage technology.

pub mod credential;
pub mod reaction_output;
pub mod workflow;
