//! Core engine for Relay.
//!
//! This crate contains the repository traits (ports), the action and
//! reaction handler contracts with their registry, the workflow execution
//! engine and the workflow service. It depends only on relay-types, never
//! on relay-infra.

pub mod engine;
pub mod handler;
pub mod repository;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;
