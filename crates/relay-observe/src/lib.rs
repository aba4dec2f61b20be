//! Observability setup for Relay: the global tracing subscriber and the
//! optional OpenTelemetry span export.

pub mod tracing_setup;
