//! Observability setup for recall: tracing subscriber with an optional
//! OpenTelemetry bridge.

pub mod tracing_setup;
