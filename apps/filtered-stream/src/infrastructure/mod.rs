//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the HTTP surfaces.

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Streaming and rule-management HTTP API.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// In-memory content, user and rule store.
pub mod store;

/// OpenTelemetry tracing integration.
pub mod telemetry;

/// Per-subscriber usage ledger.
pub mod usage;
