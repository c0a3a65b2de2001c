//! Application Layer - Ports and the stream delivery service.
//!
//! The application layer drives domain logic against the ports that
//! infrastructure adapters implement.

/// Port interfaces for the content store, usage meter and event sinks.
pub mod ports;

/// Application services (the stream dispatcher).
pub mod services;
