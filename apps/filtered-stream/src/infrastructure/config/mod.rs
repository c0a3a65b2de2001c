//! Configuration Module
//!
//! Environment-driven configuration for the stream simulator.

mod settings;

pub use settings::{ConfigError, ServerSettings, ServiceConfig, StreamSettings};
