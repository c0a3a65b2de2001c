#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Filtered Stream - Rule Matching and Streaming Delivery
//!
//! An HTTP service that holds a store of short posts, lets subscribers
//! manage filter rules written in a small boolean query language, and
//! pushes posts over long-lived newline-delimited JSON streams.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and logic
//!   - `content`: Posts, authors and entity extraction
//!   - `rules`: Tokenizer, expression parser, evaluator and matcher
//!   - `streaming`: Stream kinds, delay clamping, dedup and wire events
//!   - `connection`: Per-subscriber connection registry
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Content store, usage meter and event sink interfaces
//!   - `services`: The stream dispatcher
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `store`: In-memory content, user and rule store
//!   - `usage`: Per-subscriber usage ledger
//!   - `http`: Streaming and rule-management API
//!   - `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!  POST /2/tweets ──► InMemoryStore ◄── POST .../rules
//!                          │
//!                          ▼
//!                  StreamDispatcher ──► ChannelSink ──► HTTP body ──► client
//!                          │
//!                          └──► UsageLedger
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Content, rules and streaming policy with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::{ConnectionRegistry, Registration, RegistryStats};
pub use domain::content::{Author, ContentItem, Entities};
pub use domain::rules::{CompiledRule, MatchOutcome, Rule, RuleMatcher, matches_any, parse, tokenize};
pub use domain::streaming::{StreamEvent, StreamKind, StreamOutcome};

// Application
pub use application::ports::{ChannelSink, EventSink, SinkError, UsageMeter};
pub use application::services::{
    DispatcherConfig, OpenedStream, StreamDispatcher, StreamSession,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, ServerSettings, ServiceConfig, StreamSettings};

// Adapters
pub use infrastructure::store::{InMemoryStore, NewContent, NewRule};
pub use infrastructure::usage::{UsageLedger, UsageTotals};

// HTTP surfaces
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
pub use infrastructure::http::{AppState, HttpServer, HttpServerError, create_router};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
