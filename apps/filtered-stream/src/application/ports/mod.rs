//! Application Ports (Driver and Driven)
//!
//! Ports define the contracts between the delivery loop and the systems
//! around it.
//!
//! ## Driven Ports (Outbound)
//!
//! - `ContentStore` / `RuleSource`: Read access to posts, users and rules
//! - `UsageMeter`: Records billable deliveries
//!
//! ## Driver Ports (Inbound)
//!
//! - `EventSink`: Transport a stream writes its lines to

mod content_port;
mod event_sink_port;
mod usage_port;

pub use content_port::{ContentStore, RuleSource, StreamStore};
pub use event_sink_port::{ChannelSink, EventSink, SinkError};
pub use usage_port::{NoOpUsageMeter, UsageError, UsageMeter, UsageRecord};
