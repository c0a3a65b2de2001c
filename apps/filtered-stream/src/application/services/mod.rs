//! Application Services
//!
//! - `StreamDispatcher`: Runs one delivery loop per streaming connection

mod dispatcher;

pub use dispatcher::{DispatcherConfig, OpenedStream, StreamDispatcher, StreamSession};
