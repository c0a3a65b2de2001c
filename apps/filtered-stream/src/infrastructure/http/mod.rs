//! HTTP/REST API adapter.
//!
//! Inbound adapter exposing the streaming endpoints, rule management,
//! content ingestion and connection control over axum.

mod controller;
mod error;
mod request;
mod response;
mod server;

pub use controller::{AppState, create_router};
pub use error::{ApiError, ProblemResponse};
pub use request::*;
pub use response::*;
pub use server::{HttpServer, HttpServerError};
