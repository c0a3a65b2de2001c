//! Domain Layer - Content, rules, streaming policy and connections.
//!
//! Pure types and logic with no I/O. Everything here is synchronous;
//! the async delivery loop lives in the application layer.

/// Content items, authors, and the lookup used to resolve them.
pub mod content;

/// Live connection tracking per subscriber.
pub mod connection;

/// Rule expression language and matching.
pub mod rules;

/// Stream kinds, dedup policy and wire events.
pub mod streaming;
