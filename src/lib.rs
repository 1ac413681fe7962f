//! Centauri — an embedded client-side log and session analytics agent.
//!
//! This crate buffers structured log records and per-session metadata to
//! local storage and transmits them asynchronously to a remote collector
//! over HTTP(S). It is built for environments where the host process may
//! be suspended or killed at any moment and the network may be absent for
//! long stretches: buffers are durable across crashes, uploads are ordered
//! and retried with backoff, and nothing the core does can take down the
//! host application.
//!
//! # Quick start
//!
//! ```no_run
//! use centauri::config::Config;
//! use centauri::coordinator::Coordinator;
//! use centauri::record::LogSeverity;
//!
//! let config = Config::builder("./centauri-data")
//!     .base_url("collector.example.com")
//!     .build();
//! let coordinator = Coordinator::install(config).unwrap();
//! coordinator.begin_session("my-app-token".to_string());
//! coordinator.log(LogSeverity::Info, None, "hello world".to_string());
//! coordinator.end_session();
//! ```

/// Append-only per-session message buffer.
pub mod buffer;
/// Agent configuration: builder, env loading, defaults.
pub mod config;
/// Process-wide orchestration brain.
pub mod coordinator;
/// Error types used across crate modules.
pub mod error;
/// Log record and severity types handed in by the frontend.
pub mod record;
/// Session lifecycle state machine.
pub mod session;
/// Persisted state document load/save.
pub mod state_store;
#[cfg(test)]
/// Shared testing utilities compiled only for tests.
pub mod testsupport;
/// Ordered, pausable upload queue.
pub mod transmitter;
/// Generic single-task serial job queue primitive.
pub mod worker;
