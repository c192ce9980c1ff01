//! Transport-only client primitives for the steganography worker API.
//!
//! This crate owns request building, response parsing, and SSE stream
//! normalization for the worker endpoints only. It intentionally contains no
//! orchestration state and no UI coupling; command lifecycle concerns live in
//! `command_runner`.
//!
//! The wire contract is the worker's HTTP surface: a multipart command POST,
//! a per-command SSE subscription emitting `log`/`done` events, a bearer-
//! authenticated artifact download, and a health probe.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod payload;
pub mod sse;
pub mod url;

pub use client::{CancellationSignal, HealthReport, WorkerApiClient};
pub use config::WorkerApiConfig;
pub use error::WorkerApiError;
pub use events::{split_brute_success, LogKind, TerminalPayload, WorkerStreamEvent};
pub use payload::{CommandKind, CommandParams, CommandRequest, FileUpload};
pub use sse::SseStreamParser;
pub use url::normalize_worker_url;
