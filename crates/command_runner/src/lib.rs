//! Command execution and live-log-streaming orchestration.
//!
//! This crate owns the lifecycle of one worker command at a time: local
//! submit validation, the single live stream subscription, coalesced log
//! buffering aligned to the host's rendering cadence, and terminal result
//! resolution. Transport details stay behind the [`WorkerTransport`] seam so
//! the whole core runs against fakes in tests.

pub mod lifecycle;
pub mod log;
pub mod resolver;
pub mod stream;
pub mod submit;
pub mod transport;

pub use lifecycle::{Command, CommandLifecycle, LifecycleState, TerminalKind};
pub use log::{LogDelta, LogEntry, LogSink};
pub use resolver::{TerminalResult, DEFAULT_ARTIFACT_NAME};
pub use stream::{LogStream, RunId, StreamSignal, Subscription};
pub use submit::{SubmitRequest, ValidationError, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
pub use transport::{HttpWorkerTransport, WorkerTransport};
