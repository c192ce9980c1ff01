use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use time::OffsetDateTime;
use worker_api::{CommandKind, LogKind, TerminalPayload};

use crate::log::{LogDelta, LogEntry, LogSink};
use crate::resolver::{self, TerminalResult};
use crate::stream::{lock_unpoisoned, push_signal, LogStream, RunId, SignalQueue, StreamSignal};
use crate::submit::SubmitRequest;
use crate::transport::WorkerTransport;

/// How a command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalKind {
    Success,
    Failure,
    /// The stream died without an authoritative result.
    Unresolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Submitting,
    Streaming,
    Terminal(TerminalKind),
}

/// One submitted command, immutable once acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub id: String,
    pub kind: CommandKind,
    pub created_at: OffsetDateTime,
}

/// Orchestrates one command at a time: submit, stream, resolve, reset.
///
/// All mutation happens on the caller's thread. Worker threads only push
/// signals into the queue; [`CommandLifecycle::tick`] is the frame boundary
/// that drains them, applies state transitions, and flushes the log sink
/// into the visible log. Signals tagged with a replaced run id are
/// discarded, and every exit path from `Streaming` closes the subscription.
pub struct CommandLifecycle {
    transport: Arc<dyn WorkerTransport>,
    queue: SignalQueue,
    stream: LogStream,
    sink: LogSink,
    visible: Vec<LogEntry>,
    state: LifecycleState,
    command: Option<Command>,
    pending_kind: Option<CommandKind>,
    result: Option<TerminalResult>,
    next_run: RunId,
    current_run: Option<RunId>,
}

impl CommandLifecycle {
    pub fn new(transport: Arc<dyn WorkerTransport>) -> Self {
        let queue: SignalQueue = Arc::new(Mutex::new(VecDeque::new()));
        Self {
            stream: LogStream::new(Arc::clone(&transport), Arc::clone(&queue)),
            transport,
            queue,
            sink: LogSink::default(),
            visible: Vec::new(),
            state: LifecycleState::Idle,
            command: None,
            pending_kind: None,
            result: None,
            next_run: 0,
            current_run: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// True while a submit or stream is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(
            self.state,
            LifecycleState::Submitting | LifecycleState::Streaming
        )
    }

    pub fn command(&self) -> Option<&Command> {
        self.command.as_ref()
    }

    pub fn result(&self) -> Option<&TerminalResult> {
        self.result.as_ref()
    }

    pub fn visible_log(&self) -> &[LogEntry] {
        &self.visible
    }

    pub fn subscription_active(&self) -> bool {
        self.stream.has_active()
    }

    /// True when a tick would apply signals or flush buffered entries.
    pub fn has_pending(&self) -> bool {
        !self.sink.is_empty() || !lock_unpoisoned(&self.queue).is_empty()
    }

    /// Validate and dispatch one submission.
    ///
    /// Validation failures emit a log entry and leave the state at `Idle`
    /// without touching the network. A submission while another command is
    /// active (or unreset) is rejected the same way.
    pub fn submit(&mut self, request: SubmitRequest) {
        if self.state != LifecycleState::Idle {
            self.sink.push(LogEntry::now(
                "Another command is active; reset before submitting",
                LogKind::Error,
            ));
            return;
        }

        let kind = request.kind();
        let command_request = match request.into_command_request() {
            Ok(request) => request,
            Err(error) => {
                self.sink
                    .push(LogEntry::now(format!("Error: {error}"), LogKind::Error));
                return;
            }
        };

        self.next_run += 1;
        let run = self.next_run;
        self.current_run = Some(run);
        self.command = None;
        self.result = None;
        self.visible.clear();
        self.sink.clear();
        self.pending_kind = Some(kind);
        self.sink.push(LogEntry::now(
            format!("Submitting {} command...", kind.as_str()),
            LogKind::Info,
        ));
        self.state = LifecycleState::Submitting;

        let transport = Arc::clone(&self.transport);
        let queue = Arc::clone(&self.queue);
        let spawned = thread::Builder::new()
            .name(format!("command-submit-{run}"))
            .spawn(move || match transport.submit(&command_request) {
                Ok(command_id) => push_signal(&queue, run, StreamSignal::Queued { command_id }),
                Err(error) => push_signal(
                    &queue,
                    run,
                    StreamSignal::SubmitFailed {
                        error: error.to_string(),
                    },
                ),
            });

        // The submit result is observed via the queue; the thread itself is
        // disregarded once it has pushed its signal.
        if let Err(error) = spawned {
            push_signal(
                &self.queue,
                run,
                StreamSignal::SubmitFailed {
                    error: format!("failed to spawn submit worker: {error}"),
                },
            );
        }
    }

    /// Frame boundary: drain pending signals, then flush the sink into the
    /// visible log. Returns the visible-log deltas for rendering.
    pub fn tick(&mut self) -> Vec<LogDelta> {
        loop {
            let signal = lock_unpoisoned(&self.queue).pop_front();
            match signal {
                Some((run, signal)) => {
                    if Some(run) == self.current_run {
                        self.apply_signal(signal);
                    }
                }
                None => break,
            }
        }

        self.sink.flush_into(&mut self.visible)
    }

    /// Fetch the resolved artifact and write it under `dest_dir`.
    ///
    /// Only meaningful after a successful terminal with an artifact; a failed
    /// download becomes a log entry and never disturbs the terminal state.
    pub fn download_artifact(&mut self, dest_dir: &Path) -> Option<PathBuf> {
        let (command_id, file_name) = {
            let command = self.command.as_ref()?;
            let result = self.result.as_ref()?;
            if !result.has_artifact {
                return None;
            }
            (command.id.clone(), result.artifact_file_name())
        };

        match self.transport.download(&command_id, &file_name) {
            Ok(bytes) => {
                let path = dest_dir.join(&file_name);
                match std::fs::write(&path, bytes) {
                    Ok(()) => {
                        self.sink.push(LogEntry::now(
                            format!("Saved {}", path.display()),
                            LogKind::Success,
                        ));
                        Some(path)
                    }
                    Err(error) => {
                        self.sink.push(LogEntry::now(
                            format!("Download failed: {error}"),
                            LogKind::Error,
                        ));
                        None
                    }
                }
            }
            Err(error) => {
                self.sink.push(LogEntry::now(
                    format!("Download error: {error}"),
                    LogKind::Error,
                ));
                None
            }
        }
    }

    /// Return to `Idle`, discarding the command, result, and log trail.
    /// Any lingering subscription is torn down first.
    pub fn reset(&mut self) {
        self.stream.close();
        self.current_run = None;
        self.pending_kind = None;
        self.command = None;
        self.result = None;
        self.sink.clear();
        self.visible.clear();
        self.state = LifecycleState::Idle;
    }

    /// Abandon the active command without clearing the inspectable log
    /// trail. Guarantees subscription teardown regardless of current state.
    pub fn cancel(&mut self) {
        self.stream.close();
        self.current_run = None;
        self.pending_kind = None;
        self.state = LifecycleState::Idle;
    }

    fn apply_signal(&mut self, signal: StreamSignal) {
        match signal {
            StreamSignal::Queued { command_id } => self.on_queued(command_id),
            StreamSignal::SubmitFailed { error } => self.on_submit_failed(error),
            StreamSignal::Progress { message, kind } => self.on_progress(message, kind),
            StreamSignal::Terminal(payload) => self.on_terminal(&payload),
            StreamSignal::Closed { error } => self.on_stream_closed(error),
        }
    }

    fn on_queued(&mut self, command_id: String) {
        if self.state != LifecycleState::Submitting {
            return;
        }
        let Some(kind) = self.pending_kind.take() else {
            return;
        };

        self.sink.push(LogEntry::now(
            format!("Command queued: {}...", short_id(&command_id)),
            LogKind::Info,
        ));
        self.command = Some(Command {
            id: command_id.clone(),
            kind,
            created_at: OffsetDateTime::now_utc(),
        });
        self.state = LifecycleState::Streaming;
        if let Some(run) = self.current_run {
            self.stream.open(run, &command_id);
        }
    }

    fn on_submit_failed(&mut self, error: String) {
        if self.state != LifecycleState::Submitting {
            return;
        }
        self.pending_kind = None;
        self.sink
            .push(LogEntry::now(format!("Error: {error}"), LogKind::Error));
        self.state = LifecycleState::Idle;
    }

    fn on_progress(&mut self, message: String, kind: LogKind) {
        if self.state != LifecycleState::Streaming {
            return;
        }
        self.sink.push(LogEntry::now(message, kind));
    }

    fn on_terminal(&mut self, payload: &TerminalPayload) {
        if self.state != LifecycleState::Streaming {
            return;
        }
        self.stream.close();

        let result = resolver::resolve(payload);
        for entry in resolver::terminal_log_entries(&result) {
            self.sink.push(entry);
        }

        let terminal = if result.succeeded {
            TerminalKind::Success
        } else {
            TerminalKind::Failure
        };
        self.result = Some(result);
        self.state = LifecycleState::Terminal(terminal);
    }

    fn on_stream_closed(&mut self, error: Option<String>) {
        if self.state != LifecycleState::Streaming {
            return;
        }
        self.stream.close();

        let message = match error {
            Some(detail) => format!("Stream closed before completion: {detail}"),
            None => "Stream closed before completion".to_string(),
        };
        self.sink.push(LogEntry::now(message, LogKind::Error));
        self.state = LifecycleState::Terminal(TerminalKind::Unresolved);
    }
}

impl Drop for CommandLifecycle {
    fn drop(&mut self) {
        self.stream.close();
    }
}

fn short_id(command_id: &str) -> String {
    command_id.chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use worker_api::{
        CancellationSignal, CommandRequest, LogKind, TerminalPayload, WorkerApiError,
        WorkerStreamEvent,
    };

    use super::{CommandLifecycle, LifecycleState, TerminalKind};
    use crate::stream::{lock_unpoisoned, StreamSignal};
    use crate::submit::SubmitRequest;
    use crate::transport::WorkerTransport;

    struct IdleTransport {
        submit_calls: AtomicUsize,
    }

    impl IdleTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                submit_calls: AtomicUsize::new(0),
            })
        }
    }

    impl WorkerTransport for IdleTransport {
        fn submit(&self, _request: &CommandRequest) -> Result<String, WorkerApiError> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            Ok("deadbeefcafebabe".to_string())
        }

        fn stream(
            &self,
            _command_id: &str,
            _cancel: &CancellationSignal,
            _on_event: &mut dyn FnMut(WorkerStreamEvent),
        ) -> Result<Option<TerminalPayload>, WorkerApiError> {
            Ok(Some(TerminalPayload {
                status: Some("done".to_string()),
                result: json!({}),
                has_result_file: false,
                result_file: None,
            }))
        }

        fn download(&self, _command_id: &str, _file_name: &str) -> Result<Vec<u8>, WorkerApiError> {
            Ok(Vec::new())
        }
    }

    fn drain_until(
        lifecycle: &mut CommandLifecycle,
        done: impl Fn(&CommandLifecycle) -> bool,
    ) {
        for _ in 0..400 {
            lifecycle.tick();
            if done(lifecycle) {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("lifecycle did not reach the expected state");
    }

    #[test]
    fn validation_failure_stays_idle_and_never_touches_the_network() {
        let transport = IdleTransport::new();
        let mut lifecycle = CommandLifecycle::new(Arc::clone(&transport) as Arc<dyn WorkerTransport>);

        lifecycle.submit(SubmitRequest::Encode {
            cover: None,
            secret: "s".to_string(),
            text: "hello".to_string(),
        });
        lifecycle.tick();

        assert_eq!(lifecycle.state(), LifecycleState::Idle);
        assert_eq!(transport.submit_calls.load(Ordering::SeqCst), 0);
        assert_eq!(lifecycle.visible_log().len(), 1);
        assert_eq!(lifecycle.visible_log()[0].kind, LogKind::Error);
    }

    #[test]
    fn submit_while_active_is_rejected_with_a_log_entry() {
        let transport = IdleTransport::new();
        let mut lifecycle = CommandLifecycle::new(Arc::clone(&transport) as Arc<dyn WorkerTransport>);

        lifecycle.submit(SubmitRequest::Decode {
            cover: Some(worker_api::FileUpload::new("cover.mp3", vec![1])),
            secret: "s".to_string(),
        });
        drain_until(&mut lifecycle, |lifecycle| !lifecycle.is_busy());
        assert_eq!(
            lifecycle.state(),
            LifecycleState::Terminal(TerminalKind::Success)
        );

        lifecycle.submit(SubmitRequest::Decode {
            cover: Some(worker_api::FileUpload::new("cover.mp3", vec![1])),
            secret: "s".to_string(),
        });
        lifecycle.tick();

        assert_eq!(transport.submit_calls.load(Ordering::SeqCst), 1);
        assert!(lifecycle
            .visible_log()
            .iter()
            .any(|entry| entry.message.contains("reset before submitting")));
    }

    #[test]
    fn signals_for_a_replaced_run_are_discarded() {
        let transport = IdleTransport::new();
        let mut lifecycle = CommandLifecycle::new(Arc::clone(&transport) as Arc<dyn WorkerTransport>);

        lifecycle.submit(SubmitRequest::Decode {
            cover: Some(worker_api::FileUpload::new("cover.mp3", vec![1])),
            secret: "s".to_string(),
        });
        drain_until(&mut lifecycle, |lifecycle| !lifecycle.is_busy());
        lifecycle.reset();

        // A stale stream pushes after its run was replaced; nothing changes.
        lock_unpoisoned(&lifecycle.queue).push_back((
            1,
            StreamSignal::Progress {
                message: "[Frame 1] late".to_string(),
                kind: LogKind::Info,
            },
        ));
        lifecycle.tick();

        assert_eq!(lifecycle.state(), LifecycleState::Idle);
        assert!(lifecycle.visible_log().is_empty());
    }

    #[test]
    fn events_after_the_terminal_transition_are_discarded() {
        let transport = IdleTransport::new();
        let mut lifecycle = CommandLifecycle::new(Arc::clone(&transport) as Arc<dyn WorkerTransport>);

        lifecycle.submit(SubmitRequest::Decode {
            cover: Some(worker_api::FileUpload::new("cover.mp3", vec![1])),
            secret: "s".to_string(),
        });
        drain_until(&mut lifecycle, |lifecycle| !lifecycle.is_busy());

        let log_len = lifecycle.visible_log().len();
        let run = lifecycle.current_run.expect("run id survives terminal");
        lock_unpoisoned(&lifecycle.queue).push_back((
            run,
            StreamSignal::Progress {
                message: "[Frame 99] too late".to_string(),
                kind: LogKind::Info,
            },
        ));
        lock_unpoisoned(&lifecycle.queue).push_back((
            run,
            StreamSignal::Terminal(TerminalPayload {
                status: Some("failed".to_string()),
                result: json!({"error": "late failure"}),
                has_result_file: false,
                result_file: None,
            }),
        ));
        lifecycle.tick();

        assert_eq!(lifecycle.visible_log().len(), log_len);
        assert_eq!(
            lifecycle.state(),
            LifecycleState::Terminal(TerminalKind::Success)
        );
    }

    #[test]
    fn reset_returns_to_idle_and_clears_everything() {
        let transport = IdleTransport::new();
        let mut lifecycle = CommandLifecycle::new(Arc::clone(&transport) as Arc<dyn WorkerTransport>);

        lifecycle.submit(SubmitRequest::Decode {
            cover: Some(worker_api::FileUpload::new("cover.mp3", vec![1])),
            secret: "s".to_string(),
        });
        drain_until(&mut lifecycle, |lifecycle| !lifecycle.is_busy());
        lifecycle.reset();

        assert_eq!(lifecycle.state(), LifecycleState::Idle);
        assert!(lifecycle.command().is_none());
        assert!(lifecycle.result().is_none());
        assert!(lifecycle.visible_log().is_empty());
        assert!(!lifecycle.subscription_active());
    }
}
