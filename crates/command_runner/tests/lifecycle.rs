use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use command_runner::{
    CommandLifecycle, LifecycleState, SubmitRequest, TerminalKind, WorkerTransport,
};
use serde_json::json;
use worker_api::{
    CancellationSignal, CommandKind, CommandRequest, FileUpload, LogKind, TerminalPayload,
    WorkerApiError, WorkerStreamEvent,
};

/// Scripted transport: acknowledges the submit, replays a fixed list of log
/// events, then ends the stream with the scripted terminal payload (or
/// quietly, when none is scripted).
struct ScriptedTransport {
    command_id: String,
    submit_result: Option<WorkerApiError>,
    events: Vec<(String, LogKind)>,
    terminal: Option<TerminalPayload>,
    submit_calls: AtomicUsize,
    observed_request: Mutex<Option<CommandRequest>>,
    downloads: Mutex<Vec<(String, String)>>,
    artifact_bytes: Vec<u8>,
}

impl ScriptedTransport {
    fn new(command_id: &str) -> Self {
        Self {
            command_id: command_id.to_string(),
            submit_result: None,
            events: Vec::new(),
            terminal: None,
            submit_calls: AtomicUsize::new(0),
            observed_request: Mutex::new(None),
            downloads: Mutex::new(Vec::new()),
            artifact_bytes: b"artifact".to_vec(),
        }
    }

    fn with_events(mut self, events: Vec<(&str, LogKind)>) -> Self {
        self.events = events
            .into_iter()
            .map(|(message, kind)| (message.to_string(), kind))
            .collect();
        self
    }

    fn with_terminal(mut self, terminal: TerminalPayload) -> Self {
        self.terminal = Some(terminal);
        self
    }

    fn with_submit_error(mut self, error: WorkerApiError) -> Self {
        self.submit_result = Some(error);
        self
    }

    fn observed_request(&self) -> Option<CommandRequest> {
        lock(&self.observed_request).clone()
    }

    fn downloads(&self) -> Vec<(String, String)> {
        lock(&self.downloads).clone()
    }
}

impl WorkerTransport for ScriptedTransport {
    fn submit(&self, request: &CommandRequest) -> Result<String, WorkerApiError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.observed_request) = Some(request.clone());

        match &self.submit_result {
            Some(WorkerApiError::Server(message)) => Err(WorkerApiError::Server(message.clone())),
            Some(WorkerApiError::Auth(message)) => Err(WorkerApiError::Auth(message.clone())),
            Some(_) => Err(WorkerApiError::Unknown("scripted failure".to_string())),
            None => Ok(self.command_id.clone()),
        }
    }

    fn stream(
        &self,
        _command_id: &str,
        _cancel: &CancellationSignal,
        on_event: &mut dyn FnMut(WorkerStreamEvent),
    ) -> Result<Option<TerminalPayload>, WorkerApiError> {
        on_event(WorkerStreamEvent::Connected {
            command_id: Some(self.command_id.clone()),
        });
        for (message, kind) in &self.events {
            on_event(WorkerStreamEvent::Log {
                message: message.clone(),
                kind: *kind,
            });
        }
        Ok(self.terminal.clone())
    }

    fn download(&self, command_id: &str, file_name: &str) -> Result<Vec<u8>, WorkerApiError> {
        lock(&self.downloads).push((command_id.to_string(), file_name.to_string()));
        Ok(self.artifact_bytes.clone())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn drain_until_settled(lifecycle: &mut CommandLifecycle) {
    for _ in 0..400 {
        lifecycle.tick();
        if !lifecycle.is_busy() && !lifecycle.has_pending() {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("lifecycle did not settle");
}

fn cover() -> Option<FileUpload> {
    Some(FileUpload::new("cover.mp3", b"ID3fake".to_vec()))
}

fn done_payload() -> TerminalPayload {
    TerminalPayload {
        status: Some("done".to_string()),
        result: json!({ "success": true }),
        has_result_file: false,
        result_file: None,
    }
}

#[test]
fn encode_submission_posts_once_and_announces_the_queued_id() {
    let transport = Arc::new(
        ScriptedTransport::new("deadbeefcafebabe1234").with_terminal(done_payload()),
    );
    let mut lifecycle = CommandLifecycle::new(Arc::clone(&transport) as Arc<dyn WorkerTransport>);

    lifecycle.submit(SubmitRequest::Encode {
        cover: cover(),
        secret: "swordfish".to_string(),
        text: "hello".to_string(),
    });
    drain_until_settled(&mut lifecycle);

    assert_eq!(transport.submit_calls.load(Ordering::SeqCst), 1);

    let request = transport.observed_request().expect("request captured");
    assert_eq!(request.kind, CommandKind::Encode);
    assert_eq!(request.file.file_name, "cover.mp3");
    assert_eq!(
        request.params_json().expect("params json"),
        r#"{"secret":"swordfish","text":"hello"}"#
    );

    let command = lifecycle.command().expect("command recorded");
    assert_eq!(command.id, "deadbeefcafebabe1234");
    assert!(lifecycle
        .visible_log()
        .iter()
        .any(|entry| entry.message == "Command queued: deadbeef..."));
    assert_eq!(
        lifecycle.state(),
        LifecycleState::Terminal(TerminalKind::Success)
    );
}

#[test]
fn bursty_frames_then_failure_flush_to_one_progress_and_two_error_lines() {
    let transport = Arc::new(
        ScriptedTransport::new("feedface00112233")
            .with_events(vec![
                ("[Frame 1] encoding", LogKind::Info),
                ("[Frame 2] encoding", LogKind::Info),
                ("[Frame 3] encoding", LogKind::Info),
                ("[Frame 4] encoding", LogKind::Info),
                ("[Frame 5] encoding", LogKind::Info),
            ])
            .with_terminal(TerminalPayload {
                status: Some("failed".to_string()),
                result: json!({ "error": "line1\nline2" }),
                has_result_file: false,
                result_file: None,
            }),
    );
    let mut lifecycle = CommandLifecycle::new(Arc::clone(&transport) as Arc<dyn WorkerTransport>);

    lifecycle.submit(SubmitRequest::Decode {
        cover: cover(),
        secret: "swordfish".to_string(),
    });
    drain_until_settled(&mut lifecycle);

    assert_eq!(
        lifecycle.state(),
        LifecycleState::Terminal(TerminalKind::Failure)
    );
    assert!(!lifecycle.subscription_active());

    let progress: Vec<&str> = lifecycle
        .visible_log()
        .iter()
        .filter(|entry| entry.message.starts_with("[Frame "))
        .map(|entry| entry.message.as_str())
        .collect();
    assert_eq!(progress, vec!["[Frame 5] encoding"]);

    let errors: Vec<&str> = lifecycle
        .visible_log()
        .iter()
        .filter(|entry| entry.kind == LogKind::Error)
        .map(|entry| entry.message.as_str())
        .collect();
    assert_eq!(errors, vec!["line1", "line2"]);

    assert!(!lifecycle
        .visible_log()
        .iter()
        .any(|entry| entry.message == "Result file ready for download"));
}

#[test]
fn artifact_download_requests_the_reported_base_name() {
    let transport = Arc::new(
        ScriptedTransport::new("0123456789abcdef").with_terminal(TerminalPayload {
            status: Some("done".to_string()),
            result: json!({ "success": true }),
            has_result_file: true,
            result_file: Some("out/secret.mp3".to_string()),
        }),
    );
    let mut lifecycle = CommandLifecycle::new(Arc::clone(&transport) as Arc<dyn WorkerTransport>);

    lifecycle.submit(SubmitRequest::Decode {
        cover: cover(),
        secret: "swordfish".to_string(),
    });
    drain_until_settled(&mut lifecycle);

    assert!(lifecycle
        .visible_log()
        .iter()
        .any(|entry| entry.message == "Result file ready for download"));

    let dir = std::env::temp_dir().join("command_runner_lifecycle_test");
    std::fs::create_dir_all(&dir).expect("temp dir");
    let saved = lifecycle.download_artifact(&dir).expect("artifact saved");
    lifecycle.tick();

    assert_eq!(
        transport.downloads(),
        vec![("0123456789abcdef".to_string(), "secret.mp3".to_string())]
    );
    assert_eq!(saved, dir.join("secret.mp3"));
    assert_eq!(
        std::fs::read(&saved).expect("saved artifact"),
        b"artifact"
    );

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn artifact_download_falls_back_to_the_default_name() {
    let transport = Arc::new(
        ScriptedTransport::new("0123456789abcdef").with_terminal(TerminalPayload {
            status: Some("done".to_string()),
            result: json!({}),
            has_result_file: true,
            result_file: None,
        }),
    );
    let mut lifecycle = CommandLifecycle::new(Arc::clone(&transport) as Arc<dyn WorkerTransport>);

    lifecycle.submit(SubmitRequest::Decode {
        cover: cover(),
        secret: String::new(),
    });
    drain_until_settled(&mut lifecycle);

    let dir = std::env::temp_dir().join("command_runner_default_name_test");
    std::fs::create_dir_all(&dir).expect("temp dir");
    lifecycle.download_artifact(&dir);

    assert_eq!(
        transport.downloads(),
        vec![(
            "0123456789abcdef".to_string(),
            "stego_output.mp3".to_string()
        )]
    );

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn quiet_stream_close_lands_in_unresolved_terminal() {
    let transport = Arc::new(ScriptedTransport::new("feedface00112233").with_events(vec![(
        "[Frame 1] encoding",
        LogKind::Info,
    )]));
    let mut lifecycle = CommandLifecycle::new(Arc::clone(&transport) as Arc<dyn WorkerTransport>);

    lifecycle.submit(SubmitRequest::Decode {
        cover: cover(),
        secret: "s".to_string(),
    });
    drain_until_settled(&mut lifecycle);

    assert_eq!(
        lifecycle.state(),
        LifecycleState::Terminal(TerminalKind::Unresolved)
    );
    assert!(!lifecycle.subscription_active());
    assert!(lifecycle
        .visible_log()
        .iter()
        .any(|entry| entry.kind == LogKind::Error
            && entry.message.starts_with("Stream closed before completion")));
}

#[test]
fn submit_error_returns_to_idle_with_the_worker_message() {
    let transport = Arc::new(
        ScriptedTransport::new("unused")
            .with_submit_error(WorkerApiError::Server("No cover file uploaded".to_string())),
    );
    let mut lifecycle = CommandLifecycle::new(Arc::clone(&transport) as Arc<dyn WorkerTransport>);

    lifecycle.submit(SubmitRequest::Bruteforce {
        cover: cover(),
        wordlist: None,
        chunk_size: 10,
        check_gibberish: false,
    });
    drain_until_settled(&mut lifecycle);

    assert_eq!(lifecycle.state(), LifecycleState::Idle);
    assert!(lifecycle
        .visible_log()
        .iter()
        .any(|entry| entry.message == "Error: No cover file uploaded"));
}

#[test]
fn brute_events_keep_their_kinds_in_arrival_order() {
    let transport = Arc::new(
        ScriptedTransport::new("feedface00112233")
            .with_events(vec![
                ("password1", LogKind::BruteFail),
                ("hunter2|||Steghide Found|||the payload", LogKind::BruteSuccess),
            ])
            .with_terminal(done_payload()),
    );
    let mut lifecycle = CommandLifecycle::new(Arc::clone(&transport) as Arc<dyn WorkerTransport>);

    lifecycle.submit(SubmitRequest::Bruteforce {
        cover: cover(),
        wordlist: Some(FileUpload::new("rockyou.txt", b"hunter2\n".to_vec())),
        chunk_size: 10,
        check_gibberish: true,
    });
    drain_until_settled(&mut lifecycle);

    let kinds: Vec<LogKind> = lifecycle
        .visible_log()
        .iter()
        .map(|entry| entry.kind)
        .collect();
    let fail_index = kinds
        .iter()
        .position(|kind| *kind == LogKind::BruteFail)
        .expect("brute_fail entry");
    let success_index = kinds
        .iter()
        .position(|kind| *kind == LogKind::BruteSuccess)
        .expect("brute_success entry");
    assert!(fail_index < success_index);

    let request = transport.observed_request().expect("request captured");
    assert_eq!(
        request.wordlist.as_ref().map(|w| w.file_name.as_str()),
        Some("rockyou.txt")
    );
}
