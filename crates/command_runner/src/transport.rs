use worker_api::{
    CancellationSignal, CommandRequest, HealthReport, TerminalPayload, WorkerApiClient,
    WorkerApiError, WorkerStreamEvent,
};

/// Blocking transport seam between the orchestrator and the worker API.
///
/// The orchestrator runs its network calls on dedicated worker threads; each
/// method blocks until the underlying request resolves or the cancellation
/// signal is observed.
pub trait WorkerTransport: Send + Sync + 'static {
    fn submit(&self, request: &CommandRequest) -> Result<String, WorkerApiError>;

    fn stream(
        &self,
        command_id: &str,
        cancel: &CancellationSignal,
        on_event: &mut dyn FnMut(WorkerStreamEvent),
    ) -> Result<Option<TerminalPayload>, WorkerApiError>;

    fn download(&self, command_id: &str, file_name: &str) -> Result<Vec<u8>, WorkerApiError>;
}

/// Real transport backed by [`WorkerApiClient`].
#[derive(Debug)]
pub struct HttpWorkerTransport {
    client: WorkerApiClient,
}

impl HttpWorkerTransport {
    pub fn new(client: WorkerApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &WorkerApiClient {
        &self.client
    }

    /// Blocking liveness probe for connection setup; not part of the
    /// orchestration seam.
    pub fn health(&self) -> Result<HealthReport, WorkerApiError> {
        blocking_runtime()?.block_on(self.client.health(None))
    }
}

impl WorkerTransport for HttpWorkerTransport {
    fn submit(&self, request: &CommandRequest) -> Result<String, WorkerApiError> {
        blocking_runtime()?.block_on(self.client.create_command(request, None))
    }

    fn stream(
        &self,
        command_id: &str,
        cancel: &CancellationSignal,
        on_event: &mut dyn FnMut(WorkerStreamEvent),
    ) -> Result<Option<TerminalPayload>, WorkerApiError> {
        blocking_runtime()?.block_on(self.client.stream_command(
            command_id,
            Some(cancel),
            |event| on_event(event),
        ))
    }

    fn download(&self, command_id: &str, file_name: &str) -> Result<Vec<u8>, WorkerApiError> {
        blocking_runtime()?.block_on(self.client.download_artifact(command_id, file_name, None))
    }
}

fn blocking_runtime() -> Result<tokio::runtime::Runtime, WorkerApiError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| {
            WorkerApiError::Unknown(format!("failed to initialize tokio runtime: {error}"))
        })
}
