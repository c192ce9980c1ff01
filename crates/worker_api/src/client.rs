use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;

use crate::config::WorkerApiConfig;
use crate::error::{classify_status, parse_error_message, WorkerApiError};
use crate::events::{TerminalPayload, WorkerStreamEvent};
use crate::payload::CommandRequest;
use crate::sse::SseStreamParser;
use crate::url::{artifact_url, commands_url, health_url, stream_url};

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct WorkerApiClient {
    http: Client,
    config: WorkerApiConfig,
}

/// Body of a successful health probe.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthReport {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommandAck {
    #[serde(rename = "commandId")]
    command_id: String,
}

impl WorkerApiClient {
    pub fn new(config: WorkerApiConfig) -> Result<Self, WorkerApiError> {
        let mut builder = Client::builder();
        if let Some(user_agent) = config.user_agent.as_deref() {
            builder = builder.user_agent(user_agent.to_string());
        }
        let http = builder.build().map_err(WorkerApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &WorkerApiConfig {
        &self.config
    }

    fn bearer_headers(&self) -> Result<HeaderMap, WorkerApiError> {
        let token = self.config.token.trim();
        if token.is_empty() {
            return Err(WorkerApiError::MissingToken);
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| WorkerApiError::InvalidToken)?,
        );
        Ok(headers)
    }

    /// Submit one command; 2xx yields the worker-issued command id.
    pub async fn create_command(
        &self,
        request: &CommandRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<String, WorkerApiError> {
        let headers = self.bearer_headers()?;
        let form = request.to_form()?;

        let mut builder = self
            .http
            .post(commands_url(&self.config.base_url))
            .headers(headers)
            .multipart(form);
        if let Some(timeout) = self.config.timeout {
            builder = builder.timeout(timeout);
        }

        let body = self.read_success_body(builder.send(), cancellation).await?;
        let ack = serde_json::from_str::<CommandAck>(&body).map_err(|_| {
            WorkerApiError::MalformedResponse("missing commandId in worker response".to_string())
        })?;
        Ok(ack.command_id)
    }

    /// Open the single live subscription for a command and forward its
    /// progress events in server order.
    ///
    /// Returns `Some(payload)` as soon as the terminal `done` event arrives
    /// (the connection is dropped without reading further), or `None` when
    /// the transport ends without one. There is no reconnection; a finished
    /// stream is dead.
    pub async fn stream_command<F>(
        &self,
        command_id: &str,
        cancellation: Option<&CancellationSignal>,
        mut on_event: F,
    ) -> Result<Option<TerminalPayload>, WorkerApiError>
    where
        F: FnMut(WorkerStreamEvent),
    {
        let url = stream_url(&self.config.base_url, command_id, self.config.token.trim())?;
        let request = self
            .http
            .get(url)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"));

        let response = await_or_cancel(request.send(), cancellation)
            .await?
            .map_err(WorkerApiError::from)?;
        let response = self.reject_error_status(response, cancellation).await?;

        let mut bytes = response.bytes_stream();
        let mut parser = SseStreamParser::default();

        loop {
            let Some(chunk) = await_or_cancel(bytes.next(), cancellation).await? else {
                break;
            };
            if is_cancelled(cancellation) {
                return Err(WorkerApiError::Cancelled);
            }
            let chunk = chunk.map_err(WorkerApiError::from)?;
            for event in parser.feed(&chunk) {
                if let WorkerStreamEvent::Done(payload) = event {
                    return Ok(Some(payload));
                }
                on_event(event);
            }
        }

        if is_cancelled(cancellation) {
            return Err(WorkerApiError::Cancelled);
        }

        Ok(None)
    }

    /// Fetch a produced artifact as raw bytes.
    pub async fn download_artifact(
        &self,
        command_id: &str,
        file_name: &str,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Vec<u8>, WorkerApiError> {
        let url = artifact_url(&self.config.base_url, command_id, file_name)?;
        let headers = self.bearer_headers()?;

        let response = await_or_cancel(self.http.get(url).headers(headers).send(), cancellation)
            .await?
            .map_err(WorkerApiError::from)?;
        let response = self.reject_error_status(response, cancellation).await?;

        let bytes = await_or_cancel(response.bytes(), cancellation)
            .await?
            .map_err(WorkerApiError::from)?;
        Ok(bytes.to_vec())
    }

    /// One-shot liveness probe used by connection setup.
    pub async fn health(
        &self,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<HealthReport, WorkerApiError> {
        let headers = self.bearer_headers()?;
        let mut builder = self
            .http
            .get(health_url(&self.config.base_url))
            .headers(headers);
        if let Some(timeout) = self.config.timeout {
            builder = builder.timeout(timeout);
        }

        let body = self.read_success_body(builder.send(), cancellation).await?;
        serde_json::from_str::<HealthReport>(&body).map_err(|_| {
            WorkerApiError::MalformedResponse("health probe returned non-JSON body".to_string())
        })
    }

    async fn read_success_body<F>(
        &self,
        send: F,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<String, WorkerApiError>
    where
        F: Future<Output = Result<Response, reqwest::Error>>,
    {
        let response = await_or_cancel(send, cancellation)
            .await?
            .map_err(WorkerApiError::from)?;
        let status = response.status();
        let body = await_or_cancel(response.text(), cancellation)
            .await?
            .unwrap_or_default();

        if status.is_success() {
            Ok(body)
        } else {
            Err(classify_status(status, parse_error_message(status, &body)))
        }
    }

    async fn reject_error_status(
        &self,
        response: Response,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, WorkerApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = await_or_cancel(response.text(), cancellation)
            .await?
            .unwrap_or_else(|_| fallback_reason(status));
        Err(classify_status(status, parse_error_message(status, &body)))
    }
}

fn fallback_reason(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, WorkerApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(WorkerApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(WorkerApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}
