use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;

#[derive(Debug)]
pub enum WorkerApiError {
    MissingToken,
    InvalidToken,
    InvalidBaseUrl(String),
    /// 401/403: credentials or session presumed invalid.
    Auth(String),
    /// 404: the worker or command is unknown.
    NotFound(String),
    /// Any other non-2xx status, with the worker-reported message when present.
    Server(String),
    /// The request never completed.
    Transport(reqwest::Error),
    MalformedResponse(String),
    Serde(serde_json::Error),
    Cancelled,
    Unknown(String),
}

/// Error body shape reported by the worker on non-2xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: Option<String>,
}

impl fmt::Display for WorkerApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingToken => write!(f, "worker token is required"),
            Self::InvalidToken => write!(f, "worker token contains invalid characters"),
            Self::InvalidBaseUrl(value) => write!(f, "invalid worker URL: {value}"),
            Self::Auth(message) | Self::NotFound(message) | Self::Server(message) => {
                write!(f, "{message}")
            }
            Self::Transport(error) => write!(f, "worker unreachable: {error}"),
            Self::MalformedResponse(message) => {
                write!(f, "malformed worker response: {message}")
            }
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::Cancelled => write!(f, "request was cancelled"),
            Self::Unknown(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for WorkerApiError {}

impl From<reqwest::Error> for WorkerApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error)
    }
}

impl From<serde_json::Error> for WorkerApiError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serde(error)
    }
}

/// Extract the worker's reported error string from a non-2xx body, falling
/// back to the raw body and then the canonical status reason.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = parsed.error.filter(|value| !value.trim().is_empty()) {
            return message;
        }
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}

/// Map a non-2xx status to the error taxonomy.
pub fn classify_status(status: StatusCode, message: String) -> WorkerApiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => WorkerApiError::Auth(message),
        StatusCode::NOT_FOUND => WorkerApiError::NotFound(message),
        _ => WorkerApiError::Server(message),
    }
}
