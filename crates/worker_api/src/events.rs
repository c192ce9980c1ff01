use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity attached to a worker log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Info,
    Success,
    Error,
    BruteFail,
    BruteSuccess,
}

impl LogKind {
    /// Parse a wire kind string; unknown values degrade to `Info`.
    pub fn parse(value: &str) -> Self {
        match value {
            "success" => Self::Success,
            "error" => Self::Error,
            "brute_fail" => Self::BruteFail,
            "brute_success" => Self::BruteSuccess,
            _ => Self::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Error => "error",
            Self::BruteFail => "brute_fail",
            Self::BruteSuccess => "brute_success",
        }
    }
}

/// Raw body of the stream's single `done` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalPayload {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub has_result_file: bool,
    #[serde(default)]
    pub result_file: Option<String>,
}

impl TerminalPayload {
    /// Failure is decided strictly by the explicit status field.
    pub fn failed(&self) -> bool {
        self.status.as_deref() == Some("failed")
    }

    pub fn error_message(&self) -> Option<&str> {
        self.result.get("error").and_then(Value::as_str)
    }
}

/// Stream event emitted by the parser after normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerStreamEvent {
    /// Handshake frame sent when the subscription opens; informational only.
    Connected { command_id: Option<String> },
    Log { message: String, kind: LogKind },
    Done(TerminalPayload),
}

/// Segments of a pipe-delimited brute-success message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BruteSuccessParts<'a> {
    /// The passphrase candidate that matched.
    pub candidate: &'a str,
    /// Context tag describing where it matched.
    pub context: &'a str,
    /// Recovered content, which may itself contain the delimiter.
    pub content: &'a str,
}

/// Split a `candidate|||context|||content` brute-success message for display.
pub fn split_brute_success(message: &str) -> BruteSuccessParts<'_> {
    let mut parts = message.splitn(3, "|||");
    BruteSuccessParts {
        candidate: parts.next().unwrap_or(""),
        context: parts.next().unwrap_or(""),
        content: parts.next().unwrap_or(""),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{split_brute_success, LogKind, TerminalPayload};

    #[test]
    fn unknown_log_kind_degrades_to_info() {
        assert_eq!(LogKind::parse("success"), LogKind::Success);
        assert_eq!(LogKind::parse("brute_fail"), LogKind::BruteFail);
        assert_eq!(LogKind::parse("warning"), LogKind::Info);
        assert_eq!(LogKind::parse(""), LogKind::Info);
    }

    #[test]
    fn failure_is_decided_by_status_field_only() {
        let failed = TerminalPayload {
            status: Some("failed".to_string()),
            result: json!({"error": "nope"}),
            has_result_file: false,
            result_file: None,
        };
        let done = TerminalPayload {
            status: Some("done".to_string()),
            result: json!({"error": "error-looking content is ignored"}),
            has_result_file: true,
            result_file: Some("out.mp3".to_string()),
        };

        assert!(failed.failed());
        assert!(!done.failed());
        assert_eq!(failed.error_message(), Some("nope"));
    }

    #[test]
    fn brute_success_split_keeps_delimiters_in_content() {
        let parts = split_brute_success("hunter2|||Steghide Found|||payload|||with|||pipes");
        assert_eq!(parts.candidate, "hunter2");
        assert_eq!(parts.context, "Steghide Found");
        assert_eq!(parts.content, "payload|||with|||pipes");

        let bare = split_brute_success("hunter2");
        assert_eq!(bare.candidate, "hunter2");
        assert_eq!(bare.context, "");
        assert_eq!(bare.content, "");
    }
}
