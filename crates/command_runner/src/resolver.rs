use serde_json::Value;
use worker_api::{LogKind, TerminalPayload};

use crate::log::LogEntry;

/// Artifact name used when the terminal payload names none.
pub const DEFAULT_ARTIFACT_NAME: &str = "stego_output.mp3";

/// Classified outcome of one command, created exactly once per command.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalResult {
    pub succeeded: bool,
    /// Failure text split into non-empty lines, order preserved.
    pub error_lines: Vec<String>,
    pub has_artifact: bool,
    pub artifact_name: Option<String>,
    pub raw: Value,
}

impl TerminalResult {
    /// Basename of the reported artifact, or the fixed default.
    pub fn artifact_file_name(&self) -> String {
        artifact_file_name(self.artifact_name.as_deref())
    }
}

/// Classify a terminal payload. Success is decided strictly by the status
/// field; the payload content never overrides it.
pub fn resolve(payload: &TerminalPayload) -> TerminalResult {
    let succeeded = !payload.failed();
    let error_lines = if succeeded {
        Vec::new()
    } else {
        payload
            .error_message()
            .unwrap_or("Unknown error")
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(ToString::to_string)
            .collect()
    };

    TerminalResult {
        succeeded,
        error_lines,
        has_artifact: payload.has_result_file,
        artifact_name: payload.result_file.clone(),
        raw: payload.result.clone(),
    }
}

/// Log entries announcing a resolved terminal state, in display order:
/// artifact availability first, then the per-line failure detail or the
/// final success line.
pub fn terminal_log_entries(result: &TerminalResult) -> Vec<LogEntry> {
    let mut entries = Vec::new();

    if result.has_artifact {
        entries.push(LogEntry::now(
            "Result file ready for download",
            LogKind::Success,
        ));
    }

    if result.succeeded {
        entries.push(LogEntry::now("Done", LogKind::Success));
    } else {
        for line in &result.error_lines {
            entries.push(LogEntry::now(line.clone(), LogKind::Error));
        }
    }

    entries
}

pub fn artifact_file_name(result_file: Option<&str>) -> String {
    match result_file {
        Some(path) if !base_name(path).is_empty() => base_name(path).to_string(),
        _ => DEFAULT_ARTIFACT_NAME.to_string(),
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
