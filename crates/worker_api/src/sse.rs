use serde_json::Value;

use crate::events::{LogKind, TerminalPayload, WorkerStreamEvent};

/// Incremental parser for the worker's SSE stream.
///
/// The worker names its events (`connected`, `log`, `done`) and pads data
/// lines with trailing whitespace to defeat intermediary buffering; both are
/// handled here so callers only ever see normalized events.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    buffer: String,
}

impl SseStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<WorkerStreamEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut events = Vec::new();

        while let Some(split) = self.buffer.find("\n\n") {
            let frame = self.buffer[..split].to_string();
            self.buffer.drain(0..split + 2);

            if let Some(event) = parse_frame(&frame) {
                events.push(event);
            }
        }

        events
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<WorkerStreamEvent> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty()
    }
}

fn parse_frame(frame: &str) -> Option<WorkerStreamEvent> {
    let mut event_name: Option<&str> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in frame.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            event_name = Some(value.trim());
        } else if let Some(value) = line.strip_prefix("data:") {
            let value = value.trim();
            if !value.is_empty() {
                data_lines.push(value);
            }
        }
        // `retry:`, `id:`, and comment lines carry no payload.
    }

    if data_lines.is_empty() {
        return None;
    }

    let value = serde_json::from_str::<Value>(&data_lines.join("\n")).ok()?;
    map_event(event_name?, value)
}

fn map_event(event_name: &str, value: Value) -> Option<WorkerStreamEvent> {
    match event_name {
        "log" => {
            let message = value
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_owned();
            let kind = value
                .get("type")
                .and_then(Value::as_str)
                .map(LogKind::parse)
                .unwrap_or(LogKind::Info);
            Some(WorkerStreamEvent::Log { message, kind })
        }
        "done" => serde_json::from_value::<TerminalPayload>(value)
            .ok()
            .map(WorkerStreamEvent::Done),
        "connected" => {
            let command_id = value
                .get("commandId")
                .and_then(Value::as_str)
                .map(ToString::to_string);
            Some(WorkerStreamEvent::Connected { command_id })
        }
        _ => None,
    }
}
