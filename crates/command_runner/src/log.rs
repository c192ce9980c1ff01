use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::OffsetDateTime;
use worker_api::LogKind;

/// One visible log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: String,
    pub message: String,
    pub kind: LogKind,
}

impl LogEntry {
    pub fn new(time: impl Into<String>, message: impl Into<String>, kind: LogKind) -> Self {
        Self {
            time: time.into(),
            message: message.into(),
            kind,
        }
    }

    pub fn now(message: impl Into<String>, kind: LogKind) -> Self {
        Self::new(timestamp(), message, kind)
    }

    /// Collapsible entries are `info` frame-counter updates; a contiguous run
    /// of them is represented by its most recent member only.
    pub fn is_collapsible(&self) -> bool {
        self.kind == LogKind::Info && progress_marker_regex().is_match(&self.message)
    }
}

fn progress_marker_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"^\[Frame\s+\d+\]").expect("progress marker regex must compile")
    })
}

/// Current wall-clock stamp in `HH:MM:SS`.
pub fn timestamp() -> String {
    let format = format_description!("[hour]:[minute]:[second]");
    OffsetDateTime::now_utc()
        .format(&format)
        .unwrap_or_default()
}

/// Change applied to the visible log by one flush.
#[derive(Debug, Clone, PartialEq)]
pub enum LogDelta {
    Append(LogEntry),
    /// The tail was a collapsible progress entry and got replaced in place.
    ReplaceTail(LogEntry),
}

/// Buffers log entries between rendering frames.
///
/// Events can arrive far faster than the rendering cadence; the sink absorbs
/// the burst and the host flushes once per frame. The first push after a
/// flush reports that a new flush is due, so at most one is scheduled per
/// frame no matter how many entries arrived.
#[derive(Debug, Default)]
pub struct LogSink {
    pending: Vec<LogEntry>,
    flush_requested: bool,
}

impl LogSink {
    /// Buffer one entry. Returns true when this push should schedule a flush.
    pub fn push(&mut self, entry: LogEntry) -> bool {
        self.pending.push(entry);
        let first_of_frame = !self.flush_requested;
        self.flush_requested = true;
        first_of_frame
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.flush_requested = false;
    }

    /// Drain buffered entries into the visible log, collapsing contiguous
    /// progress runs against its tail. Idempotent when the buffer is empty.
    pub fn flush_into(&mut self, visible: &mut Vec<LogEntry>) -> Vec<LogDelta> {
        self.flush_requested = false;
        let mut deltas = Vec::with_capacity(self.pending.len());

        for entry in self.pending.drain(..) {
            let tail_collapsible = visible.last().is_some_and(LogEntry::is_collapsible);
            if tail_collapsible && entry.is_collapsible() {
                let tail_index = visible.len() - 1;
                visible[tail_index] = entry.clone();
                deltas.push(LogDelta::ReplaceTail(entry));
            } else {
                visible.push(entry.clone());
                deltas.push(LogDelta::Append(entry));
            }
        }

        deltas
    }
}
