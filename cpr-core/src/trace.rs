//! Diagnostic sink for decode attempts.
//!
//! Decoders never log directly. They hand a `TraceEvent` to whatever sink the
//! caller put in the `Decoder` context, so tests can capture events and
//! embedded callers can drop them.

use std::sync::Mutex;

use crate::types::{CprError, FormatKind, Parity, Position};

/// Which decode path produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceStage {
    Global,
    Local,
    SelfTest,
}

impl std::fmt::Display for TraceStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceStage::Global => write!(f, "global"),
            TraceStage::Local => write!(f, "local"),
            TraceStage::SelfTest => write!(f, "selftest"),
        }
    }
}

/// One decode outcome, as seen by a sink.
#[derive(Debug)]
pub struct TraceEvent<'a> {
    pub stage: TraceStage,
    pub parity: Parity,
    pub format: FormatKind,
    pub now: f64,
    pub outcome: std::result::Result<Position, &'a CprError>,
    pub detail: Option<&'a str>,
}

/// Receives decode diagnostics.
pub trait TraceSink: Sync {
    fn event(&self, event: &TraceEvent<'_>);

    /// A diagnostic not tied to one decoded frame, such as a zone table check.
    fn note(&self, stage: TraceStage, message: &str);
}

/// Forwards events to `tracing` under the `cpr` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn event(&self, ev: &TraceEvent<'_>) {
        match &ev.outcome {
            Ok(pos) => tracing::debug!(
                target: "cpr",
                stage = %ev.stage,
                parity = %ev.parity,
                format = %ev.format,
                now = ev.now,
                "decoded {pos}"
            ),
            Err(e) => tracing::debug!(
                target: "cpr",
                stage = %ev.stage,
                parity = %ev.parity,
                format = %ev.format,
                now = ev.now,
                detail = ev.detail.unwrap_or(""),
                "failed: {e}"
            ),
        }
    }

    fn note(&self, stage: TraceStage, message: &str) {
        tracing::debug!(target: "cpr", stage = %stage, "{message}");
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn event(&self, _event: &TraceEvent<'_>) {}

    fn note(&self, _stage: TraceStage, _message: &str) {}
}

/// Keeps a one-line rendering of every event. Handy in tests and for
/// printing self-test failures.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }
}

impl TraceSink for MemorySink {
    fn event(&self, ev: &TraceEvent<'_>) {
        let mut line = match &ev.outcome {
            Ok(pos) => format!("{} {} {}: {pos}", ev.stage, ev.format, ev.parity),
            Err(e) => format!("{} {} {}: {e}", ev.stage, ev.format, ev.parity),
        };
        if let Some(detail) = ev.detail {
            line.push_str(" (");
            line.push_str(detail);
            line.push(')');
        }
        self.push(line);
    }

    fn note(&self, stage: TraceStage, message: &str) {
        self.push(format!("{stage}: {message}"));
    }
}

pub(crate) static TRACING: TracingSink = TracingSink;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_success_and_failure() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());

        sink.event(&TraceEvent {
            stage: TraceStage::Global,
            parity: Parity::Even,
            format: FormatKind::Airborne,
            now: 1.0,
            outcome: Ok(Position::new(52.25720, 3.91937)),
            detail: None,
        });
        let err = CprError::ZoneMismatch;
        sink.event(&TraceEvent {
            stage: TraceStage::Local,
            parity: Parity::Odd,
            format: FormatKind::Surface,
            now: 2.0,
            outcome: Err(&err),
            detail: Some("pair discarded"),
        });

        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "global airborne even: 52.25720, 3.91937");
        assert!(lines[1].starts_with("local surface odd: even/odd frames straddle"));
        assert!(lines[1].ends_with("(pair discarded)"));
    }

    #[test]
    fn test_memory_sink_records_notes() {
        let sink = MemorySink::new();
        sink.note(TraceStage::SelfTest, "NL(45) expected 41, got 42");
        assert_eq!(sink.lines(), vec!["selftest: NL(45) expected 41, got 42"]);
    }

    #[test]
    fn test_null_sink_is_silent() {
        let err = CprError::NoReference;
        NullSink.event(&TraceEvent {
            stage: TraceStage::Local,
            parity: Parity::Even,
            format: FormatKind::Surface,
            now: 0.0,
            outcome: Err(&err),
            detail: None,
        });
        NullSink.note(TraceStage::SelfTest, "ignored");
    }
}
