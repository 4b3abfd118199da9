// ─── Status Events ───
// `{step, status}` progress lines for whatever front end drives the run.

use std::io::Write;
use std::sync::Mutex;

use serde::Serialize;
use tracing::warn;

/// Phase boundaries of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    IdentityCheck,
    Restore,
    IdentityRefresh,
    Launch,
    WaitForStart,
    WaitForExit,
    Upload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Started,
    Completed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    pub step: Step,
    pub status: StepStatus,
}

impl StatusEvent {
    pub fn new(step: Step, status: StepStatus) -> Self {
        Self { step, status }
    }
}

pub trait StatusSink: Send + Sync {
    fn emit(&self, event: StatusEvent);
}

/// Writes each event as one JSON object per line and flushes immediately.
pub struct JsonLinesSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> StatusSink for JsonLinesSink<W> {
    fn emit(&self, event: StatusEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                warn!("Cannot serialize status event {:?}: {}", event, e);
                return;
            }
        };

        let mut out = self
            .out
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            warn!("Cannot write status event: {}", e);
        }
    }
}

/// Drops every event. Used by the one-shot subcommands.
pub struct NullSink;

impl StatusSink for NullSink {
    fn emit(&self, _event: StatusEvent) {}
}
