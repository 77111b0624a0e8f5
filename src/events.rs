//! Notification events.
//!
//! The engine emits events when attempts change state or gating blocks a
//! learner. Delivery belongs to someone else: sinks are fire-and-forget and a
//! failing sink never fails the operation that emitted the event.
//!
//! [`JsonlEventLog`] appends one JSON object per line to a log file.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{AttemptId, AttemptStatus, SkillId, StepId, TrainingId, UserId};
use crate::error::{FailOpen, PathgateError, Result};

/// Schema version for logged events.
pub const EVENT_SCHEMA_VERSION: u8 = 1;

/// An event with its envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathEvent {
    /// Schema version for forward compatibility.
    pub v: u8,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: PathEventType,
}

impl PathEvent {
    /// Wrap event data with the current timestamp.
    pub fn new(data: PathEventType) -> Self {
        Self {
            v: EVENT_SCHEMA_VERSION,
            ts: Utc::now(),
            data,
        }
    }
}

/// Event payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PathEventType {
    AttemptStarted {
        training_id: TrainingId,
        user_id: UserId,
        attempt_id: AttemptId,
    },
    AttemptRestarted {
        training_id: TrainingId,
        user_id: UserId,
        closed_attempt_id: Option<AttemptId>,
        attempt_id: AttemptId,
        module_attempts_closed: usize,
    },
    AttemptCompleted {
        training_id: TrainingId,
        user_id: UserId,
        attempt_id: AttemptId,
        status: AttemptStatus,
        score: u32,
    },
    GateBlocked {
        training_id: TrainingId,
        user_id: UserId,
        step_id: StepId,
        reason: String,
    },
    /// A learner waits on a grader; graders want to hear about it.
    ManualGradingPending {
        training_id: TrainingId,
        user_id: UserId,
        step_id: StepId,
    },
    StructuralDrift {
        training_id: TrainingId,
        user_id: UserId,
        attempt_id: AttemptId,
        differences: usize,
    },
    CompletionDiscarded {
        training_id: TrainingId,
        user_id: UserId,
        attempt_id: AttemptId,
    },
    SkillStageChanged {
        user_id: UserId,
        skill_id: SkillId,
        from_stage: u32,
        to_stage: u32,
    },
}

impl PathEventType {
    /// Get the event name as a string.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::AttemptStarted { .. } => "attempt_started",
            Self::AttemptRestarted { .. } => "attempt_restarted",
            Self::AttemptCompleted { .. } => "attempt_completed",
            Self::GateBlocked { .. } => "gate_blocked",
            Self::ManualGradingPending { .. } => "manual_grading_pending",
            Self::StructuralDrift { .. } => "structural_drift",
            Self::CompletionDiscarded { .. } => "completion_discarded",
            Self::SkillStageChanged { .. } => "skill_stage_changed",
        }
    }
}

/// Receives emitted events.
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    fn send(&self, event: &PathEvent) -> Result<()>;
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn send(&self, event: &PathEvent) -> Result<()> {
        (**self).send(event)
    }
}

/// Emit an event, logging and swallowing delivery failures.
pub fn emit(sink: &dyn EventSink, data: PathEventType) {
    let name = data.event_name();
    tracing::debug!(event = name, "emitting event");
    sink.send(&PathEvent::new(data))
        .fail_open_default("emitting event");
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: &PathEvent) -> Result<()> {
        Ok(())
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<PathEvent>>,
}

impl MemoryEventSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the collected events.
    pub fn events(&self) -> Vec<PathEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Names of the collected events, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.events()
            .iter()
            .map(|e| e.data.event_name())
            .collect()
    }
}

impl EventSink for MemoryEventSink {
    fn send(&self, event: &PathEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| PathgateError::invalid_state("event sink lock poisoned"))?
            .push(event.clone());
        Ok(())
    }
}

/// JSONL log writer.
#[derive(Debug, Clone)]
pub struct JsonlEventLog {
    path: PathBuf,
}

impl JsonlEventLog {
    /// Create a log writer for the given path.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all events from the log, skipping lines that do not parse.
    pub fn read_all(&self) -> Result<Vec<PathEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content =
            fs::read_to_string(&self.path).map_err(|e| PathgateError::storage(&self.path, e))?;

        let mut events = Vec::new();
        for (line_num, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<PathEvent>(line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!(
                        line = line_num + 1,
                        error = %e,
                        "skipping malformed event log line"
                    );
                }
            }
        }

        Ok(events)
    }
}

impl EventSink for JsonlEventLog {
    fn send(&self, event: &PathEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| PathgateError::storage(parent, e))?;
            }
        }

        let json = serde_json::to_string(event)
            .map_err(|e| PathgateError::serde(format!("Failed to serialize event: {}", e)))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| PathgateError::storage(&self.path, e))?;

        writeln!(file, "{}", json).map_err(|e| PathgateError::storage(&self.path, e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn started() -> PathEventType {
        PathEventType::AttemptStarted {
            training_id: 1,
            user_id: 2,
            attempt_id: 3,
        }
    }

    #[test]
    fn test_event_json_shape() {
        let event = PathEvent::new(started());
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["v"], 1);
        assert_eq!(json["event"], "attempt_started");
        assert_eq!(json["attempt_id"], 3);
    }

    #[test]
    fn test_jsonl_log_appends_lines() {
        let dir = TempDir::new().unwrap();
        let log = JsonlEventLog::new(dir.path().join("nested").join("events.log"));

        log.send(&PathEvent::new(started())).unwrap();
        log.send(&PathEvent::new(PathEventType::CompletionDiscarded {
            training_id: 1,
            user_id: 2,
            attempt_id: 3,
        }))
        .unwrap();

        let events = log.read_all().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].data.event_name(), "completion_discarded");
    }

    #[test]
    fn test_read_all_skips_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.log");
        let log = JsonlEventLog::new(&path);
        log.send(&PathEvent::new(started())).unwrap();

        let mut content = fs::read_to_string(&path).unwrap();
        content.push_str("not json\n\n");
        fs::write(&path, content).unwrap();

        assert_eq!(log.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_read_all_missing_file_is_empty() {
        let log = JsonlEventLog::new("/nonexistent/pathgate/events.log");
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_emit_swallows_sink_failure() {
        struct Failing;
        impl EventSink for Failing {
            fn send(&self, _event: &PathEvent) -> Result<()> {
                Err(PathgateError::config("down"))
            }
        }

        emit(&Failing, started());
    }

    #[test]
    fn test_memory_sink_collects_names() {
        let sink = MemoryEventSink::new();
        emit(&sink, started());
        assert_eq!(sink.names(), vec!["attempt_started"]);
    }
}
