use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};

use crate::summary::now_utc_iso;

pub type EventPayload = Map<String, Value>;

/// The try-on session's activity log, `events.jsonl`.
///
/// Every line is one compact object tagged with `type`, `session_id` and
/// `ts`; payload keys are written after those and win on collision.
/// Video polling and the loading-message timers log from worker threads
/// through clones, which share one append lock so lines never interleave.
#[derive(Debug, Clone)]
pub struct EventWriter {
    shared: Arc<SessionLog>,
}

#[derive(Debug)]
struct SessionLog {
    path: PathBuf,
    session_id: String,
    append: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(SessionLog {
                path: path.into(),
                session_id: session_id.into(),
                append: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.shared.session_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        event.extend(payload);

        if let Some(parent) = self.shared.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        let _append = self
            .shared
            .append
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.shared.path)?
            .write_all(line.as_bytes())?;
        Ok(Value::Object(event))
    }

    /// Like `emit`, for payloads built with `json!`. A non-object value is
    /// logged under `value`.
    pub fn emit_json(&self, event_type: &str, payload: Value) -> anyhow::Result<Value> {
        let payload = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => Map::from_iter([("value".to_string(), other)]),
        };
        self.emit(event_type, payload)
    }

    /// Every readable event in file order. Unparseable lines are skipped.
    pub fn read_events(&self) -> Vec<EventPayload> {
        let Ok(raw) = std::fs::read_to_string(&self.shared.path) else {
            return Vec::new();
        };
        raw.lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| match row {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.read_events()
            .iter()
            .filter_map(|event| event.get("type").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use chrono::DateTime;
    use serde_json::{json, Value};

    use super::EventWriter;

    #[test]
    fn garment_event_is_tagged_with_session() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "session-abc");

        let emitted = writer.emit_json(
            "garment_applied",
            json!({ "garment_id": "tech-jacket", "layer_index": 1 }),
        )?;

        let events = writer.read_events();
        assert_eq!(events.len(), 1);
        assert_eq!(Value::Object(events[0].clone()), emitted);
        assert_eq!(events[0]["type"], "garment_applied");
        assert_eq!(events[0]["session_id"], "session-abc");
        assert_eq!(events[0]["layer_index"], 1);
        DateTime::parse_from_rfc3339(events[0]["ts"].as_str().unwrap_or_default())?;
        Ok(())
    }

    #[test]
    fn payload_keys_win_and_scalars_are_wrapped() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("logs").join("events.jsonl"), "s1");

        let overridden = writer.emit_json("session_started", json!({ "session_id": "s2" }))?;
        assert_eq!(overridden["session_id"], "s2");

        let scalar = writer.emit_json("video_job_polled", json!(3))?;
        assert_eq!(scalar["value"], 3);

        writer.emit_json("background_removed", Value::Null)?;
        assert_eq!(
            writer.event_types(),
            vec!["session_started", "video_job_polled", "background_removed"]
        );
        Ok(())
    }

    #[test]
    fn worker_thread_clones_write_whole_lines() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "session-threads");

        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let writer = writer.clone();
                thread::spawn(move || {
                    for poll in 0..25 {
                        let _ = writer.emit_json(
                            "video_job_polled",
                            json!({ "worker": worker, "polls": poll }),
                        );
                    }
                })
            })
            .collect();
        for worker in workers {
            worker
                .join()
                .unwrap_or_else(|_| panic!("logging thread panicked"));
        }

        let raw = std::fs::read_to_string(writer.path())?;
        assert_eq!(raw.lines().count(), 100);
        assert_eq!(writer.read_events().len(), 100);
        Ok(())
    }
}
