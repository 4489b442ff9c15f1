use serde_json::{Map, Value, json};

use crate::core::error::DocpackError;
use crate::core::job::{Failure, RelayEvent, StatusOrigin, StatusUpdate};

/// One Server-Sent Events frame: an event name and a single-line JSON payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: &'static str,
    pub data: String,
}

impl SseFrame {
    /// `event: <type>\ndata: <json>\n\n`
    pub fn to_wire(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event, self.data)
    }
}

pub fn encode(event: &RelayEvent) -> SseFrame {
    let (name, payload) = match event {
        RelayEvent::Status(update) => (frame_name(update), status_payload(update)),
        RelayEvent::Log(line) => ("log", json!({ "message": line })),
        RelayEvent::DataChunk(chunk) => ("data", json!({ "chunk": chunk })),
        RelayEvent::Complete => (
            "complete",
            json!({
                "status": "completed",
                "message": "Docpack generation completed successfully"
            }),
        ),
        RelayEvent::Error(failure) => (
            "error",
            json!({ "error": failure.reason, "message": failure.detail }),
        ),
    };
    SseFrame {
        event: name,
        data: payload.to_string(),
    }
}

fn frame_name(update: &StatusUpdate) -> &'static str {
    match update.origin {
        StatusOrigin::Queue => "status",
        StatusOrigin::Item => "progress",
    }
}

fn status_payload(update: &StatusUpdate) -> Value {
    let mut payload = Map::new();
    payload.insert("status".to_string(), Value::String(update.state.clone()));
    if let Some(progress) = update.progress {
        payload.insert("progress".to_string(), json!(progress));
    }
    if let Some(message) = &update.message {
        payload.insert("message".to_string(), Value::String(message.clone()));
    }
    Value::Object(payload)
}

/// Turns a received frame back into an event. Unknown event names yield `None`.
pub fn decode(event: &str, data: &str) -> Result<Option<RelayEvent>, DocpackError> {
    let payload: Value = if data.trim().is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_str(data)?
    };
    let text = |key: &str| payload.get(key).and_then(Value::as_str).map(str::to_string);

    let decoded = match event {
        "status" | "progress" => RelayEvent::Status(StatusUpdate {
            origin: if event == "status" {
                StatusOrigin::Queue
            } else {
                StatusOrigin::Item
            },
            state: text("status").unwrap_or_else(|| "processing".to_string()),
            progress: payload.get("progress").and_then(Value::as_f64),
            message: text("message"),
        }),
        "log" => RelayEvent::Log(text("message").unwrap_or_default()),
        "data" => RelayEvent::DataChunk(match payload.get("chunk") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }),
        "complete" => RelayEvent::Complete,
        "error" => RelayEvent::Error(Failure {
            reason: text("error").unwrap_or_else(|| "Unknown streaming error".to_string()),
            detail: text("message").unwrap_or_default(),
        }),
        _ => return Ok(None),
    };
    Ok(Some(decoded))
}

/// Incremental parser for the `event:`/`data:` text framing, fed one line at a time.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    event: Option<String>,
    data: Vec<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a decoded event when `line` terminates a frame.
    pub fn push_line(&mut self, line: &str) -> Result<Option<RelayEvent>, DocpackError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return Ok(None);
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        Ok(None)
    }

    fn dispatch(&mut self) -> Result<Option<RelayEvent>, DocpackError> {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data);
        if event.is_none() && data.is_empty() {
            return Ok(None);
        }
        // Frames without an explicit name are "message" per the SSE framing rules.
        decode(event.as_deref().unwrap_or("message"), &data.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_status_uses_status_frame() {
        let frame = encode(&RelayEvent::Status(StatusUpdate::queued()));
        assert_eq!(frame.event, "status");
        assert_eq!(
            frame.to_wire(),
            "event: status\ndata: {\"message\":\"Job is waiting in queue...\",\"status\":\"queued\"}\n\n"
        );
    }

    #[test]
    fn item_status_uses_progress_frame() {
        let frame = encode(&RelayEvent::Status(StatusUpdate {
            origin: StatusOrigin::Item,
            state: "analyzing".to_string(),
            progress: Some(55.0),
            message: None,
        }));
        assert_eq!(frame.event, "progress");
        let payload: Value = serde_json::from_str(&frame.data).unwrap();
        assert_eq!(payload["status"], "analyzing");
        assert_eq!(payload["progress"], 55.0);
        assert!(payload.get("message").is_none());
    }

    #[test]
    fn error_frame_carries_reason_and_detail() {
        let frame = encode(&RelayEvent::failure(&DocpackError::PollingTimeout));
        assert_eq!(frame.event, "error");
        let payload: Value = serde_json::from_str(&frame.data).unwrap();
        assert_eq!(payload["error"], "Polling timeout");
        assert_eq!(
            payload["message"],
            "Job status polling timed out after 10 minutes"
        );
    }

    #[test]
    fn payloads_are_single_line() {
        let frame = encode(&RelayEvent::Log("line one\nline two".to_string()));
        assert!(!frame.data.contains('\n'));
    }

    #[test]
    fn decoder_reassembles_frames_from_lines() {
        let wire = [
            encode(&RelayEvent::Log("cloning".to_string())).to_wire(),
            ": keep-alive\n\n".to_string(),
            encode(&RelayEvent::DataChunk("X".to_string())).to_wire(),
            encode(&RelayEvent::Complete).to_wire(),
        ]
        .concat();

        let mut decoder = FrameDecoder::new();
        let mut events = Vec::new();
        for line in wire.split_inclusive('\n') {
            if let Some(event) = decoder.push_line(line).unwrap() {
                events.push(event);
            }
        }
        assert_eq!(
            events,
            vec![
                RelayEvent::Log("cloning".to_string()),
                RelayEvent::DataChunk("X".to_string()),
                RelayEvent::Complete,
            ]
        );
    }

    #[test]
    fn decode_ignores_unknown_event_names() {
        assert!(decode("heartbeat", "{}").unwrap().is_none());
        assert!(decode("log", "not json").is_err());
    }
}
