// crates/core/src/channel/decode.rs
//! Turn SSE frames into job events.

use jobtrack_types::JobEvent;
use serde_json::{Map, Value};

use super::sse::SseFrame;
use super::ChannelEvent;
use crate::error::ProtocolError;

/// Decode one frame.
///
/// - `Ok(Some(_))`: a job event or a keepalive
/// - `Ok(None)`: a frame type this client does not track
/// - `Err(_)`: a malformed frame; the caller drops and logs it
pub fn decode_frame(frame: &SseFrame) -> Result<Option<ChannelEvent>, ProtocolError> {
    let name = frame.event.as_deref().unwrap_or("message");
    let event = match name {
        "hello" => {
            let fields = object(name, &frame.data)?;
            JobEvent::Hello {
                status: string_field(&fields, "status"),
                message: string_field(&fields, "message"),
            }
        }
        "status" => {
            let fields = object(name, &frame.data)?;
            JobEvent::Status {
                status: string_field(&fields, "status"),
                message: string_field(&fields, "message"),
                error: error_field(&fields),
            }
        }
        "log" => JobEvent::Log {
            line: log_line(&frame.data)?,
        },
        // A `done` is honoured even when its body is unreadable: it still
        // ends the job, and the reducer resolves the missing status.
        "done" => {
            let status = match object(name, &frame.data) {
                Ok(fields) => string_field(&fields, "status"),
                Err(e) => {
                    tracing::warn!(error = %e, "done event with unreadable payload");
                    None
                }
            };
            JobEvent::Done { status }
        }
        "ping" => return Ok(Some(ChannelEvent::Keepalive)),
        _ => return Ok(None),
    };
    Ok(Some(ChannelEvent::Job(event)))
}

fn object(event: &str, data: &str) -> Result<Map<String, Value>, ProtocolError> {
    let value: Value =
        serde_json::from_str(data).map_err(|e| ProtocolError::MalformedPayload {
            event: event.to_string(),
            message: e.to_string(),
        })?;
    match value {
        Value::Object(fields) => Ok(fields),
        _ => Err(ProtocolError::NotAnObject {
            event: event.to_string(),
        }),
    }
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

/// `error` may be a string, null, or any other JSON value the executor
/// chose to attach. Null and empty strings mean "no error".
fn error_field(fields: &Map<String, Value>) -> Option<String> {
    match fields.get("error") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// Log data is a JSON string, but raw text is accepted too.
fn log_line(data: &str) -> Result<String, ProtocolError> {
    let line = match serde_json::from_str::<Value>(data) {
        Ok(Value::String(s)) => s,
        Ok(Value::Null) => String::new(),
        Ok(other) => other.to_string(),
        Err(_) => data.to_string(),
    };
    let line = line.trim();
    if line.is_empty() {
        return Err(ProtocolError::EmptyLog);
    }
    Ok(line.to_string())
}
