//! Frame → [`StreamEvent`] classification.
//!
//! The event name decides the variant. Payloads are parsed as JSON when
//! possible and otherwise kept as a JSON string, so nothing the server
//! sends is dropped.

use serde_json::Value;

use im_domain::StreamEvent;

use crate::sse::SseFrame;

const DEFAULT_EVENT: &str = "message";

/// Decode one frame. `None` for frames that carry no event (id-only,
/// retry-only, keep-alive pings).
pub fn decode_frame(frame: &SseFrame) -> Option<StreamEvent> {
    if frame.data.is_empty() && frame.event.is_none() {
        return None;
    }

    let event = frame.event.clone().unwrap_or_else(|| DEFAULT_EVENT.to_string());
    let name = event.to_ascii_uppercase();
    if matches!(name.as_str(), "PING" | "HEARTBEAT" | "KEEPALIVE") {
        tracing::trace!(event = %event, "keep-alive event");
        return None;
    }

    let id = frame.id.clone();
    let payload = decode_payload(&frame.data);

    let decoded = if name.contains("TYPING_STARTED") {
        StreamEvent::Typing {
            id,
            event,
            started: true,
            payload,
        }
    } else if name.contains("TYPING_STOPPED") {
        StreamEvent::Typing {
            id,
            event,
            started: false,
            payload,
        }
    } else if name == "MESSAGE" || name.ends_with("_MESSAGE") {
        StreamEvent::Message { id, event, payload }
    } else {
        let status = status_name(&name);
        StreamEvent::ConversationStatus {
            id,
            event,
            status,
            payload,
        }
    };
    Some(decoded)
}

fn decode_payload(data: &str) -> Value {
    if data.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(data).unwrap_or_else(|_| Value::String(data.to_string()))
}

/// `CONVERSATION_ROUTING_RESULT` → `routing_result`.
fn status_name(upper: &str) -> String {
    upper
        .strip_prefix("CONVERSATION_")
        .unwrap_or(upper)
        .to_ascii_lowercase()
}
