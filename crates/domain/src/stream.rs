use serde::{Deserialize, Serialize};

/// Events delivered by the conversation event stream.
///
/// Data events carry the SSE event id (when the server sent one), the raw
/// event name, and the decoded JSON payload. `Error` events are synthesized
/// locally when the stream changes state because of a failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A conversation message (agent, bot, or echo of our own).
    #[serde(rename = "message")]
    Message {
        id: Option<String>,
        event: String,
        payload: serde_json::Value,
    },

    /// Typing started / stopped indicator.
    #[serde(rename = "typing")]
    Typing {
        id: Option<String>,
        event: String,
        started: bool,
        payload: serde_json::Value,
    },

    /// Routing, participant, acknowledgement, or close notifications.
    #[serde(rename = "conversation_status")]
    ConversationStatus {
        id: Option<String>,
        event: String,
        status: String,
        payload: serde_json::Value,
    },

    /// The stream failed; see `kind` for what the caller should do.
    #[serde(rename = "error")]
    Error {
        kind: StreamErrorKind,
        message: String,
    },
}

impl StreamEvent {
    /// Event id used for resumption, if the frame carried one.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Message { id, .. }
            | Self::Typing { id, .. }
            | Self::ConversationStatus { id, .. } => id.as_deref(),
            Self::Error { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn error_kind(&self) -> Option<StreamErrorKind> {
        match self {
            Self::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub(crate) fn error(kind: StreamErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn connect_failed(message: impl Into<String>) -> Self {
        Self::error(StreamErrorKind::ConnectFailed, message)
    }

    pub fn token_expired(message: impl Into<String>) -> Self {
        Self::error(StreamErrorKind::TokenExpired, message)
    }

    pub fn terminated(message: impl Into<String>) -> Self {
        Self::error(StreamErrorKind::StreamTerminated, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::error(StreamErrorKind::Transport, message)
    }
}

/// Why the stream produced a synthetic error event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamErrorKind {
    /// The initial connection was refused; the stream is disconnected.
    ConnectFailed,
    /// The bearer token is stale; refresh credentials and reopen.
    TokenExpired,
    /// Reconnect attempts exhausted; the stream is disconnected.
    StreamTerminated,
    /// A live connection dropped; a reconnect follows.
    Transport,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_with_type_tag() {
        let ev = StreamEvent::Typing {
            id: Some("7".into()),
            event: "CONVERSATION_TYPING_STARTED_INDICATOR".into(),
            started: true,
            payload: json!({}),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "typing");
        assert_eq!(v["started"], true);
        assert_eq!(v["id"], "7");
    }

    #[test]
    fn error_events_have_no_id() {
        let ev = StreamEvent::terminated("gave up");
        assert!(ev.is_error());
        assert!(ev.id().is_none());
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["kind"], "stream_terminated");
    }
}
