use serde::Serialize;

/// Connection lifecycle of the event stream.
///
/// ```text
/// Disconnected ──open──▶ Connecting ──ok──▶ Streaming
///      ▲                     │                  │ drop / idle
///      │                     │ refused          ▼
///      ├─────────────────────┘             Reconnecting ──ok──▶ Streaming
///      └── retries exhausted / token expired / closed ──┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Disconnected,
    Connecting,
    Streaming,
    Reconnecting,
}

impl StreamState {
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

/// Why a stream task ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum CloseReason {
    /// `close()` or the cancellation token fired.
    Cancelled,
    /// The receiving side was dropped.
    ReceiverDropped,
    /// The server refused the token; refresh and reopen.
    TokenExpired,
    /// The very first connection failed.
    ConnectFailed { message: String },
    /// Reconnect attempts ran out.
    Terminated { attempts: u32 },
}

/// Final result of a stream task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamOutcome {
    pub reason: CloseReason,
    /// Cursor to pass to the next `open` so nothing is missed.
    pub last_event_id: Option<String>,
    pub events_delivered: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_snake_case() {
        assert_eq!(StreamState::Reconnecting.to_string(), "reconnecting");
        assert_eq!(
            serde_json::to_value(StreamState::Streaming).unwrap(),
            serde_json::json!("streaming")
        );
    }

    #[test]
    fn only_disconnected_is_not_live() {
        assert!(!StreamState::Disconnected.is_live());
        assert!(StreamState::Connecting.is_live());
        assert!(StreamState::Reconnecting.is_live());
    }
}
