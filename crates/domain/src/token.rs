use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Access token
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Bearer token issued by the messaging service.
///
/// `Debug` is manually implemented to redact the bearer string.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    /// Event cursor handed out with the token; the first stream connection
    /// resumes from here.
    #[serde(default)]
    pub last_event_id: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("last_event_id", &self.last_event_id)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessToken {
    /// Whether the token may still be used at `now`, keeping
    /// `safety_margin_secs` in reserve so it cannot expire mid-request.
    pub fn is_valid_at(&self, now: DateTime<Utc>, safety_margin_secs: u64) -> bool {
        now < self.expires_at - Duration::seconds(safety_margin_secs as i64)
    }

    /// Whether the token is past its real expiry (no margin).
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Abbreviated form for logs and CLI output.
    pub fn preview(&self) -> String {
        let head: String = self.token.chars().take(12).collect();
        format!("{head}…")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation identity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Client-generated conversation identifier (UUID v4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The service only accepts lowercase ids in URLs.
    pub fn wire(&self) -> String {
        self.0.to_lowercase()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-only snapshot of the session, as reported by the status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub has_access_token: bool,
    pub has_conversation: bool,
    pub conversation_id: Option<String>,
}
