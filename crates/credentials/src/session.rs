//! Session state: the current access token and conversation.
//!
//! One `SessionState` per logical client, shared via `Arc`. Reads and
//! writes go through a `parking_lot::RwLock` so readers never observe a
//! half-written token. The async refresh lock is separate and only
//! serializes token refreshes.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use im_domain::config::SessionConfig;
use im_domain::{AccessToken, ConversationId, SessionStatus};

/// Result of a token lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenLookup {
    Valid(AccessToken),
    /// No token, or the cached one is inside the safety margin.
    NeedsRefresh,
}

#[derive(Debug, Default)]
struct Inner {
    token: Option<AccessToken>,
    /// Bumped on every `store_token`; lets a waiting refresher notice that
    /// someone else already refreshed.
    generation: u64,
    conversation: Option<ConversationId>,
    channel_address: Option<String>,
}

pub struct SessionState {
    inner: RwLock<Inner>,
    refresh: tokio::sync::Mutex<()>,
    safety_margin_secs: u64,
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("status", &self.status())
            .field("safety_margin_secs", &self.safety_margin_secs)
            .finish()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

impl SessionState {
    pub fn new(safety_margin_secs: u64) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            refresh: tokio::sync::Mutex::new(()),
            safety_margin_secs,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.safety_margin_secs)
    }

    pub fn safety_margin_secs(&self) -> u64 {
        self.safety_margin_secs
    }

    // ── Token ───────────────────────────────────────────────────────

    /// The cached token if it is still usable at `now`.
    pub fn get_valid_token(&self, now: DateTime<Utc>) -> TokenLookup {
        match &self.inner.read().token {
            Some(t) if t.is_valid_at(now, self.safety_margin_secs) => TokenLookup::Valid(t.clone()),
            _ => TokenLookup::NeedsRefresh,
        }
    }

    /// The cached token regardless of expiry.
    pub fn current_token(&self) -> Option<AccessToken> {
        self.inner.read().token.clone()
    }

    pub fn store_token(&self, token: AccessToken) {
        let mut inner = self.inner.write();
        inner.generation = inner.generation.wrapping_add(1);
        tracing::debug!(
            generation = inner.generation,
            expires_at = %token.expires_at,
            "session token stored"
        );
        inner.token = Some(token);
    }

    /// Drop the cached token so the next lookup refreshes.
    pub fn invalidate_token(&self) {
        self.inner.write().token = None;
    }

    pub(crate) fn token_generation(&self) -> u64 {
        self.inner.read().generation
    }

    pub(crate) async fn refresh_lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.refresh.lock().await
    }

    // ── Event cursor ────────────────────────────────────────────────

    pub fn last_event_id(&self) -> Option<String> {
        self.inner.read().token.as_ref().and_then(|t| t.last_event_id.clone())
    }

    /// Advance the resume cursor carried with the token.
    pub fn record_event_id(&self, id: &str) {
        if let Some(token) = self.inner.write().token.as_mut() {
            token.last_event_id = Some(id.to_string());
        }
    }

    // ── Conversation ────────────────────────────────────────────────

    /// Replaces any previous conversation; the channel address belongs to
    /// the old one and is cleared.
    pub fn set_conversation(&self, id: ConversationId) {
        let mut inner = self.inner.write();
        inner.conversation = Some(id);
        inner.channel_address = None;
    }

    pub fn get_conversation(&self) -> Option<ConversationId> {
        self.inner.read().conversation.clone()
    }

    pub fn set_channel_address(&self, address: impl Into<String>) {
        self.inner.write().channel_address = Some(address.into());
    }

    pub fn channel_address(&self) -> Option<String> {
        self.inner.read().channel_address.clone()
    }

    pub fn clear_conversation(&self) {
        let mut inner = self.inner.write();
        inner.conversation = None;
        inner.channel_address = None;
    }

    /// Forget everything: token and conversation.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.token = None;
        inner.conversation = None;
        inner.channel_address = None;
    }

    pub fn status(&self) -> SessionStatus {
        let inner = self.inner.read();
        SessionStatus {
            has_access_token: inner.token.is_some(),
            has_conversation: inner.conversation.is_some(),
            conversation_id: inner.conversation.as_ref().map(|c| c.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token(expires_in: i64) -> AccessToken {
        AccessToken {
            token: "tok".into(),
            last_event_id: Some("0".into()),
            expires_at: Utc::now() + Duration::seconds(expires_in),
        }
    }

    #[test]
    fn empty_session_needs_refresh() {
        let s = SessionState::new(30);
        assert_eq!(s.get_valid_token(Utc::now()), TokenLookup::NeedsRefresh);
    }

    #[test]
    fn fresh_token_is_returned() {
        let s = SessionState::new(30);
        let t = token(3600);
        s.store_token(t.clone());
        assert_eq!(s.get_valid_token(Utc::now()), TokenLookup::Valid(t));
    }

    #[test]
    fn token_inside_margin_needs_refresh() {
        let s = SessionState::new(30);
        s.store_token(token(20));
        assert_eq!(s.get_valid_token(Utc::now()), TokenLookup::NeedsRefresh);
        // still held for inspection
        assert!(s.current_token().is_some());
    }

    #[test]
    fn store_bumps_generation() {
        let s = SessionState::new(30);
        let g0 = s.token_generation();
        s.store_token(token(3600));
        assert_eq!(s.token_generation(), g0 + 1);
    }

    #[test]
    fn event_cursor_follows_token() {
        let s = SessionState::new(30);
        s.record_event_id("5");
        assert_eq!(s.last_event_id(), None);
        s.store_token(token(3600));
        assert_eq!(s.last_event_id().as_deref(), Some("0"));
        s.record_event_id("5");
        assert_eq!(s.last_event_id().as_deref(), Some("5"));
    }

    #[test]
    fn new_conversation_clears_channel_address() {
        let s = SessionState::new(30);
        s.set_conversation(ConversationId::new("a"));
        s.set_channel_address("addr-a");
        s.set_conversation(ConversationId::new("b"));
        assert_eq!(s.channel_address(), None);
        assert_eq!(s.get_conversation().unwrap().as_str(), "b");
    }

    #[test]
    fn status_and_reset() {
        let s = SessionState::new(30);
        s.store_token(token(3600));
        s.set_conversation(ConversationId::new("conv-1"));
        let st = s.status();
        assert!(st.has_access_token);
        assert!(st.has_conversation);
        assert_eq!(st.conversation_id.as_deref(), Some("conv-1"));

        s.clear_conversation();
        assert!(!s.status().has_conversation);
        assert!(s.status().has_access_token);

        s.reset();
        assert_eq!(
            s.status(),
            SessionStatus {
                has_access_token: false,
                has_conversation: false,
                conversation_id: None,
            }
        );
    }
}
