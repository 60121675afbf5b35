//! Where and how to connect for a conversation's event stream.

use serde::Serialize;

use im_credentials::SessionState;
use im_domain::config::Config;
use im_domain::error::{Error, Result};

/// Resolved connection parameters. The bearer token is supplied at open
/// time and never stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamTarget {
    pub url: String,
    pub org_id: String,
    pub query: Vec<(String, String)>,
}

impl StreamTarget {
    /// Build the target from config and the current session.
    ///
    /// Requires a token and a conversation in the session. The channel
    /// address defaults to the lowercased conversation id.
    pub fn resolve(config: &Config, session: &SessionState) -> Result<Self> {
        if session.current_token().is_none() {
            return Err(Error::NoAccessToken);
        }
        let conversation = session.get_conversation().ok_or(Error::NoConversation)?;
        let conversation_id = conversation.wire();
        let channel_address = session
            .channel_address()
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| conversation_id.clone());

        let stream = &config.stream;
        Ok(Self {
            url: config.service.url(&stream.path),
            org_id: config.service.org_id.clone(),
            query: vec![
                ("channelType".into(), stream.channel_type.clone()),
                ("channelAddressIdentifier".into(), channel_address),
                ("conversationId".into(), conversation_id),
                ("channelPlatformKey".into(), stream.channel_platform_key.clone()),
            ],
        })
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use im_domain::{AccessToken, ConversationId};

    fn config() -> Config {
        let mut cfg = Config::default();
        cfg.service.base_url = "https://scrt.example.com/".into();
        cfg.service.org_id = "00D000000000001".into();
        cfg
    }

    fn with_token(session: &SessionState) {
        session.store_token(AccessToken {
            token: "t".into(),
            last_event_id: None,
            expires_at: Utc::now() + chrono::Duration::hours(1),
        });
    }

    #[test]
    fn requires_token_then_conversation() {
        let session = SessionState::new(30);
        assert!(matches!(
            StreamTarget::resolve(&config(), &session),
            Err(Error::NoAccessToken)
        ));
        with_token(&session);
        assert!(matches!(
            StreamTarget::resolve(&config(), &session),
            Err(Error::NoConversation)
        ));
    }

    #[test]
    fn channel_address_defaults_to_lowercase_conversation() {
        let session = SessionState::new(30);
        with_token(&session);
        session.set_conversation(ConversationId::new("ABC-123"));

        let target = StreamTarget::resolve(&config(), &session).unwrap();
        assert_eq!(target.url, "https://scrt.example.com/eventrouter/v1/sse");
        assert_eq!(target.query_value("conversationId"), Some("abc-123"));
        assert_eq!(target.query_value("channelAddressIdentifier"), Some("abc-123"));
        assert_eq!(target.query_value("channelType"), Some("embedded_messaging"));
        assert_eq!(target.org_id, "00D000000000001");
    }

    #[test]
    fn stored_channel_address_wins() {
        let session = SessionState::new(30);
        with_token(&session);
        session.set_conversation(ConversationId::new("abc"));
        session.set_channel_address("addr-9");
        let target = StreamTarget::resolve(&config(), &session).unwrap();
        assert_eq!(target.query_value("channelAddressIdentifier"), Some("addr-9"));
    }
}
