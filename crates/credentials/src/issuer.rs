//! Token issuance: build → exchange → store.
//!
//! A rejected-as-expired assertion is rebuilt with a fresh timestamp and
//! retried once. Concurrent refreshes collapse into a single exchange.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use im_domain::config::Config;
use im_domain::error::{Error, Result};
use im_domain::AccessToken;

use crate::assertion::AssertionBuilder;
use crate::exchange::{HttpTokenExchange, TokenExchange};
use crate::keys::{load_signing_key, SigningKey};
use crate::session::{SessionState, TokenLookup};

/// Retries after a `TokenExpired` rejection.
pub const MAX_EXPIRED_RETRIES: u32 = 1;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct TokenIssuer {
    key: SigningKey,
    builder: AssertionBuilder,
    exchange: Arc<dyn TokenExchange>,
    session: Arc<SessionState>,
    clock: Clock,
}

impl TokenIssuer {
    pub fn new(
        key: SigningKey,
        builder: AssertionBuilder,
        exchange: Arc<dyn TokenExchange>,
        session: Arc<SessionState>,
    ) -> Self {
        Self {
            key,
            builder,
            exchange,
            session,
            clock: Arc::new(Utc::now),
        }
    }

    /// Load the key and wire the HTTP exchange from config. Key errors
    /// surface here, before any network traffic.
    pub fn from_config(config: &Config, session: Arc<SessionState>) -> Result<Self> {
        let creds = &config.credentials;
        let key = load_signing_key(&creds.key_path, creds.key_format, creds.kid.as_deref())?;
        let builder = AssertionBuilder::from_config(config, key.kid());
        let exchange = Arc::new(HttpTokenExchange::from_config(config)?);
        Ok(Self::new(key, builder, exchange, session))
    }

    /// Replace the wall clock used for assertion timestamps.
    pub fn with_clock(
        mut self,
        clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static,
    ) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn key(&self) -> &SigningKey {
        &self.key
    }

    pub fn builder(&self) -> &AssertionBuilder {
        &self.builder
    }

    /// Cached token if still valid, otherwise a refresh.
    pub async fn valid_token(&self) -> Result<AccessToken> {
        if let TokenLookup::Valid(token) = self.session.get_valid_token((self.clock)()) {
            return Ok(token);
        }
        self.refresh_if_stale().await
    }

    /// Force a new token. Callers that were queued behind an in-flight
    /// refresh receive its result instead of exchanging again.
    pub async fn refresh(&self) -> Result<AccessToken> {
        let seen = self.session.token_generation();
        let _guard = self.session.refresh_lock().await;
        if self.session.token_generation() != seen {
            if let Some(token) = self.session.current_token() {
                tracing::debug!("refresh satisfied by a concurrent exchange");
                return Ok(token);
            }
        }
        self.issue_locked().await
    }

    /// Sign and exchange a new assertion, ignoring the cache. Still
    /// serialized with other refreshes.
    pub async fn issue(&self) -> Result<AccessToken> {
        let _guard = self.session.refresh_lock().await;
        self.issue_locked().await
    }

    /// Guest token through the same exchange, stored as the session token.
    pub async fn issue_unauthenticated(&self) -> Result<AccessToken> {
        issue_unauthenticated(self.exchange.as_ref(), &self.session).await
    }

    async fn refresh_if_stale(&self) -> Result<AccessToken> {
        let _guard = self.session.refresh_lock().await;
        if let TokenLookup::Valid(token) = self.session.get_valid_token((self.clock)()) {
            tracing::debug!("refresh satisfied by a concurrent exchange");
            return Ok(token);
        }
        self.issue_locked().await
    }

    /// Caller holds the refresh lock.
    async fn issue_locked(&self) -> Result<AccessToken> {
        let mut retries = 0;
        loop {
            let assertion = self.builder.build(&self.key, (self.clock)())?;
            match self.exchange.exchange(&assertion).await {
                Ok(token) => {
                    self.session.store_token(token.clone());
                    return Ok(token);
                }
                Err(Error::TokenExpired(reason)) if retries < MAX_EXPIRED_RETRIES => {
                    retries += 1;
                    tracing::warn!(
                        %reason,
                        iat = assertion.claims().iat,
                        "assertion rejected as expired; retrying with a fresh timestamp"
                    );
                }
                Err(e) => {
                    match &e {
                        Error::KeyMismatch(_) => tracing::error!(
                            error = %e,
                            kid = %self.key.kid(),
                            "assertion signature rejected; check the registered public key and kid"
                        ),
                        _ => tracing::warn!(error = %e, "token exchange failed"),
                    }
                    return Err(e);
                }
            }
        }
    }
}

/// Obtain a guest token and make it the session's current token.
///
/// Needs no signing key, so the guest flow works without
/// `[credentials]`. Serialized with assertion-based refreshes.
pub async fn issue_unauthenticated(
    exchange: &dyn TokenExchange,
    session: &SessionState,
) -> Result<AccessToken> {
    let _guard = session.refresh_lock().await;
    let token = exchange.exchange_unauthenticated().await?;
    session.store_token(token.clone());
    tracing::debug!(last_event_id = ?token.last_event_id, "guest token stored in session");
    Ok(token)
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("key", &self.key)
            .field("builder", &self.builder)
            .field("session", &self.session)
            .finish()
    }
}
