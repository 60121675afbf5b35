//! Assertion → access token exchange.
//!
//! Two request styles are supported:
//! - `oauth_form`: RFC 7523 form post (`grant_type=…jwt-bearer&assertion=…`).
//! - `messaging_json`: the messaging service's JSON authorization body with
//!   the assertion as `customerIdentityToken`.
//!
//! The guest flow and the OAuth client-credentials grant share the same
//! response handling.
//!
//! Failures are classified so the issuer can tell a stale assertion (worth
//! one retry) from a key mismatch (never retried).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use im_domain::config::{ClientCredentialsConfig, Config, ExchangeStyle, ServiceConfig};
use im_domain::error::{Error, Result};
use im_domain::AccessToken;

use crate::assertion::JwtAssertion;
use crate::util::{decode_unverified_claims, from_reqwest, truncate_body};

pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
pub const CLIENT_CREDENTIALS_GRANT: &str = "client_credentials";
pub const AUTHENTICATED_TOKEN_PATH: &str =
    "/iamessage/api/v2/authorization/authenticated/access-token";
pub const UNAUTHENTICATED_TOKEN_PATH: &str =
    "/iamessage/api/v2/authorization/unauthenticated/access-token";
pub const OAUTH_TOKEN_PATH: &str = "/services/oauth2/token";

/// Upper bound on a server-provided `expires_in`.
const MAX_LIFETIME_SECS: u64 = 86_400 * 365;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait seam
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trades a signed assertion for an access token.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self, assertion: &JwtAssertion) -> Result<AccessToken>;

    /// Guest token, no assertion involved.
    async fn exchange_unauthenticated(&self) -> Result<AccessToken> {
        Err(Error::Config("this token exchange has no unauthenticated flow".into()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct HttpTokenExchange {
    http: reqwest::Client,
    style: ExchangeStyle,
    token_url: String,
    unauthenticated_url: String,
    service: ServiceConfig,
    default_lifetime_secs: u64,
    client_credentials: Option<(String, ClientCredentialsConfig)>,
}

impl HttpTokenExchange {
    pub fn from_config(config: &Config) -> Result<Self> {
        let ex = &config.exchange;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(ex.request_timeout_ms))
            .connect_timeout(Duration::from_millis(ex.connect_timeout_ms))
            .build()
            .map_err(from_reqwest)?;

        let token_url = ex
            .token_url
            .clone()
            .unwrap_or_else(|| config.service.url(AUTHENTICATED_TOKEN_PATH));
        let unauthenticated_url = ex
            .unauthenticated_url
            .clone()
            .unwrap_or_else(|| config.service.url(UNAUTHENTICATED_TOKEN_PATH));
        let client_credentials = ex.client_credentials.clone().map(|cc| {
            let url = cc
                .token_url
                .clone()
                .unwrap_or_else(|| config.service.url(OAUTH_TOKEN_PATH));
            (url, cc)
        });

        Ok(Self {
            http,
            style: ex.style,
            token_url,
            unauthenticated_url,
            service: config.service.clone(),
            default_lifetime_secs: ex.default_token_lifetime_secs,
            client_credentials,
        })
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// OAuth client-credentials grant with the `[exchange.client_credentials]`
    /// id and secret. The token is returned, not cached: it authorizes the
    /// platform API, not the messaging session.
    pub async fn exchange_client_credentials(&self) -> Result<AccessToken> {
        let (url, cc) = self.client_credentials.as_ref().ok_or_else(|| {
            Error::Config("exchange.client_credentials is not configured".into())
        })?;
        let secret = resolve_client_secret(cc)?;

        tracing::debug!(
            url = %url,
            client_id = %cc.client_id,
            "requesting client-credentials token"
        );
        let resp = self
            .http
            .post(url)
            .form(&[
                ("grant_type", CLIENT_CREDENTIALS_GRANT),
                ("client_id", cc.client_id.as_str()),
                ("client_secret", secret.as_str()),
            ])
            .send()
            .await
            .map_err(from_reqwest)?;
        self.read_response(resp).await
    }

    fn messaging_body(&self, assertion: Option<&JwtAssertion>) -> Value {
        let s = &self.service;
        let mut body = json!({
            "orgId": s.org_id,
            "esDeveloperName": s.es_developer_name,
            "capabilitiesVersion": s.capabilities_version,
            "platform": s.platform,
            "context": {
                "appName": s.app_name,
                "clientVersion": s.client_version,
            },
        });
        if let (Some(assertion), Some(obj)) = (assertion, body.as_object_mut()) {
            obj.insert("authorizationType".into(), json!("JWT"));
            obj.insert("customerIdentityToken".into(), json!(assertion.as_str()));
        }
        body
    }

    async fn read_response(&self, resp: reqwest::Response) -> Result<AccessToken> {
        let status = resp.status();
        let text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            let err = classify_failure(status, &text);
            tracing::warn!(status = status.as_u16(), error = %err, "token exchange rejected");
            return Err(err);
        }

        let parsed: TokenResponse = serde_json::from_str(&text).map_err(|e| Error::Remote {
            status: status.as_u16(),
            message: format!("malformed token response: {e}"),
        })?;
        let token = parsed.into_access_token(Utc::now(), self.default_lifetime_secs)?;

        tracing::info!(
            token = %token.preview(),
            expires_at = %token.expires_at,
            last_event_id = ?token.last_event_id,
            "access token issued"
        );
        Ok(token)
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange(&self, assertion: &JwtAssertion) -> Result<AccessToken> {
        tracing::debug!(
            url = %self.token_url,
            style = ?self.style,
            kid = %assertion.kid(),
            "exchanging assertion"
        );

        let request = match self.style {
            ExchangeStyle::OauthForm => self.http.post(&self.token_url).form(&[
                ("grant_type", JWT_BEARER_GRANT),
                ("assertion", assertion.as_str()),
            ]),
            ExchangeStyle::MessagingJson => self
                .http
                .post(&self.token_url)
                .json(&self.messaging_body(Some(assertion))),
        };

        let resp = request.send().await.map_err(from_reqwest)?;
        self.read_response(resp).await
    }

    async fn exchange_unauthenticated(&self) -> Result<AccessToken> {
        let body = self.messaging_body(None);
        tracing::debug!(url = %self.unauthenticated_url, "requesting unauthenticated access token");
        let resp = self
            .http
            .post(&self.unauthenticated_url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;
        self.read_response(resp).await
    }
}

/// Direct `client_secret` first (with a warning), then `client_secret_env`.
fn resolve_client_secret(cc: &ClientCredentialsConfig) -> Result<String> {
    if let Some(secret) = &cc.client_secret {
        tracing::warn!("client secret loaded from plaintext config; prefer client_secret_env");
        return Ok(secret.clone());
    }
    match &cc.client_secret_env {
        Some(var) => std::env::var(var).map_err(|_| {
            Error::Config(format!("environment variable '{var}' not set or not valid UTF-8"))
        }),
        None => Err(Error::Config(
            "no client secret configured: set exchange.client_credentials.client_secret_env".into(),
        )),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(rename = "accessToken", alias = "access_token")]
    access_token: String,
    #[serde(default, rename = "lastEventId", alias = "last_event_id")]
    last_event_id: Option<Value>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    exp: Option<i64>,
}

impl TokenResponse {
    /// Expiry: `expires_in`, then the token's own `exp` claim, then the
    /// configured default lifetime.
    fn into_access_token(
        self,
        now: DateTime<Utc>,
        default_lifetime_secs: u64,
    ) -> Result<AccessToken> {
        if self.access_token.trim().is_empty() {
            return Err(Error::Remote {
                status: 200,
                message: "token response carried an empty access token".into(),
            });
        }

        let expires_at = match self.expires_in {
            Some(secs) => now + chrono::Duration::seconds(secs.min(MAX_LIFETIME_SECS) as i64),
            None => decode_unverified_claims::<TokenClaims>(&self.access_token)
                .and_then(|c| c.exp)
                .and_then(|exp| DateTime::<Utc>::from_timestamp(exp, 0))
                .unwrap_or_else(|| now + chrono::Duration::seconds(default_lifetime_secs as i64)),
        };

        let last_event_id = match self.last_event_id {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        Ok(AccessToken {
            token: self.access_token,
            last_event_id,
            expires_at,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default, alias = "code", alias = "errorCode")]
    error: Option<String>,
    #[serde(default, alias = "message")]
    error_description: Option<String>,
}

/// Map a non-2xx exchange response onto the error taxonomy.
pub(crate) fn classify_failure(status: StatusCode, body: &str) -> Error {
    let message = truncate_body(body, 512);
    if !status.is_client_error() {
        return Error::Remote {
            status: status.as_u16(),
            message,
        };
    }

    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.error.unwrap_or_default().to_ascii_lowercase();
    let desc = parsed.error_description.unwrap_or_default().to_ascii_lowercase();
    let haystack = if code.is_empty() && desc.is_empty() {
        body.to_ascii_lowercase()
    } else {
        format!("{code} {desc}")
    };

    if matches!(code.as_str(), "invalid_signature" | "invalid_client" | "invalid_key") {
        return Error::KeyMismatch(message);
    }
    if code == "expired_token" || haystack.contains("expired") {
        return Error::TokenExpired(message);
    }
    let key_related = ["signature", "kid", "public key"];
    if key_related.iter().any(|needle| haystack.contains(needle)) {
        return Error::KeyMismatch(message);
    }
    Error::Remote {
        status: status.as_u16(),
        message,
    }
}
