use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Token exchange
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Wire shape of the token exchange request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeStyle {
    /// RFC 7523 form body: `grant_type=...jwt-bearer&assertion=<JWT>`.
    OauthForm,
    /// Vendor JSON body carrying the assertion as `customerIdentityToken`.
    #[default]
    MessagingJson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default)]
    pub style: ExchangeStyle,
    /// Absolute token endpoint. When unset the vendor's authenticated
    /// access-token path under `service.base_url` is used.
    #[serde(default)]
    pub token_url: Option<String>,
    /// Absolute endpoint for the unauthenticated (guest) flow.
    #[serde(default)]
    pub unauthenticated_url: Option<String>,
    /// Upper bound on a whole exchange round trip.
    #[serde(default = "d_15000")]
    pub request_timeout_ms: u64,
    #[serde(default = "d_5000")]
    pub connect_timeout_ms: u64,
    /// Lifetime assumed when the response carries no `expires_in` and the
    /// access token is not a decodable JWT.
    #[serde(default = "d_3600")]
    pub default_token_lifetime_secs: u64,
    /// Connected-app credentials for the OAuth client-credentials grant.
    #[serde(default)]
    pub client_credentials: Option<ClientCredentialsConfig>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            style: ExchangeStyle::MessagingJson,
            token_url: None,
            unauthenticated_url: None,
            request_timeout_ms: 15_000,
            connect_timeout_ms: 5_000,
            default_token_lifetime_secs: 3_600,
            client_credentials: None,
        }
    }
}

/// `[exchange.client_credentials]`: the secret comes from `client_secret`
/// or, preferably, from the environment variable named by
/// `client_secret_env`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ClientCredentialsConfig {
    /// Absolute token endpoint. Defaults to `/services/oauth2/token` under
    /// `service.base_url`.
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub client_id: String,
    /// Env var containing the client secret.
    #[serde(default)]
    pub client_secret_env: Option<String>,
    /// Direct secret (config-only setups; prefer `client_secret_env`).
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl std::fmt::Debug for ClientCredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentialsConfig")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret_env", &self.client_secret_env)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Refresh policy for the cached access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// A token counts as expired this many seconds before its real expiry.
    #[serde(default = "d_30")]
    pub safety_margin_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            safety_margin_secs: 30,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_15000() -> u64 {
    15_000
}
fn d_5000() -> u64 {
    5_000
}
fn d_3600() -> u64 {
    3_600
}
fn d_30() -> u64 {
    30
}
