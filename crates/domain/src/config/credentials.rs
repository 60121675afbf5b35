use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Signing key + assertion claims
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How the private key file is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyFormat {
    /// PKCS#1 (`BEGIN RSA PRIVATE KEY`) or PKCS#8 (`BEGIN PRIVATE KEY`).
    Pem,
    /// JSON Web Key (RFC 7517/7518) holding an RSA private key.
    Jwk,
    /// Sniff the file contents once at load time.
    #[default]
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "d_key_path")]
    pub key_path: String,
    #[serde(default)]
    pub key_format: KeyFormat,
    /// Key id registered with the remote service. When unset the JWK `kid`
    /// is used.
    #[serde(default)]
    pub kid: Option<String>,
    /// `iss` claim. Defaults to the kid when unset.
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default = "d_subject")]
    pub subject: String,
    /// `aud` claim. Defaults to the service base URL when unset.
    #[serde(default)]
    pub audience: Option<String>,
    /// Optional `name` claim shown to agents.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Seconds subtracted from the local clock for `iat`/`nbf`.
    #[serde(default = "d_30")]
    pub clock_skew_tolerance_secs: u64,
    /// Lifetime of a single assertion, measured from `iat`.
    #[serde(default = "d_180")]
    pub validity_window_secs: u64,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            key_path: d_key_path(),
            key_format: KeyFormat::Auto,
            kid: None,
            issuer: None,
            subject: d_subject(),
            audience: None,
            display_name: None,
            clock_skew_tolerance_secs: 30,
            validity_window_secs: 180,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_key_path() -> String {
    "keys/private.jwk.json".into()
}
fn d_subject() -> String {
    "user123".into()
}
fn d_30() -> u64 {
    30
}
fn d_180() -> u64 {
    180
}
