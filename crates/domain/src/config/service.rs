use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Remote messaging service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Identity of the remote deployment the client talks to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the messaging service (the SCRT host), no trailing slash
    /// required.
    #[serde(default)]
    pub base_url: String,
    /// Organization id, sent in exchange bodies and the `X-Org-Id` stream
    /// header.
    #[serde(default)]
    pub org_id: String,
    /// Developer name of the messaging deployment.
    #[serde(default)]
    pub es_developer_name: String,
    #[serde(default = "d_capabilities_version")]
    pub capabilities_version: String,
    #[serde(default = "d_platform")]
    pub platform: String,
    #[serde(default = "d_app_name")]
    pub app_name: String,
    #[serde(default = "d_client_version")]
    pub client_version: String,
    /// Language tag attached to new conversations and messages.
    #[serde(default = "d_language")]
    pub language: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            org_id: String::new(),
            es_developer_name: String::new(),
            capabilities_version: d_capabilities_version(),
            platform: d_platform(),
            app_name: d_app_name(),
            client_version: d_client_version(),
            language: d_language(),
        }
    }
}

impl ServiceConfig {
    /// Join `path` onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_capabilities_version() -> String {
    "1".into()
}
fn d_platform() -> String {
    "Web".into()
}
fn d_app_name() -> String {
    "imsim".into()
}
fn d_client_version() -> String {
    "1.0".into()
}
fn d_language() -> String {
    "en_US".into()
}
