//! `imsim token` and `imsim inspect`.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use im_credentials::issuer::issue_unauthenticated;
use im_credentials::{
    load_signing_key, AssertionBuilder, AssertionReport, HttpTokenExchange, SessionState,
    TokenIssuer,
};
use im_domain::config::Config;

/// Which grant `imsim token` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFlow {
    /// Signed assertion (the default).
    Assertion,
    Guest,
    ClientCredentials,
}

impl TokenFlow {
    pub fn from_flags(unauthenticated: bool, client_credentials: bool) -> Self {
        match (unauthenticated, client_credentials) {
            (true, _) => Self::Guest,
            (false, true) => Self::ClientCredentials,
            (false, false) => Self::Assertion,
        }
    }
}

/// Obtain a token and print it. Messaging tokens are printed with the
/// session status they leave behind.
pub async fn token(config: &Config, flow: TokenFlow) -> anyhow::Result<()> {
    let session = Arc::new(SessionState::from_config(&config.session));
    let token = match flow {
        TokenFlow::Assertion => {
            let issuer = TokenIssuer::from_config(config, session.clone())?;
            issuer.valid_token().await?
        }
        TokenFlow::Guest => {
            let exchange = HttpTokenExchange::from_config(config)?;
            issue_unauthenticated(&exchange, &session).await?
        }
        TokenFlow::ClientCredentials => {
            let token = HttpTokenExchange::from_config(config)?
                .exchange_client_credentials()
                .await?;
            tracing::info!(expires_at = %token.expires_at, "client-credentials token obtained");
            println!("{}", serde_json::to_string_pretty(&json!({ "token": token }))?);
            return Ok(());
        }
    };

    tracing::info!(
        ?flow,
        expires_at = %token.expires_at,
        last_event_id = ?token.last_event_id,
        "access token obtained"
    );
    let out = json!({ "token": token, "session": session.status() });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Inspect `assertion`, or a freshly signed one when absent.
pub fn inspect(config: &Config, assertion: Option<String>) -> anyhow::Result<()> {
    let now = Utc::now();
    let (compact, public_jwk) = match assertion {
        Some(a) => (a.trim().to_string(), None),
        None => {
            let key = load_signing_key(
                &config.credentials.key_path,
                config.credentials.key_format,
                config.credentials.kid.as_deref(),
            )?;
            let assertion = AssertionBuilder::from_config(config, key.kid()).build(&key, now)?;
            (assertion.into_string(), Some(key.public_jwk()))
        }
    };

    let report = AssertionReport::inspect(&compact, now)?;
    for warning in &report.warnings {
        tracing::warn!(%warning, "assertion check");
    }

    let mut out = json!({ "report": report });
    if let Some(jwk) = public_jwk {
        out["assertion"] = json!(compact);
        out["public_jwk"] = jwk;
    }
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
