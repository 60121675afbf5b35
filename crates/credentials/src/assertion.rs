//! RS256 bearer assertions.
//!
//! `iat` is backdated by the clock-skew tolerance so a service whose clock
//! runs slightly behind ours still accepts the token. `exp` is measured
//! from that backdated `iat`.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, Header};
use serde::{Deserialize, Serialize};

use im_domain::config::Config;
use im_domain::error::{Error, Result};

use crate::keys::SigningKey;
use crate::util::decode_unverified_claims;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Claims
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A signed compact JWT plus the claims it carries.
///
/// Single use: the issuer builds a new one for every exchange attempt.
#[derive(Clone)]
pub struct JwtAssertion {
    compact: String,
    kid: String,
    claims: AssertionClaims,
}

impl std::fmt::Debug for JwtAssertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAssertion")
            .field("kid", &self.kid)
            .field("claims", &self.claims)
            .field("compact", &"[REDACTED]")
            .finish()
    }
}

impl JwtAssertion {
    pub fn as_str(&self) -> &str {
        &self.compact
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn claims(&self) -> &AssertionClaims {
        &self.claims
    }

    pub fn into_string(self) -> String {
        self.compact
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Builder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct AssertionBuilder {
    issuer: String,
    subject: String,
    audience: String,
    display_name: Option<String>,
    clock_skew_secs: i64,
    validity_window_secs: i64,
}

impl AssertionBuilder {
    pub fn new(
        issuer: impl Into<String>,
        subject: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            subject: subject.into(),
            audience: audience.into(),
            display_name: None,
            clock_skew_secs: 30,
            validity_window_secs: 180,
        }
    }

    /// Builder from the `[credentials]` section. The issuer defaults to
    /// the key id when not configured.
    pub fn from_config(config: &Config, kid: &str) -> Self {
        let creds = &config.credentials;
        let issuer = creds
            .issuer
            .clone()
            .filter(|i| !i.is_empty())
            .unwrap_or_else(|| kid.to_string());
        Self::new(issuer, creds.subject.clone(), config.assertion_audience())
            .with_display_name(creds.display_name.clone())
            .with_timing(creds.clock_skew_tolerance_secs, creds.validity_window_secs)
    }

    pub fn with_display_name(mut self, name: Option<String>) -> Self {
        self.display_name = name.filter(|n| !n.is_empty());
        self
    }

    pub fn with_timing(mut self, clock_skew_secs: u64, validity_window_secs: u64) -> Self {
        self.clock_skew_secs = clock_skew_secs as i64;
        self.validity_window_secs = validity_window_secs as i64;
        self
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Claims for an assertion minted at `now`. Pure.
    pub fn claims_at(&self, now: DateTime<Utc>) -> AssertionClaims {
        self.claims_for(&self.subject, now)
    }

    fn claims_for(&self, subject: &str, now: DateTime<Utc>) -> AssertionClaims {
        let iat = now.timestamp() - self.clock_skew_secs;
        AssertionClaims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            aud: self.audience.clone(),
            iat,
            nbf: iat,
            exp: iat + self.validity_window_secs,
            name: self.display_name.clone(),
        }
    }

    /// Sign a fresh assertion with `key`.
    pub fn build(&self, key: &SigningKey, now: DateTime<Utc>) -> Result<JwtAssertion> {
        self.sign(key, self.claims_at(now))
    }

    /// Same as [`build`](Self::build) with a different `sub`.
    pub fn build_for(
        &self,
        subject: &str,
        key: &SigningKey,
        now: DateTime<Utc>,
    ) -> Result<JwtAssertion> {
        self.sign(key, self.claims_for(subject, now))
    }

    fn sign(&self, key: &SigningKey, claims: AssertionClaims) -> Result<JwtAssertion> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key.kid().to_string());

        let compact = jsonwebtoken::encode(&header, &claims, key.encoding_key())
            .map_err(|e| Error::SigningFailure(e.to_string()))?;

        tracing::debug!(
            kid = %key.kid(),
            sub = %claims.sub,
            iat = claims.iat,
            exp = claims.exp,
            "assertion signed"
        );

        Ok(JwtAssertion {
            compact,
            kid: key.kid().to_string(),
            claims,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inspection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Offline sanity report for a compact assertion: header, claims and how
// the timestamps relate to the local clock. No signature check.

#[derive(Debug, Clone, Serialize)]
pub struct AssertionReport {
    pub alg: String,
    pub kid: Option<String>,
    pub typ: Option<String>,
    pub claims: AssertionClaims,
    /// Seconds between `iat` and now (positive means in the past).
    pub issued_secs_ago: i64,
    /// Seconds until `exp` (negative once expired).
    pub expires_in_secs: i64,
    pub warnings: Vec<String>,
}

impl AssertionReport {
    pub fn inspect(compact: &str, now: DateTime<Utc>) -> Result<Self> {
        let header = jsonwebtoken::decode_header(compact)
            .map_err(|e| Error::InvalidInput(format!("not a JWT: {e}")))?;
        let claims: AssertionClaims = decode_unverified_claims(compact).ok_or_else(|| {
            Error::InvalidInput("JWT payload is not an assertion claim set".into())
        })?;

        let now = now.timestamp();
        let issued_secs_ago = now - claims.iat;
        let expires_in_secs = claims.exp - now;

        let mut warnings = Vec::new();
        if header.alg != Algorithm::RS256 {
            warnings.push(format!("alg is {:?}, expected RS256", header.alg));
        }
        if header.kid.is_none() {
            warnings.push("header has no kid".into());
        }
        if issued_secs_ago < -60 {
            warnings.push(format!("iat is {}s in the future", -issued_secs_ago));
        }
        if claims.exp <= claims.iat {
            warnings.push("exp is not after iat".into());
        }
        if expires_in_secs <= 0 {
            warnings.push(format!("expired {}s ago", -expires_in_secs));
        } else if expires_in_secs < 60 {
            warnings.push(format!("expires in {expires_in_secs}s"));
        }

        Ok(Self {
            alg: format!("{:?}", header.alg),
            kid: header.kid,
            typ: header.typ,
            claims,
            issued_secs_ago,
            expires_in_secs,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn builder() -> AssertionBuilder {
        AssertionBuilder::new("kid-1", "user123", "https://scrt.example.com")
            .with_timing(30, 180)
    }

    #[test]
    fn iat_is_backdated_by_skew() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let claims = builder().claims_at(now);
        assert_eq!(claims.iat, now.timestamp() - 30);
        assert_eq!(claims.nbf, claims.iat);
        assert_eq!(claims.exp - claims.iat, 180);
        assert!(claims.iat <= now.timestamp());
        assert!(now.timestamp() < claims.exp);
    }

    #[test]
    fn claims_are_deterministic_for_a_given_instant() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(builder().claims_at(now), builder().claims_at(now));
    }

    #[test]
    fn display_name_is_optional() {
        let now = Utc::now();
        let claims = builder().claims_at(now);
        let json = serde_json::to_value(&claims).unwrap();
        assert!(json.get("name").is_none());

        let claims = builder()
            .with_display_name(Some("Ada".into()))
            .claims_at(now);
        assert_eq!(claims.name.as_deref(), Some("Ada"));
    }

    #[test]
    fn issuer_defaults_to_kid() {
        let mut config = Config::default();
        config.service.base_url = "https://scrt.example.com/".into();
        let b = AssertionBuilder::from_config(&config, "kid-9");
        let claims = b.claims_at(Utc::now());
        assert_eq!(claims.iss, "kid-9");
        assert_eq!(claims.aud, "https://scrt.example.com");
        assert_eq!(claims.sub, "user123");
    }

    #[test]
    fn inspect_rejects_non_jwt() {
        let err = AssertionReport::inspect("nope", Utc::now()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
