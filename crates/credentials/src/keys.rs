//! Private key loading.
//!
//! PEM (PKCS#1 or PKCS#8) and JWK files are resolved once into a
//! [`SigningKey`]. Nothing downstream looks at the original encoding, so
//! switching the configured format never changes the signing path.

use std::path::Path;

use jsonwebtoken::{Algorithm, EncodingKey};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey, LineEnding, PrivateKeyInfo};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};

use im_domain::config::KeyFormat;
use im_domain::error::{Error, Result};

use crate::jwk;
use crate::util::b64url_encode;

/// RS256 keys below this modulus size are refused.
pub const MIN_RSA_BITS: usize = 2048;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SigningKey
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An RSA private key ready for RS256 signing, tagged with its key id.
///
/// Immutable once loaded. `Debug` never prints key material.
pub struct SigningKey {
    kid: String,
    encoding_key: EncodingKey,
    public_key: RsaPublicKey,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm())
            .field("bits", &self.bits())
            .field("private", &"[REDACTED]")
            .finish()
    }
}

impl SigningKey {
    /// Wrap an already-parsed RSA key.
    pub fn from_rsa(private: RsaPrivateKey, kid: impl Into<String>) -> Result<Self> {
        let kid = kid.into();
        if kid.trim().is_empty() {
            return Err(Error::KeyFormatInvalid("key id (kid) must not be empty".into()));
        }

        let public_key = private.to_public_key();
        let bits = public_key.size() * 8;
        if bits < MIN_RSA_BITS {
            return Err(Error::KeyAlgorithmUnsupported(format!(
                "RS256 requires an RSA modulus of at least {MIN_RSA_BITS} bits, got {bits}"
            )));
        }

        let der = private
            .to_pkcs1_der()
            .map_err(|e| Error::KeyFormatInvalid(format!("re-encoding RSA key: {e}")))?;
        let encoding_key = EncodingKey::from_rsa_der(der.as_bytes());

        Ok(Self {
            kid,
            encoding_key,
            public_key,
        })
    }

    /// Parse a PEM document held in memory.
    pub fn from_pem_str(pem: &str, kid: impl Into<String>) -> Result<Self> {
        Self::from_rsa(parse_pem(pem)?, kid)
    }

    /// Parse a JWK document held in memory. An explicit `kid` overrides
    /// the one embedded in the JWK.
    pub fn from_jwk_str(json: &str, kid: Option<&str>) -> Result<Self> {
        let parsed = jwk::parse(json)?;
        let kid = resolve_kid(kid, parsed.kid.as_deref())?;
        Self::from_rsa(parsed.key, kid)
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn algorithm(&self) -> Algorithm {
        Algorithm::RS256
    }

    pub fn bits(&self) -> usize {
        self.public_key.size() * 8
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// SPKI PEM of the public half, for registering with the service.
    pub fn public_key_pem(&self) -> Result<String> {
        self.public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| Error::KeyFormatInvalid(format!("encoding public key: {e}")))
    }

    /// Public JWK (no private members) for the keyset the service trusts.
    pub fn public_jwk(&self) -> serde_json::Value {
        serde_json::json!({
            "kty": "RSA",
            "kid": self.kid,
            "use": "sig",
            "alg": "RS256",
            "n": b64url_encode(&self.public_key.n().to_bytes_be()),
            "e": b64url_encode(&self.public_key.e().to_bytes_be()),
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Loading
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Load a signing key from `path`.
///
/// `configured_kid` wins over a `kid` embedded in a JWK. PEM files carry
/// no key id, so a PEM key without a configured kid is rejected.
pub fn load_signing_key(
    path: impl AsRef<Path>,
    format: KeyFormat,
    configured_kid: Option<&str>,
) -> Result<SigningKey> {
    let path = path.as_ref();
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::KeyNotFound {
                path: path.display().to_string(),
            });
        }
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            return Err(Error::KeyFormatInvalid(format!(
                "{} is not a text key file (binary DER is not supported)",
                path.display()
            )));
        }
        Err(e) => return Err(Error::Io(e)),
    };

    let format = resolve_format(format, &raw);
    let key = match format {
        KeyFormat::Jwk => SigningKey::from_jwk_str(&raw, configured_kid)?,
        KeyFormat::Pem | KeyFormat::Auto => {
            let private = parse_pem(&raw)?;
            SigningKey::from_rsa(private, resolve_kid(configured_kid, None)?)?
        }
    };

    tracing::info!(
        path = %path.display(),
        format = ?format,
        kid = %key.kid(),
        bits = key.bits(),
        "signing key loaded"
    );
    Ok(key)
}

/// `Auto` picks JWK when the document looks like a JSON object.
fn resolve_format(format: KeyFormat, raw: &str) -> KeyFormat {
    match format {
        KeyFormat::Auto if raw.trim_start().starts_with('{') => KeyFormat::Jwk,
        KeyFormat::Auto => KeyFormat::Pem,
        explicit => explicit,
    }
}

fn resolve_kid(configured: Option<&str>, embedded: Option<&str>) -> Result<String> {
    let configured = configured.filter(|k| !k.trim().is_empty());
    let embedded = embedded.filter(|k| !k.trim().is_empty());
    match (configured, embedded) {
        (Some(c), Some(e)) if c != e => {
            tracing::warn!(
                configured = %c,
                embedded = %e,
                "configured kid differs from the JWK kid; using the configured one"
            );
            Ok(c.to_string())
        }
        (Some(c), _) => Ok(c.to_string()),
        (None, Some(e)) => Ok(e.to_string()),
        (None, None) => Err(Error::KeyFormatInvalid(
            "no key id: set credentials.kid or include \"kid\" in the JWK".into(),
        )),
    }
}

fn parse_pem(pem: &str) -> Result<RsaPrivateKey> {
    let (label, der) = decode_pem_block(pem)?;

    match label.as_str() {
        "RSA PRIVATE KEY" => RsaPrivateKey::from_pkcs1_der(&der)
            .map_err(|e| Error::KeyFormatInvalid(format!("PKCS#1 RSA key: {e}"))),
        "PRIVATE KEY" => {
            let info = PrivateKeyInfo::try_from(der.as_slice())
                .map_err(|e| Error::KeyFormatInvalid(format!("PKCS#8 structure: {e}")))?;
            if info.algorithm.oid != rsa::pkcs1::ALGORITHM_OID {
                return Err(Error::KeyAlgorithmUnsupported(format!(
                    "PKCS#8 key with algorithm {} (only RSA keys can sign RS256)",
                    info.algorithm.oid
                )));
            }
            RsaPrivateKey::from_pkcs8_der(&der)
                .map_err(|e| Error::KeyFormatInvalid(format!("PKCS#8 RSA key: {e}")))
        }
        "EC PRIVATE KEY" => Err(Error::KeyAlgorithmUnsupported(
            "EC private key (only RSA keys can sign RS256)".into(),
        )),
        "ENCRYPTED PRIVATE KEY" => Err(Error::KeyFormatInvalid(
            "encrypted private keys are not supported; decrypt the key first".into(),
        )),
        "PUBLIC KEY" | "RSA PUBLIC KEY" | "CERTIFICATE" => Err(Error::KeyFormatInvalid(format!(
            "found a {label} where a private key was expected"
        ))),
        other => Err(Error::KeyFormatInvalid(format!(
            "unexpected PEM label \"{other}\""
        ))),
    }
}

/// First PEM block in `pem`. Text before the BEGIN line (OpenSSL "Bag
/// Attributes", comments) is ignored.
fn decode_pem_block(document: &str) -> Result<(String, Vec<u8>)> {
    let block = pem::parse(document)
        .map_err(|e| Error::KeyFormatInvalid(format!("malformed PEM: {e}")))?;
    // RFC 1421 headers only appear on legacy encrypted keys.
    if block.headers().get("Proc-Type").is_some() || block.headers().get("DEK-Info").is_some() {
        return Err(Error::KeyFormatInvalid(
            "encrypted private keys are not supported; decrypt the key first".into(),
        ));
    }
    Ok((block.tag().to_string(), block.into_contents()))
}
