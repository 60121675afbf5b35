//! `im-credentials`: JWT-bearer credential lifecycle for the messaging
//! service.
//!
//! This crate provides:
//! - Private key loading from PEM (PKCS#1 / PKCS#8) or JWK files into a
//!   format-agnostic [`SigningKey`].
//! - An [`AssertionBuilder`] producing short-lived RS256 assertions with
//!   clock-skew compensation.
//! - An HTTP [`TokenExchange`] client that trades assertions for access
//!   tokens and classifies failures.
//! - [`SessionState`], the injectable cache for the current token and
//!   conversation.
//! - A [`TokenIssuer`] tying them together with a bounded retry and
//!   single-flight refresh.
//!
//! # Usage
//!
//! ```rust,ignore
//! let session = Arc::new(SessionState::from_config(&config.session));
//! let issuer = TokenIssuer::from_config(&config, session.clone())?;
//! let token = issuer.valid_token().await?;
//! ```

pub mod assertion;
pub mod exchange;
pub mod issuer;
pub mod jwk;
pub mod keys;
pub mod session;
pub mod util;

// Re-exports for convenience.
pub use assertion::{AssertionBuilder, AssertionClaims, AssertionReport, JwtAssertion};
pub use exchange::{HttpTokenExchange, TokenExchange};
pub use issuer::TokenIssuer;
pub use keys::{load_signing_key, SigningKey};
pub use session::{SessionState, TokenLookup};
