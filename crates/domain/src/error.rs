/// Shared error type used across all imsim crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("key file not found: {path}")]
    KeyNotFound { path: String },

    #[error("invalid key material: {0}")]
    KeyFormatInvalid(String),

    #[error("unsupported key algorithm: {0}")]
    KeyAlgorithmUnsupported(String),

    #[error("signing failed: {0}")]
    SigningFailure(String),

    #[error("assertion rejected as expired: {0}")]
    TokenExpired(String),

    #[error("assertion signature rejected (check kid and key pair): {0}")]
    KeyMismatch(String),

    #[error("network: {0}")]
    Network(String),

    #[error("remote returned HTTP {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("stream connect failed: {0}")]
    ConnectFailed(String),

    #[error("stream terminated after {attempts} reconnect attempts")]
    StreamTerminated { attempts: u32 },

    #[error("no access token available; generate an access token first")]
    NoAccessToken,

    #[error("no conversation available; create a conversation first")]
    NoConversation,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("config: {0}")]
    Config(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether a caller may reasonably retry the failed operation (with
    /// backoff). Configuration and key errors are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::ConnectFailed(_) => true,
            Self::Remote { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Errors that abort the credential flow at startup.
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            Self::KeyNotFound { .. } | Self::KeyFormatInvalid(_) | Self::KeyAlgorithmUnsupported(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_and_5xx_are_retryable() {
        assert!(Error::Network("reset".into()).is_retryable());
        assert!(Error::Remote { status: 503, message: "busy".into() }.is_retryable());
        assert!(Error::Remote { status: 429, message: "slow".into() }.is_retryable());
    }

    #[test]
    fn client_errors_are_not_retryable() {
        assert!(!Error::Remote { status: 400, message: "bad".into() }.is_retryable());
        assert!(!Error::KeyMismatch("sig".into()).is_retryable());
        assert!(!Error::TokenExpired("exp".into()).is_retryable());
    }

    #[test]
    fn key_errors_are_classified() {
        assert!(Error::KeyNotFound { path: "k.pem".into() }.is_key_error());
        assert!(Error::KeyFormatInvalid("x".into()).is_key_error());
        assert!(!Error::SigningFailure("x".into()).is_key_error());
    }

    #[test]
    fn remote_error_message_includes_status_and_body() {
        let err = Error::Remote { status: 418, message: "teapot".into() };
        let msg = err.to_string();
        assert!(msg.contains("418"));
        assert!(msg.contains("teapot"));
    }
}
