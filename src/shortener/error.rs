//! Shortening provider errors.

/// Why a single provider failed to shorten a URL.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ShortenError {
    #[error("Request timed out")]
    Timeout,

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Malformed response: {0:?}")]
    Malformed(String),

    #[error("API token not configured (env: {0})")]
    MissingToken(String),
}

impl From<reqwest::Error> for ShortenError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(e.to_string())
        }
    }
}
