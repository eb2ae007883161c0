//! Webhook delivery errors.

/// Why one delivery attempt failed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Webhook request timed out")]
    Timeout,

    #[error("Webhook request failed: {0}")]
    Request(String),

    #[error("Webhook returned HTTP {0}")]
    Status(u16),
}

impl DeliveryError {
    /// HTTP status, if the endpoint answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status(code) => Some(*code),
            Self::Timeout | Self::Request(_) => None,
        }
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(e.to_string())
        }
    }
}
