//! The message delivered for one novel tunnel URL.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::extract::Candidate;
use crate::shortener::ShortenResult;

/// Title used for detection notifications.
pub const DETECTION_TITLE: &str = "New Tunnel URL Detected";

/// Provider-independent notification content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub original_url: String,
    pub shortened_url: Option<String>,
    pub source_file: PathBuf,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl NotificationPayload {
    /// Build the payload for a candidate that passed dedup and shortening.
    #[must_use]
    pub fn from_detection(candidate: &Candidate, shortened: &ShortenResult) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("line".to_string(), Value::from(candidate.line.trim()));
        metadata.insert("line_number".to_string(), Value::from(candidate.line_number));
        metadata.insert("shape".to_string(), Value::from(candidate.shape.to_string()));
        if let Some(provider) = &shortened.provider {
            metadata.insert("shortener".to_string(), Value::from(provider.as_str()));
        }
        if let Some(host) = hostname() {
            metadata.insert("hostname".to_string(), Value::from(host));
        }

        Self {
            title: DETECTION_TITLE.to_string(),
            original_url: shortened.original.clone(),
            shortened_url: shortened.shortened.clone(),
            source_file: candidate.source.clone(),
            timestamp: candidate.detected_at,
            metadata,
        }
    }

    /// A fixed payload for verifying webhook configuration.
    #[must_use]
    pub fn sample() -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("test".to_string(), Value::Bool(true));
        if let Some(host) = hostname() {
            metadata.insert("hostname".to_string(), Value::from(host));
        }

        Self {
            title: "Tunnel Notifier Test".to_string(),
            original_url: "https://example-test-123.trycloudflare.com".to_string(),
            shortened_url: Some("https://tinyurl.com/test123".to_string()),
            source_file: PathBuf::from("/test/cloudflared.log"),
            timestamp: Utc::now(),
            metadata,
        }
    }

    /// The URL to put in front of people: short form when available.
    #[must_use]
    pub fn link(&self) -> &str {
        self.shortened_url.as_deref().unwrap_or(&self.original_url)
    }

    /// Metadata value rendered as a plain string.
    #[must_use]
    pub fn meta_str(&self, key: &str) -> Option<String> {
        self.metadata.get(key).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Name of the reporting machine, when the environment exposes it.
fn hostname() -> Option<String> {
    ["HOSTNAME", "COMPUTERNAME"]
        .into_iter()
        .find_map(|key| std::env::var(key).ok())
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}
