//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the tunnel notifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// What to watch.
    pub watch: WatchConfig,
    /// Webhook endpoints that receive notifications.
    pub webhooks: Vec<WebhookConfig>,
    /// Shortening providers, tried in order.
    pub shorteners: Vec<ShortenerConfig>,
    /// Delivery retry policy.
    pub retry: RetryConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch: WatchConfig::default(),
            webhooks: Vec::new(),
            shorteners: default_shorteners(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// A configured watch directory.
///
/// Accepts either a bare path string or a table with an explicit
/// `recursive` flag overriding the global one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DirectoryEntry {
    Path(PathBuf),
    Detailed {
        path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recursive: Option<bool>,
    },
}

impl DirectoryEntry {
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Path(path) | Self::Detailed { path, .. } => path,
        }
    }

    /// Per-directory recursive flag, if one was given.
    #[must_use]
    pub fn recursive(&self) -> Option<bool> {
        match self {
            Self::Path(_) => None,
            Self::Detailed { recursive, .. } => *recursive,
        }
    }
}

/// Watch scope and coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Root directories to watch.
    pub directories: Vec<DirectoryEntry>,
    /// Default recursive flag for directories without their own.
    pub recursive: bool,
    /// Accepted file extensions, with or without the leading dot.
    pub extensions: Vec<String>,
    /// Filename glob patterns (`*`, `?`).
    pub patterns: Vec<String>,
    /// Read matching files in full when the watcher starts.
    pub startup_scan: bool,
    /// Number of pipeline workers.
    pub workers: usize,
    /// Debounce window for filesystem events, in milliseconds.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            directories: vec![DirectoryEntry::Path(PathBuf::from("."))],
            recursive: true,
            extensions: [".log", ".txt", ".out"]
                .into_iter()
                .map(String::from)
                .collect(),
            patterns: ["*tunnel*", "*cloudflare*", "*cloudflared*"]
                .into_iter()
                .map(String::from)
                .collect(),
            startup_scan: true,
            workers: 4,
            debounce_ms: 250,
        }
    }
}

impl WatchConfig {
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Webhook provider kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WebhookKind {
    #[default]
    Discord,
    Slack,
    Generic,
}

/// A webhook endpoint descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub kind: WebhookKind,
    /// Display name used by providers that support it.
    #[serde(default = "default_username")]
    pub username: String,
    /// Label used in logs; defaults to the URL host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

fn default_username() -> String {
    "Tunnel Monitor".to_string()
}

impl WebhookConfig {
    /// Create a Discord endpoint with the default username.
    #[must_use]
    pub fn discord(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: WebhookKind::Discord,
            username: default_username(),
            name: None,
        }
    }
}

/// Shortening provider kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShortenerKind {
    TinyUrl,
    IsGd,
    DaGd,
    ChilpIt,
    Bitly,
}

impl ShortenerKind {
    /// Public endpoint used when no `base_url` is configured.
    #[must_use]
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::TinyUrl => "https://tinyurl.com",
            Self::IsGd => "https://is.gd",
            Self::DaGd => "https://da.gd",
            Self::ChilpIt => "http://chilp.it",
            Self::Bitly => "https://api-ssl.bitly.com",
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::TinyUrl => "tinyurl",
            Self::IsGd => "isgd",
            Self::DaGd => "dagd",
            Self::ChilpIt => "chilpit",
            Self::Bitly => "bitly",
        }
    }
}

/// A shortening provider descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShortenerConfig {
    pub kind: ShortenerKind,
    /// Override the provider's API root (self-hosted mirrors, tests).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Per-call timeout in seconds.
    #[serde(default = "default_shortener_timeout")]
    pub timeout_secs: u64,
    /// Environment variable holding the API token (bitly).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

fn default_shortener_timeout() -> u64 {
    10
}

impl ShortenerConfig {
    #[must_use]
    pub fn new(kind: ShortenerKind) -> Self {
        Self {
            kind,
            base_url: None,
            timeout_secs: default_shortener_timeout(),
            token_env: None,
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.kind.default_base_url())
    }
}

/// The built-in fallback order: tinyurl, is.gd, da.gd.
#[must_use]
pub fn default_shorteners() -> Vec<ShortenerConfig> {
    [ShortenerKind::TinyUrl, ShortenerKind::IsGd, ShortenerKind::DaGd]
        .into_iter()
        .map(ShortenerConfig::new)
        .collect()
}

/// Delivery retry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per endpoint, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards.
    pub base_delay_ms: u64,
    /// Upper bound on a single backoff delay.
    pub max_delay_ms: u64,
    /// Timeout for each webhook request.
    pub request_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            request_timeout_secs: 10,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write logs to this file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}
