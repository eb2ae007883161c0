//! Shortening provider strategies.
//!
//! Every provider exposes the same contract: long URL in, short URL out.
//! Authentication and request shape stay inside the provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::error::ShortenError;
use crate::config::{ShortenerConfig, ShortenerKind};

/// Timeout used when a provider does not specify one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Trait for shortening providers.
#[async_trait]
pub trait ShortenProvider: Send + Sync {
    /// Name used in logs and results.
    fn name(&self) -> &str;

    /// Upper bound for one `try_shorten` call.
    fn timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    /// Shorten `url`, or explain why not.
    async fn try_shorten(&self, url: &str) -> Result<String, ShortenError>;
}

/// Accept a provider response only if it is an absolute http(s) URL.
fn validate_short_url(body: &str) -> Result<String, ShortenError> {
    let candidate = body.trim();
    match url::Url::parse(candidate) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => {
            Ok(candidate.to_string())
        }
        _ => Err(ShortenError::Malformed(candidate.chars().take(200).collect())),
    }
}

/// Providers with a `GET ?url=<long>` API that answer with the short URL
/// as plain text (tinyurl, is.gd, da.gd, chilp.it).
#[derive(Debug, Clone)]
pub struct PlainTextProvider {
    client: Client,
    name: &'static str,
    endpoint: String,
    extra_query: &'static [(&'static str, &'static str)],
    timeout: Duration,
}

impl PlainTextProvider {
    /// Create a provider for one of the plain-text kinds.
    ///
    /// Returns `None` for kinds with a different API shape.
    #[must_use]
    pub fn new(kind: ShortenerKind, base_url: &str, timeout: Duration, client: Client) -> Option<Self> {
        let (path, extra_query): (&str, &'static [(&str, &str)]) = match kind {
            ShortenerKind::TinyUrl => ("api-create.php", &[]),
            ShortenerKind::IsGd => ("create.php", &[("format", "simple")]),
            ShortenerKind::DaGd => ("s", &[]),
            ShortenerKind::ChilpIt => ("api.php", &[]),
            ShortenerKind::Bitly => return None,
        };
        Some(Self {
            client,
            name: kind.name(),
            endpoint: format!("{}/{path}", base_url.trim_end_matches('/')),
            extra_query,
            timeout,
        })
    }
}

#[async_trait]
impl ShortenProvider for PlainTextProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn try_shorten(&self, url: &str) -> Result<String, ShortenError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(self.extra_query)
            .query(&[("url", url)])
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ShortenError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        validate_short_url(&body)
    }
}

/// Bitly v4 API provider.
#[derive(Debug, Clone)]
pub struct BitlyProvider {
    client: Client,
    endpoint: String,
    token_env: String,
    token: Option<String>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct BitlyResponse {
    link: String,
}

impl BitlyProvider {
    /// Environment variable read when none is configured.
    pub const DEFAULT_TOKEN_ENV: &'static str = "BITLY_TOKEN";

    #[must_use]
    pub fn new(
        base_url: &str,
        token_env: String,
        token: Option<String>,
        timeout: Duration,
        client: Client,
    ) -> Self {
        Self {
            client,
            endpoint: format!("{}/v4/shorten", base_url.trim_end_matches('/')),
            token_env,
            token,
            timeout,
        }
    }
}

#[async_trait]
impl ShortenProvider for BitlyProvider {
    fn name(&self) -> &str {
        ShortenerKind::Bitly.name()
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn try_shorten(&self, url: &str) -> Result<String, ShortenError> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| ShortenError::MissingToken(self.token_env.clone()))?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&serde_json::json!({ "long_url": url }))
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ShortenError::Status(status.as_u16()));
        }

        let body: BitlyResponse = response
            .json()
            .await
            .map_err(|e| ShortenError::Malformed(e.to_string()))?;
        validate_short_url(&body.link)
    }
}

/// Provider enum for dispatch.
#[derive(Debug, Clone)]
pub enum Provider {
    PlainText(PlainTextProvider),
    Bitly(BitlyProvider),
}

impl Provider {
    /// Build the provider described by `config`.
    ///
    /// Bitly tokens are read from the environment here; a missing token
    /// surfaces as a failed attempt rather than a startup error.
    #[must_use]
    pub fn from_config(config: &ShortenerConfig, client: Client) -> Self {
        let base_url = config.base_url();
        let timeout = config.timeout();
        if let Some(provider) = PlainTextProvider::new(config.kind, base_url, timeout, client.clone()) {
            return Self::PlainText(provider);
        }

        let token_env = config
            .token_env
            .clone()
            .unwrap_or_else(|| BitlyProvider::DEFAULT_TOKEN_ENV.to_string());
        let token = std::env::var(&token_env).ok().filter(|t| !t.is_empty());
        Self::Bitly(BitlyProvider::new(base_url, token_env, token, timeout, client))
    }
}

#[async_trait]
impl ShortenProvider for Provider {
    fn name(&self) -> &str {
        match self {
            Self::PlainText(p) => p.name(),
            Self::Bitly(p) => p.name(),
        }
    }

    fn timeout(&self) -> Duration {
        match self {
            Self::PlainText(p) => p.timeout(),
            Self::Bitly(p) => p.timeout(),
        }
    }

    async fn try_shorten(&self, url: &str) -> Result<String, ShortenError> {
        match self {
            Self::PlainText(p) => p.try_shorten(url).await,
            Self::Bitly(p) => p.try_shorten(url).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_short_url() {
        assert_eq!(
            validate_short_url("https://tinyurl.com/abc123\n").unwrap(),
            "https://tinyurl.com/abc123"
        );
        assert!(matches!(
            validate_short_url("Error: Please enter a valid URL"),
            Err(ShortenError::Malformed(_))
        ));
        assert!(matches!(validate_short_url(""), Err(ShortenError::Malformed(_))));
        assert!(matches!(
            validate_short_url("ftp://short.example/x"),
            Err(ShortenError::Malformed(_))
        ));
    }

    #[test]
    fn test_plain_text_endpoints() {
        let client = Client::new();
        let tiny = PlainTextProvider::new(
            ShortenerKind::TinyUrl,
            "https://tinyurl.com/",
            DEFAULT_TIMEOUT,
            client.clone(),
        )
        .unwrap();
        assert_eq!(tiny.endpoint, "https://tinyurl.com/api-create.php");
        assert_eq!(tiny.name(), "tinyurl");

        let isgd =
            PlainTextProvider::new(ShortenerKind::IsGd, "https://is.gd", DEFAULT_TIMEOUT, client.clone())
                .unwrap();
        assert_eq!(isgd.endpoint, "https://is.gd/create.php");
        assert_eq!(isgd.extra_query, &[("format", "simple")]);

        assert!(
            PlainTextProvider::new(ShortenerKind::Bitly, "https://x", DEFAULT_TIMEOUT, client)
                .is_none()
        );
    }

    #[test]
    fn test_from_config_dispatch() {
        let client = Client::new();
        let mut config = ShortenerConfig::new(ShortenerKind::DaGd);
        config.timeout_secs = 2;
        let provider = Provider::from_config(&config, client.clone());
        assert!(matches!(provider, Provider::PlainText(_)));
        assert_eq!(provider.name(), "dagd");
        assert_eq!(provider.timeout(), Duration::from_secs(2));

        let mut bitly = ShortenerConfig::new(ShortenerKind::Bitly);
        bitly.token_env = Some("TUNNEL_NOTIFIER_TEST_UNSET_TOKEN".to_string());
        let provider = Provider::from_config(&bitly, client);
        assert!(matches!(provider, Provider::Bitly(_)));
        assert_eq!(provider.name(), "bitly");
    }

    #[tokio::test]
    async fn test_bitly_without_token_fails_attempt() {
        let provider = BitlyProvider::new(
            "http://127.0.0.1:9",
            "TUNNEL_NOTIFIER_TEST_UNSET_TOKEN".to_string(),
            None,
            DEFAULT_TIMEOUT,
            Client::new(),
        );
        let result = provider.try_shorten("https://a.trycloudflare.com").await;
        assert_eq!(
            result,
            Err(ShortenError::MissingToken(
                "TUNNEL_NOTIFIER_TEST_UNSET_TOKEN".to_string()
            ))
        );
    }
}
