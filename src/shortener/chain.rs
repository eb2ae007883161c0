//! Ordered provider fallback.

use reqwest::Client;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::error::ShortenError;
use super::provider::{Provider, ShortenProvider};
use crate::config::ShortenerConfig;

/// Outcome of running a URL through the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShortenResult {
    pub original: String,
    /// Short URL from the first provider that succeeded.
    pub shortened: Option<String>,
    /// Name of that provider.
    pub provider: Option<String>,
    /// Every provider tried, in order.
    pub attempted: Vec<String>,
}

impl ShortenResult {
    fn unshortened(original: &str, attempted: Vec<String>) -> Self {
        Self {
            original: original.to_string(),
            shortened: None,
            provider: None,
            attempted,
        }
    }

    /// The URL to present: the short form when available.
    #[must_use]
    pub fn url(&self) -> &str {
        self.shortened.as_deref().unwrap_or(&self.original)
    }

    #[must_use]
    pub fn is_shortened(&self) -> bool {
        self.shortened.is_some()
    }
}

/// Providers tried in configured order until one succeeds.
pub struct ShortenerChain {
    providers: Vec<Box<dyn ShortenProvider>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for ShortenerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("ShortenerChain")
            .field("providers", &names)
            .finish_non_exhaustive()
    }
}

impl ShortenerChain {
    #[must_use]
    pub fn new(providers: Vec<Box<dyn ShortenProvider>>) -> Self {
        Self {
            providers,
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop trying further providers once `token` is cancelled.
    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Build the chain from configuration, sharing one HTTP client.
    #[must_use]
    pub fn from_config(configs: &[ShortenerConfig], client: &Client) -> Self {
        let providers = configs
            .iter()
            .map(|config| {
                Box::new(Provider::from_config(config, client.clone())) as Box<dyn ShortenProvider>
            })
            .collect();
        Self::new(providers)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Shorten `url`, falling back through the providers.
    ///
    /// Never fails: when every provider fails the result carries the
    /// original URL and no provider.
    pub async fn shorten(&self, url: &str) -> ShortenResult {
        let mut attempted = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            if self.shutdown.is_cancelled() {
                tracing::debug!(url = %url, "Shutdown requested, skipping remaining shorteners");
                break;
            }

            let name = provider.name().to_string();
            attempted.push(name.clone());

            let attempt = tokio::time::timeout(provider.timeout(), provider.try_shorten(url));
            let result = tokio::select! {
                () = self.shutdown.cancelled() => break,
                result = attempt => result.unwrap_or(Err(ShortenError::Timeout)),
            };

            match result {
                Ok(short) => {
                    tracing::debug!(url = %url, short = %short, provider = %name, "URL shortened");
                    return ShortenResult {
                        original: url.to_string(),
                        shortened: Some(short),
                        provider: Some(name),
                        attempted,
                    };
                }
                Err(e) => {
                    tracing::warn!(url = %url, provider = %name, error = %e, "Shortener failed, trying next");
                }
            }
        }

        tracing::info!(url = %url, attempted = attempted.len(), "No shortener succeeded, using original URL");
        ShortenResult::unshortened(url, attempted)
    }
}
