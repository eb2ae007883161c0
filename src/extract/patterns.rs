//! Recognized tunnel URL shapes.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which rule recognized a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlShape {
    /// Quick tunnels: `https://<name>.trycloudflare.com`.
    TunnelSubdomain,
    /// Workers: `https://<worker>.<account>.workers.dev`.
    WorkerSubdomain,
    /// Named tunnels: `https://<uuid>.cfargotunnel.com`.
    TunnelId,
    /// Hosts with a `tunnel` label or a `tunnel-` prefix.
    TunnelHost,
    /// Any https URL on a line that mentions a tunnel keyword.
    Keyword,
}

impl std::fmt::Display for UrlShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::TunnelSubdomain => "tunnel-subdomain",
            Self::WorkerSubdomain => "worker-subdomain",
            Self::TunnelId => "tunnel-id",
            Self::TunnelHost => "tunnel-host",
            Self::Keyword => "keyword",
        };
        f.write_str(name)
    }
}

/// A compiled URL rule.
#[derive(Debug, Clone)]
pub(crate) struct UrlRule {
    pub shape: UrlShape,
    pub pattern: Regex,
}

impl UrlRule {
    fn new(shape: UrlShape, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            shape,
            pattern: Regex::new(pattern)?,
        })
    }
}

/// Host-shaped rules, applied to every line.
pub(crate) fn host_rules() -> Vec<UrlRule> {
    [
        UrlRule::new(
            UrlShape::TunnelSubdomain,
            r"(?i)https://[\w-]+\.trycloudflare\.com",
        ),
        UrlRule::new(
            UrlShape::WorkerSubdomain,
            r"(?i)https://[\w-]+\.[\w-]+\.workers\.dev",
        ),
        UrlRule::new(
            UrlShape::TunnelId,
            r"(?i)https://[\w.-]+\.cfargotunnel\.com",
        ),
        UrlRule::new(UrlShape::TunnelHost, r"(?i)https://[\w.-]+\.tunnel\.[\w.-]+"),
        UrlRule::new(UrlShape::TunnelHost, r"(?i)https://tunnel-[\w-]+\.[\w.-]+"),
    ]
    .into_iter()
    .filter_map(|result| match result {
        Ok(rule) => Some(rule),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to compile tunnel URL rule");
            None
        }
    })
    .collect()
}

/// Keyword that makes any https URL on the same line a candidate.
pub(crate) fn keyword_pattern() -> Result<Regex, regex::Error> {
    Regex::new(r"(?i)\b(?:tunnel|tunnels|endpoint|url)\b")
}

/// Generic https URL (host and optional port) used by the keyword rule.
pub(crate) fn generic_url_pattern() -> Result<Regex, regex::Error> {
    Regex::new(r"(?i)https://[\w.-]+(?::\d+)?")
}
