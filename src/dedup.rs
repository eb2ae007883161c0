//! Process-lifetime record of URLs already announced.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use url::Url;

/// Capability to remember which URLs have been notified.
pub trait SeenUrls: Send + Sync + std::fmt::Debug {
    /// Whether `url` has not been seen yet.
    fn is_novel(&self, url: &str) -> bool;

    /// Record `url` as seen.
    fn mark_seen(&self, url: &str);

    /// Check and record in one step; `true` means the caller owns `url`.
    ///
    /// Two concurrent callers with the same URL never both get `true`.
    fn check_and_mark(&self, url: &str) -> bool;

    /// Number of distinct URLs recorded.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Normalize a URL for comparison.
///
/// Lowercases scheme and host, drops default ports and a trailing slash.
#[must_use]
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(url) => {
            let plain = url.query().is_none() && url.fragment().is_none();
            let serialized = String::from(url);
            if plain {
                serialized.trim_end_matches('/').to_string()
            } else {
                serialized
            }
        }
        Err(_) => raw.trim_end_matches('/').to_lowercase(),
    }
}

/// Set of seen URLs behind a single lock.
#[derive(Debug, Default)]
pub struct SeenSet {
    urls: Mutex<HashSet<String>>,
}

impl SeenSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_urls<T>(&self, f: impl FnOnce(&mut HashSet<String>) -> T) -> T {
        let mut urls = self.urls.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut urls)
    }
}

impl SeenUrls for SeenSet {
    fn is_novel(&self, url: &str) -> bool {
        let key = normalize_url(url);
        self.with_urls(|urls| !urls.contains(&key))
    }

    fn mark_seen(&self, url: &str) {
        let key = normalize_url(url);
        self.with_urls(|urls| urls.insert(key));
    }

    fn check_and_mark(&self, url: &str) -> bool {
        let key = normalize_url(url);
        self.with_urls(|urls| urls.insert(key))
    }

    fn len(&self) -> usize {
        self.with_urls(|urls| urls.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_normalize_case_and_trailing_slash() {
        assert_eq!(
            normalize_url("HTTPS://ABC123.TryCloudflare.com/"),
            "https://abc123.trycloudflare.com"
        );
        assert_eq!(
            normalize_url("https://abc123.trycloudflare.com"),
            "https://abc123.trycloudflare.com"
        );
    }

    #[test]
    fn test_normalize_default_port() {
        assert_eq!(
            normalize_url("https://abc.trycloudflare.com:443"),
            "https://abc.trycloudflare.com"
        );
        assert_eq!(
            normalize_url("https://abc.example.com:8443"),
            "https://abc.example.com:8443"
        );
    }

    #[test]
    fn test_normalize_keeps_path_case() {
        assert_eq!(
            normalize_url("https://Example.com/Path/"),
            "https://example.com/Path"
        );
    }

    #[test]
    fn test_normalize_unparseable() {
        assert_eq!(normalize_url("Not A URL/"), "not a url");
    }

    #[test]
    fn test_is_novel_then_mark() {
        let seen = SeenSet::new();
        let url = "https://abc123.trycloudflare.com";

        assert!(seen.is_novel(url));
        seen.mark_seen(url);
        assert!(!seen.is_novel(url));
        seen.mark_seen(url);
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_variants_share_an_entry() {
        let seen = SeenSet::new();
        assert!(seen.check_and_mark("https://abc123.trycloudflare.com"));
        assert!(!seen.check_and_mark("HTTPS://ABC123.trycloudflare.com/"));
        assert!(!seen.is_novel("https://abc123.TRYCLOUDFLARE.com:443/"));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_concurrent_check_and_mark_has_one_winner() {
        let seen = Arc::new(SeenSet::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seen = Arc::clone(&seen);
                std::thread::spawn(move || seen.check_and_mark("https://race.trycloudflare.com"))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_empty() {
        let seen = SeenSet::new();
        assert!(seen.is_empty());
        seen.mark_seen("https://a.trycloudflare.com");
        assert!(!seen.is_empty());
    }
}
