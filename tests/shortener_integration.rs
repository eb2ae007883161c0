//! Integration tests for the shortener chain against mock providers.

use std::time::Duration;

use reqwest::Client;
use tunnel_notifier::config::{ShortenerConfig, ShortenerKind};
use tunnel_notifier::shortener::{BitlyProvider, ShortenError, ShortenProvider, ShortenerChain};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LONG_URL: &str = "https://abc123.trycloudflare.com";

fn provider(kind: ShortenerKind, server: &MockServer) -> ShortenerConfig {
    ShortenerConfig {
        base_url: Some(server.uri()),
        timeout_secs: 5,
        ..ShortenerConfig::new(kind)
    }
}

#[tokio::test]
async fn test_tinyurl_returns_plain_text_short_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api-create.php"))
        .and(query_param("url", LONG_URL))
        .respond_with(ResponseTemplate::new(200).set_body_string("https://tinyurl.com/abc123\n"))
        .expect(1)
        .mount(&server)
        .await;

    let chain = ShortenerChain::from_config(&[provider(ShortenerKind::TinyUrl, &server)], &Client::new());
    let result = chain.shorten(LONG_URL).await;

    assert_eq!(result.shortened.as_deref(), Some("https://tinyurl.com/abc123"));
    assert_eq!(result.provider.as_deref(), Some("tinyurl"));
    assert_eq!(result.original, LONG_URL);
}

#[tokio::test]
async fn test_isgd_requests_simple_format() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/create.php"))
        .and(query_param("format", "simple"))
        .and(query_param("url", LONG_URL))
        .respond_with(ResponseTemplate::new(200).set_body_string("https://is.gd/xyz"))
        .mount(&server)
        .await;

    let chain = ShortenerChain::from_config(&[provider(ShortenerKind::IsGd, &server)], &Client::new());
    assert_eq!(chain.shorten(LONG_URL).await.url(), "https://is.gd/xyz");
}

#[tokio::test]
async fn test_chain_falls_back_past_error_and_malformed_responses() {
    let server = MockServer::start().await;
    Mock::given(path("/api-create.php"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/create.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Error: Please enter a valid URL"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/s"))
        .and(query_param("url", LONG_URL))
        .respond_with(ResponseTemplate::new(200).set_body_string("https://da.gd/q1"))
        .expect(1)
        .mount(&server)
        .await;

    let configs = [
        provider(ShortenerKind::TinyUrl, &server),
        provider(ShortenerKind::IsGd, &server),
        provider(ShortenerKind::DaGd, &server),
    ];
    let result = ShortenerChain::from_config(&configs, &Client::new())
        .shorten(LONG_URL)
        .await;

    assert_eq!(result.provider.as_deref(), Some("dagd"));
    assert_eq!(result.url(), "https://da.gd/q1");
    assert_eq!(result.attempted, vec!["tinyurl", "isgd", "dagd"]);
}

#[tokio::test]
async fn test_chain_returns_original_when_every_provider_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let configs = [
        provider(ShortenerKind::TinyUrl, &server),
        provider(ShortenerKind::ChilpIt, &server),
    ];
    let result = ShortenerChain::from_config(&configs, &Client::new())
        .shorten(LONG_URL)
        .await;

    assert_eq!(result.url(), LONG_URL);
    assert!(!result.url().is_empty());
    assert_eq!(result.provider, None);
    assert_eq!(result.attempted, vec!["tinyurl", "chilpit"]);
}

#[tokio::test]
async fn test_slow_provider_times_out_and_chain_advances() {
    let server = MockServer::start().await;
    Mock::given(path("/api-create.php"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("https://tinyurl.com/late")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;
    Mock::given(path("/s"))
        .respond_with(ResponseTemplate::new(200).set_body_string("https://da.gd/fast"))
        .mount(&server)
        .await;

    let mut slow = provider(ShortenerKind::TinyUrl, &server);
    slow.timeout_secs = 1;
    let configs = [slow, provider(ShortenerKind::DaGd, &server)];
    let result = ShortenerChain::from_config(&configs, &Client::new())
        .shorten(LONG_URL)
        .await;

    assert_eq!(result.provider.as_deref(), Some("dagd"));
}

#[tokio::test]
async fn test_bitly_sends_bearer_token_and_reads_link() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v4/shorten"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_json(serde_json::json!({ "long_url": LONG_URL })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "link": "https://bit.ly/3abc" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let bitly = BitlyProvider::new(
        &server.uri(),
        "BITLY_TOKEN".to_string(),
        Some("test-token".to_string()),
        Duration::from_secs(5),
        Client::new(),
    );
    assert_eq!(bitly.try_shorten(LONG_URL).await, Ok("https://bit.ly/3abc".to_string()));
}

#[tokio::test]
async fn test_bitly_rejection_is_a_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let bitly = BitlyProvider::new(
        &server.uri(),
        "BITLY_TOKEN".to_string(),
        Some("bad".to_string()),
        Duration::from_secs(5),
        Client::new(),
    );
    assert_eq!(bitly.try_shorten(LONG_URL).await, Err(ShortenError::Status(403)));
}
