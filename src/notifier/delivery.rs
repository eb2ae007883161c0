//! Webhook delivery with per-endpoint retry and isolation.

use std::time::Duration;

use futures_util::future::join_all;
use reqwest::Client;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::error::DeliveryError;
use super::format::build_body;
use super::payload::NotificationPayload;
use super::retry::RetryPolicy;
use crate::config::{Config, WebhookConfig, WebhookKind};

/// A configured webhook destination.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEndpoint {
    pub url: String,
    pub kind: WebhookKind,
    pub username: String,
    label: String,
}

impl WebhookEndpoint {
    #[must_use]
    pub fn from_config(config: &WebhookConfig) -> Self {
        let label = config.name.clone().unwrap_or_else(|| {
            url::Url::parse(&config.url)
                .ok()
                .and_then(|u| u.host_str().map(String::from))
                .unwrap_or_else(|| "webhook".to_string())
        });
        Self {
            url: config.url.clone(),
            kind: config.kind,
            username: config.username.clone(),
            label,
        }
    }

    /// Name used in logs. Never the full URL, which may embed a secret.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Final result of delivering to one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    /// The endpoint answered with a client error; not retried.
    Rejected { status: u16 },
    Exhausted { attempts: u32, last_error: DeliveryError },
    /// Shutdown was requested before delivery finished.
    Cancelled { attempts: u32 },
}

impl DeliveryOutcome {
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Number of HTTP attempts made.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Delivered { attempts }
            | Self::Exhausted { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
            Self::Rejected { .. } => 1,
        }
    }
}

impl std::fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Delivered { attempts: 1 } => write!(f, "delivered"),
            Self::Delivered { attempts } => write!(f, "delivered after {attempts} attempts"),
            Self::Rejected { status } => write!(f, "rejected with HTTP {status}"),
            Self::Exhausted {
                attempts,
                last_error,
            } => write!(f, "failed after {attempts} attempts: {last_error}"),
            Self::Cancelled { .. } => write!(f, "cancelled"),
        }
    }
}

/// Outcome for one endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    pub endpoint: String,
    pub outcome: DeliveryOutcome,
}

/// Delivers payloads to every configured endpoint.
#[derive(Debug, Clone)]
pub struct Notifier {
    client: Client,
    endpoints: Vec<WebhookEndpoint>,
    policy: RetryPolicy,
    shutdown: CancellationToken,
}

impl Notifier {
    #[must_use]
    pub fn new(client: Client, endpoints: Vec<WebhookEndpoint>, policy: RetryPolicy) -> Self {
        Self {
            client,
            endpoints,
            policy,
            shutdown: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config, client: Client) -> Self {
        let endpoints = config.webhooks.iter().map(WebhookEndpoint::from_config).collect();
        Self::new(client, endpoints, RetryPolicy::from_config(&config.retry))
    }

    /// Abandon in-flight retries once `token` is cancelled.
    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    #[must_use]
    pub fn endpoints(&self) -> &[WebhookEndpoint] {
        &self.endpoints
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliver `payload` to every endpoint concurrently.
    ///
    /// Returns one report per endpoint, in configuration order. Failures
    /// are reported, never raised.
    pub async fn notify(&self, payload: &NotificationPayload) -> Vec<DeliveryReport> {
        let deliveries = self.endpoints.iter().map(|endpoint| async move {
            let body = build_body(endpoint.kind, &endpoint.username, payload);
            let outcome = self.deliver(endpoint, &body).await;
            match &outcome {
                DeliveryOutcome::Delivered { attempts } => {
                    tracing::info!(endpoint = endpoint.label(), attempts, "Notification delivered");
                }
                DeliveryOutcome::Rejected { status } => {
                    tracing::error!(endpoint = endpoint.label(), status, "Webhook rejected notification");
                }
                DeliveryOutcome::Exhausted {
                    attempts,
                    last_error,
                } => {
                    tracing::error!(
                        endpoint = endpoint.label(),
                        attempts,
                        error = %last_error,
                        "Notification delivery failed"
                    );
                }
                DeliveryOutcome::Cancelled { attempts } => {
                    tracing::info!(endpoint = endpoint.label(), attempts, "Notification delivery cancelled");
                }
            }
            DeliveryReport {
                endpoint: endpoint.label().to_string(),
                outcome,
            }
        });
        join_all(deliveries).await
    }

    async fn deliver(&self, endpoint: &WebhookEndpoint, body: &Value) -> DeliveryOutcome {
        let mut attempt = 0;
        loop {
            if self.shutdown.is_cancelled() {
                return DeliveryOutcome::Cancelled { attempts: attempt };
            }
            attempt += 1;

            let result = tokio::select! {
                () = self.shutdown.cancelled() => {
                    return DeliveryOutcome::Cancelled { attempts: attempt };
                }
                result = self.send_once(endpoint, body) => result,
            };

            let error = match result {
                Ok(()) => return DeliveryOutcome::Delivered { attempts: attempt },
                Err(DeliveryError::Status(status)) if (400..500).contains(&status) => {
                    return DeliveryOutcome::Rejected { status };
                }
                Err(e) => e,
            };

            if !self.policy.should_retry(error.status(), attempt) {
                return DeliveryOutcome::Exhausted {
                    attempts: attempt,
                    last_error: error,
                };
            }

            let backoff = self.policy.backoff(attempt);
            tracing::warn!(
                endpoint = endpoint.label(),
                attempt,
                error = %error,
                backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                "Webhook delivery failed, retrying"
            );
            if !self.sleep(backoff).await {
                return DeliveryOutcome::Cancelled { attempts: attempt };
            }
        }
    }

    async fn send_once(&self, endpoint: &WebhookEndpoint, body: &Value) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&endpoint.url)
            .json(body)
            .timeout(self.policy.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Status(status.as_u16()))
        }
    }

    /// Sleep unless shutdown comes first. Returns `false` on shutdown.
    async fn sleep(&self, delay: Duration) -> bool {
        tokio::select! {
            () = self.shutdown.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }
}
