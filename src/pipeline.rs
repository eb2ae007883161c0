//! Extraction, dedup, shortening and delivery for one block of new content.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::dedup::{SeenSet, SeenUrls};
use crate::extract::{Candidate, UrlExtractor};
use crate::notifier::{DeliveryReport, NotificationPayload, Notifier};
use crate::shortener::{ShortenResult, ShortenerChain};
use crate::watcher::NewContent;

/// Running totals across all processed content.
#[derive(Debug, Default)]
pub struct PipelineStats {
    blocks: AtomicU64,
    candidates: AtomicU64,
    duplicates: AtomicU64,
    notified: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Blocks of new content processed.
    pub blocks: u64,
    /// URLs extracted, including duplicates.
    pub candidates: u64,
    /// URLs skipped because they were already seen.
    pub duplicates: u64,
    /// Novel URLs delivered to at least one endpoint.
    pub notified: u64,
    /// Novel URLs no endpoint accepted.
    pub failed: u64,
}

impl PipelineStats {
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            blocks: self.blocks.load(Ordering::Relaxed),
            candidates: self.candidates.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            notified: self.notified.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// A novel URL and what happened to it.
#[derive(Debug, Clone)]
pub struct Detection {
    pub candidate: Candidate,
    pub shortened: ShortenResult,
    pub reports: Vec<DeliveryReport>,
}

impl Detection {
    /// Whether at least one endpoint accepted the notification.
    #[must_use]
    pub fn delivered(&self) -> bool {
        self.reports.iter().any(|r| r.outcome.is_delivered())
    }
}

/// Drives new content through extraction, dedup, shortening and delivery.
#[derive(Debug)]
pub struct Pipeline {
    extractor: UrlExtractor,
    seen: Arc<dyn SeenUrls>,
    shortener: ShortenerChain,
    notifier: Notifier,
    stats: PipelineStats,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        extractor: UrlExtractor,
        seen: Arc<dyn SeenUrls>,
        shortener: ShortenerChain,
        notifier: Notifier,
    ) -> Self {
        Self {
            extractor,
            seen,
            shortener,
            notifier,
            stats: PipelineStats::default(),
        }
    }

    /// Build the pipeline from configuration.
    ///
    /// `shutdown` makes in-flight shortening and delivery retries give up.
    #[must_use]
    pub fn from_config(config: &Config, client: &Client, shutdown: &CancellationToken) -> Self {
        let shortener =
            ShortenerChain::from_config(&config.shorteners, client).with_shutdown(shutdown.clone());
        let notifier = Notifier::from_config(config, client.clone()).with_shutdown(shutdown.clone());
        Self::new(UrlExtractor::new(), Arc::new(SeenSet::new()), shortener, notifier)
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    #[must_use]
    pub fn seen(&self) -> &Arc<dyn SeenUrls> {
        &self.seen
    }

    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Process one block of newly appended content.
    ///
    /// Candidates are handled in extraction order. Failures are logged per
    /// URL and never abort the block.
    pub async fn process(&self, content: &NewContent) -> Vec<Detection> {
        PipelineStats::bump(&self.stats.blocks);
        let text = content.text();
        let mut detections = Vec::new();

        for candidate in self.extractor.extract(&text, &content.path) {
            PipelineStats::bump(&self.stats.candidates);

            if !self.seen.check_and_mark(&candidate.url) {
                PipelineStats::bump(&self.stats.duplicates);
                tracing::debug!(url = %candidate.url, path = %content.path.display(), "Skipping known URL");
                continue;
            }

            tracing::info!(
                url = %candidate.url,
                path = %content.path.display(),
                line = candidate.line_number,
                shape = %candidate.shape,
                "New tunnel URL detected"
            );
            detections.push(self.announce(candidate).await);
        }

        detections
    }

    async fn announce(&self, candidate: Candidate) -> Detection {
        let shortened = self.shortener.shorten(&candidate.url).await;
        let payload = NotificationPayload::from_detection(&candidate, &shortened);
        let reports = self.notifier.notify(&payload).await;

        let detection = Detection {
            candidate,
            shortened,
            reports,
        };
        if detection.delivered() {
            PipelineStats::bump(&self.stats.notified);
        } else if !detection.reports.is_empty() {
            PipelineStats::bump(&self.stats.failed);
            tracing::warn!(url = %detection.candidate.url, "No endpoint accepted the notification");
        }
        detection
    }
}
