//! Line-oriented tunnel URL extraction.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use regex::Regex;

use super::patterns::{generic_url_pattern, host_rules, keyword_pattern, UrlRule, UrlShape};

/// A URL found in log text, not yet deduplicated.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub url: String,
    pub source: PathBuf,
    /// The line the URL was found on, without its line terminator.
    pub line: String,
    /// 1-based line number within the scanned block.
    pub line_number: usize,
    pub shape: UrlShape,
    pub detected_at: DateTime<Utc>,
}

/// A match inside one line before overlap resolution.
#[derive(Debug)]
struct Hit {
    start: usize,
    end: usize,
    shape: UrlShape,
}

/// Scans text for tunnel-shaped URLs.
#[derive(Debug, Clone)]
pub struct UrlExtractor {
    rules: Vec<UrlRule>,
    keyword: Option<Regex>,
    generic: Option<Regex>,
}

impl Default for UrlExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlExtractor {
    #[must_use]
    pub fn new() -> Self {
        let keyword = keyword_pattern()
            .inspect_err(|e| tracing::warn!(error = %e, "Failed to compile keyword rule"))
            .ok();
        let generic = generic_url_pattern()
            .inspect_err(|e| tracing::warn!(error = %e, "Failed to compile generic URL rule"))
            .ok();
        Self {
            rules: host_rules(),
            keyword,
            generic,
        }
    }

    /// Lazily extract candidates from `text`, in line order and then
    /// left-to-right within a line.
    pub fn extract<'a>(
        &'a self,
        text: &'a str,
        source: &'a Path,
    ) -> impl Iterator<Item = Candidate> + 'a {
        let detected_at = Utc::now();
        text.lines().enumerate().flat_map(move |(index, line)| {
            self.scan_line(line)
                .into_iter()
                .map(move |(url, shape)| Candidate {
                    url,
                    source: source.to_path_buf(),
                    line: line.to_string(),
                    line_number: index + 1,
                    shape,
                    detected_at,
                })
        })
    }

    /// Distinct URLs on one line with the rule that found each.
    fn scan_line(&self, line: &str) -> Vec<(String, UrlShape)> {
        if !line.contains("://") {
            return Vec::new();
        }

        let mut hits: Vec<Hit> = self
            .rules
            .iter()
            .flat_map(|rule| {
                rule.pattern.find_iter(line).map(|m| Hit {
                    start: m.start(),
                    end: m.end(),
                    shape: rule.shape,
                })
            })
            .collect();

        if let (Some(keyword), Some(generic)) = (&self.keyword, &self.generic) {
            if keyword.is_match(line) {
                hits.extend(generic.find_iter(line).map(|m| Hit {
                    start: m.start(),
                    end: m.end(),
                    shape: UrlShape::Keyword,
                }));
            }
        }

        // Earliest first; at equal starts the longest wins.
        hits.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

        let mut urls: Vec<(String, UrlShape)> = Vec::new();
        let mut covered = 0;
        for hit in hits {
            if hit.start < covered {
                continue;
            }
            covered = hit.end;
            let url = line[hit.start..hit.end].trim_end_matches(['.', '-']);
            if !urls.iter().any(|(seen, _)| seen == url) {
                urls.push((url.to_string(), hit.shape));
            }
        }
        urls
    }
}
