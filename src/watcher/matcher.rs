//! Watch-scope matching for log file paths.
//!
//! A path is in scope when it sits under a configured root, carries an
//! accepted extension, and its filename matches one of the glob patterns.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};

use super::error::WatcherError;
use crate::config::WatchConfig;

/// A directory to watch and whether to descend into subdirectories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub directory: PathBuf,
    pub recursive: bool,
}

impl WatchTarget {
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>, recursive: bool) -> Self {
        Self {
            directory: directory.into(),
            recursive,
        }
    }

    /// Whether `path` is located under this target's directory.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        if self.recursive {
            path != self.directory && path.starts_with(&self.directory)
        } else {
            path.parent() == Some(self.directory.as_path())
        }
    }
}

/// Resolve the configured directories into watch targets.
#[must_use]
pub fn watch_targets(config: &WatchConfig) -> Vec<WatchTarget> {
    config
        .directories
        .iter()
        .map(|entry| {
            WatchTarget::new(
                entry.path().clone(),
                entry.recursive().unwrap_or(config.recursive),
            )
        })
        .collect()
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Decides whether a filesystem path is in the watch scope.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    targets: Vec<WatchTarget>,
    /// Lowercased, without the leading dot.
    extensions: HashSet<String>,
    patterns: Vec<Pattern>,
}

impl PatternMatcher {
    /// Build a matcher from targets, extensions and filename globs.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::InvalidPattern`] if a glob does not compile.
    pub fn new<E, P>(targets: Vec<WatchTarget>, extensions: E, patterns: P) -> Result<Self, WatcherError>
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        let patterns = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                Pattern::new(p).map_err(|e| WatcherError::InvalidPattern {
                    pattern: p.to_string(),
                    reason: e.msg.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            targets,
            extensions,
            patterns,
        })
    }

    /// Build a matcher from the watch section of the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::InvalidPattern`] if a glob does not compile.
    pub fn from_config(config: &WatchConfig) -> Result<Self, WatcherError> {
        Self::new(watch_targets(config), &config.extensions, &config.patterns)
    }

    #[must_use]
    pub fn targets(&self) -> &[WatchTarget] {
        &self.targets
    }

    /// Whether `path` is under a root, has an accepted extension, and
    /// matches at least one filename pattern.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        self.in_root(path) && self.has_extension(path) && self.matches_name(path)
    }

    fn in_root(&self, path: &Path) -> bool {
        self.targets.iter().any(|t| t.contains(path))
    }

    fn has_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_lowercase()))
    }

    fn matches_name(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.patterns
            .iter()
            .any(|p| p.matches_with(name, MATCH_OPTIONS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(recursive: bool) -> PatternMatcher {
        PatternMatcher::new(
            vec![WatchTarget::new("/var/log", recursive)],
            [".log", "TXT"],
            ["*tunnel*", "cloudflared-?.out"],
        )
        .unwrap()
    }

    #[test]
    fn test_matches_requires_all_three_groups() {
        let m = matcher(false);
        assert!(m.matches(Path::new("/var/log/tunnel.log")));
        // Wrong root
        assert!(!m.matches(Path::new("/tmp/tunnel.log")));
        // Wrong extension
        assert!(!m.matches(Path::new("/var/log/tunnel.json")));
        // Name matches no pattern
        assert!(!m.matches(Path::new("/var/log/syslog.log")));
    }

    #[test]
    fn test_extensions_are_case_insensitive() {
        let m = matcher(false);
        assert!(m.matches(Path::new("/var/log/my-tunnel.LOG")));
        assert!(m.matches(Path::new("/var/log/my-tunnel.txt")));
    }

    #[test]
    fn test_patterns_are_ored() {
        let m = PatternMatcher::new(
            vec![WatchTarget::new("/logs", false)],
            ["out"],
            ["*tunnel*", "cloudflared-?.out"],
        )
        .unwrap();
        assert!(m.matches(Path::new("/logs/cloudflared-1.out")));
        assert!(m.matches(Path::new("/logs/tunnel.out")));
        // `?` matches exactly one character
        assert!(!m.matches(Path::new("/logs/cloudflared-12.out")));
    }

    #[test]
    fn test_non_recursive_only_matches_direct_children() {
        let m = matcher(false);
        assert!(!m.matches(Path::new("/var/log/nested/tunnel.log")));
    }

    #[test]
    fn test_recursive_matches_nested_files() {
        let m = matcher(true);
        assert!(m.matches(Path::new("/var/log/tunnel.log")));
        assert!(m.matches(Path::new("/var/log/a/b/c/tunnel.log")));
        assert!(!m.matches(Path::new("/var/logs/tunnel.log")));
    }

    #[test]
    fn test_roots_are_ored() {
        let m = PatternMatcher::new(
            vec![
                WatchTarget::new("/a", false),
                WatchTarget::new("/b", true),
            ],
            ["log"],
            ["*tunnel*"],
        )
        .unwrap();
        assert!(m.matches(Path::new("/a/tunnel.log")));
        assert!(m.matches(Path::new("/b/x/tunnel.log")));
        assert!(!m.matches(Path::new("/a/x/tunnel.log")));
    }

    #[test]
    fn test_pattern_does_not_match_directory_part() {
        let m = matcher(true);
        assert!(!m.matches(Path::new("/var/log/tunnel/app.log")));
    }

    #[test]
    fn test_empty_extension_set_matches_nothing() {
        let empty: [&str; 0] = [];
        let m = PatternMatcher::new(vec![WatchTarget::new("/var/log", true)], empty, ["*"])
            .unwrap();
        assert!(!m.matches(Path::new("/var/log/tunnel.log")));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let result = PatternMatcher::new(vec![], ["log"], ["[oops"]);
        assert!(matches!(result, Err(WatcherError::InvalidPattern { .. })));
    }

    #[test]
    fn test_watch_targets_use_global_recursive_default() {
        let toml = r#"
            recursive = false
            directories = ["/a", { path = "/b", recursive = true }]
        "#;
        let config: WatchConfig = toml::from_str(toml).unwrap();
        let targets = watch_targets(&config);
        assert_eq!(targets[0], WatchTarget::new("/a", false));
        assert_eq!(targets[1], WatchTarget::new("/b", true));
    }
}
