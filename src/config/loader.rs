//! Configuration file loader.

use std::path::{Path, PathBuf};

use super::{Config, DirectoryEntry, WebhookConfig};

/// Name of the per-directory config file.
pub const LOCAL_CONFIG_FILE: &str = ".tunnel-notifier.toml";

/// Environment variable that adds a Discord webhook at load time.
pub const DISCORD_WEBHOOK_ENV: &str = "DISCORD_WEBHOOK_URL";

/// Configuration loader that searches multiple locations.
#[derive(Debug)]
pub struct ConfigLoader {
    /// Search paths in order of priority.
    search_paths: Vec<PathBuf>,
    /// Whether the first search path was given explicitly and must exist.
    explicit: bool,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths.
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        // 1. Current directory: .tunnel-notifier.toml
        search_paths.push(PathBuf::from(LOCAL_CONFIG_FILE));

        // 2. User config directory: ~/.config/tunnel-notifier/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("tunnel-notifier").join("config.toml"));
        }

        Self {
            search_paths,
            explicit: false,
        }
    }

    /// Create a config loader for a specific config file, which must exist.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
            explicit: true,
        }
    }

    /// Load configuration from the first available file, or return defaults.
    ///
    /// Environment overrides are applied and `~` is expanded in watch
    /// directories. The result is not validated; call [`Config::validate`].
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or an
    /// explicitly requested file does not exist.
    pub fn load(&self) -> Result<Config, ConfigError> {
        let mut config = match self.find_config_file() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading config file");
                Self::load_from_path(&path)?
            }
            None if self.explicit => {
                return Err(ConfigError::NotFound(self.search_paths[0].clone()));
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                Config::default()
            }
        };

        config.apply_discord_webhook(std::env::var(DISCORD_WEBHOOK_ENV).ok());
        config.expand_home();
        Ok(config)
    }

    /// Load configuration from a specific path.
    fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the search paths for debugging.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Find the first config file that exists.
    #[must_use]
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths.iter().find(|p| p.exists()).cloned()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Write the default configuration to `path`.
///
/// # Errors
///
/// Returns an error if the file already exists or cannot be written.
pub fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Err(ConfigError::AlreadyExists(path.to_path_buf()));
    }

    let content = toml::to_string_pretty(&Config::default())?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Expand a leading `~` to the user's home directory.
#[must_use]
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

impl Config {
    /// Add a Discord endpoint for `url` unless it is empty or already configured.
    pub fn apply_discord_webhook(&mut self, url: Option<String>) {
        let Some(url) = url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) else {
            return;
        };
        if self.webhooks.iter().any(|w| w.url == url) {
            return;
        }
        tracing::debug!(env = DISCORD_WEBHOOK_ENV, "Adding Discord webhook from environment");
        self.webhooks.push(WebhookConfig::discord(url));
    }

    fn expand_home(&mut self) {
        for entry in &mut self.watch.directories {
            let expanded = expand_home(entry.path());
            match entry {
                DirectoryEntry::Path(path) | DirectoryEntry::Detailed { path, .. } => {
                    *path = expanded;
                }
            }
        }
    }

    /// Check the configuration for errors that must stop startup.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let watch = &self.watch;
        if watch.directories.is_empty() {
            return Err(ConfigError::Invalid("no watch directories configured".into()));
        }
        for entry in &watch.directories {
            let path = entry.path();
            if !path.exists() {
                return Err(ConfigError::MissingDirectory(path.clone()));
            }
            if !path.is_dir() {
                return Err(ConfigError::Invalid(format!(
                    "watch path is not a directory: {}",
                    path.display()
                )));
            }
        }
        if watch.extensions.iter().all(|e| e.trim_start_matches('.').is_empty()) {
            return Err(ConfigError::Invalid("no file extensions configured".into()));
        }
        if watch.patterns.is_empty() {
            return Err(ConfigError::Invalid("no filename patterns configured".into()));
        }
        for pattern in &watch.patterns {
            glob::Pattern::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.msg.to_string(),
            })?;
        }
        if watch.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        for webhook in &self.webhooks {
            match url::Url::parse(&webhook.url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                _ => return Err(ConfigError::InvalidWebhook(webhook.url.clone())),
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    /// Validate and additionally require at least one webhook.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoWebhooks`] when nothing would be notified.
    pub fn validate_for_delivery(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.webhooks.is_empty() {
            return Err(ConfigError::NoWebhooks);
        }
        Ok(())
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read config file {}: {source}", .path.display())]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to write config file {}: {source}", .path.display())]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Config file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Watch directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("Invalid filename pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid webhook URL: {0}")]
    InvalidWebhook(String),

    #[error("No webhooks configured (set {DISCORD_WEBHOOK_ENV} or add [[webhooks]])")]
    NoWebhooks,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
