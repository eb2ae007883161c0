//! Watcher error types.

use std::path::PathBuf;

/// Errors that can occur while tracking and reading watched files.
#[derive(thiserror::Error, Debug)]
pub enum WatcherError {
    /// Watched file was deleted.
    #[error("Watched file deleted: {}", .0.display())]
    FileDeleted(PathBuf),

    /// Permission denied accessing file.
    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    /// Path exists but is not a regular file.
    #[error("Not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    /// Configured watch root is missing or unreadable.
    #[error("Watch directory not found: {}", .0.display())]
    MissingRoot(PathBuf),

    /// A watch root was deleted or moved away while watching.
    #[error("Watch directory removed: {}", .0.display())]
    RootRemoved(PathBuf),

    /// Filename pattern could not be compiled.
    #[error("Invalid filename pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Notify watcher error.
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The filesystem event stream ended without a shutdown request.
    #[error("File watcher stopped unexpectedly")]
    SubscriptionClosed,
}

impl WatcherError {
    /// Classify an error from opening or reading `path`.
    #[must_use]
    pub fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::FileDeleted(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }

    /// Whether this error comes from bad configuration rather than the
    /// watch facility.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::MissingRoot(_) | Self::InvalidPattern { .. })
    }
}
