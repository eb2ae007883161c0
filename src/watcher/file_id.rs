//! File identity tokens used to detect rotation.
//!
//! The identity survives renames but changes when a path is replaced by a
//! new file, which is what log rotation does.

use std::fs::Metadata;

/// Identity of a file independent of its path.
///
/// Device and inode on Unix; elsewhere the creation time stands in for the
/// inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    #[must_use]
    pub fn new(dev: u64, ino: u64) -> Self {
        Self { dev, ino }
    }

    #[cfg(unix)]
    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    #[cfg(not(unix))]
    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let created = metadata
            .created()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));
        Self {
            dev: 0,
            ino: created,
        }
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.dev, self.ino)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_display() {
        assert_eq!(FileId::new(8, 1234).to_string(), "8:1234");
    }

    #[test]
    fn test_same_file_same_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tunnel.log");
        std::fs::write(&path, "a").unwrap();

        let first = FileId::from_metadata(&std::fs::metadata(&path).unwrap());
        std::fs::write(&path, "ab").unwrap();
        let second = FileId::from_metadata(&std::fs::metadata(&path).unwrap());
        assert_eq!(first, second);
    }

    #[cfg(unix)]
    #[test]
    fn test_rename_keeps_id_and_replacement_changes_it() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tunnel.log");
        let rotated = dir.path().join("tunnel.log.1");
        std::fs::write(&path, "old").unwrap();
        let original = FileId::from_metadata(&std::fs::metadata(&path).unwrap());

        std::fs::rename(&path, &rotated).unwrap();
        std::fs::write(&path, "new").unwrap();

        let moved = FileId::from_metadata(&std::fs::metadata(&rotated).unwrap());
        let replacement = FileId::from_metadata(&std::fs::metadata(&path).unwrap());
        assert_eq!(original, moved);
        assert_ne!(original, replacement);
    }
}
