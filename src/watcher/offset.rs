//! Per-file read cursors.
//!
//! Tracks how far each watched file has been read and hands out only the
//! bytes appended since, resetting on truncation or rotation. Only whole
//! lines are handed out; a trailing partial line waits for its newline.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

use super::error::WatcherError;
use super::file_id::FileId;

/// Longest partial line held back before it is released as-is.
const MAX_PARTIAL_LINE: usize = 64 * 1024;

/// How a file first came to the tracker's attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discovery {
    /// Found by the startup sweep; its whole content is new.
    Scan,
    /// Created while watching; everything in it was written after discovery.
    Created,
    /// A pre-existing file that changed; only later appends are new.
    Modified,
}

impl Discovery {
    fn initial_offset(self, size: u64) -> u64 {
        match self {
            Self::Scan | Self::Created => 0,
            Self::Modified => size,
        }
    }
}

/// Read position for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCursor {
    pub path: PathBuf,
    pub offset: u64,
    pub id: FileId,
    pub last_size: u64,
    /// Bytes after the last newline read so far.
    pub partial: Vec<u8>,
}

/// Bytes appended to a file since its previous read.
#[derive(Debug, Clone)]
pub struct NewContent {
    pub path: PathBuf,
    /// Offset of the first byte in `bytes`.
    pub start: u64,
    /// Complete lines, starting with any partial line held from the
    /// previous read.
    pub bytes: Vec<u8>,
}

impl NewContent {
    /// Offset one past the last byte read.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.start + self.bytes.len() as u64
    }

    /// Content as text, replacing invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// Cursors keyed by file identity, with a path index on top.
#[derive(Debug, Default)]
struct CursorTable {
    cursors: HashMap<FileId, FileCursor>,
    paths: HashMap<PathBuf, FileId>,
}

impl CursorTable {
    /// Decide where reading starts and move the cursor to `size`.
    ///
    /// Returns the start offset and the partial line carried over from the
    /// previous read, which is dropped on rotation or truncation.
    fn advance(
        &mut self,
        path: &Path,
        id: FileId,
        size: u64,
        discovery: Discovery,
    ) -> (u64, Vec<u8>) {
        let known = self.paths.get(path).copied();
        let previous = match known {
            Some(old) if old != id => {
                tracing::info!(path = %path.display(), old = %old, new = %id, "File rotated, reading from start");
                self.cursors.remove(&old);
                Some((0, Vec::new()))
            }
            // Same path and identity, or a tracked file renamed onto this path.
            _ => self
                .cursors
                .get_mut(&id)
                .map(|c| (c.offset, std::mem::take(&mut c.partial))),
        };

        let resume = match previous {
            Some((offset, _)) if size < offset => {
                tracing::warn!(
                    path = %path.display(),
                    old_offset = offset,
                    new_len = size,
                    "File truncated, resetting offset to 0"
                );
                (0, Vec::new())
            }
            Some(resume) => resume,
            None => (discovery.initial_offset(size), Vec::new()),
        };

        if let Some(cursor) = self.cursors.get(&id) {
            if cursor.path != path {
                self.paths.remove(&cursor.path);
            }
        }
        self.paths.insert(path.to_path_buf(), id);
        self.cursors.insert(
            id,
            FileCursor {
                path: path.to_path_buf(),
                offset: size,
                id,
                last_size: size,
                partial: Vec::new(),
            },
        );
        resume
    }

    fn hold(&mut self, id: FileId, partial: Vec<u8>) {
        if let Some(cursor) = self.cursors.get_mut(&id) {
            cursor.partial = partial;
        }
    }

    fn forget(&mut self, path: &Path) -> Option<FileCursor> {
        let id = self.paths.remove(path)?;
        self.cursors.remove(&id)
    }
}

/// Tracks read offsets for every known file.
///
/// Calls for the same path must not overlap; the coordinator routes each
/// path to a single worker. Calls for different paths may run concurrently.
#[derive(Debug, Default)]
pub struct OffsetTracker {
    table: Mutex<CursorTable>,
}

impl OffsetTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a change notification for `path`.
    ///
    /// Returns the newly appended bytes, or `None` when nothing is new or
    /// the file could not be read. Read failures are logged and drop the
    /// file's cursor.
    pub async fn on_event(&self, path: &Path, discovery: Discovery) -> Option<NewContent> {
        match self.read_new(path, discovery).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Dropping unreadable file");
                self.forget(path).await;
                None
            }
        }
    }

    /// Read bytes appended to `path` since the last call.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    pub async fn read_new(
        &self,
        path: &Path,
        discovery: Discovery,
    ) -> Result<Option<NewContent>, WatcherError> {
        let mut file = File::open(path)
            .await
            .map_err(|e| WatcherError::from_io(path, e))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| WatcherError::from_io(path, e))?;
        if !metadata.is_file() {
            return Err(WatcherError::NotAFile(path.to_path_buf()));
        }

        let id = FileId::from_metadata(&metadata);
        let size = metadata.len();
        let (start, mut bytes) = self.table.lock().await.advance(path, id, size, discovery);
        let carried = bytes.len() as u64;

        if start < size {
            file.seek(std::io::SeekFrom::Start(start)).await?;
            (&mut file).take(size - start).read_to_end(&mut bytes).await?;
        }

        let partial = bytes.split_off(complete_len(&bytes));
        if !partial.is_empty() {
            tracing::trace!(path = %path.display(), len = partial.len(), "Holding partial line");
            self.table.lock().await.hold(id, partial);
        }
        if bytes.is_empty() {
            return Ok(None);
        }

        let start = start.saturating_sub(carried);
        tracing::debug!(
            path = %path.display(),
            start,
            end = start + bytes.len() as u64,
            "Read new content"
        );
        Ok(Some(NewContent {
            path: path.to_path_buf(),
            start,
            bytes,
        }))
    }

    /// Drop the cursor for `path` (deleted or moved out of scope).
    pub async fn forget(&self, path: &Path) -> Option<FileCursor> {
        let removed = self.table.lock().await.forget(path);
        if removed.is_some() {
            tracing::debug!(path = %path.display(), "Evicted file cursor");
        }
        removed
    }

    /// Re-key the cursor for `from` under `to`, keeping its offset.
    ///
    /// Returns `false` if `from` had no cursor. In that case any cursor
    /// already at `to` is left in place, so a file moved over a tracked log
    /// is seen as a rotation on the next read.
    pub async fn rename(&self, from: &Path, to: &Path) -> bool {
        let mut table = self.table.lock().await;
        let Some(id) = table.paths.remove(from) else {
            return false;
        };
        if let Some(replaced) = table.paths.insert(to.to_path_buf(), id) {
            if replaced != id {
                table.cursors.remove(&replaced);
            }
        }
        if let Some(cursor) = table.cursors.get_mut(&id) {
            cursor.path = to.to_path_buf();
        }
        true
    }

    /// Snapshot of the cursor for `path`.
    pub async fn cursor(&self, path: &Path) -> Option<FileCursor> {
        let table = self.table.lock().await;
        let id = table.paths.get(path)?;
        table.cursors.get(id).cloned()
    }

    /// Number of files currently tracked.
    pub async fn len(&self) -> usize {
        self.table.lock().await.cursors.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Length of the prefix of `bytes` that ends in a newline. An overlong
/// unterminated tail counts as complete.
fn complete_len(bytes: &[u8]) -> usize {
    let complete = bytes.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
    if bytes.len() - complete > MAX_PARTIAL_LINE {
        bytes.len()
    } else {
        complete
    }
}
