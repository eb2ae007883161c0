//! Log file watching.
//!
//! Scope matching, per-file read cursors, change events, and the
//! coordinator that ties them to the pipeline.

mod coordinator;
mod error;
mod event;
mod file_id;
mod matcher;
mod offset;

pub use coordinator::{CoordinatorOptions, CoordinatorState, WatchCoordinator};
pub use error::WatcherError;
pub use event::{FileEvent, FileEventKind};
pub use file_id::FileId;
pub use matcher::{watch_targets, PatternMatcher, WatchTarget};
pub use offset::{Discovery, FileCursor, NewContent, OffsetTracker};
