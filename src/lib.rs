//! Tunnel Notifier - watch logs for tunnel URLs and announce them.

pub mod config;
pub mod dedup;
pub mod display;
pub mod extract;
pub mod http;
pub mod notifier;
pub mod pipeline;
pub mod shortener;
pub mod watcher;
