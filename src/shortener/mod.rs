//! URL shortening with ordered provider fallback.

mod chain;
mod error;
mod provider;

pub use chain::{ShortenResult, ShortenerChain};
pub use error::ShortenError;
pub use provider::{BitlyProvider, PlainTextProvider, Provider, ShortenProvider};
