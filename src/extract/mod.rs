//! Tunnel URL extraction from log text.

mod extractor;
mod patterns;

pub use extractor::{Candidate, UrlExtractor};
pub use patterns::UrlShape;
