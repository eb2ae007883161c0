//! Notification formatting and webhook delivery.

mod delivery;
mod error;
mod format;
mod payload;
mod retry;

pub use delivery::{DeliveryOutcome, DeliveryReport, Notifier, WebhookEndpoint};
pub use error::DeliveryError;
pub use format::{build_body, EMBED_COLOR};
pub use payload::{NotificationPayload, DETECTION_TITLE};
pub use retry::RetryPolicy;
