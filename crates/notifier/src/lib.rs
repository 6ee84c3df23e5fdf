//! PiClaim Notifier
//!
//! Best-effort operator notifications. Delivery never fails the caller:
//! errors are logged and dropped, and a notifier without credentials is a
//! silent no-op.

mod memory;
pub mod messages;
mod telegram;

pub use memory::MemoryNotifier;
pub use telegram::{TelegramConfig, TelegramNotifier, DEFAULT_TELEGRAM_API_URL};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotifyError {
    #[error("Notifier not configured")]
    Disabled,

    #[error("Delivery failed: {0}")]
    Transport(String),

    #[error("Delivery rejected with HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

pub type Result<T> = std::result::Result<T, NotifyError>;

/// Outbound channel for operator-facing status messages
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `message`. Failures are logged, never returned.
    async fn notify(&self, message: &str);
}
