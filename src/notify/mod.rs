//! Notification delivery.
//!
//! - `TelegramNotifier`: Bot API `sendPhoto` over HTTPS (multipart upload).
//! - `LogNotifier`: logs instead of sending; used when no bot token is set.
//!
//! Deliveries are attempted once. A non-200 answer is reported as
//! `Delivery::Rejected` with the response body; transport failures are errors.

mod multipart;
pub mod telegram;

use anyhow::Result;
use std::path::Path;

pub use multipart::MultipartForm;
pub use telegram::{TelegramConfig, TelegramNotifier, DEFAULT_TELEGRAM_API};

/// Outcome of a delivery attempt that reached the endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Rejected { status: u16, body: String },
}

/// Channel that receives snapshot photos.
pub trait Notifier: Send {
    fn name(&self) -> &'static str;

    /// Upload the photo at `photo` with an optional caption.
    fn send_photo(&mut self, photo: &Path, caption: Option<&str>) -> Result<Delivery>;
}

/// Notifier that only logs.
#[derive(Debug, Default)]
pub struct LogNotifier {
    sent: u64,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    fn send_photo(&mut self, photo: &Path, caption: Option<&str>) -> Result<Delivery> {
        self.sent += 1;
        log::info!(
            "notification #{} (dry run): {} caption={:?}",
            self.sent,
            photo.display(),
            caption
        );
        Ok(Delivery::Sent)
    }
}
