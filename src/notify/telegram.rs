use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::time::Duration;
use url::Url;

use super::{Delivery, MultipartForm, Notifier};

pub const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";

/// Responses larger than this are truncated before logging.
const MAX_LOGGED_BODY: usize = 4096;

/// Telegram Bot API settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TelegramConfig {
    /// API root; overridable for tests and self-hosted Bot API servers.
    pub api_base: String,
    pub bot_token: String,
    pub chat_id: String,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_TELEGRAM_API.to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }
}

/// Sends snapshots with `sendPhoto`.
pub struct TelegramNotifier {
    chat_id: String,
    api_base: String,
    endpoint: Url,
    agent: ureq::Agent,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        if config.bot_token.trim().is_empty() {
            return Err(anyhow!("telegram bot token is empty"));
        }
        if config.chat_id.trim().is_empty() {
            return Err(anyhow!("telegram chat id is empty"));
        }
        let mut base = config.api_base.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let endpoint = Url::parse(&base)
            .with_context(|| format!("parse telegram api base {}", config.api_base))?
            .join(&format!("./bot{}/sendPhoto", config.bot_token))
            .context("build sendPhoto url")?;
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .build();
        Ok(Self {
            chat_id: config.chat_id,
            api_base: base,
            endpoint,
            agent,
        })
    }

    /// Endpoint with the token masked, for logs.
    fn redacted_endpoint(&self) -> String {
        format!("{}bot<redacted>/sendPhoto", self.api_base)
    }
}

impl Notifier for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn send_photo(&mut self, photo: &Path, caption: Option<&str>) -> Result<Delivery> {
        let bytes = std::fs::read(photo)
            .with_context(|| format!("read snapshot {}", photo.display()))?;
        let filename = photo
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("snapshot.jpg");

        let mut form = MultipartForm::new().text("chat_id", &self.chat_id);
        if let Some(caption) = caption {
            form = form.text("caption", caption);
        }
        let (content_type, body) = form.file("photo", filename, "image/jpeg", &bytes).finish();

        let response = self
            .agent
            .post(self.endpoint.as_str())
            .set("Content-Type", &content_type)
            .send_bytes(&body);

        let delivery = match response {
            Ok(resp) if resp.status() == 200 => Delivery::Sent,
            Ok(resp) => {
                let status = resp.status();
                Delivery::Rejected {
                    status,
                    body: read_body(resp),
                }
            }
            Err(ureq::Error::Status(status, resp)) => Delivery::Rejected {
                status,
                body: read_body(resp),
            },
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("send photo to {}", self.redacted_endpoint())))
            }
        };

        match &delivery {
            Delivery::Sent => log::info!("photo sent successfully"),
            Delivery::Rejected { status, body } => {
                log::error!("failed to send photo (HTTP {}): {}", status, body)
            }
        }
        Ok(delivery)
    }
}

fn read_body(resp: ureq::Response) -> String {
    let mut body = resp.into_string().unwrap_or_default();
    if body.len() > MAX_LOGGED_BODY {
        let mut cut = MAX_LOGGED_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_send_photo_endpoint() -> Result<()> {
        let notifier = TelegramNotifier::new(TelegramConfig::new("123:abc", "42"))?;
        assert_eq!(
            notifier.endpoint.as_str(),
            "https://api.telegram.org/bot123:abc/sendPhoto"
        );
        assert_eq!(
            notifier.redacted_endpoint(),
            "https://api.telegram.org/bot<redacted>/sendPhoto"
        );
        Ok(())
    }

    #[test]
    fn api_base_with_path_is_kept() -> Result<()> {
        let config = TelegramConfig {
            api_base: "http://127.0.0.1:8081/tg".to_string(),
            ..TelegramConfig::new("t", "1")
        };
        let notifier = TelegramNotifier::new(config)?;
        assert_eq!(
            notifier.endpoint.as_str(),
            "http://127.0.0.1:8081/tg/bott/sendPhoto"
        );
        Ok(())
    }

    #[test]
    fn empty_credentials_are_rejected() {
        assert!(TelegramNotifier::new(TelegramConfig::new("", "1")).is_err());
        assert!(TelegramNotifier::new(TelegramConfig::new("t", " ")).is_err());
    }
}
