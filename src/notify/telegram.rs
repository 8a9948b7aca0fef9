// src/notify/telegram.rs
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;

use super::{alert_icon, Notifier};
use crate::domain::{ClassificationResult, Message};

/// Telegram bot destination; one `sendMessage` per chat id, sent concurrently.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot_token: String,
    chat_ids: Vec<String>,
    client: Client,
    api_base: String,
    timeout: Duration,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_ids: Vec<String>) -> Self {
        Self {
            bot_token,
            chat_ids,
            client: Client::new(),
            api_base: "https://api.telegram.org".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    async fn send(&self, chat_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let body = SendMessage {
            chat_id,
            text,
            parse_mode: "HTML",
        };
        let rsp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("telegram request")?;
        if !rsp.status().is_success() {
            return Err(anyhow!("telegram error: {}", rsp.status().as_u16()));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// HTML body for Telegram's `parse_mode=HTML`; user text is escaped.
pub fn format_html(msg: &Message, verdict: &ClassificationResult) -> String {
    let esc = |s: &str| html_escape::encode_text(s).to_string();
    format!(
        "{} <b>{} detected</b>\n\n<b>Author:</b> @{}\n<b>Token:</b> {}\n<b>Confidence:</b> {:.0}%\n\n<b>Tweet:</b>\n{}\n\n<b>Reason:</b> {}",
        alert_icon(verdict.classification),
        verdict.classification.as_str(),
        esc(&msg.username),
        esc(&verdict.token),
        verdict.confidence * 100.0,
        esc(&msg.content),
        esc(&verdict.reason)
    )
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, msg: &Message, verdict: &ClassificationResult) -> Result<()> {
        let text = format_html(msg, verdict);
        let sends = self.chat_ids.iter().map(|chat_id| {
            let text = text.as_str();
            async move { (chat_id, self.send(chat_id, text).await) }
        });
        let mut failed = Vec::new();
        for (chat_id, res) in join_all(sends).await {
            if let Err(e) = res {
                tracing::warn!(chat_id = %chat_id, error = ?e, "telegram send failed");
                failed.push(chat_id.clone());
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("telegram failed for chats: {}", failed.join(",")))
        }
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Classification, Source};

    #[test]
    fn html_body_escapes_user_text() {
        let m = Message::new("g", "A", "alice", "<script>$FOO</script>", Source::Twitter, chrono::Utc::now());
        let v = ClassificationResult {
            classification: Classification::Endorsement,
            token: "FOO".into(),
            confidence: 0.5,
            reason: "a & b".into(),
        };
        let body = format_html(&m, &v);
        assert!(body.starts_with("📢 <b>endorsement detected</b>"));
        assert!(body.contains("&lt;script&gt;"));
        assert!(body.contains("a &amp; b"));
        assert!(body.contains("50%"));
    }
}
