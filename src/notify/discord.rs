use super::{alert_icon, Notifier};
use crate::domain::{ClassificationResult, Message};
use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordNotifier {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    /// Per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Size the per-attempt timeout so every attempt plus its backoff fits in `total`.
    pub fn with_budget(mut self, total: Duration) -> Self {
        let backoff: Duration = (1..self.max_retries).map(backoff_after).sum();
        let per_attempt = total.saturating_sub(backoff) / u32::from(self.max_retries);
        self.timeout = per_attempt.max(MIN_ATTEMPT_TIMEOUT);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    async fn post_with_retries(&self, payload: &DiscordWebhookPayload) -> Result<()> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("Discord webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("Discord webhook request failed: {e}"),
            };

            if attempt >= self.max_retries {
                return Err(err);
            }
            tokio::time::sleep(backoff_after(attempt)).await;
        }
    }
}

const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(500);

fn backoff_after(attempt: u8) -> Duration {
    Duration::from_millis(500u64 << (attempt - 1))
}

pub fn embed_for(msg: &Message, verdict: &ClassificationResult) -> DiscordWebhookPayload {
    let title = format!(
        "{} {} detected: {}",
        alert_icon(verdict.classification),
        verdict.classification.as_str(),
        if verdict.token.is_empty() { "—" } else { verdict.token.as_str() }
    );
    let description = format!(
        "**Author:** @{}\n**Confidence:** {:.0}%\n**Tweet:** {}\n**Reason:** {}",
        msg.username,
        verdict.confidence * 100.0,
        msg.content,
        verdict.reason
    );
    DiscordWebhookPayload::embed(&title, &description)
}

#[async_trait::async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, msg: &Message, verdict: &ClassificationResult) -> Result<()> {
        self.post_with_retries(&embed_for(msg, verdict)).await
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

#[derive(Debug, Serialize)]
pub struct DiscordEmbed {
    title: String,
    description: String,
}

#[derive(Debug, Serialize)]
pub struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl DiscordWebhookPayload {
    fn embed(title: &str, description: &str) -> Self {
        Self {
            content: None,
            embeds: vec![DiscordEmbed {
                title: title.to_string(),
                description: description.to_string(),
            }],
        }
    }
}
