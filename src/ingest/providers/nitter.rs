// src/ingest/providers/nitter.rs
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::domain::{Message, Source};
use crate::ingest::normalize_text;
use crate::ingest::types::SourceConnector;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    title: Option<String>,
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Guid>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "$text")]
    value: Option<String>,
}

fn parse_pub_date(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(ts.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// RSS connector for a Nitter instance (`https://{instance}/{account}/rss`).
pub struct NitterConnector {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        instance: String,
        client: reqwest::Client,
    },
}

impl NitterConnector {
    pub fn new(instance: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("curl/8.0")
            .timeout(timeout)
            .build()
            .context("building nitter http client")?;
        Ok(Self {
            mode: Mode::Http {
                instance: instance.into(),
                client,
            },
        })
    }

    /// Serve every account from the same RSS document (tests, probe binary).
    pub fn from_fixture(xml: &str) -> Self {
        Self {
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn feed_url(instance: &str, account: &str) -> String {
        format!("https://{instance}/{account}/rss")
    }

    /// Parse one RSS document into messages attributed to `account`, in feed order.
    pub fn parse_feed(xml: &str, account: &str) -> Result<Vec<Message>> {
        let t0 = std::time::Instant::now();
        let rss: Rss = from_str(xml).context("parsing nitter rss xml")?;

        let author = rss
            .channel
            .title
            .as_deref()
            .map(normalize_text)
            .unwrap_or_else(|| account.to_string());

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let external_id = it
                .guid
                .and_then(|g| g.value)
                .or(it.link)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
            let Some(external_id) = external_id else {
                continue;
            };
            let content = normalize_text(it.title.as_deref().unwrap_or_default());
            if content.is_empty() {
                continue;
            }
            let created_at = it
                .pub_date
                .as_deref()
                .and_then(parse_pub_date)
                .unwrap_or_else(Utc::now);

            out.push(Message::new(
                external_id,
                author.clone(),
                account,
                content,
                Source::Twitter,
                created_at,
            ));
        }

        histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(out)
    }
}

#[async_trait]
impl SourceConnector for NitterConnector {
    async fn fetch(&self, account: &str) -> Result<Vec<Message>> {
        match &self.mode {
            Mode::Fixture(xml) => Self::parse_feed(xml, account),
            Mode::Http { instance, client } => {
                let url = Self::feed_url(instance, account);
                let resp = client
                    .get(&url)
                    .header(
                        reqwest::header::ACCEPT,
                        "application/rss+xml, application/xml, text/xml, */*",
                    )
                    .send()
                    .await
                    .context("nitter http get()")?;
                let status = resp.status();
                if status != reqwest::StatusCode::OK {
                    bail!("nitter HTTP {} for {url}", status.as_u16());
                }
                let body = resp.text().await.context("nitter http .text()")?;
                Self::parse_feed(&body, account)
            }
        }
    }

    fn name(&self) -> &'static str {
        "nitter"
    }
}
