//! Runtime configuration read from the environment (`.env` is loaded by the binary).

pub mod accounts;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::bus::ConsumePolicy;
use crate::classify::openrouter::DEFAULT_MODEL;
use crate::ingest::accounts::clean_handles;
use crate::ingest::ProducerCfg;
use crate::pipeline::PipelineCfg;

pub const DEFAULT_NITTER_INSTANCE: &str = "nitter.privacyredirect.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpCfg {
    pub host: String,
    pub user: String,
    pub pass: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub nitter_instance: String,
    pub accounts: Vec<String>,
    /// Serve `accounts` as a fixed list; the HTTP account routes then reject changes.
    pub accounts_readonly: bool,
    pub producer: ProducerCfg,
    /// `None` keeps every seen id for the process lifetime.
    pub dedup_capacity: Option<usize>,
    pub openrouter_api_key: Option<String>,
    pub openrouter_model: String,
    pub pipeline: PipelineCfg,
    pub telegram_token: Option<String>,
    pub telegram_chat_ids: Vec<String>,
    pub discord_webhook: Option<String>,
    pub smtp: Option<SmtpCfg>,
    pub hub_capacity: usize,
    pub consumer_group: String,
    pub consume_policy: ConsumePolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| {
            lookup(k)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let num = |k: &str, default: u64| -> u64 {
            get(k).and_then(|v| v.parse().ok()).unwrap_or(default)
        };

        let mut accounts = get("ACCOUNTS")
            .map(|v| accounts::parse_account_list(&v))
            .unwrap_or_default();
        if let Some(p) = get("ACCOUNTS_PATH") {
            accounts.extend(accounts::load_accounts_from(&PathBuf::from(p))?);
        }
        let accounts = clean_handles(accounts);

        let smtp = match (
            get("SMTP_HOST"),
            get("SMTP_USER"),
            get("SMTP_PASS"),
            get("NOTIFY_EMAIL_FROM"),
            get("NOTIFY_EMAIL_TO"),
        ) {
            (Some(host), Some(user), Some(pass), Some(from), Some(to)) => Some(SmtpCfg {
                host,
                user,
                pass,
                from,
                to,
            }),
            _ => None,
        };

        Ok(Self {
            nitter_instance: get("NITTER_INSTANCE")
                .unwrap_or_else(|| DEFAULT_NITTER_INSTANCE.to_string()),
            accounts,
            accounts_readonly: get("ACCOUNTS_READONLY")
                .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes")),
            producer: ProducerCfg {
                interval: Duration::from_secs(num("POLL_INTERVAL_SECS", 30).max(1)),
                fetch_timeout: Duration::from_secs(num("FETCH_TIMEOUT_SECS", 15).max(1)),
            },
            dedup_capacity: get("DEDUP_CAPACITY")
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|n| *n > 0),
            openrouter_api_key: get("OPENROUTER_API_KEY"),
            openrouter_model: get("OPENROUTER_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            pipeline: PipelineCfg {
                classify_timeout: Duration::from_secs(num("CLASSIFY_TIMEOUT_SECS", 60).max(1)),
                notify_timeout: Duration::from_secs(num("NOTIFY_TIMEOUT_SECS", 10).max(1)),
            },
            telegram_token: get("TELEGRAM_BOT_TOKEN"),
            telegram_chat_ids: get("TELEGRAM_CHAT_IDS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            discord_webhook: get("DISCORD_WEBHOOK_URL"),
            smtp,
            hub_capacity: num("HUB_CAPACITY", crate::hub::DEFAULT_CAPACITY as u64).max(1) as usize,
            consumer_group: get("CONSUMER_GROUP").unwrap_or_else(|| "pipeline".to_string()),
            consume_policy: ConsumePolicy {
                max_attempts: num("CONSUMER_MAX_ATTEMPTS", 3).clamp(1, 20) as u32,
                backoff: Duration::from_millis(num("CONSUMER_BACKOFF_MS", 500)),
            },
        })
    }
}
