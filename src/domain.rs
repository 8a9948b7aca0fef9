//! Core data model shared by ingest, bus, pipeline and store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the SHA-256 digest of the external id.
const ID_HEX_LEN: usize = 12;

/// Derive the stable message id from the source-native identifier.
/// Pure function of `external_id`.
pub fn message_id(external_id: &str) -> String {
    let digest = Sha256::digest(external_id.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..ID_HEX_LEN].to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Twitter,
    Discord,
    Telegram,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Twitter => "twitter",
            Source::Discord => "discord",
            Source::Telegram => "telegram",
        }
    }
}

/// One harvested post. Immutable after creation; `id` is always `message_id(external_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub external_id: String,
    pub author: String,
    pub username: String,
    pub content: String,
    pub source: Source,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        external_id: impl Into<String>,
        author: impl Into<String>,
        username: impl Into<String>,
        content: impl Into<String>,
        source: Source,
        created_at: DateTime<Utc>,
    ) -> Self {
        let external_id = external_id.into();
        Self {
            id: message_id(&external_id),
            external_id,
            author: author.into(),
            username: username.into(),
            content: content.into(),
            source,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Launch,
    Endorsement,
    None,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Launch => "launch",
            Classification::Endorsement => "endorsement",
            Classification::None => "none",
        }
    }

    /// Strict parse of the wire label; anything else is `None` (the Rust one).
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "launch" => Some(Classification::Launch),
            "endorsement" => Some(Classification::Endorsement),
            "none" => Some(Classification::None),
            _ => None,
        }
    }

    /// True for verdicts that get persisted and alerted on.
    pub fn is_signal(&self) -> bool {
        !matches!(self, Classification::None)
    }
}

/// Verdict attached to exactly one message. Produced once, never revised.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationResult {
    pub classification: Classification,
    pub token: String,
    pub confidence: f64,
    pub reason: String,
}

impl ClassificationResult {
    /// Default verdict substituted when the backend fails.
    pub fn none() -> Self {
        Self {
            classification: Classification::None,
            token: String::new(),
            confidence: 0.0,
            reason: String::new(),
        }
    }
}
