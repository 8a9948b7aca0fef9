// src/ingest/types.rs
use anyhow::Result;

use crate::domain::Message;

/// Source Connector: returns the currently observable posts of one account.
///
/// Every returned `Message` must carry `id == message_id(external_id)`.
#[async_trait::async_trait]
pub trait SourceConnector: Send + Sync {
    async fn fetch(&self, account: &str) -> Result<Vec<Message>>;
    fn name(&self) -> &'static str;
}

/// Set of tracked account handles. Read once per poll pass.
#[async_trait::async_trait]
pub trait AccountRegistry: Send + Sync {
    async fn list(&self) -> Result<Vec<String>>;
    /// Returns `false` when the handle was already tracked.
    async fn add(&self, account: &str) -> Result<bool>;
    /// Returns `false` when the handle was not tracked.
    async fn remove(&self, account: &str) -> Result<bool>;
    async fn contains(&self, account: &str) -> Result<bool>;
}

/// Trim and strip a leading `@`; empty input stays empty.
pub fn normalize_handle(s: &str) -> String {
    s.trim().trim_start_matches('@').trim().to_string()
}

/// A normalized handle is non-empty and limited to ASCII letters, digits and `_`, so it can
/// be placed in a feed URL path as is.
pub fn is_valid_handle(h: &str) -> bool {
    !h.is_empty() && h.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_limited_to_word_characters() {
        assert!(is_valid_handle("degen_Dev42"));
        assert!(is_valid_handle(&normalize_handle(" @whale ")));
        for bad in ["", "bob/x", "a?b", "a#b", "../admin", "bob x", "b%2Fx", "bö"] {
            assert!(!is_valid_handle(bad), "{bad:?} accepted");
        }
    }
}
