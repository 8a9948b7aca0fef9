//! Message repository contract and the in-process implementation.

use std::collections::HashMap;

use anyhow::{bail, Result};
use parking_lot::RwLock;
use serde::Serialize;

use crate::domain::{Classification, Message};

/// Classification row attached to a stored message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationRecord {
    pub classification: Classification,
    pub token: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total: usize,
    pub launches: usize,
    pub endorsements: usize,
}

/// Durable store. Every write is idempotent, every read is pure.
#[async_trait::async_trait]
pub trait MessageRepository: Send + Sync {
    /// Insert keyed by `msg.id`; an existing row is left untouched (first write wins).
    async fn upsert_message(&self, msg: &Message) -> Result<()>;
    async fn upsert_classification(
        &self,
        id: &str,
        classification: Classification,
        token: &str,
        confidence: f64,
    ) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Message>>;
    /// Newest first by `created_at`.
    async fn find_all(&self, limit: usize, offset: usize) -> Result<Vec<Message>>;
    async fn exists(&self, id: &str) -> Result<bool>;
    async fn find_classification(&self, id: &str) -> Result<Option<ClassificationRecord>>;
    async fn stats(&self) -> Result<Stats>;
}

#[derive(Debug, Clone)]
struct Row {
    message: Message,
    classification: Option<ClassificationRecord>,
}

/// Thread-safe in-memory repository.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    rows: RwLock<HashMap<String, Row>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl MessageRepository for MemoryRepository {
    async fn upsert_message(&self, msg: &Message) -> Result<()> {
        self.rows
            .write()
            .entry(msg.id.clone())
            .or_insert_with(|| Row {
                message: msg.clone(),
                classification: None,
            });
        Ok(())
    }

    async fn upsert_classification(
        &self,
        id: &str,
        classification: Classification,
        token: &str,
        confidence: f64,
    ) -> Result<()> {
        let mut rows = self.rows.write();
        let Some(row) = rows.get_mut(id) else {
            bail!("no stored message with id {id}");
        };
        row.classification = Some(ClassificationRecord {
            classification,
            token: token.to_string(),
            confidence,
        });
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Message>> {
        Ok(self.rows.read().get(id).map(|r| r.message.clone()))
    }

    async fn find_all(&self, limit: usize, offset: usize) -> Result<Vec<Message>> {
        let mut all: Vec<Message> = self
            .rows
            .read()
            .values()
            .map(|r| r.message.clone())
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.rows.read().contains_key(id))
    }

    async fn find_classification(&self, id: &str) -> Result<Option<ClassificationRecord>> {
        Ok(self.rows.read().get(id).and_then(|r| r.classification.clone()))
    }

    async fn stats(&self) -> Result<Stats> {
        let rows = self.rows.read();
        let mut s = Stats {
            total: rows.len(),
            ..Stats::default()
        };
        for r in rows.values() {
            match r.classification.as_ref().map(|c| c.classification) {
                Some(Classification::Launch) => s.launches += 1,
                Some(Classification::Endorsement) => s.endorsements += 1,
                _ => {}
            }
        }
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Source;
    use chrono::{Duration, TimeZone, Utc};

    fn msg(ext: &str, content: &str, mins: i64) -> Message {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap();
        Message::new(ext, "A", "a", content, Source::Twitter, t0 + Duration::minutes(mins))
    }

    #[tokio::test]
    async fn upsert_twice_keeps_first_write() {
        let repo = MemoryRepository::new();
        let first = msg("g1", "first", 0);
        let mut second = msg("g1", "second", 5);
        second.author = "B".into();
        repo.upsert_message(&first).await.unwrap();
        repo.upsert_message(&second).await.unwrap();
        assert_eq!(repo.len(), 1);
        assert_eq!(repo.find_by_id(&first.id).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn find_all_is_newest_first_with_paging() {
        let repo = MemoryRepository::new();
        for i in 0..5 {
            repo.upsert_message(&msg(&format!("g{i}"), "x", i)).await.unwrap();
        }
        let page = repo.find_all(2, 1).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].external_id, "g3");
        assert_eq!(page[1].external_id, "g2");
        assert!(repo.find_all(10, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn classification_requires_stored_message_and_feeds_stats() {
        let repo = MemoryRepository::new();
        let m = msg("g1", "x", 0);
        assert!(repo
            .upsert_classification(&m.id, Classification::Launch, "FOO", 0.9)
            .await
            .is_err());
        repo.upsert_message(&m).await.unwrap();
        repo.upsert_classification(&m.id, Classification::Launch, "FOO", 0.9)
            .await
            .unwrap();
        assert!(repo.exists(&m.id).await.unwrap());
        let s = repo.stats().await.unwrap();
        assert_eq!(s, Stats { total: 1, launches: 1, endorsements: 0 });
    }
}
