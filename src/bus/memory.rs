// src/bus/memory.rs
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::{
    decode, deliver_with_retry, encode, BusError, ConsumePolicy, ConsumeStats, Consumer,
    MessageHandler, Publisher,
};
use crate::domain::Message;

/// One appended record. `offset` is its position in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub offset: u64,
    pub key: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct Log {
    records: Vec<Record>,
    /// Acknowledged offsets per consumer group.
    acked: HashMap<String, HashSet<u64>>,
    /// Offsets currently being handled by some consumer of the group.
    in_flight: HashMap<String, HashSet<u64>>,
    dead: Vec<(String, Record)>,
}

/// In-process append-only log with per-group acknowledgement.
///
/// Acknowledgement is per record rather than a cumulative offset, so a record whose
/// handler failed stays pending for its group while later records can still commit.
pub struct MemoryBus {
    topic: String,
    log: Mutex<Log>,
    appended: watch::Sender<u64>,
}

impl MemoryBus {
    pub fn new(topic: impl Into<String>) -> Arc<Self> {
        let (appended, _) = watch::channel(0);
        Arc::new(Self {
            topic: topic.into(),
            log: Mutex::new(Log::default()),
            appended,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Consumer handle for `group`. Handles of the same group share acknowledgements and
    /// split the records between them: a record is handed to one handle at a time.
    pub fn consumer(
        self: &Arc<Self>,
        group: impl Into<String>,
        policy: ConsumePolicy,
    ) -> MemoryConsumer {
        MemoryConsumer {
            bus: Arc::clone(self),
            group: group.into(),
            policy,
        }
    }

    /// Append a raw payload (used for encoded messages, and by tests for garbage).
    pub fn append_raw(&self, key: impl Into<String>, payload: Vec<u8>) -> u64 {
        let len = {
            let mut log = self.log.lock();
            let offset = log.records.len() as u64;
            log.records.push(Record {
                offset,
                key: key.into(),
                payload,
            });
            log.records.len() as u64
        };
        self.appended.send_replace(len);
        len - 1
    }

    pub fn len(&self) -> usize {
        self.log.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> Vec<Record> {
        self.log.lock().records.clone()
    }

    /// Offsets acknowledged by `group`, ascending.
    pub fn committed(&self, group: &str) -> Vec<u64> {
        let log = self.log.lock();
        let mut v: Vec<u64> = log
            .acked
            .get(group)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        v.sort_unstable();
        v
    }

    /// Records not yet acknowledged by `group`.
    pub fn pending(&self, group: &str) -> usize {
        let log = self.log.lock();
        let acked = log.acked.get(group).map(|s| s.len()).unwrap_or(0);
        log.records.len() - acked
    }

    pub fn dead_letters(&self) -> Vec<Record> {
        self.log.lock().dead.iter().map(|(_, r)| r.clone()).collect()
    }

    /// Offsets of `group` claimed by a consumer and not yet settled.
    pub fn in_flight(&self, group: &str) -> usize {
        self.log.lock().in_flight.get(group).map(|s| s.len()).unwrap_or(0)
    }

    /// Find the first record at or after `from` that `group` has neither acknowledged nor
    /// handed out, and claim it. Lookup and claim happen under one lock.
    fn claim_next(&self, group: &str, from: u64) -> Option<Record> {
        let mut log = self.log.lock();
        let Log {
            records,
            acked,
            in_flight,
            ..
        } = &mut *log;
        let acked = acked.get(group);
        let claimed = in_flight.entry(group.to_string()).or_default();
        let rec = records
            .iter()
            .skip(from as usize)
            .find(|r| {
                !acked.is_some_and(|a| a.contains(&r.offset)) && !claimed.contains(&r.offset)
            })?
            .clone();
        claimed.insert(rec.offset);
        Some(rec)
    }

    fn ack(&self, group: &str, offset: u64) {
        let mut log = self.log.lock();
        release_claim(&mut log, group, offset);
        log.acked
            .entry(group.to_string())
            .or_default()
            .insert(offset);
    }

    /// Give a failed record back to the group without acknowledging it.
    fn release(&self, group: &str, offset: u64) {
        release_claim(&mut self.log.lock(), group, offset);
    }

    fn dead_letter(&self, group: &str, rec: Record) {
        let mut log = self.log.lock();
        release_claim(&mut log, group, rec.offset);
        log.acked
            .entry(group.to_string())
            .or_default()
            .insert(rec.offset);
        log.dead.push((group.to_string(), rec));
    }
}

fn release_claim(log: &mut Log, group: &str, offset: u64) {
    if let Some(claimed) = log.in_flight.get_mut(group) {
        claimed.remove(&offset);
    }
}

#[async_trait::async_trait]
impl Publisher for MemoryBus {
    async fn publish(&self, msg: &Message) -> Result<(), BusError> {
        let payload = encode(msg)?;
        self.append_raw(msg.id.clone(), payload);
        Ok(())
    }
}

pub struct MemoryConsumer {
    bus: Arc<MemoryBus>,
    group: String,
    policy: ConsumePolicy,
}

impl MemoryConsumer {
    pub fn group(&self) -> &str {
        &self.group
    }
}

#[async_trait::async_trait]
impl Consumer for MemoryConsumer {
    async fn consume(
        &self,
        handler: &dyn MessageHandler,
        cancel: CancellationToken,
    ) -> anyhow::Result<ConsumeStats> {
        let mut stats = ConsumeStats::default();
        let mut appended = self.bus.appended.subscribe();
        // Each run starts from the lowest unacknowledged offset.
        let mut cursor = 0u64;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let _ = appended.borrow_and_update();

            let Some(rec) = self.bus.claim_next(&self.group, cursor) else {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = appended.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            };
            cursor = rec.offset + 1;
            stats.delivered += 1;

            let msg = match decode(&rec.payload) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(
                        topic = %self.bus.topic,
                        offset = rec.offset,
                        key = %rec.key,
                        error = ?e,
                        "undecodable bus record; dead-lettered"
                    );
                    counter!("bus_dead_letters_total").increment(1);
                    self.bus.dead_letter(&self.group, rec);
                    stats.dead_lettered += 1;
                    continue;
                }
            };

            if deliver_with_retry(handler, &msg, &self.policy, &cancel).await {
                self.bus.ack(&self.group, rec.offset);
                stats.committed += 1;
            } else {
                tracing::warn!(
                    topic = %self.bus.topic,
                    offset = rec.offset,
                    id = %msg.id,
                    "record left uncommitted; redelivered on next consume run"
                );
                self.bus.release(&self.group, rec.offset);
                stats.failed += 1;
            }
        }

        Ok(stats)
    }
}
