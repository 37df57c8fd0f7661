//! Durable storage for the work queue and its dead-letter queue.
//!
//! Two redb tables keyed by sequence number, plus a counter. Every state
//! change the broker makes (publish, retry, ack, dead-letter) is one write
//! transaction, so a restarted broker resumes exactly where it stopped.

use actor_framework::StoreError;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub const ORDERS_QUEUE: &str = "kitchen.orders";
pub const DEAD_LETTER_QUEUE: &str = "kitchen.orders.dlq";

const MESSAGES_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new(ORDERS_QUEUE);
const DEAD_LETTERS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new(DEAD_LETTER_QUEUE);
const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("broker_meta");
const NEXT_SEQ_KEY: &str = "next_seq";

/// A queued message: the raw body plus the `x-retry-count` header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub payload: Vec<u8>,
    pub retry_count: u32,
    /// Wall-clock millis before which the message must not be delivered.
    #[serde(default)]
    pub not_before_ms: Option<i64>,
}

impl StoredMessage {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            retry_count: 0,
            not_before_ms: None,
        }
    }
}

/// A message that will never be delivered again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub seq: u64,
    pub payload: String,
    pub retry_count: u32,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct QueueStore {
    db: Arc<Database>,
}

impl std::fmt::Debug for QueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueStore").finish_non_exhaustive()
    }
}

impl QueueStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Open a queue that lives only in memory (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Create the queue tables if missing. Safe to repeat.
    pub fn declare(&self) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let _ = txn.open_table(MESSAGES_TABLE)?;
            let _ = txn.open_table(DEAD_LETTERS_TABLE)?;
            let _ = txn.open_table(META_TABLE)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Every queued message in sequence order.
    pub fn load(&self) -> Result<Vec<(u64, StoredMessage)>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(MESSAGES_TABLE)?;
        let mut messages = Vec::new();
        for row in table.iter()? {
            let (seq, value) = row?;
            messages.push((seq.value(), serde_json::from_slice(value.value())?));
        }
        Ok(messages)
    }

    /// Append at the tail; returns the assigned sequence number.
    pub fn append(&self, message: &StoredMessage) -> Result<u64, StoreError> {
        let value = serde_json::to_vec(message)?;
        let txn = self.db.begin_write()?;
        let seq = {
            let mut meta = txn.open_table(META_TABLE)?;
            let seq = meta.get(NEXT_SEQ_KEY)?.map(|v| v.value()).unwrap_or(1);
            meta.insert(NEXT_SEQ_KEY, seq + 1)?;
            let mut table = txn.open_table(MESSAGES_TABLE)?;
            table.insert(seq, value.as_slice())?;
            seq
        };
        txn.commit()?;
        Ok(seq)
    }

    pub fn update(&self, seq: u64, message: &StoredMessage) -> Result<(), StoreError> {
        let value = serde_json::to_vec(message)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(MESSAGES_TABLE)?;
            table.insert(seq, value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn remove(&self, seq: u64) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(MESSAGES_TABLE)?;
            table.remove(seq)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Move a message from the work queue to the dead-letter queue atomically.
    pub fn dead_letter(&self, letter: &DeadLetter) -> Result<(), StoreError> {
        let value = serde_json::to_vec(letter)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(MESSAGES_TABLE)?;
            table.remove(letter.seq)?;
            let mut dlq = txn.open_table(DEAD_LETTERS_TABLE)?;
            dlq.insert(letter.seq, value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn dead_letters(&self) -> Result<Vec<DeadLetter>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DEAD_LETTERS_TABLE)?;
        let mut letters = Vec::new();
        for row in table.iter()? {
            let (_, value) = row?;
            letters.push(serde_json::from_slice(value.value())?);
        }
        Ok(letters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_assigns_increasing_sequence() {
        let store = QueueStore::open_in_memory().unwrap();
        store.declare().unwrap();
        let a = store.append(&StoredMessage::new(b"a".to_vec())).unwrap();
        let b = store.append(&StoredMessage::new(b"b".to_vec())).unwrap();
        assert!(b > a);

        store.remove(a).unwrap();
        let c = store.append(&StoredMessage::new(b"c".to_vec())).unwrap();
        assert!(c > b);

        let seqs: Vec<u64> = store.load().unwrap().into_iter().map(|(s, _)| s).collect();
        assert_eq!(seqs, vec![b, c]);
    }

    #[test]
    fn test_dead_letter_moves_message() {
        let store = QueueStore::open_in_memory().unwrap();
        store.declare().unwrap();
        store.declare().unwrap();
        let seq = store.append(&StoredMessage::new(b"{}".to_vec())).unwrap();

        store
            .dead_letter(&DeadLetter {
                seq,
                payload: "{}".into(),
                retry_count: 3,
                reason: "boom".into(),
                dead_lettered_at: Utc::now(),
            })
            .unwrap();

        assert!(store.load().unwrap().is_empty());
        let letters = store.dead_letters().unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].reason, "boom");
    }
}
