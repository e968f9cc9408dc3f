//! Inbound execution feed.
//!
//! The feed is partitioned by `instrument_id` so every fill of a block lands
//! on one worker, and delivery is at-least-once: a message stays owned by
//! the feed until its offset is committed, and an uncommitted message is
//! redelivered after a crash. The in-memory source implements the same
//! contract for tests and single-process runs.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use marlow_rules::ExecutionMsg;

/// One delivery from the feed.
#[derive(Debug, Clone)]
pub struct FeedMessage {
    /// Partition key (the instrument id)
    pub partition: String,
    /// Offset within the partition
    pub offset: u64,
    /// The fill
    pub msg: ExecutionMsg,
}

/// Port for the partitioned execution feed.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Next uncommitted delivery, if any.
    async fn poll(&self) -> Option<FeedMessage>;

    /// Surrender `offset` for `partition`; the message will not redeliver.
    async fn commit(&self, partition: &str, offset: u64);

    /// Hand an unprocessed delivery back for immediate redelivery.
    async fn nack(&self, partition: &str, offset: u64);
}

// =============================================================================
// In-memory feed
// =============================================================================

#[derive(Default)]
struct Partition {
    messages: Vec<ExecutionMsg>,
    committed: Option<u64>,
}

/// In-memory feed with explicit offset commit and redelivery.
pub struct InMemoryFeed {
    partitions: RwLock<HashMap<String, Partition>>,
    /// Delivery order across partitions
    queue: RwLock<VecDeque<(String, u64)>>,
}

impl InMemoryFeed {
    /// Empty feed.
    pub fn new() -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
            queue: RwLock::new(VecDeque::new()),
        }
    }

    /// Append a fill to its instrument partition and enqueue the delivery.
    pub fn push(&self, msg: ExecutionMsg) {
        let mut partitions = self.partitions.write().unwrap();
        let partition = partitions.entry(msg.instrument_id.clone()).or_default();
        let offset = partition.messages.len() as u64;
        partition.messages.push(msg.clone());
        drop(partitions);
        self.queue.write().unwrap().push_back((msg.instrument_id, offset));
    }

    /// Re-enqueue every uncommitted message in partition order, simulating
    /// a restart replaying from the last committed offsets.
    pub fn replay_uncommitted(&self) {
        let partitions = self.partitions.read().unwrap();
        let mut queue = self.queue.write().unwrap();
        queue.clear();
        for (key, partition) in partitions.iter() {
            let start = partition.committed.map(|o| o + 1).unwrap_or(0);
            for offset in start..partition.messages.len() as u64 {
                queue.push_back((key.clone(), offset));
            }
        }
    }

    /// Deliveries currently queued.
    pub fn queued(&self) -> usize {
        self.queue.read().unwrap().len()
    }

    /// Last committed offset for a partition.
    pub fn committed(&self, partition: &str) -> Option<u64> {
        self.partitions.read().unwrap().get(partition).and_then(|p| p.committed)
    }
}

impl Default for InMemoryFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedSource for InMemoryFeed {
    async fn poll(&self) -> Option<FeedMessage> {
        let (partition, offset) = self.queue.write().unwrap().pop_front()?;
        let partitions = self.partitions.read().unwrap();
        let msg = partitions.get(&partition)?.messages.get(offset as usize)?.clone();
        Some(FeedMessage { partition, offset, msg })
    }

    async fn commit(&self, partition: &str, offset: u64) {
        let mut partitions = self.partitions.write().unwrap();
        if let Some(p) = partitions.get_mut(partition) {
            // Offsets commit monotonically per partition
            if p.committed.map_or(true, |prev| offset > prev) {
                p.committed = Some(offset);
            }
        }
    }

    async fn nack(&self, partition: &str, offset: u64) {
        self.queue.write().unwrap().push_front((partition.to_string(), offset));
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn msg(exec_id: &str, instrument: &str) -> ExecutionMsg {
        ExecutionMsg {
            exec_id: exec_id.to_string(),
            order_id: "O1".to_string(),
            instrument_id: instrument.to_string(),
            qty: dec!(100),
            price: dec!(10.00),
            trade_date: "20240115".to_string(),
            venue: "XNAS".to_string(),
        }
    }

    #[tokio::test]
    async fn test_push_poll_commit() {
        let feed = InMemoryFeed::new();
        feed.push(msg("X1", "AAPL.O"));
        feed.push(msg("X2", "AAPL.O"));

        let first = feed.poll().await.unwrap();
        assert_eq!(first.msg.exec_id, "X1");
        assert_eq!(first.offset, 0);
        feed.commit(&first.partition, first.offset).await;

        let second = feed.poll().await.unwrap();
        assert_eq!(second.msg.exec_id, "X2");
        assert_eq!(second.offset, 1);
        assert!(feed.poll().await.is_none());
        assert_eq!(feed.committed("AAPL.O"), Some(0));
    }

    #[tokio::test]
    async fn test_per_partition_offsets() {
        let feed = InMemoryFeed::new();
        feed.push(msg("X1", "AAPL.O"));
        feed.push(msg("Y1", "MSFT.O"));
        feed.push(msg("X2", "AAPL.O"));

        let offsets: Vec<(String, u64)> = [
            feed.poll().await.unwrap(),
            feed.poll().await.unwrap(),
            feed.poll().await.unwrap(),
        ]
        .into_iter()
        .map(|d| (d.partition, d.offset))
        .collect();

        assert_eq!(
            offsets,
            vec![
                ("AAPL.O".to_string(), 0),
                ("MSFT.O".to_string(), 0),
                ("AAPL.O".to_string(), 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_replay_redelivers_uncommitted_only() {
        let feed = InMemoryFeed::new();
        feed.push(msg("X1", "AAPL.O"));
        feed.push(msg("X2", "AAPL.O"));

        let first = feed.poll().await.unwrap();
        feed.commit(&first.partition, first.offset).await;
        let _second = feed.poll().await.unwrap();
        // Crash before committing X2

        feed.replay_uncommitted();
        assert_eq!(feed.queued(), 1);
        let redelivered = feed.poll().await.unwrap();
        assert_eq!(redelivered.msg.exec_id, "X2");
    }
}
