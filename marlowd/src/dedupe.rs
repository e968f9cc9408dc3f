//! Inbound dedupe set.
//!
//! The feed is at-least-once with `exec_id` as the dedupe key. Seen ids are
//! kept until `trade_date + horizon` business days, then pruned; the horizon
//! is generous enough that any broker redelivery window fits inside it.
//! Sharded by id hash so concurrent partition workers do not serialize on
//! one lock.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;

use marlow_domain::{BusinessCalendar, TradeDate};

/// Sharded set of recently seen execution ids.
pub struct DedupeSet {
    shards: Vec<RwLock<HashMap<String, TradeDate>>>,
    horizon_days: u32,
    calendar: BusinessCalendar,
}

impl DedupeSet {
    /// Set with `shards` shards and the given retention horizon.
    pub fn new(shards: usize, horizon_days: u32, calendar: BusinessCalendar) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards).map(|_| RwLock::new(HashMap::new())).collect(),
            horizon_days,
            calendar,
        }
    }

    fn shard_of(&self, exec_id: &str) -> &RwLock<HashMap<String, TradeDate>> {
        let mut hasher = DefaultHasher::new();
        exec_id.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// True if `exec_id` was already recorded.
    pub fn seen(&self, exec_id: &str) -> bool {
        self.shard_of(exec_id).read().unwrap().contains_key(exec_id)
    }

    /// Record a processed id with the trade date that anchors its retention.
    pub fn record(&self, exec_id: &str, trade_date: TradeDate) {
        self.shard_of(exec_id)
            .write()
            .unwrap()
            .insert(exec_id.to_string(), trade_date);
    }

    /// Drop every entry whose retention horizon passed before `today`.
    ///
    /// Returns the number of pruned entries.
    pub fn prune(&self, today: TradeDate) -> usize {
        let mut pruned = 0;
        for shard in &self.shards {
            let mut map = shard.write().unwrap();
            let before = map.len();
            map.retain(|_, trade_date| {
                self.calendar.add_business_days(*trade_date, self.horizon_days) >= today
            });
            pruned += before - map.len();
        }
        pruned
    }

    /// Total recorded ids across shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().unwrap().len()).sum()
    }

    /// True when no ids are recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Tests
// =============================================================================
