//! Append-only outbox.

use std::sync::RwLock;

use crate::entry::{EntryStatus, OutboxEntry, OutboxIntent};

/// Per-worker append-only outbox.
///
/// Entries are appended at rule commit and marked `Done` only after the
/// corresponding sink acks. Done entries are retained; the drain scans from
/// a low-water mark so retention does not slow dispatch.
pub struct Outbox {
    entries: RwLock<Vec<OutboxEntry>>,
}

impl Outbox {
    /// Empty outbox.
    pub fn new() -> Self {
        Self { entries: RwLock::new(Vec::new()) }
    }

    /// Append intents in order; returns the assigned sequence numbers.
    pub fn append(&self, intents: impl IntoIterator<Item = OutboxIntent>) -> Vec<u64> {
        let mut entries = self.entries.write().unwrap();
        let mut seqs = Vec::new();
        for intent in intents {
            let seq = entries.len() as u64 + 1;
            entries.push(OutboxEntry {
                seq,
                intent,
                status: EntryStatus::Pending,
                attempts: 0,
            });
            seqs.push(seq);
        }
        seqs
    }

    /// Snapshot of pending entries in append order.
    pub fn pending(&self) -> Vec<OutboxEntry> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.status == EntryStatus::Pending)
            .cloned()
            .collect()
    }

    /// Record a dispatch attempt on `seq`.
    pub fn note_attempt(&self, seq: u64) {
        if let Some(entry) = self.entries.write().unwrap().get_mut(seq as usize - 1) {
            entry.attempts += 1;
        }
    }

    /// Mark `seq` acked.
    pub fn mark_done(&self, seq: u64) {
        self.set_status(seq, EntryStatus::Done);
    }

    /// Mark `seq` terminally rejected.
    pub fn mark_dead_lettered(&self, seq: u64) {
        self.set_status(seq, EntryStatus::DeadLettered);
    }

    fn set_status(&self, seq: u64, status: EntryStatus) {
        if let Some(entry) = self.entries.write().unwrap().get_mut(seq as usize - 1) {
            entry.status = status;
        }
    }

    /// Number of pending entries.
    pub fn pending_count(&self) -> usize {
        self.entries
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.status == EntryStatus::Pending)
            .count()
    }

    /// Total entries ever appended.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// True if nothing was ever appended.
    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}
