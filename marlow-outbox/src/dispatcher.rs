//! Outbox dispatcher.
//!
//! Drains pending entries to the trade-event sink and the settlement
//! gateway, marking each done only after its ack. Dispatch is in append
//! order and stops at the first transient failure so per-partition event
//! ordering survives redrives. `SettlementSent` is only staged after the
//! gateway acks, which is what makes the event mean what it says.

use std::sync::Arc;

use tracing::{debug, error, info};

use marlow_domain::TradeEvent;
use marlow_gateway::SettlementGateway;

use crate::entry::OutboxIntent;
use crate::outbox::Outbox;
use crate::sink::TradeEventSink;

/// Outcome of one drain pass.
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Entries acked this pass
    pub dispatched: usize,
    /// Entries terminally rejected this pass
    pub dead_lettered: Vec<DeadLetteredEffect>,
    /// Transient failure that stopped the pass early, if any
    pub stalled: Option<String>,
}

/// A terminally rejected outbound effect.
#[derive(Debug, Clone)]
pub struct DeadLetteredEffect {
    /// Outbox sequence of the rejected entry
    pub seq: u64,
    /// Human-readable description of the intent
    pub intent: String,
    /// Gateway rejection detail
    pub reason: String,
}

/// Drains the outbox to its two sinks.
pub struct OutboxDispatcher {
    outbox: Arc<Outbox>,
    sink: Arc<dyn TradeEventSink>,
    gateway: Arc<dyn SettlementGateway>,
}

impl OutboxDispatcher {
    /// Dispatcher over `outbox`, publishing to `sink` and settling via
    /// `gateway`.
    pub fn new(
        outbox: Arc<Outbox>,
        sink: Arc<dyn TradeEventSink>,
        gateway: Arc<dyn SettlementGateway>,
    ) -> Self {
        Self { outbox, sink, gateway }
    }

    /// Drain until no pending entries remain or a transient failure stalls
    /// the pass. Safe to call again at any time; acked entries never
    /// redispatch and both sinks are idempotent.
    pub async fn drain(&self) -> DrainReport {
        let mut report = DrainReport::default();

        loop {
            let pending = self.outbox.pending();
            if pending.is_empty() {
                break;
            }
            let mut progressed = false;

            for entry in pending {
                self.outbox.note_attempt(entry.seq);
                match &entry.intent {
                    OutboxIntent::PublishEvent(envelope) => {
                        match self.sink.publish(envelope).await {
                            Ok(()) => {
                                debug!(
                                    seq = entry.seq,
                                    event_type = %envelope.event.qualified_type(),
                                    "Published trade event"
                                );
                                self.outbox.mark_done(entry.seq);
                                report.dispatched += 1;
                                progressed = true;
                            },
                            Err(err) => {
                                // Stop the pass: later entries must not
                                // overtake this one on the topic.
                                info!(seq = entry.seq, error = %err, "Publish stalled, will redrive");
                                report.stalled = Some(err.to_string());
                                return report;
                            },
                        }
                    },
                    OutboxIntent::SendSettlement(instruction) => {
                        match self.gateway.send(instruction).await {
                            Ok(()) => {
                                self.outbox.mark_done(entry.seq);
                                // Ack in hand; now the event is true.
                                self.outbox.append([OutboxIntent::PublishEvent(
                                    TradeEvent::SettlementSent {
                                        settle_id: instruction.settle_id.clone(),
                                        alloc_id: instruction.alloc_id.clone(),
                                    }
                                    .envelope(),
                                )]);
                                report.dispatched += 1;
                                progressed = true;
                            },
                            Err(err) if err.is_terminal() => {
                                error!(
                                    seq = entry.seq,
                                    settle_id = %instruction.settle_id,
                                    error = %err,
                                    "Settlement terminally rejected, dead-lettering"
                                );
                                self.outbox.mark_dead_lettered(entry.seq);
                                report.dead_lettered.push(DeadLetteredEffect {
                                    seq: entry.seq,
                                    intent: entry.intent.describe(),
                                    reason: err.to_string(),
                                });
                                progressed = true;
                            },
                            Err(err) => {
                                info!(
                                    seq = entry.seq,
                                    settle_id = %instruction.settle_id,
                                    error = %err,
                                    "Settlement send stalled, will redrive"
                                );
                                report.stalled = Some(err.to_string());
                                return report;
                            },
                        }
                    },
                }
            }

            if !progressed {
                break;
            }
        }
        report
    }
}

// =============================================================================
// Tests
// =============================================================================
