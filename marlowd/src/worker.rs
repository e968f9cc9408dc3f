//! Pipeline worker.
//!
//! One worker owns a strictly sequential slice of the feed. Per delivery it
//! runs the ingest + aggregation chain, then cascades: the outbox drain
//! publishes `BlockReady`, which triggers allocation; the allocation-created
//! store notification triggers settlement; an execution-updated notification
//! triggers the bust rule. The cascade loops until the turn is quiescent,
//! and only then does the caller commit the inbound offset.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use marlow_domain::{EventEnvelope, TradeDate, TradeEvent};
use marlow_outbox::OutboxDispatcher;
use marlow_rules::{ErrorPolicy, ExecutionMsg, RuleError, RuleRuntime};
use marlow_store::{ChangeKind, StoreChange, TableName};

use crate::dead_letter::DeadLetterQueue;
use crate::dedupe::DedupeSet;
use crate::error::{DaemonError, DaemonResult};
use crate::feed::{FeedMessage, FeedSource};

/// How a delivery left the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Chain committed and cascade ran
    Processed,
    /// Dedupe hit; acked without effect
    Duplicate,
    /// Parked for the operator; offset advances past it
    DeadLettered,
}

/// Sequential pipeline worker.
pub struct PipelineWorker {
    runtime: Arc<RuleRuntime>,
    dispatcher: Arc<OutboxDispatcher>,
    dedupe: Arc<DedupeSet>,
    dead_letters: Arc<DeadLetterQueue>,
    events_rx: broadcast::Receiver<EventEnvelope>,
    changes_rx: broadcast::Receiver<StoreChange>,
}

impl PipelineWorker {
    /// Assemble a worker over shared pipeline components.
    pub fn new(
        runtime: Arc<RuleRuntime>,
        dispatcher: Arc<OutboxDispatcher>,
        dedupe: Arc<DedupeSet>,
        dead_letters: Arc<DeadLetterQueue>,
        events_rx: broadcast::Receiver<EventEnvelope>,
        changes_rx: broadcast::Receiver<StoreChange>,
    ) -> Self {
        Self { runtime, dispatcher, dedupe, dead_letters, events_rx, changes_rx }
    }

    /// Process one feed delivery through the full rule cascade.
    pub async fn handle_message(&mut self, delivery: &FeedMessage) -> DaemonResult<Disposition> {
        let msg = &delivery.msg;
        if self.dedupe.seen(&msg.exec_id) {
            debug!(exec_id = %msg.exec_id, "Duplicate delivery acked without effect");
            return Ok(Disposition::Duplicate);
        }

        match self.runtime.process_execution(msg) {
            Ok(_report) => {
                // The precondition check already validated the date
                if let Ok(trade_date) = TradeDate::parse(&msg.trade_date) {
                    self.dedupe.record(&msg.exec_id, trade_date);
                }
                self.run_cascade().await?;
                Ok(Disposition::Processed)
            },
            Err(err) => self.dispose_inbound(err, msg),
        }
    }

    /// Record an out-of-band bust correction and run the resulting cascade.
    pub async fn bust_execution(&mut self, exec_id: &str) -> DaemonResult<()> {
        match self.runtime.record_correction(exec_id, Decimal::ZERO) {
            Ok(_) => self.run_cascade().await,
            Err(err) => {
                self.dispose_cascade(err, "correction", json!({ "exec_id": exec_id }))
            },
        }
    }

    /// Drain the outbox and route triggers until the turn is quiescent.
    ///
    /// A stalled drain (transient sink failure) returns cleanly; the redrive
    /// tick finishes the job later.
    pub async fn run_cascade(&mut self) -> DaemonResult<()> {
        loop {
            let report = self.dispatcher.drain().await;
            for dead in &report.dead_lettered {
                self.dead_letters.push(
                    "dispatch",
                    dead.reason.as_str(),
                    json!({ "seq": dead.seq, "intent": dead.intent }),
                );
            }
            if let Some(reason) = &report.stalled {
                debug!(%reason, "Outbox drain stalled, leaving remainder for redrive");
                return Ok(());
            }

            let mut progressed = false;

            // BlockReady on the event stream fires allocation
            while let Some(envelope) = try_next(&mut self.events_rx) {
                if let TradeEvent::BlockReady { block_id, .. } = &envelope.event {
                    match self.runtime.allocate_block(block_id) {
                        Ok(_) => progressed = true,
                        Err(err) => self.dispose_cascade(
                            err,
                            "allocate",
                            json!({ "block_id": block_id }),
                        )?,
                    }
                }
            }

            // Store notifications fire settlement and bust
            while let Some(change) = try_next(&mut self.changes_rx) {
                match (change.table, change.kind) {
                    (TableName::Allocations, ChangeKind::Created) => {
                        match self.runtime.generate_settlement(&change.pk) {
                            Ok(_) => progressed = true,
                            Err(err) => self.dispose_cascade(
                                err,
                                "settle",
                                json!({ "alloc_id": change.pk }),
                            )?,
                        }
                    },
                    (TableName::Executions, ChangeKind::Updated) => {
                        match self.runtime.handle_bust(&change.pk) {
                            Ok(_) => progressed = true,
                            Err(err) => self.dispose_cascade(
                                err,
                                "bust",
                                json!({ "exec_id": change.pk }),
                            )?,
                        }
                    },
                    _ => {},
                }
            }

            if !progressed {
                return Ok(());
            }
        }
    }

    /// Consume the feed until shutdown.
    pub async fn run(
        mut self,
        feed: Arc<dyn FeedSource>,
        shutdown: CancellationToken,
        poll_interval: Duration,
    ) -> DaemonResult<()> {
        info!("Pipeline worker started");
        loop {
            if shutdown.is_cancelled() {
                info!("Pipeline worker shutdown requested");
                return Ok(());
            }

            match feed.poll().await {
                Some(delivery) => match self.handle_message(&delivery).await {
                    Ok(_) => feed.commit(&delivery.partition, delivery.offset).await,
                    Err(DaemonError::Transient(reason)) => {
                        warn!(
                            partition = %delivery.partition,
                            offset = delivery.offset,
                            %reason,
                            "Transient failure, redelivering without offset commit"
                        );
                        feed.nack(&delivery.partition, delivery.offset).await;
                        tokio::time::sleep(poll_interval).await;
                    },
                    Err(fatal) => {
                        error!(error = %fatal, "Pipeline worker halting");
                        return Err(fatal);
                    },
                },
                None => {
                    // Idle turn: redrive stalled effects, expire dedupe entries
                    self.run_cascade().await?;
                    self.dedupe.prune(TradeDate::from_date(Utc::now().date_naive()));
                    tokio::select! {
                        _ = shutdown.cancelled() => {},
                        _ = tokio::time::sleep(poll_interval) => {},
                    }
                },
            }
        }
    }

    fn dispose_inbound(&self, err: RuleError, msg: &ExecutionMsg) -> DaemonResult<Disposition> {
        let payload = serde_json::to_value(msg).unwrap_or_default();
        match err.policy() {
            ErrorPolicy::DeadLetter => {
                self.dead_letters.push("ingest", err.to_string(), payload);
                Ok(Disposition::DeadLettered)
            },
            ErrorPolicy::Retry => Err(DaemonError::Transient(err.to_string())),
            ErrorPolicy::Halt => Err(DaemonError::Fatal(err.to_string())),
        }
    }

    fn dispose_cascade(
        &self,
        err: RuleError,
        stage: &str,
        payload: serde_json::Value,
    ) -> DaemonResult<()> {
        match err.policy() {
            ErrorPolicy::DeadLetter => {
                self.dead_letters.push(stage, err.to_string(), payload);
                Ok(())
            },
            ErrorPolicy::Retry => Err(DaemonError::Transient(err.to_string())),
            ErrorPolicy::Halt => Err(DaemonError::Fatal(err.to_string())),
        }
    }
}

/// Drain one value from a broadcast receiver without blocking, riding
/// through lag notices.
fn try_next<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Option<T> {
    loop {
        match rx.try_recv() {
            Ok(value) => return Some(value),
            Err(TryRecvError::Lagged(missed)) => {
                warn!(missed, "Notification receiver lagged");
            },
            Err(_) => return None,
        }
    }
}
