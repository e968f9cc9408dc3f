//! Daemon assembly.
//!
//! Wires the store, outbox, sinks, gateway and rule runtime into a runnable
//! pipeline. The stub assembly keeps every adapter in memory (tests,
//! development); production swaps in the HTTP gateway via configuration.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use marlow_domain::BusinessCalendar;
use marlow_gateway::{SettlementGateway, StubGateway};
use marlow_outbox::{MemoryTradeEvents, Outbox, OutboxDispatcher};
use marlow_rules::RuleRuntime;
use marlow_store::MemoryStore;

use crate::config::Config;
use crate::dead_letter::DeadLetterQueue;
use crate::dedupe::DedupeSet;
use crate::error::DaemonResult;
use crate::feed::InMemoryFeed;
use crate::worker::PipelineWorker;

/// The assembled daemon.
pub struct Daemon {
    config: Config,
    store: Arc<MemoryStore>,
    outbox: Arc<Outbox>,
    events: Arc<MemoryTradeEvents>,
    stub_gateway: Option<Arc<StubGateway>>,
    runtime: Arc<RuleRuntime>,
    dispatcher: Arc<OutboxDispatcher>,
    dedupe: Arc<DedupeSet>,
    dead_letters: Arc<DeadLetterQueue>,
    feed: Arc<InMemoryFeed>,
}

impl Daemon {
    /// Assemble with the stub gateway (test and development).
    pub fn new_stub(config: Config) -> Self {
        let stub = Arc::new(StubGateway::new());
        Self::assemble(config, stub.clone(), Some(stub))
    }

    /// Assemble with an explicit gateway adapter.
    pub fn new_with_gateway(config: Config, gateway: Arc<dyn SettlementGateway>) -> Self {
        Self::assemble(config, gateway, None)
    }

    fn assemble(
        config: Config,
        gateway: Arc<dyn SettlementGateway>,
        stub_gateway: Option<Arc<StubGateway>>,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let outbox = Arc::new(Outbox::new());
        let events = Arc::new(MemoryTradeEvents::new());
        let calendar = BusinessCalendar::with_holidays(config.holidays.iter().copied());

        let runtime = Arc::new(RuleRuntime::new(
            store.clone(),
            outbox.clone(),
            calendar.clone(),
            config.scales.clone(),
        ));
        let dispatcher =
            Arc::new(OutboxDispatcher::new(outbox.clone(), events.clone(), gateway));
        let dedupe = Arc::new(DedupeSet::new(
            config.feed.dedupe_shards,
            config.feed.dedupe_horizon_days,
            calendar,
        ));

        Self {
            config,
            store,
            outbox,
            events,
            stub_gateway,
            runtime,
            dispatcher,
            dedupe,
            dead_letters: Arc::new(DeadLetterQueue::new()),
            feed: Arc::new(InMemoryFeed::new()),
        }
    }

    /// Spawn a worker wired to this daemon's components.
    ///
    /// Subscriptions are taken here, so create the worker before pushing
    /// work at the feed.
    pub fn worker(&self) -> PipelineWorker {
        PipelineWorker::new(
            self.runtime.clone(),
            self.dispatcher.clone(),
            self.dedupe.clone(),
            self.dead_letters.clone(),
            self.events.subscribe(),
            self.store.subscribe(),
        )
    }

    /// Run a single worker over the feed until shutdown.
    pub async fn run(&self, shutdown: CancellationToken) -> DaemonResult<()> {
        info!(
            environment = %self.config.environment,
            topic = %self.config.feed.topic,
            brokers = ?self.config.feed.brokers,
            "Marlow daemon starting"
        );
        let worker = self.worker();
        worker.run(self.feed.clone(), shutdown, self.config.feed.poll_interval).await
    }

    /// Shared store handle.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Shared outbox handle.
    pub fn outbox(&self) -> &Arc<Outbox> {
        &self.outbox
    }

    /// The `trade.events` sink.
    pub fn events(&self) -> &Arc<MemoryTradeEvents> {
        &self.events
    }

    /// The stub gateway, when assembled with one.
    pub fn stub_gateway(&self) -> Option<&Arc<StubGateway>> {
        self.stub_gateway.as_ref()
    }

    /// The inbound feed.
    pub fn feed(&self) -> &Arc<InMemoryFeed> {
        &self.feed
    }

    /// The dead-letter queue.
    pub fn dead_letters(&self) -> &Arc<DeadLetterQueue> {
        &self.dead_letters
    }

    /// The inbound dedupe set.
    pub fn dedupe(&self) -> &Arc<DedupeSet> {
        &self.dedupe
    }

    /// The rule runtime.
    pub fn runtime(&self) -> &Arc<RuleRuntime> {
        &self.runtime
    }
}
