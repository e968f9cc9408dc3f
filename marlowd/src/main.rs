//! Marlow Daemon binary
//!
//! Post-trade pipeline runtime: consumes the execution feed, maintains the
//! five-table projection and dispatches settlement instructions.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration (stub gateway)
//! marlowd
//!
//! # Point at the real settlement gateway
//! MARLOW_GATEWAY_URL=https://settlement.internal marlowd
//! ```
//!
//! # Environment Variables
//!
//! - `MARLOW_ENV`: Environment (test, development, production)
//! - `MARLOW_BROKERS`: Feed broker list (default: localhost:9092)
//! - `MARLOW_FEED_TOPIC`: Inbound topic (default: fix.executions)
//! - `MARLOW_GATEWAY_URL`: Settlement gateway base URL (unset: stub)
//! - `MARLOW_GATEWAY_RETRY_BUDGET_SECS`: Outbound retry budget (default: 60)
//! - `MARLOW_HOLIDAYS`: Comma-separated YYYYMMDD holiday dates
//! - `MARLOW_CURRENCY_SCALES`: Overrides, e.g. `USD:2,JPY:0`
//! - `MARLOW_DEDUPE_HORIZON_DAYS`: Dedupe retention (default: 7)

use std::sync::Arc;

use marlow_gateway::{HttpSettlementGateway, SettlementGateway};
use marlowd::{Config, Daemon};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("marlowd=info".parse()?))
        .init();

    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        "Marlow daemon"
    );

    let daemon = match &config.gateway.base_url {
        Some(base_url) => {
            info!(%base_url, "Using HTTP settlement gateway");
            let gateway: Arc<dyn SettlementGateway> = Arc::new(HttpSettlementGateway::new(
                base_url.clone(),
                config.gateway.retry.clone(),
            )?);
            Daemon::new_with_gateway(config, gateway)
        },
        None => {
            info!("No MARLOW_GATEWAY_URL configured, using stub gateway");
            Daemon::new_stub(config)
        },
    };

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            signal_token.cancel();
        }
    });

    daemon.run(shutdown).await?;
    Ok(())
}
