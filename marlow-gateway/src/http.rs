//! Reqwest adapter for the settlement gateway.
//!
//! Contract: `POST {base}/v1/settlements` with the instruction as JSON and
//! `Idempotency-Key: <settleId>`; the gateway answers 202 when accepted.
//! Transient failures (transport errors, timeouts, 5xx, 408, 429) retry on
//! the configured backoff schedule until the retry budget runs out; any
//! other 4xx is terminal and dead-letters the settlement upstream.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use marlow_domain::SettlementInstruction;

use crate::error::GatewayError;
use crate::ports::{RetryPolicy, SettlementGateway};

/// Per-attempt HTTP timeout
const ATTEMPT_TIMEOUT_SECS: u64 = 10;

/// Response body bytes kept for diagnostics
const BODY_SNIPPET_LEN: usize = 256;

/// HTTP settlement gateway client.
pub struct HttpSettlementGateway {
    client: Client,
    base_url: String,
    policy: RetryPolicy,
}

impl HttpSettlementGateway {
    /// Create a client against `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>, policy: RetryPolicy) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(ATTEMPT_TIMEOUT_SECS))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self { client, base_url: base_url.into(), policy })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/settlements", self.base_url)
    }

    /// One POST attempt, classified into the gateway error taxonomy.
    async fn attempt(&self, instruction: &SettlementInstruction) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("Idempotency-Key", &instruction.settle_id)
            .json(instruction)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            if status != StatusCode::ACCEPTED {
                debug!(settle_id = %instruction.settle_id, %status, "Gateway ack with non-202 success");
            }
            return Ok(());
        }

        let body: String = response
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(BODY_SNIPPET_LEN)
            .collect();
        Err(GatewayError::Status { status: status.as_u16(), body })
    }
}

#[async_trait]
impl SettlementGateway for HttpSettlementGateway {
    async fn send(&self, instruction: &SettlementInstruction) -> Result<(), GatewayError> {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            match self.attempt(instruction).await {
                Ok(()) => {
                    debug!(
                        settle_id = %instruction.settle_id,
                        attempts,
                        "Settlement accepted by gateway"
                    );
                    return Ok(());
                },
                Err(err) if err.is_terminal() => {
                    warn!(settle_id = %instruction.settle_id, error = %err, "Terminal gateway rejection");
                    return Err(err);
                },
                Err(err) => {
                    let delay = self.policy.delay_for(attempts);
                    if started.elapsed() + delay > self.policy.max_elapsed {
                        return Err(GatewayError::RetriesExhausted {
                            attempts,
                            last: err.to_string(),
                        });
                    }
                    warn!(
                        settle_id = %instruction.settle_id,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Gateway send failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                },
            }
        }
    }
}
