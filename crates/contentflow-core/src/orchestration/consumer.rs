//! Inbound consumer - feeds agent replies from an [`InboundChannel`] into
//! the orchestrator.
//!
//! A delivery is acknowledged only after the orchestrator handled it. Any
//! error leaves it unacknowledged so it reappears after the channel's
//! visibility timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::Orchestrator;
use crate::channel::InboundChannel;
use crate::error::FlowError;

const PRUNE_INTERVAL: Duration = Duration::from_secs(300);
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Counters for one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: usize,
    pub handled: usize,
    pub failed: usize,
}

pub struct InboundConsumer {
    orchestrator: Arc<Orchestrator>,
    inbound: Arc<dyn InboundChannel>,
}

impl InboundConsumer {
    pub fn new(orchestrator: Arc<Orchestrator>, inbound: Arc<dyn InboundChannel>) -> Self {
        Self {
            orchestrator,
            inbound,
        }
    }

    /// Receive one batch and handle it in order.
    pub async fn poll_once(&self) -> Result<ConsumerStats, FlowError> {
        let batch_size = self.orchestrator.config().consumer.batch_size.max(1);
        let deliveries = self.inbound.receive(batch_size).await?;

        let mut stats = ConsumerStats {
            received: deliveries.len(),
            ..Default::default()
        };

        for delivery in deliveries {
            match self.orchestrator.handle_raw(&delivery.body).await {
                Ok(outcome) => {
                    tracing::debug!(
                        "[InboundConsumer] Delivery {} handled: {:?}",
                        delivery.receipt,
                        outcome
                    );
                    self.inbound.ack(&delivery.receipt).await?;
                    stats.handled += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "[InboundConsumer] Delivery {} failed (attempt {}): {}",
                        delivery.receipt,
                        delivery.attempts,
                        e
                    );
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }

    /// Poll until `shutdown` resolves, pruning the dedup set periodically.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), FlowError>
    where
        F: Future<Output = ()>,
    {
        let config = &self.orchestrator.config().consumer;
        let mut ticker = tokio::time::interval(config.poll_interval().max(MIN_POLL_INTERVAL));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_prune = Instant::now();

        tracing::info!(
            "[InboundConsumer] Started (batch size {}, poll every {:?})",
            config.batch_size,
            config.poll_interval()
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("[InboundConsumer] Shutting down");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    match self.poll_once().await {
                        Ok(stats) if stats.received > 0 => {
                            tracing::info!(
                                "[InboundConsumer] Batch: {} received, {} handled, {} failed",
                                stats.received,
                                stats.handled,
                                stats.failed
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!("[InboundConsumer] Poll failed: {}", e),
                    }

                    if last_prune.elapsed() >= PRUNE_INTERVAL {
                        match self.orchestrator.prune_processed().await {
                            Ok(removed) if removed > 0 => {
                                tracing::info!(
                                    "[InboundConsumer] Pruned {} processed ids",
                                    removed
                                );
                            }
                            Ok(_) => {}
                            Err(e) => tracing::warn!("[InboundConsumer] Prune failed: {}", e),
                        }
                        last_prune = Instant::now();
                    }
                }
            }
        }
    }
}
