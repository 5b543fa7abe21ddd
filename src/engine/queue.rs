//! In-process work queue and the worker that drains it.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::upstream::WorkQueue;

use super::orders::OrderService;
use super::reconciler::CONTINUE_DEPLOY_TOPIC;

pub type ContinuationJob = (String, String); // (topic, order_id)

/// Bounded channel behind the `WorkQueue` seam. A full channel counts as a
/// failed push so the caller's retry policy applies.
pub struct ChannelQueue {
    tx: mpsc::Sender<ContinuationJob>,
}

impl ChannelQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ContinuationJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl WorkQueue for ChannelQueue {
    async fn push(&self, topic: &str, order_id: &str) -> Result<()> {
        self.tx
            .try_send((topic.to_string(), order_id.to_string()))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => anyhow!("work queue is full"),
                mpsc::error::TrySendError::Closed(_) => anyhow!("work queue is closed"),
            })
    }
}

/// Submits the next batch of orders the reconciler advanced.
pub struct ContinuationWorker {
    rx: mpsc::Receiver<ContinuationJob>,
    service: Arc<OrderService>,
}

impl ContinuationWorker {
    pub fn new(rx: mpsc::Receiver<ContinuationJob>, service: Arc<OrderService>) -> Self {
        Self { rx, service }
    }

    pub async fn run(mut self) {
        tracing::info!("Continuation worker started");

        while let Some((topic, order_id)) = self.rx.recv().await {
            if topic != CONTINUE_DEPLOY_TOPIC {
                tracing::warn!(topic = %topic, order = %order_id, "Ignoring job with unknown topic");
                continue;
            }

            let service = self.service.clone();
            tokio::spawn(async move {
                match service.continue_deploy_order(&order_id).await {
                    Ok(Some(results)) => tracing::info!(
                        order = %order_id,
                        applications = results.len(),
                        "Continued deployment order"
                    ),
                    Ok(None) => tracing::debug!(order = %order_id, "Order no longer deploying, nothing to continue"),
                    Err(e) => tracing::error!(order = %order_id, error = %e, "Failed to continue deployment order"),
                }
            });
        }

        tracing::info!("Continuation worker stopped");
    }
}
