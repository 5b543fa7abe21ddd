//! Reconciler: advances multi-application orders between batches.
//!
//! Each tick observes the runtimes of every deploying order's current batch,
//! folds the observation into the recorded status detail and either advances
//! the order to its next batch, completes it, or records the new aggregate
//! status. Submission of the next batch is handed to the work queue.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::api::metrics::{record_batch_advanced, record_reconcile_cycle};
use crate::config::OrchestratorConfig;
use crate::db::{
    merge_status_detail, AppDeploymentStatus, ApplicationStatusItem, DeploymentOrder, OrderKind,
    OrderStatus, StatusMap,
};
use crate::upstream::Upstreams;
use crate::DbPool;

use super::error::{OrderError, OrderResult};
use super::executor::resolve_applications;
use super::locks::OrderLocks;
use super::status::classify;

/// Queue topic consumed by the continuation worker.
pub const CONTINUE_DEPLOY_TOPIC: &str = "deployment-order-continue";

/// What one tick did to one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The order was no longer eligible once its lock was taken.
    Skipped,
    /// Batch finished; `enqueued` tells whether the next one was queued.
    Advanced { enqueued: bool },
    Completed,
    Deploying,
    Failed,
    Canceled,
}

/// Result of a reconcile cycle
#[derive(Debug, Default)]
pub struct ReconcileResult {
    pub orders_checked: usize,
    pub advanced: usize,
    pub completed: usize,
    pub still_deploying: usize,
    pub failed: usize,
    pub canceled: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl ReconcileResult {
    fn record(&mut self, outcome: &OrderResult<TickOutcome>) {
        match outcome {
            Ok(TickOutcome::Skipped) => self.skipped += 1,
            Ok(TickOutcome::Advanced { .. }) => self.advanced += 1,
            Ok(TickOutcome::Completed) => self.completed += 1,
            Ok(TickOutcome::Deploying) => self.still_deploying += 1,
            Ok(TickOutcome::Failed) => self.failed += 1,
            Ok(TickOutcome::Canceled) => self.canceled += 1,
            Err(_) => self.errors += 1,
        }
    }

    fn has_changes(&self) -> bool {
        self.advanced + self.completed + self.failed + self.canceled + self.errors > 0
    }
}

pub struct Reconciler {
    db: DbPool,
    upstreams: Upstreams,
    locks: Arc<OrderLocks>,
    concurrency: usize,
    push_retries: u32,
}

impl Reconciler {
    pub fn new(
        db: DbPool,
        upstreams: Upstreams,
        locks: Arc<OrderLocks>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            db,
            upstreams,
            locks,
            concurrency: config.reconcile_concurrency.max(1),
            push_retries: config.queue_push_retries,
        }
    }

    /// Run one reconcile cycle over every deploying multi-application order.
    pub async fn reconcile(&self) -> ReconcileResult {
        let mut result = ReconcileResult::default();

        let orders = match DeploymentOrder::list_deploying_multi_application(&self.db).await {
            Ok(orders) => orders,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list deploying orders");
                result.errors += 1;
                return result;
            }
        };

        let candidates: Vec<String> = orders
            .into_iter()
            .filter(|order| {
                if order.current_batch == 0 {
                    result.skipped += 1;
                    return false;
                }
                true
            })
            .map(|order| order.id)
            .collect();
        result.orders_checked = candidates.len();

        let outcomes: Vec<(String, OrderResult<TickOutcome>)> = stream::iter(candidates)
            .map(|order_id| async move {
                let outcome = self.reconcile_order(&order_id).await;
                (order_id, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (order_id, outcome) in &outcomes {
            if let Err(e) = outcome {
                tracing::warn!(order = %order_id, error = %e, "Failed to reconcile deployment order");
            }
            result.record(outcome);
        }

        self.locks.prune();
        record_reconcile_cycle(result.orders_checked);
        result
    }

    /// Observe, merge, classify and persist one order.
    pub async fn reconcile_order(&self, order_id: &str) -> OrderResult<TickOutcome> {
        let _guard = self.locks.acquire(order_id).await;

        let mut order = DeploymentOrder::get(&self.db, order_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(format!("deployment order {}", order_id)))?;
        if order.status_enum() != OrderStatus::Deploying
            || order.kind_enum() != OrderKind::MultiApplication
            || order.current_batch == 0
        {
            return Ok(TickOutcome::Skipped);
        }

        let fresh = self.observe_current_batch(&order).await?;
        if fresh.is_empty() {
            tracing::warn!(
                order = %order.id,
                batch = order.current_batch,
                "Current batch has no applications"
            );
            order.set_status(OrderStatus::Failed);
            order.failure_reason = Some(format!(
                "malformed deploy list: batch {} has no applications",
                order.current_batch
            ));
            if !order.update(&self.db).await? {
                return Err(OrderError::stale(&order.id));
            }
            return Ok(TickOutcome::Failed);
        }

        let merged = merge_status_detail(&order.status_detail_map()?, &fresh);
        order.set_status_detail(&merged)?;

        let batch_status = classify(&fresh);
        let outcome = match batch_status {
            OrderStatus::Ok if order.is_last_batch() => {
                order.set_status(OrderStatus::Ok);
                TickOutcome::Completed
            }
            OrderStatus::Ok => {
                order.current_batch += 1;
                order.set_status(OrderStatus::Deploying);
                TickOutcome::Advanced { enqueued: false }
            }
            OrderStatus::Failed => {
                order.set_status(OrderStatus::Failed);
                order.failure_reason = Some(describe_failures(order.current_batch, &fresh));
                TickOutcome::Failed
            }
            OrderStatus::Canceled => {
                order.set_status(OrderStatus::Canceled);
                TickOutcome::Canceled
            }
            other => {
                order.set_status(other);
                TickOutcome::Deploying
            }
        };

        if !order.update(&self.db).await? {
            return Err(OrderError::stale(&order.id));
        }

        match outcome {
            TickOutcome::Advanced { .. } => {
                record_batch_advanced();
                tracing::info!(
                    order = %order.id,
                    batch = order.current_batch,
                    batch_size = order.batch_size,
                    "Batch finished, advancing"
                );
                let enqueued = self.enqueue_continuation(&mut order).await?;
                Ok(TickOutcome::Advanced { enqueued })
            }
            TickOutcome::Completed => {
                tracing::info!(order = %order.id, batch_size = order.batch_size, "Deployment order completed");
                Ok(outcome)
            }
            _ => Ok(outcome),
        }
    }

    /// Status of every application of the current batch, straight from the
    /// runtime service.
    async fn observe_current_batch(&self, order: &DeploymentOrder) -> OrderResult<StatusMap> {
        let release_ids = order.current_release_ids()?.ok_or_else(|| {
            OrderError::Validation(format!(
                "invalid deploy list of order {}: no batch {} of {}",
                order.id, order.current_batch, order.batch_size
            ))
        })?;
        let applications = resolve_applications(&self.upstreams, order, &release_ids).await?;

        let mut fresh = StatusMap::new();
        for app in applications {
            let runtime = self
                .upstreams
                .runtimes
                .runtime_by_app(&order.workspace, order.project_id as u64, &app.application_name)
                .await?;

            let item = match runtime {
                None => {
                    tracing::debug!(order = %order.id, app = %app.application_name, "Runtime not found");
                    ApplicationStatusItem::with_status(AppDeploymentStatus::Failed)
                }
                Some(runtime) => match self.upstreams.runtimes.last_deployment(runtime.id).await? {
                    None => ApplicationStatusItem::with_status(AppDeploymentStatus::Waiting),
                    Some(deployment) => ApplicationStatusItem {
                        runtime_id: runtime.id,
                        application_id: app.application_id,
                        deployment_id: deployment.id,
                        deployment_status: deployment.status,
                    },
                },
            };
            fresh.insert(app.application_name, item);
        }
        Ok(fresh)
    }

    /// Push the order onto the continuation queue, retrying a few times.
    ///
    /// When every attempt fails the order is marked failed, since the next
    /// tick would observe a batch that was never submitted.
    async fn enqueue_continuation(&self, order: &mut DeploymentOrder) -> OrderResult<bool> {
        let mut attempt = 0;
        loop {
            match self.upstreams.queue.push(CONTINUE_DEPLOY_TOPIC, &order.id).await {
                Ok(()) => return Ok(true),
                Err(e) if attempt < self.push_retries => {
                    attempt += 1;
                    tracing::warn!(
                        order = %order.id,
                        attempt,
                        error = %e,
                        "Failed to enqueue next batch, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(50 * attempt as u64)).await;
                }
                Err(e) => {
                    tracing::error!(order = %order.id, error = %e, "Failed to enqueue next batch");
                    order.set_status(OrderStatus::Failed);
                    order.failure_reason = Some(format!(
                        "failed to schedule batch {}: {:#}",
                        order.current_batch, e
                    ));
                    if !order.update(&self.db).await? {
                        return Err(OrderError::stale(&order.id));
                    }
                    return Ok(false);
                }
            }
        }
    }
}

fn describe_failures(batch: i64, fresh: &StatusMap) -> String {
    let failed: Vec<&str> = fresh
        .iter()
        .filter(|(_, item)| item.deployment_status == AppDeploymentStatus::Failed)
        .map(|(name, _)| name.as_str())
        .collect();
    format!("batch {} failed, applications: {}", batch, failed.join(", "))
}

/// Spawn the background reconcile task
pub fn spawn_reconciler_task(reconciler: Arc<Reconciler>, config: &OrchestratorConfig) {
    let poll_interval = config.poll_interval_secs.max(1);
    let initial_delay = config.initial_delay_secs;
    tracing::info!(
        poll_interval_secs = poll_interval,
        initial_delay_secs = initial_delay,
        concurrency = reconciler.concurrency,
        "Starting deployment order reconciler"
    );

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(initial_delay)).await;

        let mut tick = interval(Duration::from_secs(poll_interval));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;

            let result = reconciler.reconcile().await;
            if result.has_changes() {
                tracing::info!(
                    orders_checked = result.orders_checked,
                    advanced = result.advanced,
                    completed = result.completed,
                    deploying = result.still_deploying,
                    failed = result.failed,
                    canceled = result.canceled,
                    skipped = result.skipped,
                    errors = result.errors,
                    "Reconcile cycle completed (status changes detected)"
                );
            } else {
                tracing::debug!(
                    orders_checked = result.orders_checked,
                    deploying = result.still_deploying,
                    skipped = result.skipped,
                    "Reconcile cycle completed"
                );
            }
        }
    });
}
