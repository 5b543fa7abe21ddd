//! Deployment order engine.
//!
//! Planning, batch execution, status reconciliation and the order
//! operations built on top of them.

mod error;
mod executor;
mod locks;
mod orders;
mod planner;
mod queue;
mod reconciler;
mod status;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{OrderError, OrderResult};
pub use executor::{BatchExecutor, SubmissionResults, DEPLOY_MODES_ENV, FIRST_BATCH};
pub use locks::OrderLocks;
pub use orders::{CreatedOrder, OrderService};
pub use planner::{plan, release_ids, PlanError, Wave};
pub use queue::{ChannelQueue, ContinuationJob, ContinuationWorker};
pub use reconciler::{
    spawn_reconciler_task, ReconcileResult, Reconciler, TickOutcome, CONTINUE_DEPLOY_TOPIC,
};
pub use status::classify;
