//! Aggregate status classification.

use crate::db::{OrderStatus, StatusMap};

/// Collapse per-application statuses into one order status.
///
/// Precedence: in progress > canceled > failed > all unset (pending) > ok.
/// The result never depends on map iteration order.
pub fn classify(statuses: &StatusMap) -> OrderStatus {
    if statuses.is_empty() {
        return OrderStatus::WaitDeploy;
    }

    let mut canceled = false;
    let mut failed = false;
    let mut all_unset = true;

    for item in statuses.values() {
        let status = item.deployment_status;
        if status.is_in_progress() {
            return OrderStatus::Deploying;
        }
        canceled |= status.is_canceled();
        failed |= status == crate::db::AppDeploymentStatus::Failed;
        all_unset &= status.is_unset();
    }

    if canceled {
        OrderStatus::Canceled
    } else if failed {
        OrderStatus::Failed
    } else if all_unset {
        OrderStatus::Deploying
    } else {
        OrderStatus::Ok
    }
}
