//! Batch executor: submits the runtimes of an order's current wave.
//!
//! Submission is sequential and fail-fast. When a runtime creation fails the
//! remaining applications of the wave are not submitted, the ones already
//! submitted are left running, and the order is marked failed with the
//! reason recorded on the row.

use std::collections::{BTreeMap, HashMap};

use crate::api::metrics::{record_batch_failed, record_batch_submitted};
use crate::db::{
    AppDeploymentStatus, ApplicationStatusItem, DeploymentOrder, OrderKind, OrderSource,
    OrderStatus,
};
use crate::upstream::{
    ApplicationReleaseSummary, Release, RuntimeCreateExtra, RuntimeCreateRequest, RuntimeCreated,
    RuntimeSource, Upstreams, GIT_BRANCH_LABEL,
};
use crate::DbPool;

use super::error::{OrderError, OrderResult};

/// Environment-style parameter carrying the selected modes of a
/// multi-application order into each runtime.
pub const DEPLOY_MODES_ENV: &str = "DEPLOY_MODES";

pub const FIRST_BATCH: i64 = 1;

const RELEASE_DEPLOY_TYPE: &str = "release";

/// Submission results of one wave, keyed by application name.
pub type SubmissionResults = BTreeMap<String, RuntimeCreated>;

pub struct BatchExecutor {
    db: DbPool,
    upstreams: Upstreams,
}

impl BatchExecutor {
    pub fn new(db: DbPool, upstreams: Upstreams) -> Self {
        Self { db, upstreams }
    }

    /// Submit the wave `order.current_batch` points at and persist the outcome.
    ///
    /// The caller must hold the order's lock. Requests are fully composed
    /// before anything is written, so a validation failure leaves the stored
    /// order unchanged.
    pub async fn execute_current_batch(
        &self,
        order: &mut DeploymentOrder,
    ) -> OrderResult<SubmissionResults> {
        let requests = match order.kind_enum() {
            OrderKind::MultiApplication => self.compose_batch_requests(order).await?,
            OrderKind::SingleApplication => vec![self.compose_single_request(order).await?],
        };
        if requests.is_empty() {
            return Err(OrderError::Validation(format!(
                "malformed deploy list of order {}: batch {} has no applications",
                order.id, order.current_batch
            )));
        }

        let mut detail = order.status_detail_map()?;
        if order.current_batch == FIRST_BATCH && detail.is_empty() && order.started_at.is_none() {
            order.started_at = Some(chrono::Utc::now().to_rfc3339());
        }

        for req in &requests {
            detail.insert(
                req.extra.application_name.clone(),
                ApplicationStatusItem::with_status(AppDeploymentStatus::Init),
            );
        }

        let mut results = SubmissionResults::new();
        let mut failure: Option<String> = None;

        for req in &requests {
            let app_name = &req.extra.application_name;
            match self.upstreams.runtimes.create_runtime(&order.operator, req).await {
                Ok(created) => {
                    tracing::info!(
                        order = %order.id,
                        batch = order.current_batch,
                        app = %app_name,
                        runtime_id = created.runtime_id,
                        deployment_id = created.deployment_id,
                        "Runtime submitted"
                    );
                    detail.insert(
                        app_name.clone(),
                        ApplicationStatusItem {
                            runtime_id: created.runtime_id,
                            application_id: req.extra.application_id,
                            deployment_id: created.deployment_id,
                            deployment_status: AppDeploymentStatus::Init,
                        },
                    );
                    results.insert(app_name.clone(), created);
                }
                Err(e) => {
                    tracing::error!(
                        order = %order.id,
                        runtime = %req.name,
                        cluster = %req.cluster_name,
                        release_id = %req.release_id,
                        error = %e,
                        "Failed to create runtime"
                    );
                    detail.insert(
                        app_name.clone(),
                        ApplicationStatusItem::with_status(AppDeploymentStatus::Failed),
                    );
                    failure = Some(format!("application: {}, failed reason: {:#}", app_name, e));
                    break;
                }
            }
        }

        order.set_status_detail(&detail)?;
        match &failure {
            Some(reason) => {
                order.set_status(OrderStatus::Failed);
                order.failure_reason = Some(reason.clone());
            }
            None => {
                order.set_status(OrderStatus::Deploying);
                order.failure_reason = None;
            }
        }

        if !order.update(&self.db).await? {
            return Err(OrderError::stale(&order.id));
        }

        match failure {
            Some(reason) => {
                record_batch_failed();
                Err(OrderError::External(format!("deploy failed, reason: {}", reason)))
            }
            None => {
                record_batch_submitted();
                tracing::info!(
                    order = %order.id,
                    batch = order.current_batch,
                    batch_size = order.batch_size,
                    applications = results.len(),
                    "Batch submitted"
                );
                Ok(results)
            }
        }
    }

    async fn compose_batch_requests(
        &self,
        order: &DeploymentOrder,
    ) -> OrderResult<Vec<RuntimeCreateRequest>> {
        if order.current_batch <= 0 {
            return Err(OrderError::Validation("current batch is 0".to_string()));
        }
        let release_ids = order.current_release_ids()?.ok_or_else(|| {
            OrderError::Validation(format!(
                "invalid deploy list of order {}: no batch {} of {}",
                order.id, order.current_batch, order.batch_size
            ))
        })?;

        let summaries = resolve_applications(&self.upstreams, order, &release_ids).await?;
        let cluster_name = self.resolve_cluster(order).await?;
        let params = order.order_params()?;

        let modes = order.mode_names();
        let extra_params = if modes.is_empty() {
            None
        } else {
            let extra: HashMap<&str, String> =
                [(DEPLOY_MODES_ENV, modes.join(","))].into_iter().collect();
            Some(serde_json::to_string(&extra)?)
        };

        summaries
            .into_iter()
            .map(|summary| -> OrderResult<RuntimeCreateRequest> {
                let param = serde_json::to_string(
                    params
                        .get(&summary.application_name)
                        .map(Vec::as_slice)
                        .unwrap_or_default(),
                )?;
                Ok(RuntimeCreateRequest {
                    name: summary.application_name.clone(),
                    deployment_order_id: order.id.clone(),
                    release_id: summary.release_id,
                    release_version: summary.version,
                    source: runtime_source(order.source_enum()),
                    operator: order.operator.clone(),
                    cluster_name: cluster_name.clone(),
                    extra: RuntimeCreateExtra {
                        project_id: order.project_id as u64,
                        application_id: summary.application_id,
                        application_name: summary.application_name,
                        workspace: order.workspace.clone(),
                        deploy_type: RELEASE_DEPLOY_TYPE.to_string(),
                    },
                    param,
                    extra_params: extra_params.clone(),
                })
            })
            .collect()
    }

    async fn compose_single_request(&self, order: &DeploymentOrder) -> OrderResult<RuntimeCreateRequest> {
        let release = match self.upstreams.releases.get_release(&order.release_id).await? {
            Some(Release::SingleApplication(release)) => release,
            Some(Release::MultiApplication(_)) => {
                return Err(OrderError::Validation(format!(
                    "release {} is not an application release",
                    order.release_id
                )))
            }
            None => return Err(OrderError::NotFound(format!("release {}", order.release_id))),
        };

        let cluster_name = self.resolve_cluster(order).await?;
        let params = order.order_params()?;
        let param = serde_json::to_string(
            params
                .get(&release.application_name)
                .map(Vec::as_slice)
                .unwrap_or_default(),
        )?;

        let mut name = release.application_name.clone();
        let mut deploy_type = RELEASE_DEPLOY_TYPE.to_string();
        if order.source_enum() == OrderSource::Pipeline && !order.deploy_without_branch {
            let branch = release
                .labels
                .get(GIT_BRANCH_LABEL)
                .cloned()
                .ok_or_else(|| {
                    OrderError::Validation(format!(
                        "failed to get release branch in release {}",
                        release.release_id
                    ))
                })?;
            name = branch;
            deploy_type = String::new();
        }

        Ok(RuntimeCreateRequest {
            name,
            deployment_order_id: order.id.clone(),
            release_id: release.release_id.clone(),
            release_version: release.version.clone(),
            source: runtime_source(order.source_enum()),
            operator: order.operator.clone(),
            cluster_name,
            extra: RuntimeCreateExtra {
                project_id: order.project_id as u64,
                application_id: release.application_id,
                application_name: release.application_name.clone(),
                workspace: order.workspace.clone(),
                deploy_type,
            },
            param,
            extra_params: None,
        })
    }

    async fn resolve_cluster(&self, order: &DeploymentOrder) -> OrderResult<String> {
        self.upstreams
            .projects
            .cluster_for_workspace(order.project_id as u64, &order.workspace)
            .await?
            .ok_or_else(|| {
                OrderError::Validation(format!(
                    "cluster not found at workspace: {}",
                    order.workspace
                ))
            })
    }
}

fn runtime_source(source: OrderSource) -> RuntimeSource {
    match source {
        OrderSource::Pipeline => RuntimeSource::Pipeline,
        OrderSource::DeployCenter => RuntimeSource::Release,
    }
}

/// Application summaries of the given release ids, in the given order.
///
/// When the order deploys into another project than the release belongs to,
/// application ids are rebound by name to the target project's applications.
pub(crate) async fn resolve_applications(
    upstreams: &Upstreams,
    order: &DeploymentOrder,
    release_ids: &[String],
) -> OrderResult<Vec<ApplicationReleaseSummary>> {
    if release_ids.is_empty() {
        return Ok(Vec::new());
    }

    let releases = upstreams.releases.list_releases(release_ids).await?;
    let by_id: HashMap<&str, _> = releases.iter().map(|r| (r.release_id.as_str(), r)).collect();

    let mut summaries = Vec::with_capacity(release_ids.len());
    let mut cross_project = false;
    for id in release_ids {
        let release = by_id
            .get(id.as_str())
            .ok_or_else(|| OrderError::NotFound(format!("release {}", id)))?;
        cross_project |= release.project_id != order.project_id as u64;
        summaries.push(release.summary());
    }

    if cross_project {
        rebind_application_ids(upstreams, order.project_id as u64, &order.operator, &mut summaries)
            .await?;
    }
    Ok(summaries)
}

/// Point every summary at the application of the same name in `project_id`.
pub(crate) async fn rebind_application_ids(
    upstreams: &Upstreams,
    project_id: u64,
    operator: &str,
    summaries: &mut [ApplicationReleaseSummary],
) -> OrderResult<()> {
    let names: Vec<String> = summaries.iter().map(|s| s.application_name.clone()).collect();
    let ids = upstreams
        .projects
        .application_ids_by_names(project_id, operator, &names)
        .await?;

    for summary in summaries.iter_mut() {
        summary.application_id = *ids.get(&summary.application_name).ok_or_else(|| {
            OrderError::Validation(format!(
                "failed to find application {} in project {}",
                summary.application_name, project_id
            ))
        })?;
    }
    Ok(())
}
