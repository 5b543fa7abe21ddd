//! Deployment order operations: create, deploy, continue, cancel, get, list.
//!
//! Every mutation runs under the order's lock and writes through the
//! row's version token. Permission checks cover all applications of the
//! order and run before anything is persisted.

use std::sync::Arc;

use crate::api::metrics::record_order_created;
use crate::db::{
    merge_status_detail, AppDeploymentStatus, ApplicationStatusItem, CreateOrderRequest,
    DeploymentOrder, ListOrdersQuery, OrderKind, OrderPage, OrderParams, OrderStatus, StatusMap,
};
use crate::upstream::{ApplicationReleaseSummary, Release, ReleaseLookup, RuntimeRecord, Upstreams};
use crate::DbPool;

use super::error::{OrderError, OrderResult};
use super::executor::{
    rebind_application_ids, resolve_applications, BatchExecutor, SubmissionResults, FIRST_BATCH,
};
use super::locks::OrderLocks;
use super::planner::{plan, release_ids};
use super::status::classify;

const DEFAULT_MODE: &str = "default";

/// A freshly created order and, with `auto_run`, its first batch submissions.
#[derive(Debug)]
pub struct CreatedOrder {
    pub order: DeploymentOrder,
    pub deployments: SubmissionResults,
}

pub struct OrderService {
    db: DbPool,
    upstreams: Upstreams,
    locks: Arc<OrderLocks>,
    executor: Arc<BatchExecutor>,
}

impl OrderService {
    pub fn new(
        db: DbPool,
        upstreams: Upstreams,
        locks: Arc<OrderLocks>,
        executor: Arc<BatchExecutor>,
    ) -> Self {
        Self {
            db,
            upstreams,
            locks,
            executor,
        }
    }

    pub async fn create(&self, req: CreateOrderRequest) -> OrderResult<CreatedOrder> {
        if req.operator.trim().is_empty() {
            return Err(OrderError::Validation("operator is required".to_string()));
        }

        let release_id = self.resolve_release_id(&req).await?;
        let release = self
            .upstreams
            .releases
            .get_release(&release_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(format!("release {}", release_id)))?;

        let project_id = if req.project_id == 0 {
            release.project_id()
        } else {
            req.project_id
        };
        let workspace = self.resolve_workspace(&req, &release, project_id).await?;

        let now = chrono::Utc::now().to_rfc3339();
        let mut order = DeploymentOrder {
            id: req.id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            kind: release.order_kind().as_str().to_string(),
            release_id: release_id.clone(),
            workspace: workspace.clone(),
            project_id: project_id as i64,
            application_id: None,
            application_name: None,
            operator: req.operator.clone(),
            source: req.source.as_str().to_string(),
            deploy_without_branch: req.deploy_without_branch,
            batch_size: 0,
            current_batch: 0,
            status: OrderStatus::WaitDeploy.as_str().to_string(),
            failure_reason: None,
            status_detail: "{}".to_string(),
            params: "{}".to_string(),
            deploy_list: "[]".to_string(),
            modes: String::new(),
            started_at: None,
            version: 0,
            created_at: now.clone(),
            updated_at: now,
        };

        let applications = match &release {
            Release::MultiApplication(project_release) => {
                let selected = if req.modes.is_empty() {
                    vec![DEFAULT_MODE.to_string()]
                } else {
                    req.modes.clone()
                };
                let waves = plan(&selected, &project_release.modes)?;
                if waves.is_empty() {
                    return Err(OrderError::Validation(format!(
                        "modes {} of release {} contain no applications",
                        selected.join(","),
                        release_id
                    )));
                }
                if let Some(empty) = waves.iter().position(Vec::is_empty) {
                    return Err(OrderError::Validation(format!(
                        "malformed deploy list: batch {} of modes {} has no applications",
                        empty + 1,
                        selected.join(",")
                    )));
                }

                let deploy_list = release_ids(&waves);
                order.batch_size = deploy_list.len() as i64;
                order.deploy_list = serde_json::to_string(&deploy_list)?;
                order.modes = selected.join(",");

                let mut applications: Vec<ApplicationReleaseSummary> =
                    waves.into_iter().flatten().collect();
                if project_release.project_id != project_id {
                    rebind_application_ids(&self.upstreams, project_id, &req.operator, &mut applications)
                        .await?;
                }
                applications
            }
            Release::SingleApplication(app_release) => {
                let mut applications = vec![app_release.summary()];
                if app_release.project_id != project_id {
                    rebind_application_ids(&self.upstreams, project_id, &req.operator, &mut applications)
                        .await?;
                }
                order.application_id = Some(applications[0].application_id as i64);
                order.application_name = Some(applications[0].application_name.clone());
                order.batch_size = 1;
                applications
            }
        };

        self.check_permissions(&req.operator, &workspace, &applications)
            .await?;

        let mut params = OrderParams::new();
        for app in &applications {
            let app_params = self
                .upstreams
                .params
                .fetch_params(app.application_id, &workspace)
                .await?;
            params.insert(app.application_name.clone(), app_params);
        }
        order.params = serde_json::to_string(&params)?;

        order.insert(&self.db).await?;
        record_order_created(order.kind_enum());
        tracing::info!(
            order = %order.id,
            kind = %order.kind,
            release_id = %order.release_id,
            workspace = %order.workspace,
            batch_size = order.batch_size,
            operator = %order.operator,
            "Deployment order created"
        );

        if !req.auto_run {
            return Ok(CreatedOrder {
                order,
                deployments: SubmissionResults::new(),
            });
        }

        let _guard = self.locks.acquire(&order.id).await;
        order.current_batch = FIRST_BATCH;
        match self.executor.execute_current_batch(&mut order).await {
            Ok(deployments) => Ok(CreatedOrder { order, deployments }),
            Err(e) => Err(OrderError::RunAfterCreate {
                order_id: order.id.clone(),
                source: Box::new(e),
            }),
        }
    }

    /// Run an order. A new order starts at its first batch; a failed or
    /// canceled one retries its current batch with the recorded detail kept.
    pub async fn deploy(&self, id: &str, operator: &str) -> OrderResult<SubmissionResults> {
        let _guard = self.locks.acquire(id).await;
        let mut order = self.load(id).await?;

        match order.status_enum() {
            OrderStatus::Deploying => {
                return Err(OrderError::State(format!(
                    "deployment order {} is already deploying",
                    id
                )))
            }
            OrderStatus::Ok => {
                return Err(OrderError::State(format!(
                    "deployment order {} has already succeeded",
                    id
                )))
            }
            _ => {}
        }

        let applications = self.order_applications(&order).await?;
        self.check_permissions(operator, &order.workspace, &applications)
            .await?;

        order.operator = operator.to_string();
        // current_batch never moves backwards
        if order.current_batch == 0 {
            order.current_batch = FIRST_BATCH;
        }

        tracing::info!(order = %order.id, operator, batch = order.current_batch, "Deploying order");
        self.executor.execute_current_batch(&mut order).await
    }

    /// Submit the batch the reconciler advanced the order to.
    ///
    /// Returns `None` when the order is no longer deploying.
    pub async fn continue_deploy_order(&self, id: &str) -> OrderResult<Option<SubmissionResults>> {
        let _guard = self.locks.acquire(id).await;
        let mut order = self.load(id).await?;

        if order.status_enum() != OrderStatus::Deploying {
            return Ok(None);
        }
        if order.current_batch <= 0 {
            return Err(OrderError::Validation(format!(
                "deployment order {} has not started",
                id
            )));
        }

        self.executor
            .execute_current_batch(&mut order)
            .await
            .map(Some)
    }

    pub async fn cancel(&self, id: &str, operator: &str, force: bool) -> OrderResult<DeploymentOrder> {
        let _guard = self.locks.acquire(id).await;
        let mut order = self.load(id).await?;

        match order.status_enum() {
            OrderStatus::Canceled => {
                return Err(OrderError::State(format!(
                    "deployment order {} is already canceled",
                    id
                )))
            }
            OrderStatus::Ok if !force => {
                return Err(OrderError::State(format!(
                    "deployment order {} has already succeeded",
                    id
                )))
            }
            _ => {}
        }

        let applications = self.order_applications(&order).await?;
        self.check_permissions(operator, &order.workspace, &applications)
            .await?;

        let current = self.current_batch_applications(&order).await?;
        let mut detail = order.status_detail_map()?;
        let mut issued = 0;
        for app in &current {
            let Some(runtime) = self.find_runtime(&order, &app.application_name).await? else {
                continue;
            };
            let Some(deployment) = self.upstreams.runtimes.last_deployment(runtime.id).await? else {
                continue;
            };
            if deployment.status.is_finished() {
                continue;
            }

            self.upstreams
                .runtimes
                .cancel_deployment(operator, deployment.id)
                .await?;
            issued += 1;
            detail.insert(
                app.application_name.clone(),
                ApplicationStatusItem {
                    runtime_id: runtime.id,
                    application_id: app.application_id,
                    deployment_id: deployment.id,
                    deployment_status: AppDeploymentStatus::Canceling,
                },
            );
            tracing::info!(
                order = %order.id,
                app = %app.application_name,
                deployment_id = deployment.id,
                "Requested deployment cancellation"
            );
        }

        order.set_status_detail(&detail)?;
        order.operator = operator.to_string();
        if issued == 0 || order.kind_enum() == OrderKind::SingleApplication {
            order.set_status(OrderStatus::Canceled);
        } else {
            order.set_status(OrderStatus::Deploying);
        }

        if !order.update(&self.db).await? {
            return Err(OrderError::stale(&order.id));
        }
        tracing::info!(order = %order.id, operator, issued, status = %order.status, "Deployment order canceled");
        Ok(order)
    }

    /// Fetch an order. A deploying single-application order has its status
    /// refreshed from its runtime first.
    pub async fn get(&self, id: &str) -> OrderResult<DeploymentOrder> {
        let order = self.load(id).await?;
        if order.kind_enum() != OrderKind::SingleApplication
            || order.status_enum() != OrderStatus::Deploying
        {
            return Ok(order);
        }

        let _guard = self.locks.acquire(id).await;
        let mut order = self.load(id).await?;
        if order.status_enum() == OrderStatus::Deploying {
            self.refresh_single_application(&mut order).await?;
        }
        Ok(order)
    }

    pub async fn list(&self, query: &ListOrdersQuery) -> OrderResult<OrderPage> {
        Ok(DeploymentOrder::list(&self.db, query).await?)
    }

    async fn load(&self, id: &str) -> OrderResult<DeploymentOrder> {
        DeploymentOrder::get(&self.db, id)
            .await?
            .ok_or_else(|| OrderError::NotFound(format!("deployment order {}", id)))
    }

    async fn resolve_release_id(&self, req: &CreateOrderRequest) -> OrderResult<String> {
        if let Some(id) = req.release_id.as_deref().filter(|id| !id.is_empty()) {
            return Ok(id.to_string());
        }

        let version = req
            .release_name
            .clone()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| OrderError::Validation("release id or release name is required".to_string()))?;
        let kind = req.kind.ok_or_else(|| {
            OrderError::Validation("kind is required when the release is given by name".to_string())
        })?;
        let lookup = match kind {
            OrderKind::MultiApplication => {
                if req.project_id == 0 {
                    return Err(OrderError::Validation(
                        "project id is required to look up a project release".to_string(),
                    ));
                }
                ReleaseLookup {
                    kind,
                    version: version.clone(),
                    project_id: Some(req.project_id),
                    application_name: None,
                }
            }
            OrderKind::SingleApplication => {
                let application_name = req.application_name.clone().ok_or_else(|| {
                    OrderError::Validation(
                        "application name is required to look up an application release".to_string(),
                    )
                })?;
                ReleaseLookup {
                    kind,
                    version: version.clone(),
                    project_id: (req.project_id != 0).then_some(req.project_id),
                    application_name: Some(application_name),
                }
            }
        };

        self.upstreams
            .releases
            .find_release_by_version(&lookup)
            .await?
            .ok_or_else(|| OrderError::NotFound(format!("release version {}", version)))
    }

    async fn resolve_workspace(
        &self,
        req: &CreateOrderRequest,
        release: &Release,
        project_id: u64,
    ) -> OrderResult<String> {
        if let Some(workspace) = req.workspace.as_deref().filter(|w| !w.trim().is_empty()) {
            return Ok(workspace.trim().to_uppercase());
        }

        let branch = release.git_branch().ok_or_else(|| {
            OrderError::Validation(format!(
                "workspace is required, release {} carries no branch",
                release.release_id()
            ))
        })?;
        let workspace = self
            .upstreams
            .projects
            .workspace_for_branch(project_id, branch)
            .await?
            .ok_or_else(|| {
                OrderError::Validation(format!("no workspace matches branch {}", branch))
            })?;
        Ok(workspace.to_uppercase())
    }

    /// Every application the order deploys, across all batches.
    async fn order_applications(
        &self,
        order: &DeploymentOrder,
    ) -> OrderResult<Vec<ApplicationReleaseSummary>> {
        match order.kind_enum() {
            OrderKind::MultiApplication => {
                let ids: Vec<String> = order.deploy_list_ids()?.into_iter().flatten().collect();
                resolve_applications(&self.upstreams, order, &ids).await
            }
            OrderKind::SingleApplication => Ok(vec![single_application(order)]),
        }
    }

    async fn current_batch_applications(
        &self,
        order: &DeploymentOrder,
    ) -> OrderResult<Vec<ApplicationReleaseSummary>> {
        match order.kind_enum() {
            OrderKind::MultiApplication => match order.current_release_ids()? {
                Some(ids) => resolve_applications(&self.upstreams, order, &ids).await,
                None => Ok(Vec::new()),
            },
            OrderKind::SingleApplication => Ok(vec![single_application(order)]),
        }
    }

    async fn check_permissions(
        &self,
        operator: &str,
        workspace: &str,
        applications: &[ApplicationReleaseSummary],
    ) -> OrderResult<()> {
        for app in applications {
            let allowed = self
                .upstreams
                .permissions
                .check_execute_permission(operator, workspace, app.application_id)
                .await?;
            if !allowed {
                tracing::warn!(
                    operator,
                    workspace,
                    app = %app.application_name,
                    "Execute permission denied"
                );
                return Err(OrderError::Permission(format!(
                    "operator {} may not deploy application {} in {}",
                    operator, app.application_name, workspace
                )));
            }
        }
        Ok(())
    }

    async fn find_runtime(
        &self,
        order: &DeploymentOrder,
        app_name: &str,
    ) -> OrderResult<Option<RuntimeRecord>> {
        Ok(self
            .upstreams
            .runtimes
            .runtime_by_app(&order.workspace, order.project_id as u64, app_name)
            .await?)
    }

    async fn refresh_single_application(&self, order: &mut DeploymentOrder) -> OrderResult<()> {
        let app = single_application(order);
        let item = match self.find_runtime(order, &app.application_name).await? {
            None => return Ok(()),
            Some(runtime) => match self.upstreams.runtimes.last_deployment(runtime.id).await? {
                None => return Ok(()),
                Some(deployment) => ApplicationStatusItem {
                    runtime_id: runtime.id,
                    application_id: app.application_id,
                    deployment_id: deployment.id,
                    deployment_status: deployment.status,
                },
            },
        };

        let fresh: StatusMap = [(app.application_name.clone(), item)].into_iter().collect();
        let merged = merge_status_detail(&order.status_detail_map()?, &fresh);
        let status = classify(&merged);
        if status == order.status_enum() && merged == order.status_detail_map()? {
            return Ok(());
        }

        order.set_status_detail(&merged)?;
        order.set_status(status);
        if !order.update(&self.db).await? {
            return Err(OrderError::stale(&order.id));
        }
        Ok(())
    }
}

fn single_application(order: &DeploymentOrder) -> ApplicationReleaseSummary {
    ApplicationReleaseSummary {
        application_id: order.application_id.unwrap_or_default() as u64,
        application_name: order.application_name.clone().unwrap_or_default(),
        release_id: order.release_id.clone(),
        version: None,
    }
}
