//! Deployment order models and DTOs.
//!
//! A deployment order is the persisted unit of one rollout. Structured fields
//! (status detail, deploy list, captured params) are stored as JSON text and
//! decoded through the accessors on [`DeploymentOrder`].

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::collections::BTreeMap;

/// Per-application status snapshot, keyed by application name.
pub type StatusMap = BTreeMap<String, ApplicationStatusItem>;

/// Captured deployment parameters, keyed by application name.
pub type OrderParams = BTreeMap<String, Vec<DeploymentParam>>;

/// Leveled batch plan persisted as release ids.
pub type DeployList = Vec<Vec<String>>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    SingleApplication,
    MultiApplication,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleApplication => "single_application",
            Self::MultiApplication => "multi_application",
        }
    }
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for OrderKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "multi_application" => Self::MultiApplication,
            _ => Self::SingleApplication,
        }
    }
}

/// Aggregate status of a deployment order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    WaitDeploy,
    Deploying,
    Canceled,
    Failed,
    Ok,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitDeploy => "wait_deploy",
            Self::Deploying => "deploying",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
            Self::Ok => "ok",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::Failed | Self::Ok)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for OrderStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "deploying" => Self::Deploying,
            "canceled" => Self::Canceled,
            "failed" => Self::Failed,
            "ok" => Self::Ok,
            _ => Self::WaitDeploy,
        }
    }
}

/// Status of one application's latest deployment attempt, ordered from
/// "waiting to start" to "finished". `Unset` is the empty status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(into = "String", from = "String")]
pub enum AppDeploymentStatus {
    WaitApprove,
    Init,
    Waiting,
    Deploying,
    Canceling,
    Canceled,
    Failed,
    Ok,
    #[default]
    Unset,
}

impl AppDeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitApprove => "WAITAPPROVE",
            Self::Init => "INIT",
            Self::Waiting => "WAITING",
            Self::Deploying => "DEPLOYING",
            Self::Canceling => "CANCELING",
            Self::Canceled => "CANCELED",
            Self::Failed => "FAILED",
            Self::Ok => "OK",
            Self::Unset => "",
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            Self::WaitApprove | Self::Init | Self::Waiting | Self::Deploying
        )
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceling | Self::Canceled)
    }

    /// Whether a deployment in this status can no longer change on its own.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Canceled | Self::Failed | Self::Ok)
    }
}

impl std::fmt::Display for AppDeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AppDeploymentStatus> for String {
    fn from(status: AppDeploymentStatus) -> Self {
        status.as_str().to_string()
    }
}

impl From<String> for AppDeploymentStatus {
    fn from(s: String) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "WAITAPPROVE" => Self::WaitApprove,
            "INIT" => Self::Init,
            "WAITING" => Self::Waiting,
            "DEPLOYING" => Self::Deploying,
            "CANCELING" => Self::Canceling,
            "CANCELED" => Self::Canceled,
            "FAILED" => Self::Failed,
            "OK" => Self::Ok,
            _ => Self::Unset,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatusItem {
    #[serde(default)]
    pub runtime_id: u64,
    #[serde(default)]
    pub application_id: u64,
    #[serde(default)]
    pub deployment_id: u64,
    #[serde(default)]
    pub deployment_status: AppDeploymentStatus,
}

impl ApplicationStatusItem {
    pub fn with_status(status: AppDeploymentStatus) -> Self {
        Self {
            deployment_status: status,
            ..Default::default()
        }
    }
}

/// Merge freshly observed statuses into the recorded detail.
///
/// `OK` is absorbing: once recorded for an application, later observations
/// are ignored. Observations without a deployment id only carry a status and
/// never clobber recorded identifiers.
pub fn merge_status_detail(existing: &StatusMap, fresh: &StatusMap) -> StatusMap {
    let mut merged = existing.clone();

    for (app, item) in fresh {
        if item.deployment_status.is_unset() {
            continue;
        }

        match merged.get_mut(app) {
            Some(current) if current.deployment_status == AppDeploymentStatus::Ok => {}
            Some(current) if item.deployment_id == 0 => {
                current.deployment_status = item.deployment_status;
            }
            Some(current) => *current = item.clone(),
            None if item.deployment_id == 0 => {
                merged.insert(
                    app.clone(),
                    ApplicationStatusItem::with_status(item.deployment_status),
                );
            }
            None => {
                merged.insert(app.clone(), item.clone());
            }
        }
    }

    merged
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParamKind {
    Env,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentParam {
    pub key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: ParamKind,
    #[serde(default)]
    pub encrypt: bool,
    #[serde(default)]
    pub comment: String,
}

/// Where an order was triggered from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderSource {
    #[default]
    DeployCenter,
    Pipeline,
}

impl OrderSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeployCenter => "deploy_center",
            Self::Pipeline => "pipeline",
        }
    }
}

impl From<String> for OrderSource {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pipeline" => Self::Pipeline,
            _ => Self::DeployCenter,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeploymentOrder {
    pub id: String,
    pub kind: String,
    pub release_id: String,
    pub workspace: String,
    pub project_id: i64,
    pub application_id: Option<i64>,
    pub application_name: Option<String>,
    pub operator: String,
    pub source: String,
    #[serde(default)]
    pub deploy_without_branch: bool,
    pub batch_size: i64,
    pub current_batch: i64,
    pub status: String,
    pub failure_reason: Option<String>,
    pub status_detail: String,
    pub params: String,
    pub deploy_list: String,
    pub modes: String,
    pub started_at: Option<String>,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

const ORDER_COLUMNS: &str = r#"
    id, kind, release_id, workspace, project_id, application_id, application_name,
    operator, source, deploy_without_branch, batch_size, current_batch, status,
    failure_reason, status_detail, params, deploy_list, modes, started_at, version,
    created_at, updated_at
"#;

impl DeploymentOrder {
    pub fn kind_enum(&self) -> OrderKind {
        OrderKind::from(self.kind.clone())
    }

    pub fn status_enum(&self) -> OrderStatus {
        OrderStatus::from(self.status.clone())
    }

    pub fn source_enum(&self) -> OrderSource {
        OrderSource::from(self.source.clone())
    }

    pub fn set_status(&mut self, status: OrderStatus) {
        self.status = status.as_str().to_string();
    }

    pub fn status_detail_map(&self) -> Result<StatusMap, serde_json::Error> {
        if self.status_detail.trim().is_empty() {
            return Ok(StatusMap::new());
        }
        serde_json::from_str(&self.status_detail)
    }

    pub fn set_status_detail(&mut self, detail: &StatusMap) -> Result<(), serde_json::Error> {
        self.status_detail = serde_json::to_string(detail)?;
        Ok(())
    }

    pub fn deploy_list_ids(&self) -> Result<DeployList, serde_json::Error> {
        if self.deploy_list.trim().is_empty() {
            return Ok(DeployList::new());
        }
        serde_json::from_str(&self.deploy_list)
    }

    pub fn order_params(&self) -> Result<OrderParams, serde_json::Error> {
        if self.params.trim().is_empty() {
            return Ok(OrderParams::new());
        }
        serde_json::from_str(&self.params)
    }

    /// Selected mode names, in selection order.
    pub fn mode_names(&self) -> Vec<String> {
        self.modes
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Release ids of the batch `current_batch` points at.
    pub fn current_release_ids(&self) -> Result<Option<Vec<String>>, serde_json::Error> {
        if self.current_batch <= 0 {
            return Ok(None);
        }
        let list = self.deploy_list_ids()?;
        Ok(list.get(self.current_batch as usize - 1).cloned())
    }

    pub fn is_last_batch(&self) -> bool {
        self.current_batch >= self.batch_size
    }

    pub async fn get(db: &SqlitePool, id: &str) -> Result<Option<DeploymentOrder>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {} FROM deployment_orders WHERE id = ?",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(db)
        .await
    }

    pub async fn insert(&self, db: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO deployment_orders (
                id, kind, release_id, workspace, project_id, application_id, application_name,
                operator, source, deploy_without_branch, batch_size, current_batch, status,
                failure_reason, status_detail, params, deploy_list, modes, started_at, version,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&self.id)
        .bind(&self.kind)
        .bind(&self.release_id)
        .bind(&self.workspace)
        .bind(self.project_id)
        .bind(self.application_id)
        .bind(&self.application_name)
        .bind(&self.operator)
        .bind(&self.source)
        .bind(self.deploy_without_branch)
        .bind(self.batch_size)
        .bind(self.current_batch)
        .bind(&self.status)
        .bind(&self.failure_reason)
        .bind(&self.status_detail)
        .bind(&self.params)
        .bind(&self.deploy_list)
        .bind(&self.modes)
        .bind(&self.started_at)
        .bind(self.version)
        .bind(&self.created_at)
        .bind(&self.updated_at)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Persist the mutable fields, guarded by the version token.
    ///
    /// Returns `false` when the row was changed since it was read. On success
    /// the in-memory version is bumped to match the stored row.
    pub async fn update(&mut self, db: &SqlitePool) -> Result<bool, sqlx::Error> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            UPDATE deployment_orders
            SET operator = ?, current_batch = ?, status = ?, failure_reason = ?,
                status_detail = ?, started_at = ?, version = version + 1, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(&self.operator)
        .bind(self.current_batch)
        .bind(&self.status)
        .bind(&self.failure_reason)
        .bind(&self.status_detail)
        .bind(&self.started_at)
        .bind(&now)
        .bind(&self.id)
        .bind(self.version)
        .execute(db)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }
        self.version += 1;
        self.updated_at = now;
        Ok(true)
    }

    /// Multi-application orders the reconciler has to look at.
    pub async fn list_deploying_multi_application(
        db: &SqlitePool,
    ) -> Result<Vec<DeploymentOrder>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {} FROM deployment_orders WHERE status = ? AND kind = ? ORDER BY created_at ASC",
            ORDER_COLUMNS
        ))
        .bind(OrderStatus::Deploying.as_str())
        .bind(OrderKind::MultiApplication.as_str())
        .fetch_all(db)
        .await
    }

    pub async fn list(db: &SqlitePool, query: &ListOrdersQuery) -> Result<OrderPage, sqlx::Error> {
        let page_size = query.page_size();
        let offset = (query.page_no() - 1) * page_size;

        let mut filters = Vec::new();
        if query.project_id.is_some() {
            filters.push("project_id = ?");
        }
        if query.workspace.is_some() {
            filters.push("workspace = ?");
        }
        if query.status.is_some() {
            filters.push("status = ?");
        }
        let where_clause = if filters.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", filters.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM deployment_orders {}", where_clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(project_id) = query.project_id {
            count_query = count_query.bind(project_id);
        }
        if let Some(workspace) = &query.workspace {
            count_query = count_query.bind(workspace.to_uppercase());
        }
        if let Some(status) = query.status {
            count_query = count_query.bind(status.as_str());
        }
        let total = count_query.fetch_one(db).await?;

        let list_sql = format!(
            "SELECT {} FROM deployment_orders {} ORDER BY created_at DESC LIMIT ? OFFSET ?",
            ORDER_COLUMNS, where_clause
        );
        let mut list_query = sqlx::query_as::<_, DeploymentOrder>(&list_sql);
        if let Some(project_id) = query.project_id {
            list_query = list_query.bind(project_id);
        }
        if let Some(workspace) = &query.workspace {
            list_query = list_query.bind(workspace.to_uppercase());
        }
        if let Some(status) = query.status {
            list_query = list_query.bind(status.as_str());
        }
        let orders = list_query.bind(page_size).bind(offset).fetch_all(db).await?;

        Ok(OrderPage {
            total,
            list: orders.into_iter().map(DeploymentOrderResponse::from).collect(),
        })
    }
}

// -------------------------------------------------------------------------
// Request / response DTOs
// -------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub id: Option<String>,
    /// Release kind, required when the release is looked up by name.
    #[serde(default)]
    pub kind: Option<OrderKind>,
    #[serde(default)]
    pub release_id: Option<String>,
    /// Release version, used when `release_id` is not given.
    #[serde(default)]
    pub release_name: Option<String>,
    #[serde(default)]
    pub application_name: Option<String>,
    #[serde(default)]
    pub project_id: u64,
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub modes: Vec<String>,
    pub operator: String,
    #[serde(default)]
    pub source: OrderSource,
    #[serde(default)]
    pub auto_run: bool,
    #[serde(default)]
    pub deploy_without_branch: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeployOrderRequest {
    pub operator: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelOrderRequest {
    pub operator: String,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub page_no: Option<i64>,
    pub page_size: Option<i64>,
    pub project_id: Option<i64>,
    pub workspace: Option<String>,
    pub status: Option<OrderStatus>,
}

impl ListOrdersQuery {
    pub fn page_no(&self) -> i64 {
        self.page_no.filter(|p| *p > 0).unwrap_or(1)
    }

    pub fn page_size(&self) -> i64 {
        self.page_size.filter(|s| *s > 0).unwrap_or(20).min(100)
    }
}

/// Deployment order as returned by the API, with decoded JSON fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentOrderResponse {
    pub id: String,
    pub kind: OrderKind,
    pub release_id: String,
    pub workspace: String,
    pub project_id: i64,
    pub application_id: Option<i64>,
    pub application_name: Option<String>,
    pub operator: String,
    pub batch_size: i64,
    pub current_batch: i64,
    pub status: OrderStatus,
    pub failure_reason: Option<String>,
    pub status_detail: StatusMap,
    pub deploy_list: DeployList,
    pub modes: Vec<String>,
    pub started_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<DeploymentOrder> for DeploymentOrderResponse {
    fn from(order: DeploymentOrder) -> Self {
        Self {
            kind: order.kind_enum(),
            status: order.status_enum(),
            status_detail: order.status_detail_map().unwrap_or_default(),
            deploy_list: order.deploy_list_ids().unwrap_or_default(),
            modes: order.mode_names(),
            id: order.id,
            release_id: order.release_id,
            workspace: order.workspace,
            project_id: order.project_id,
            application_id: order.application_id,
            application_name: order.application_name,
            operator: order.operator,
            batch_size: order.batch_size,
            current_batch: order.current_batch,
            failure_reason: order.failure_reason,
            started_at: order.started_at,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPage {
    pub total: i64,
    pub list: Vec<DeploymentOrderResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(deployment_id: u64, status: AppDeploymentStatus) -> ApplicationStatusItem {
        ApplicationStatusItem {
            runtime_id: 10,
            application_id: 20,
            deployment_id,
            deployment_status: status,
        }
    }

    #[test]
    fn test_app_status_round_trips_through_json() {
        let detail: StatusMap = [
            ("a".to_string(), item(1, AppDeploymentStatus::Ok)),
            ("b".to_string(), ApplicationStatusItem::default()),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&detail).unwrap();
        assert!(json.contains(r#""deploymentStatus":"OK""#));
        assert!(json.contains(r#""deploymentStatus":"""#));

        let back: StatusMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, detail);
    }

    #[test]
    fn test_unknown_app_status_is_unset() {
        assert_eq!(
            AppDeploymentStatus::from("whatever".to_string()),
            AppDeploymentStatus::Unset
        );
        assert_eq!(
            AppDeploymentStatus::from("deploying".to_string()),
            AppDeploymentStatus::Deploying
        );
    }

    #[test]
    fn test_merge_skips_empty_status() {
        let existing: StatusMap = [("a".to_string(), item(1, AppDeploymentStatus::Deploying))]
            .into_iter()
            .collect();
        let fresh: StatusMap = [("a".to_string(), ApplicationStatusItem::default())]
            .into_iter()
            .collect();

        assert_eq!(merge_status_detail(&existing, &fresh), existing);
    }

    #[test]
    fn test_merge_never_downgrades_ok() {
        let mut detail: StatusMap = [("a".to_string(), item(1, AppDeploymentStatus::Ok))]
            .into_iter()
            .collect();

        for status in [
            AppDeploymentStatus::Failed,
            AppDeploymentStatus::Deploying,
            AppDeploymentStatus::Canceled,
            AppDeploymentStatus::Init,
        ] {
            for deployment_id in [0, 7] {
                let fresh: StatusMap = [("a".to_string(), item(deployment_id, status))]
                    .into_iter()
                    .collect();
                detail = merge_status_detail(&detail, &fresh);
                assert_eq!(detail["a"].deployment_status, AppDeploymentStatus::Ok);
                assert_eq!(detail["a"].deployment_id, 1);
            }
        }
    }

    #[test]
    fn test_merge_status_only_update_keeps_identifiers() {
        let existing: StatusMap = [("a".to_string(), item(5, AppDeploymentStatus::Init))]
            .into_iter()
            .collect();
        let fresh: StatusMap = [(
            "a".to_string(),
            ApplicationStatusItem::with_status(AppDeploymentStatus::Failed),
        )]
        .into_iter()
        .collect();

        let merged = merge_status_detail(&existing, &fresh);
        assert_eq!(merged["a"].deployment_status, AppDeploymentStatus::Failed);
        assert_eq!(merged["a"].deployment_id, 5);
        assert_eq!(merged["a"].runtime_id, 10);
    }

    #[test]
    fn test_merge_replaces_entry_with_new_deployment() {
        let existing: StatusMap = [
            ("a".to_string(), item(5, AppDeploymentStatus::Failed)),
            ("b".to_string(), item(6, AppDeploymentStatus::Ok)),
        ]
        .into_iter()
        .collect();
        let replacement = ApplicationStatusItem {
            runtime_id: 11,
            application_id: 20,
            deployment_id: 9,
            deployment_status: AppDeploymentStatus::Deploying,
        };
        let fresh: StatusMap = [("a".to_string(), replacement.clone())].into_iter().collect();

        let merged = merge_status_detail(&existing, &fresh);
        assert_eq!(merged["a"], replacement);
        assert_eq!(merged["b"], existing["b"]);
    }

    #[test]
    fn test_current_release_ids() {
        let mut order = sample_order();
        order.deploy_list = r#"[["r1","r2"],["r3"]]"#.to_string();
        order.batch_size = 2;

        order.current_batch = 0;
        assert_eq!(order.current_release_ids().unwrap(), None);

        order.current_batch = 2;
        assert_eq!(
            order.current_release_ids().unwrap(),
            Some(vec!["r3".to_string()])
        );
        assert!(order.is_last_batch());
    }

    #[test]
    fn test_list_query_paging_defaults() {
        let query = ListOrdersQuery::default();
        assert_eq!(query.page_no(), 1);
        assert_eq!(query.page_size(), 20);

        let query = ListOrdersQuery {
            page_no: Some(0),
            page_size: Some(1000),
            ..Default::default()
        };
        assert_eq!(query.page_no(), 1);
        assert_eq!(query.page_size(), 100);
    }

    fn sample_order() -> DeploymentOrder {
        DeploymentOrder {
            id: "order-1".to_string(),
            kind: OrderKind::MultiApplication.as_str().to_string(),
            release_id: "release-1".to_string(),
            workspace: "DEV".to_string(),
            project_id: 1,
            application_id: None,
            application_name: None,
            operator: "u1".to_string(),
            source: OrderSource::DeployCenter.as_str().to_string(),
            deploy_without_branch: false,
            batch_size: 1,
            current_batch: 0,
            status: OrderStatus::WaitDeploy.as_str().to_string(),
            failure_reason: None,
            status_detail: String::new(),
            params: String::new(),
            deploy_list: String::new(),
            modes: "default".to_string(),
            started_at: None,
            version: 0,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }
}
