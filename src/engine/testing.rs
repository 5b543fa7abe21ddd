//! Shared fixtures for engine tests.

use std::sync::Arc;

use crate::db::{self, DeploymentOrder, OrderKind, OrderSource, OrderStatus};
use crate::upstream::fakes::{FakeUpstream, RecordingQueue};
use crate::upstream::Upstreams;
use crate::DbPool;

use super::executor::BatchExecutor;
use super::locks::OrderLocks;

pub struct TestEnv {
    pub db: DbPool,
    pub fake: Arc<FakeUpstream>,
    pub queue: Arc<RecordingQueue>,
    pub upstreams: Upstreams,
    pub locks: Arc<OrderLocks>,
    pub executor: Arc<BatchExecutor>,
}

pub async fn setup() -> TestEnv {
    let db = db::init_memory().await.unwrap();
    let fake = Arc::new(FakeUpstream::new());
    let queue = Arc::new(RecordingQueue::default());
    let upstreams = Upstreams {
        releases: fake.clone(),
        permissions: fake.clone(),
        projects: fake.clone(),
        params: fake.clone(),
        runtimes: fake.clone(),
        queue: queue.clone(),
    };
    let executor = Arc::new(BatchExecutor::new(db.clone(), upstreams.clone()));

    TestEnv {
        db,
        fake,
        queue,
        upstreams,
        locks: Arc::new(OrderLocks::new()),
        executor,
    }
}

fn base_order(id: &str, release_id: &str) -> DeploymentOrder {
    let now = chrono::Utc::now().to_rfc3339();
    DeploymentOrder {
        id: id.to_string(),
        kind: OrderKind::MultiApplication.as_str().to_string(),
        release_id: release_id.to_string(),
        workspace: "DEV".to_string(),
        project_id: 1,
        application_id: None,
        application_name: None,
        operator: "u1".to_string(),
        source: OrderSource::DeployCenter.as_str().to_string(),
        deploy_without_branch: false,
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
    }
}

/// Insert a multi-application order over `deploy_list` in mode `default`.
pub async fn multi_order(
    db: &DbPool,
    id: &str,
    release_id: &str,
    deploy_list: &[&[&str]],
    current_batch: i64,
) -> DeploymentOrder {
    let list: Vec<Vec<String>> = deploy_list
        .iter()
        .map(|batch| batch.iter().map(|r| r.to_string()).collect())
        .collect();

    let mut order = base_order(id, release_id);
    order.batch_size = list.len() as i64;
    order.current_batch = current_batch;
    order.deploy_list = serde_json::to_string(&list).unwrap();
    order.modes = "default".to_string();
    order.insert(db).await.unwrap();
    order
}

pub async fn single_order(
    db: &DbPool,
    id: &str,
    release_id: &str,
    app: &str,
    source: OrderSource,
) -> DeploymentOrder {
    let mut order = base_order(id, release_id);
    order.kind = OrderKind::SingleApplication.as_str().to_string();
    order.application_name = Some(app.to_string());
    order.source = source.as_str().to_string();
    order.insert(db).await.unwrap();
    order
}
