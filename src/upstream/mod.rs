//! Collaborator services the orchestrator depends on.
//!
//! Every external system is reached through one of the traits below so the
//! engine can run against the HTTP implementation in production and against
//! in-memory fakes in tests.

mod http;
#[cfg(test)]
pub mod fakes;

pub use http::HttpUpstream;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::db::{DeploymentParam, OrderKind};

/// Label carrying the git branch a release was built from.
pub const GIT_BRANCH_LABEL: &str = "gitBranch";

/// One application's release inside a project release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplicationReleaseSummary {
    pub application_id: u64,
    pub application_name: String,
    pub release_id: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// A named deployment profile of a project release.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mode {
    #[serde(default)]
    pub depend_on: Vec<String>,
    /// Ordered batches, each deployed as one wave.
    #[serde(default)]
    pub batches: Vec<Vec<ApplicationReleaseSummary>>,
    #[serde(default)]
    pub expose: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplicationRelease {
    pub release_id: String,
    pub project_id: u64,
    pub application_id: u64,
    pub application_name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl ApplicationRelease {
    pub fn summary(&self) -> ApplicationReleaseSummary {
        ApplicationReleaseSummary {
            application_id: self.application_id,
            application_name: self.application_name.clone(),
            release_id: self.release_id.clone(),
            version: self.version.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectRelease {
    pub release_id: String,
    pub project_id: u64,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub modes: BTreeMap<String, Mode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Release {
    SingleApplication(ApplicationRelease),
    MultiApplication(ProjectRelease),
}

impl Release {
    pub fn release_id(&self) -> &str {
        match self {
            Release::SingleApplication(r) => &r.release_id,
            Release::MultiApplication(r) => &r.release_id,
        }
    }

    pub fn project_id(&self) -> u64 {
        match self {
            Release::SingleApplication(r) => r.project_id,
            Release::MultiApplication(r) => r.project_id,
        }
    }

    pub fn labels(&self) -> &HashMap<String, String> {
        match self {
            Release::SingleApplication(r) => &r.labels,
            Release::MultiApplication(r) => &r.labels,
        }
    }

    pub fn order_kind(&self) -> OrderKind {
        match self {
            Release::SingleApplication(_) => OrderKind::SingleApplication,
            Release::MultiApplication(_) => OrderKind::MultiApplication,
        }
    }

    pub fn git_branch(&self) -> Option<&str> {
        self.labels().get(GIT_BRANCH_LABEL).map(String::as_str)
    }
}

/// Where the runtime creation was requested from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeSource {
    Release,
    Pipeline,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeCreateExtra {
    pub project_id: u64,
    pub application_id: u64,
    pub application_name: String,
    pub workspace: String,
    /// `"release"` for release deployments; empty for branch-named runtimes.
    pub deploy_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeCreateRequest {
    /// Runtime name, the application name unless named after a branch.
    pub name: String,
    pub deployment_order_id: String,
    pub release_id: String,
    #[serde(default)]
    pub release_version: Option<String>,
    pub source: RuntimeSource,
    pub operator: String,
    pub cluster_name: String,
    pub extra: RuntimeCreateExtra,
    /// JSON encoded captured parameters of the application.
    pub param: String,
    /// JSON encoded environment-style extras, set for multi-application orders.
    #[serde(default)]
    pub extra_params: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeCreated {
    pub runtime_id: u64,
    pub deployment_id: u64,
    #[serde(default)]
    pub application_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeRecord {
    pub id: u64,
    pub name: String,
    pub application_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentRecord {
    pub id: u64,
    pub status: crate::db::AppDeploymentStatus,
}

/// Lookup of a release by its human version instead of its id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseLookup {
    pub kind: OrderKind,
    pub version: String,
    #[serde(default)]
    pub project_id: Option<u64>,
    #[serde(default)]
    pub application_name: Option<String>,
}

#[async_trait]
pub trait ReleaseStore: Send + Sync {
    async fn get_release(&self, release_id: &str) -> Result<Option<Release>>;
    /// Application releases for the given ids; unknown ids are omitted.
    async fn list_releases(&self, release_ids: &[String]) -> Result<Vec<ApplicationRelease>>;
    async fn find_release_by_version(&self, lookup: &ReleaseLookup) -> Result<Option<String>>;
}

#[async_trait]
pub trait PermissionChecker: Send + Sync {
    async fn check_execute_permission(
        &self,
        operator: &str,
        workspace: &str,
        application_id: u64,
    ) -> Result<bool>;
}

#[async_trait]
pub trait ProjectMetadata: Send + Sync {
    async fn cluster_for_workspace(&self, project_id: u64, workspace: &str) -> Result<Option<String>>;
    async fn workspace_for_branch(&self, project_id: u64, branch: &str) -> Result<Option<String>>;
    /// Application ids in `project_id` for the given application names.
    async fn application_ids_by_names(
        &self,
        project_id: u64,
        operator: &str,
        names: &[String],
    ) -> Result<HashMap<String, u64>>;
}

#[async_trait]
pub trait ParamSource: Send + Sync {
    async fn fetch_params(&self, application_id: u64, workspace: &str) -> Result<Vec<DeploymentParam>>;
}

#[async_trait]
pub trait RuntimeService: Send + Sync {
    async fn create_runtime(&self, operator: &str, req: &RuntimeCreateRequest) -> Result<RuntimeCreated>;
    async fn runtime_by_app(
        &self,
        workspace: &str,
        project_id: u64,
        app_name: &str,
    ) -> Result<Option<RuntimeRecord>>;
    async fn last_deployment(&self, runtime_id: u64) -> Result<Option<DeploymentRecord>>;
    async fn cancel_deployment(&self, operator: &str, deployment_id: u64) -> Result<()>;
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn push(&self, topic: &str, order_id: &str) -> Result<()>;
}

/// Handles to every collaborator, cloned into each engine component.
#[derive(Clone)]
pub struct Upstreams {
    pub releases: Arc<dyn ReleaseStore>,
    pub permissions: Arc<dyn PermissionChecker>,
    pub projects: Arc<dyn ProjectMetadata>,
    pub params: Arc<dyn ParamSource>,
    pub runtimes: Arc<dyn RuntimeService>,
    pub queue: Arc<dyn WorkQueue>,
}

impl Upstreams {
    /// Route every service through one HTTP gateway client.
    pub fn from_http(http: Arc<HttpUpstream>, queue: Arc<dyn WorkQueue>) -> Self {
        Self {
            releases: http.clone(),
            permissions: http.clone(),
            projects: http.clone(),
            params: http.clone(),
            runtimes: http,
            queue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_is_tagged_by_kind() {
        let json = r#"{
            "kind": "multi_application",
            "release_id": "p1",
            "project_id": 3,
            "modes": {
                "default": {
                    "depend_on": [],
                    "batches": [[{"application_id": 1, "application_name": "web", "release_id": "r1"}]]
                }
            }
        }"#;

        let release: Release = serde_json::from_str(json).unwrap();
        assert_eq!(release.order_kind(), OrderKind::MultiApplication);
        assert_eq!(release.release_id(), "p1");
        match release {
            Release::MultiApplication(r) => {
                assert_eq!(r.modes["default"].batches[0][0].application_name, "web");
            }
            other => panic!("unexpected release {:?}", other),
        }
    }

    #[test]
    fn test_git_branch_label() {
        let release = Release::SingleApplication(ApplicationRelease {
            release_id: "r1".to_string(),
            project_id: 1,
            application_id: 2,
            application_name: "web".to_string(),
            version: None,
            labels: [(GIT_BRANCH_LABEL.to_string(), "feature/x".to_string())]
                .into_iter()
                .collect(),
        });
        assert_eq!(release.git_branch(), Some("feature/x"));
    }
}
