//! In-memory collaborators for tests.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::*;
use crate::db::{AppDeploymentStatus, DeploymentParam};

#[derive(Default)]
struct State {
    releases: HashMap<String, Release>,
    app_releases: HashMap<String, ApplicationRelease>,
    versions: HashMap<String, String>,
    denied: HashSet<u64>,
    clusters: HashMap<(u64, String), String>,
    branch_workspaces: HashMap<String, String>,
    project_app_ids: HashMap<String, u64>,
    params: HashMap<u64, Vec<DeploymentParam>>,
    failing_apps: HashSet<String>,
    created: Vec<RuntimeCreateRequest>,
    runtimes: HashMap<String, RuntimeRecord>,
    deployments: HashMap<u64, DeploymentRecord>,
    canceled: Vec<u64>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Every collaborator backed by one shared in-memory state.
#[derive(Default)]
pub struct FakeUpstream {
    state: Mutex<State>,
}

impl FakeUpstream {
    /// A fake with a `DEV` cluster configured for project 1.
    pub fn new() -> Self {
        let fake = Self::default();
        fake.set_cluster(1, "DEV", "dev-cluster");
        fake
    }

    fn register_app_release(
        state: &mut State,
        project_id: u64,
        app: &str,
        release_id: &str,
    ) -> ApplicationReleaseSummary {
        let application_id = match state.app_releases.values().find(|r| r.application_name == app) {
            Some(existing) => existing.application_id,
            None => 100 + state.app_releases.len() as u64,
        };
        let release = ApplicationRelease {
            release_id: release_id.to_string(),
            project_id,
            application_id,
            application_name: app.to_string(),
            version: Some(format!("{}-1.0.0", app)),
            labels: HashMap::new(),
        };
        let summary = release.summary();
        state.app_releases.insert(release_id.to_string(), release);
        summary
    }

    fn register_batches(
        state: &mut State,
        project_id: u64,
        batches: &[&[(&str, &str)]],
    ) -> Vec<Vec<ApplicationReleaseSummary>> {
        let mut registered = Vec::with_capacity(batches.len());
        for batch in batches {
            let mut wave = Vec::with_capacity(batch.len());
            for (app, release_id) in batch.iter() {
                wave.push(Self::register_app_release(state, project_id, app, release_id));
            }
            registered.push(wave);
        }
        registered
    }

    /// Project release with a single `default` mode made of `batches`
    /// of `(application name, release id)` pairs.
    pub fn add_project_release(&self, release_id: &str, project_id: u64, batches: &[&[(&str, &str)]]) {
        let mut state = self.state.lock().unwrap();
        let batches = Self::register_batches(&mut state, project_id, batches);
        let mode = Mode {
            depend_on: Vec::new(),
            batches,
            expose: true,
        };
        state.releases.insert(
            release_id.to_string(),
            Release::MultiApplication(ProjectRelease {
                release_id: release_id.to_string(),
                project_id,
                version: Some("1.0.0".to_string()),
                labels: HashMap::new(),
                modes: [("default".to_string(), mode)].into_iter().collect(),
            }),
        );
    }

    /// Project release with explicit modes; `modes` maps a mode name to its
    /// dependencies and batches of `(application name, release id)` pairs.
    pub fn add_project_release_with_modes(
        &self,
        release_id: &str,
        project_id: u64,
        modes: &[(&str, &[&str], &[&[(&str, &str)]])],
    ) {
        let mut state = self.state.lock().unwrap();
        let mut table = BTreeMap::new();
        for (name, depend_on, batches) in modes {
            let batches = Self::register_batches(&mut state, project_id, batches);
            table.insert(
                name.to_string(),
                Mode {
                    depend_on: depend_on.iter().map(|d| d.to_string()).collect(),
                    batches,
                    expose: true,
                },
            );
        }
        state.releases.insert(
            release_id.to_string(),
            Release::MultiApplication(ProjectRelease {
                release_id: release_id.to_string(),
                project_id,
                version: None,
                labels: [(GIT_BRANCH_LABEL.to_string(), "master".to_string())]
                    .into_iter()
                    .collect(),
                modes: table,
            }),
        );
    }

    pub fn add_application_release(&self, release_id: &str, project_id: u64, app: &str, branch: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        if !state.app_releases.contains_key(release_id) {
            Self::register_app_release(&mut state, project_id, app, release_id);
        }
        let mut release = state.app_releases[release_id].clone();
        if let Some(branch) = branch {
            release
                .labels
                .insert(GIT_BRANCH_LABEL.to_string(), branch.to_string());
        }
        state.app_releases.insert(release_id.to_string(), release.clone());
        state
            .releases
            .insert(release_id.to_string(), Release::SingleApplication(release));
    }

    pub fn application_id(&self, app: &str) -> u64 {
        let state = self.state.lock().unwrap();
        state
            .app_releases
            .values()
            .find(|r| r.application_name == app)
            .map(|r| r.application_id)
            .unwrap_or_default()
    }

    pub fn add_release_version(&self, version: &str, release_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.versions.insert(version.to_string(), release_id.to_string());
    }

    pub fn set_cluster(&self, project_id: u64, workspace: &str, cluster: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .clusters
            .insert((project_id, workspace.to_string()), cluster.to_string());
    }

    pub fn set_branch_workspace(&self, branch: &str, workspace: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .branch_workspaces
            .insert(branch.to_string(), workspace.to_string());
    }

    pub fn set_project_app_id(&self, app: &str, id: u64) {
        let mut state = self.state.lock().unwrap();
        state.project_app_ids.insert(app.to_string(), id);
    }

    pub fn set_params(&self, application_id: u64, params: Vec<DeploymentParam>) {
        let mut state = self.state.lock().unwrap();
        state.params.insert(application_id, params);
    }

    pub fn deny_application(&self, application_id: u64) {
        let mut state = self.state.lock().unwrap();
        state.denied.insert(application_id);
    }

    pub fn fail_runtime_creation(&self, app: &str) {
        let mut state = self.state.lock().unwrap();
        state.failing_apps.insert(app.to_string());
    }

    /// Set the status of the app's last deployment, creating the runtime
    /// and deployment when they do not exist yet.
    pub fn set_deployment_status(&self, app: &str, status: AppDeploymentStatus) {
        let mut state = self.state.lock().unwrap();
        let runtime_id = match state.runtimes.get(app) {
            Some(runtime) => runtime.id,
            None => {
                let id = state.next_id();
                state.runtimes.insert(
                    app.to_string(),
                    RuntimeRecord {
                        id,
                        name: app.to_string(),
                        application_id: 0,
                    },
                );
                id
            }
        };
        let deployment_id = match state.deployments.get(&runtime_id) {
            Some(deployment) => deployment.id,
            None => state.next_id(),
        };
        state.deployments.insert(
            runtime_id,
            DeploymentRecord {
                id: deployment_id,
                status,
            },
        );
    }

    /// Register a runtime that has no deployment yet.
    pub fn add_bare_runtime(&self, app: &str) {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.runtimes.insert(
            app.to_string(),
            RuntimeRecord {
                id,
                name: app.to_string(),
                application_id: 0,
            },
        );
    }

    pub fn has_runtime(&self, app: &str) -> bool {
        self.state.lock().unwrap().runtimes.contains_key(app)
    }

    pub fn created(&self) -> Vec<RuntimeCreateRequest> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn canceled(&self) -> Vec<u64> {
        self.state.lock().unwrap().canceled.clone()
    }
}

#[async_trait]
impl ReleaseStore for FakeUpstream {
    async fn get_release(&self, release_id: &str) -> Result<Option<Release>> {
        Ok(self.state.lock().unwrap().releases.get(release_id).cloned())
    }

    async fn list_releases(&self, release_ids: &[String]) -> Result<Vec<ApplicationRelease>> {
        let state = self.state.lock().unwrap();
        Ok(release_ids
            .iter()
            .filter_map(|id| state.app_releases.get(id).cloned())
            .collect())
    }

    async fn find_release_by_version(&self, lookup: &ReleaseLookup) -> Result<Option<String>> {
        Ok(self.state.lock().unwrap().versions.get(&lookup.version).cloned())
    }
}

#[async_trait]
impl PermissionChecker for FakeUpstream {
    async fn check_execute_permission(
        &self,
        _operator: &str,
        _workspace: &str,
        application_id: u64,
    ) -> Result<bool> {
        Ok(!self.state.lock().unwrap().denied.contains(&application_id))
    }
}

#[async_trait]
impl ProjectMetadata for FakeUpstream {
    async fn cluster_for_workspace(&self, project_id: u64, workspace: &str) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        Ok(state.clusters.get(&(project_id, workspace.to_string())).cloned())
    }

    async fn workspace_for_branch(&self, _project_id: u64, branch: &str) -> Result<Option<String>> {
        Ok(self.state.lock().unwrap().branch_workspaces.get(branch).cloned())
    }

    async fn application_ids_by_names(
        &self,
        _project_id: u64,
        _operator: &str,
        names: &[String],
    ) -> Result<HashMap<String, u64>> {
        let state = self.state.lock().unwrap();
        Ok(names
            .iter()
            .filter_map(|n| state.project_app_ids.get(n).map(|id| (n.clone(), *id)))
            .collect())
    }
}

#[async_trait]
impl ParamSource for FakeUpstream {
    async fn fetch_params(&self, application_id: u64, _workspace: &str) -> Result<Vec<DeploymentParam>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .params
            .get(&application_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl RuntimeService for FakeUpstream {
    async fn create_runtime(&self, _operator: &str, req: &RuntimeCreateRequest) -> Result<RuntimeCreated> {
        let mut state = self.state.lock().unwrap();
        state.created.push(req.clone());

        let app = req.extra.application_name.clone();
        if state.failing_apps.contains(&app) {
            anyhow::bail!("runtime scheduler rejected {}", app);
        }

        let runtime_id = match state.runtimes.get(&app) {
            Some(runtime) => runtime.id,
            None => state.next_id(),
        };
        state.runtimes.insert(
            app.clone(),
            RuntimeRecord {
                id: runtime_id,
                name: req.name.clone(),
                application_id: req.extra.application_id,
            },
        );
        let deployment_id = state.next_id();
        state.deployments.insert(
            runtime_id,
            DeploymentRecord {
                id: deployment_id,
                status: AppDeploymentStatus::Init,
            },
        );

        Ok(RuntimeCreated {
            runtime_id,
            deployment_id,
            application_id: req.extra.application_id,
        })
    }

    async fn runtime_by_app(
        &self,
        _workspace: &str,
        _project_id: u64,
        app_name: &str,
    ) -> Result<Option<RuntimeRecord>> {
        Ok(self.state.lock().unwrap().runtimes.get(app_name).cloned())
    }

    async fn last_deployment(&self, runtime_id: u64) -> Result<Option<DeploymentRecord>> {
        Ok(self.state.lock().unwrap().deployments.get(&runtime_id).cloned())
    }

    async fn cancel_deployment(&self, _operator: &str, deployment_id: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.canceled.push(deployment_id);
        for deployment in state.deployments.values_mut() {
            if deployment.id == deployment_id {
                deployment.status = AppDeploymentStatus::Canceling;
            }
        }
        Ok(())
    }
}

/// Work queue that records pushes and can be told to fail.
#[derive(Default)]
pub struct RecordingQueue {
    pushes: Mutex<Vec<(String, String)>>,
    failures_left: AtomicUsize,
}

impl RecordingQueue {
    pub fn fail_next(&self, times: usize) {
        self.failures_left.store(times, Ordering::SeqCst);
    }

    pub fn pushes(&self) -> Vec<(String, String)> {
        self.pushes.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkQueue for RecordingQueue {
    async fn push(&self, topic: &str, order_id: &str) -> Result<()> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            anyhow::bail!("queue unavailable");
        }
        self.pushes
            .lock()
            .unwrap()
            .push((topic.to_string(), order_id.to_string()));
        Ok(())
    }
}
