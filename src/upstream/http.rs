//! HTTP client for the platform services behind the collaborator traits.
//!
//! All services share one gateway (`upstream.base_url`); a 404 from a lookup
//! endpoint is reported as `None` rather than as an error.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::{
    ApplicationRelease, DeploymentRecord, ParamSource, PermissionChecker, ProjectMetadata, Release,
    ReleaseLookup, ReleaseStore, RuntimeCreateRequest, RuntimeCreated, RuntimeRecord,
    RuntimeService,
};
use crate::config::UpstreamConfig;
use crate::db::DeploymentParam;

pub struct HttpUpstream {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ListReleasesRequest<'a> {
    release_ids: &'a [String],
}

#[derive(Deserialize)]
struct ReleaseIdResponse {
    release_id: String,
}

#[derive(Deserialize)]
struct PermissionResponse {
    allowed: bool,
}

#[derive(Deserialize)]
struct ClusterResponse {
    cluster_name: String,
}

#[derive(Deserialize)]
struct WorkspaceResponse {
    workspace: String,
}

#[derive(Serialize)]
struct AppIdsRequest<'a> {
    operator: &'a str,
    names: &'a [String],
}

#[derive(Deserialize)]
struct AppIdsResponse {
    app_name_to_id: HashMap<String, u64>,
}

impl HttpUpstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("convoy/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build upstream HTTP client")?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and decode the JSON body, mapping 404 to `None`.
    async fn send_optional<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<Option<T>> {
        let response = self
            .authorize(builder)
            .send()
            .await
            .context("Failed to reach upstream service")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Upstream error: {} - {}", status, body);
        }

        let value = response
            .json()
            .await
            .context("Failed to parse upstream response")?;
        Ok(Some(value))
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        self.send_optional(builder)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Upstream resource not found"))
    }
}

#[async_trait]
impl ReleaseStore for HttpUpstream {
    async fn get_release(&self, release_id: &str) -> Result<Option<Release>> {
        let url = self.url(&format!("/api/releases/{}", release_id));
        self.send_optional(self.client.get(url)).await
    }

    async fn list_releases(&self, release_ids: &[String]) -> Result<Vec<ApplicationRelease>> {
        let url = self.url("/api/releases/actions/list");
        self.send(self.client.post(url).json(&ListReleasesRequest { release_ids }))
            .await
    }

    async fn find_release_by_version(&self, lookup: &ReleaseLookup) -> Result<Option<String>> {
        let url = self.url("/api/releases/actions/find-by-version");
        let found: Option<ReleaseIdResponse> =
            self.send_optional(self.client.post(url).json(lookup)).await?;
        Ok(found.map(|r| r.release_id))
    }
}

#[async_trait]
impl PermissionChecker for HttpUpstream {
    async fn check_execute_permission(
        &self,
        operator: &str,
        workspace: &str,
        application_id: u64,
    ) -> Result<bool> {
        let url = self.url("/api/permissions/execute");
        let response: PermissionResponse = self
            .send(self.client.get(url).query(&[
                ("operator", operator.to_string()),
                ("workspace", workspace.to_string()),
                ("application_id", application_id.to_string()),
            ]))
            .await?;
        Ok(response.allowed)
    }
}

#[async_trait]
impl ProjectMetadata for HttpUpstream {
    async fn cluster_for_workspace(&self, project_id: u64, workspace: &str) -> Result<Option<String>> {
        let url = self.url(&format!("/api/projects/{}/clusters/{}", project_id, workspace));
        let found: Option<ClusterResponse> = self.send_optional(self.client.get(url)).await?;
        Ok(found.map(|c| c.cluster_name).filter(|name| !name.is_empty()))
    }

    async fn workspace_for_branch(&self, project_id: u64, branch: &str) -> Result<Option<String>> {
        let url = self.url(&format!("/api/projects/{}/branch-workspace", project_id));
        let found: Option<WorkspaceResponse> = self
            .send_optional(self.client.get(url).query(&[("branch", branch)]))
            .await?;
        Ok(found.map(|w| w.workspace))
    }

    async fn application_ids_by_names(
        &self,
        project_id: u64,
        operator: &str,
        names: &[String],
    ) -> Result<HashMap<String, u64>> {
        let url = self.url(&format!(
            "/api/projects/{}/applications/actions/ids-by-names",
            project_id
        ));
        let response: AppIdsResponse = self
            .send(self.client.post(url).json(&AppIdsRequest { operator, names }))
            .await?;
        Ok(response.app_name_to_id)
    }
}

#[async_trait]
impl ParamSource for HttpUpstream {
    async fn fetch_params(&self, application_id: u64, workspace: &str) -> Result<Vec<DeploymentParam>> {
        let url = self.url(&format!("/api/applications/{}/deploy-params", application_id));
        self.send(self.client.get(url).query(&[("workspace", workspace)]))
            .await
            .with_context(|| {
                format!(
                    "Failed to fetch deployment params, application {}, workspace {}",
                    application_id, workspace
                )
            })
    }
}

#[async_trait]
impl RuntimeService for HttpUpstream {
    async fn create_runtime(&self, operator: &str, req: &RuntimeCreateRequest) -> Result<RuntimeCreated> {
        let url = self.url("/api/runtimes");
        self.send(self.client.post(url).header("User-ID", operator).json(req))
            .await
    }

    async fn runtime_by_app(
        &self,
        workspace: &str,
        project_id: u64,
        app_name: &str,
    ) -> Result<Option<RuntimeRecord>> {
        let url = self.url("/api/runtimes/actions/by-app");
        self.send_optional(self.client.get(url).query(&[
            ("workspace", workspace.to_string()),
            ("project_id", project_id.to_string()),
            ("app_name", app_name.to_string()),
        ]))
        .await
    }

    async fn last_deployment(&self, runtime_id: u64) -> Result<Option<DeploymentRecord>> {
        let url = self.url(&format!("/api/runtimes/{}/last-deployment", runtime_id));
        self.send_optional(self.client.get(url)).await
    }

    async fn cancel_deployment(&self, operator: &str, deployment_id: u64) -> Result<()> {
        let url = self.url(&format!("/api/deployments/{}/actions/cancel", deployment_id));
        let response = self
            .authorize(self.client.post(url).header("User-ID", operator))
            .send()
            .await
            .context("Failed to reach upstream service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to cancel deployment {}: {} - {}", deployment_id, status, body);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalised() {
        let config = UpstreamConfig {
            base_url: "http://gateway:9000/".to_string(),
            request_timeout_secs: 5,
            token: None,
        };
        let upstream = HttpUpstream::new(&config).unwrap();
        assert_eq!(
            upstream.url("/api/releases/r1"),
            "http://gateway:9000/api/releases/r1"
        );
    }
}
