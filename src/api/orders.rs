//! Deployment order endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{
    CancelOrderRequest, CreateOrderRequest, DeployOrderRequest, DeploymentOrderResponse,
    ListOrdersQuery, OrderPage,
};
use crate::engine::SubmissionResults;
use crate::AppState;

use super::error::ApiError;
use super::validation::{validate_create_order, validate_operator};

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    pub order: DeploymentOrderResponse,
    /// Runtimes submitted for the first batch when `auto_run` was set.
    pub deployments: SubmissionResults,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeployOrderResponse {
    pub order_id: String,
    pub deployments: SubmissionResults,
}

/// POST /api/deployment-orders
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), ApiError> {
    validate_create_order(&req)?;

    let created = state.orders.create(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse {
            order: created.order.into(),
            deployments: created.deployments,
        }),
    ))
}

/// GET /api/deployment-orders
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderPage>, ApiError> {
    Ok(Json(state.orders.list(&query).await?))
}

/// GET /api/deployment-orders/:id
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeploymentOrderResponse>, ApiError> {
    let order = state.orders.get(&id).await?;
    Ok(Json(order.into()))
}

/// POST /api/deployment-orders/:id/deploy
pub async fn deploy_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<DeployOrderRequest>,
) -> Result<(StatusCode, Json<DeployOrderResponse>), ApiError> {
    validate_operator(&req.operator).map_err(ApiError::bad_request)?;

    let deployments = state.orders.deploy(&id, &req.operator).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(DeployOrderResponse {
            order_id: id,
            deployments,
        }),
    ))
}

/// POST /api/deployment-orders/:id/cancel
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CancelOrderRequest>,
) -> Result<Json<DeploymentOrderResponse>, ApiError> {
    validate_operator(&req.operator).map_err(ApiError::bad_request)?;

    let order = state.orders.cancel(&id, &req.operator, req.force).await?;
    Ok(Json(order.into()))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::api::create_router;
    use crate::config::Config;
    use crate::engine::testing::{setup, TestEnv};
    use crate::engine::OrderService;
    use crate::AppState;

    fn router(env: &TestEnv) -> axum::Router {
        let orders = Arc::new(OrderService::new(
            env.db.clone(),
            env.upstreams.clone(),
            env.locks.clone(),
            env.executor.clone(),
        ));
        create_router(Arc::new(AppState::new(Config::default(), env.db.clone(), orders)))
    }

    async fn send(app: axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_create_and_get_order() {
        let env = setup().await;
        env.fake.add_project_release("p1", 1, &[&[("web", "r-web")], &[("api", "r-api")]]);
        let app = router(&env);

        let (status, body) = send(
            app.clone(),
            "POST",
            "/api/deployment-orders",
            Some(json!({"id": "o1", "release_id": "p1", "project_id": 1, "workspace": "dev", "operator": "u1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["order"]["status"], "wait_deploy");
        assert_eq!(body["order"]["batch_size"], 2);
        assert_eq!(body["order"]["deploy_list"], json!([["r-web"], ["r-api"]]));

        let (status, body) = send(app, "GET", "/api/deployment-orders/o1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["workspace"], "DEV");
        assert_eq!(body["kind"], "multi_application");
    }

    #[tokio::test]
    async fn test_invalid_create_request() {
        let env = setup().await;
        let (status, body) = send(
            router(&env),
            "POST",
            "/api/deployment-orders",
            Some(json!({"operator": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");
        assert!(body["error"]["details"]["operator"].is_array());
    }

    #[tokio::test]
    async fn test_unknown_order_is_404() {
        let env = setup().await;
        let (status, body) = send(router(&env), "GET", "/api/deployment-orders/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn test_deploy_twice_conflicts() {
        let env = setup().await;
        env.fake.add_project_release("p1", 1, &[&[("web", "r-web")]]);
        let app = router(&env);
        send(
            app.clone(),
            "POST",
            "/api/deployment-orders",
            Some(json!({"id": "o1", "release_id": "p1", "project_id": 1, "workspace": "DEV", "operator": "u1"})),
        )
        .await;

        let (status, body) = send(
            app.clone(),
            "POST",
            "/api/deployment-orders/o1/deploy",
            Some(json!({"operator": "u1"})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(body["deployments"]["web"]["deployment_id"].is_u64());

        let (status, body) = send(
            app,
            "POST",
            "/api/deployment-orders/o1/deploy",
            Some(json!({"operator": "u1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "conflict");
    }

    #[tokio::test]
    async fn test_permission_denied_is_403() {
        let env = setup().await;
        env.fake.add_project_release("p1", 1, &[&[("web", "r-web")]]);
        env.fake.deny_application(env.fake.application_id("web"));

        let (status, body) = send(
            router(&env),
            "POST",
            "/api/deployment-orders",
            Some(json!({"release_id": "p1", "project_id": 1, "workspace": "DEV", "operator": "u1"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "forbidden");
    }

    #[tokio::test]
    async fn test_cancel_and_list() {
        let env = setup().await;
        env.fake.add_project_release("p1", 1, &[&[("web", "r-web")]]);
        let app = router(&env);
        send(
            app.clone(),
            "POST",
            "/api/deployment-orders",
            Some(json!({"id": "o1", "release_id": "p1", "project_id": 1, "workspace": "DEV", "operator": "u1"})),
        )
        .await;

        let (status, body) = send(
            app.clone(),
            "POST",
            "/api/deployment-orders/o1/cancel",
            Some(json!({"operator": "u1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "canceled");

        let (status, body) = send(app, "GET", "/api/deployment-orders?status=canceled", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["list"][0]["id"], "o1");
    }

    #[tokio::test]
    async fn test_health() {
        let env = setup().await;
        let (status, _) = send(router(&env), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
