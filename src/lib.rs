pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod engine;
pub mod upstream;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::engine::OrderService;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub orders: Arc<OrderService>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, orders: Arc<OrderService>) -> Self {
        Self {
            config,
            db,
            orders,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
