//! Error taxonomy of the deployment order engine.

use thiserror::Error;

use super::planner::PlanError;

pub type OrderResult<T> = std::result::Result<T, OrderError>;

#[derive(Error, Debug)]
pub enum OrderError {
    /// Bad input or configuration: unknown mode, cycle, missing cluster, malformed plan
    #[error("{0}")]
    Validation(String),

    /// The operator may not execute one of the order's applications
    #[error("permission denied: {0}")]
    Permission(String),

    /// Release, order, runtime or deployment missing
    #[error("{0} not found")]
    NotFound(String),

    /// A collaborator service failed
    #[error("{0}")]
    External(String),

    /// The order is not in a state that allows the operation
    #[error("{0}")]
    State(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The order was persisted but running its first batch failed
    #[error("deployment order {order_id} was created but failed to run: {source}")]
    RunAfterCreate {
        order_id: String,
        #[source]
        source: Box<OrderError>,
    },
}

impl OrderError {
    pub fn stale(order_id: &str) -> Self {
        OrderError::State(format!(
            "deployment order {} was modified concurrently, retry the operation",
            order_id
        ))
    }

    /// The error that decides how the failure is reported.
    pub fn root(&self) -> &OrderError {
        match self {
            OrderError::RunAfterCreate { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<PlanError> for OrderError {
    fn from(err: PlanError) -> Self {
        OrderError::Validation(err.to_string())
    }
}

impl From<anyhow::Error> for OrderError {
    fn from(err: anyhow::Error) -> Self {
        OrderError::External(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_error_is_validation() {
        let err: OrderError = PlanError::UnknownMode("blue".to_string()).into();
        assert!(matches!(err, OrderError::Validation(_)));
        assert!(err.to_string().contains("blue"));
    }

    #[test]
    fn test_root_unwraps_run_after_create() {
        let err = OrderError::RunAfterCreate {
            order_id: "o1".to_string(),
            source: Box::new(OrderError::Permission("app web".to_string())),
        };
        assert!(matches!(err.root(), OrderError::Permission(_)));
        assert!(err.to_string().contains("o1"));
    }
}
