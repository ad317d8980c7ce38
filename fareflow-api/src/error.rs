use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fareflow_core::distribution::DistributionError;
use fareflow_order::sell::PipelineError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// The distribution system failed or rejected the call; the message is
    /// already user-facing.
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Internal(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl From<DistributionError> for AppError {
    fn from(err: DistributionError) -> Self {
        AppError::Upstream(err.user_message("The booking service rejected the request").to_string())
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Distribution(inner) => inner.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fareflow_core::ndc::RemoteError;

    #[test]
    fn test_distribution_errors_map_to_bad_gateway() {
        let err: AppError = DistributionError::Api(RemoteError {
            error_message: Some("Order not found upstream".into()),
            message: None,
            details: None,
        })
        .into();
        match &err {
            AppError::Upstream(msg) => assert_eq!(msg, "Order not found upstream"),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::Validation("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::NotFound("x".into()).into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("x".into()).into_response().status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Internal("boom".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
