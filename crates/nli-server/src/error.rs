use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nli_ai::PoolError;
use nli_core::ErrorBody;
use thiserror::Error;
use tracing::{error, warn};

/// Why a request was not answered. Each variant maps to one HTTP status.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Model not loaded")]
    NotReady,

    #[error("Service is shutting down")]
    ShuttingDown,

    #[error("Maximum {max} pairs per request, got {count}")]
    TooManyPairs { count: usize, max: usize },

    #[error("{detail}")]
    InvalidBody { status: StatusCode, detail: String },

    #[error("Batch did not finish within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{0}")]
    Inference(PoolError),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotReady | Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            Self::TooManyPairs { .. } => StatusCode::BAD_REQUEST,
            Self::InvalidBody { status, .. } => *status,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PoolError> for ServiceError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Closed => Self::ShuttingDown,
            other => Self::Inference(other),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            match &self {
                Self::Inference(_) => error!(status = status.as_u16(), "{self}"),
                _ => warn!(status = status.as_u16(), "{self}"),
            }
        }
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(ServiceError::NotReady.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ServiceError::TooManyPairs { count: 101, max: 100 }.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::Timeout(Duration::from_secs(5)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ServiceError::from(PoolError::WorkerLost).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn closed_pool_means_shutting_down() {
        assert!(matches!(
            ServiceError::from(PoolError::Closed),
            ServiceError::ShuttingDown
        ));
    }

    #[test]
    fn not_ready_detail_matches_health_contract() {
        assert_eq!(ServiceError::NotReady.to_string(), "Model not loaded");
    }
}
