use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tufe_core::FetchError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Fetch(err) => match err {
                FetchError::SourceNotFound(_) | FetchError::SessionNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                FetchError::StateConflict(_) | FetchError::Cancelled(_) => StatusCode::CONFLICT,
                FetchError::InvalidInput(_)
                | FetchError::UnsupportedPeriod { .. }
                | FetchError::MissingCredential(_) => StatusCode::BAD_REQUEST,
                FetchError::ValidationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                FetchError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
                FetchError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                FetchError::AllSourcesFailed { .. }
                | FetchError::ProviderError { .. }
                | FetchError::Network(_) => StatusCode::BAD_GATEWAY,
                FetchError::AutoConfigFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
                FetchError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Internal(_) => "internal",
            ApiError::Fetch(err) => match err {
                FetchError::SourceNotFound(_) => "source_not_found",
                FetchError::SessionNotFound(_) => "session_not_found",
                FetchError::ValidationFailed { .. } => "validation_failed",
                FetchError::AutoConfigFailed(_) => "auto_config_failed",
                FetchError::AllSourcesFailed { .. } => "all_sources_failed",
                FetchError::RateLimitExceeded { .. } => "rate_limit_exceeded",
                FetchError::Timeout { .. } => "timeout",
                FetchError::StateConflict(_) => "state_conflict",
                FetchError::Cancelled(_) => "cancelled",
                FetchError::ProviderError { .. } => "provider_error",
                FetchError::MissingCredential(_) => "missing_credential",
                FetchError::UnsupportedPeriod { .. } => "unsupported_period",
                FetchError::Network(_) => "network",
                FetchError::InvalidInput(_) => "invalid_input",
                FetchError::Storage(_) => "storage",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("{}", self);
        }

        let mut body = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let ApiError::Fetch(FetchError::AllSourcesFailed { attempts, .. }) = &self {
            body["attempts"] = json!(attempts);
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_fetch_errors_to_statuses() {
        let cases = [
            (FetchError::SessionNotFound("x".into()), StatusCode::NOT_FOUND),
            (FetchError::SourceNotFound("x".into()), StatusCode::NOT_FOUND),
            (FetchError::StateConflict("busy".into()), StatusCode::CONFLICT),
            (FetchError::InvalidInput("bad".into()), StatusCode::BAD_REQUEST),
            (
                FetchError::AllSourcesFailed {
                    period: "2024-03".into(),
                    summary: "no eligible sources".into(),
                    attempts: vec![],
                },
                StatusCode::BAD_GATEWAY,
            ),
            (FetchError::Storage("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
