use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn too_many_requests() -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "too many requests",
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.body.code
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        let status = match &error {
            ApplicationError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApplicationError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApplicationError::Conflict(_) | ApplicationError::CapacityExceeded { .. } => {
                StatusCode::CONFLICT
            }
            ApplicationError::NotFound(_) => StatusCode::NOT_FOUND,
            ApplicationError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApplicationError::StorageFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApplicationError::RemoteStateUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        if status.is_server_error() {
            tracing::error!(error = %error, "请求处理失败");
        }
        ApiError::new(status, error.code(), error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_errors_map_to_status_codes() {
        let cases = [
            (ApplicationError::invalid_request("bad"), StatusCode::BAD_REQUEST),
            (ApplicationError::forbidden("no"), StatusCode::FORBIDDEN),
            (ApplicationError::Conflict("dup".into()), StatusCode::CONFLICT),
            (ApplicationError::CapacityExceeded { max: 2 }, StatusCode::CONFLICT),
            (ApplicationError::not_found("room"), StatusCode::NOT_FOUND),
            (ApplicationError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (ApplicationError::storage("io"), StatusCode::INTERNAL_SERVER_ERROR),
            (ApplicationError::remote_unavailable("redis"), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (error, expected) in cases {
            let code = error.code();
            let api = ApiError::from(error);
            assert_eq!(api.status(), expected);
            assert_eq!(api.code(), code);
        }
    }
}
