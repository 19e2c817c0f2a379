//! Error Handling Module
//!
//! Provides type-safe error handling with proper HTTP status code mapping.
//! Uses thiserror for domain errors and integrates with tracing for structured logging.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// API 에러 타입
///
/// # Design Decision
///
/// 각 에러 variant는 적절한 HTTP 상태 코드에 매핑됨
/// - 클라이언트 에러: 4xx (검증 실패, 인증 실패, 권한 없음 등)
/// - 서버 에러: 5xx (내부 오류, 외부 서비스 장애)
///
/// NotFound는 "존재하지 않음"과 "존재하지만 권한 없음"을 의도적으로
/// 구분하지 않음 - 리소스 존재 여부 자체가 정보 유출이기 때문
///
/// 민감한 내부 정보는 클라이언트에 노출하지 않음
#[derive(Debug, Error)]
pub enum ApiError {
    // ============ 400 Bad Request ============
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    /// 비즈니스 규칙 충돌 (쿼터 초과, 중복 제안/리뷰 등)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// 상태 머신에 정의되지 않은 전이 요청
    #[error("Illegal status transition from {from} to {to}")]
    IllegalTransition {
        from: &'static str,
        to: &'static str,
        allowed: Vec<&'static str>,
    },

    // ============ 401 Unauthorized ============
    #[error("Authentication required")]
    Unauthenticated,

    // ============ 403 Forbidden ============
    /// 리소스는 존재하지만 현재 역할로는 해당 동작 불가
    #[error("Forbidden: {0}")]
    Forbidden(String),

    // ============ 404 Not Found ============
    #[error("Resource not found: {0}")]
    NotFound(String),

    // ============ 500 Internal Server Error ============
    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error")]
    Internal,

    // ============ 503 Service Unavailable ============
    /// 폴백 경로가 없는 외부 서비스 장애 (OCR 등)
    #[error("External service degraded: {0}")]
    ExternalServiceDegraded(String),
}

/// API 에러 응답 구조
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            // 4xx 클라이언트 에러
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None)
            }
            ApiError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                "Validation failed".to_string(),
                Some(serde_json::json!(msg)),
            ),
            ApiError::Conflict(msg) => (StatusCode::BAD_REQUEST, "CONFLICT", msg.clone(), None),
            ApiError::IllegalTransition { from, to, allowed } => (
                StatusCode::BAD_REQUEST,
                "ILLEGAL_TRANSITION",
                format!("Illegal status transition from {} to {}", from, to),
                Some(serde_json::json!({ "allowed_statuses": allowed })),
            ),
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                "Authentication required".to_string(),
                None,
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone(), None),
            ApiError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{} not found", resource),
                None,
            ),

            // 5xx 서버 에러
            ApiError::Database(_) => {
                // 내부 에러는 클라이언트에 상세 정보 노출 안 함
                tracing::error!("Database error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error occurred".to_string(),
                    None,
                )
            }
            ApiError::Internal => {
                tracing::error!("Internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            ApiError::ExternalServiceDegraded(service) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                format!("{} is currently unavailable", service),
                None,
            ),
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// SQLx 에러를 ApiError로 변환
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("SQLx error: {:?}", err);
        ApiError::Database(err.to_string())
    }
}

/// anyhow 에러를 ApiError로 변환
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Anyhow error: {:?}", err);
        ApiError::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_of(ApiError::Validation("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ApiError::Conflict("dup".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(ApiError::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(ApiError::Forbidden("role".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(ApiError::NotFound("Offer".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_of(ApiError::Internal), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            status_of(ApiError::ExternalServiceDegraded("OCR".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_illegal_transition_reports_allowed() {
        let err = ApiError::IllegalTransition {
            from: "COMPLETED",
            to: "PAYMENT_SENT",
            allowed: vec![],
        };
        assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
    }
}
