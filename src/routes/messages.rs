//! Message Endpoints
//!
//! 거래 참여자 간 채팅. 메시지는 append-only이며 시스템 메시지는
//! 상태 전이/증빙 제출 트랜잭션 안에서 생성되므로 여기서는 USER만 만든다.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::Message;
use crate::error::ApiError;
use crate::routes::{require_user, AuthUser};
use crate::types::ApiResponse;
use crate::AppState;

/// 메시지 본문 길이 범위
const MAX_BODY_LEN: usize = 1000;

// ============ Request/Response Types ============

/// 메시지 전송 요청
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub transaction_id: Uuid,
    pub body: String,
    pub attachment_url: Option<String>,
}

/// 메시지 목록 쿼리
#[derive(Debug, Deserialize)]
pub struct MessageListQuery {
    pub transaction_id: Uuid,
}

// ============ Handlers ============

/// POST /api/messages
///
/// 거래 채팅에 메시지 추가 (참여자만)
pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<ApiResponse<Message>>, ApiError> {
    let user = require_user(&state, &auth).await?;

    let body = req.body.trim();
    if body.is_empty() {
        return Err(ApiError::Validation(
            "Message body cannot be empty".to_string(),
        ));
    }
    if body.len() > MAX_BODY_LEN {
        return Err(ApiError::Validation(format!(
            "Message body cannot exceed {} characters",
            MAX_BODY_LEN
        )));
    }

    if let Some(url) = &req.attachment_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ApiError::Validation(
                "Attachment must be a URL".to_string(),
            ));
        }
    }

    // 참여자 확인 (비참여자에게는 거래 존재 자체를 숨김)
    state
        .db
        .find_transaction_for_participant(req.transaction_id, user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Transaction".to_string()))?;

    let message = state
        .db
        .insert_message(req.transaction_id, user.id, body, req.attachment_url)
        .await?;

    Ok(Json(ApiResponse::success(message)))
}

/// GET /api/messages?transaction_id=...
///
/// 거래 채팅 전체 (오래된 순)
pub async fn list_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<ApiResponse<Vec<Message>>>, ApiError> {
    let user = require_user(&state, &auth).await?;

    state
        .db
        .find_transaction_for_participant(query.transaction_id, user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Transaction".to_string()))?;

    let messages = state.db.list_messages(query.transaction_id).await?;

    Ok(Json(ApiResponse::success(messages)))
}
