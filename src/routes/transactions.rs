//! Transaction Endpoints
//!
//! 거래 조회 및 상태 전이. 전이 검증은 `services::state_machine`의
//! 테이블이 담당하고, 여기서는 요청을 그대로 전달만 한다.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Transaction;
use crate::error::ApiError;
use crate::routes::{require_user, AuthUser};
use crate::services::state_machine::{ParticipantRole, TransactionStatus};
use crate::types::{ApiResponse, PageQuery, Pagination};
use crate::AppState;

// ============ Request/Response Types ============

/// 거래 목록 쿼리
#[derive(Debug, Deserialize)]
pub struct TransactionListQuery {
    pub status: Option<TransactionStatus>,
    /// buyer | seller (생략 시 둘 다)
    pub role: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct TransactionListResponse {
    pub transactions: Vec<Transaction>,
    pub pagination: Pagination,
}

/// 상태 전이 요청
#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: TransactionStatus,
    pub proof_url: Option<String>,
    pub notes: Option<String>,
}

// ============ Handlers ============

/// GET /api/transactions
///
/// 내가 참여한 거래 목록 (상태/역할 필터)
pub async fn list_transactions(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<TransactionListQuery>,
) -> Result<Json<TransactionListResponse>, ApiError> {
    let user = require_user(&state, &auth).await?;

    let role = match query.role.as_deref() {
        Some("buyer") => Some(ParticipantRole::Buyer),
        Some("seller") => Some(ParticipantRole::Seller),
        None => None,
        Some(other) => {
            return Err(ApiError::Validation(format!(
                "Unknown role: {} (expected buyer or seller)",
                other
            )))
        }
    };

    let paging = PageQuery {
        page: query.page,
        limit: query.limit,
    };
    let (transactions, total) = state
        .db
        .list_transactions(user.id, query.status, role, paging.limit(), paging.offset())
        .await?;

    Ok(Json(TransactionListResponse {
        transactions,
        pagination: Pagination::build(paging.page(), paging.limit(), total),
    }))
}

/// GET /api/transactions/:id
///
/// 거래 상세 (참여자만, 비참여자에게는 404)
pub async fn get_transaction(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Transaction>>, ApiError> {
    let user = require_user(&state, &auth).await?;

    let transaction = state
        .db
        .find_transaction_for_participant(transaction_id, user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Transaction".to_string()))?;

    Ok(Json(ApiResponse::success(transaction)))
}

/// PATCH /api/transactions/:id
///
/// 상태 전이 요청
///
/// # Errors
///
/// - 테이블에 없는 전이 → 400 ILLEGAL_TRANSITION (허용 목록 포함)
/// - 전이는 합법이나 역할 불일치 → 403
/// - 비참여자/없는 거래 → 404
pub async fn transition_transaction(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(transaction_id): Path<Uuid>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<ApiResponse<Transaction>>, ApiError> {
    let user = require_user(&state, &auth).await?;

    let updated = state
        .db
        .transition_transaction(user.id, transaction_id, req.status, req.proof_url, req.notes)
        .await?;

    tracing::info!(
        transaction_id = %updated.id,
        status = updated.status.as_str(),
        "transaction status changed"
    );

    Ok(Json(ApiResponse::success_with_message(
        format!("Transaction status changed to: {}", updated.status.as_str()),
        updated,
    )))
}
