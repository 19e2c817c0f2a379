//! Proposal Endpoints
//!
//! 오퍼에 대한 제안 생성/조회/응답.
//! 수락은 거래 생성과 오퍼 비활성화를 묶은 원자 연산이다.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{Proposal, ProposalScope, ProposalStatus, Transaction};
use crate::error::ApiError;
use crate::routes::{require_user, AuthUser};
use crate::types::{ApiResponse, PageQuery, Pagination};
use crate::AppState;

/// 제안 메시지 최대 길이
const MAX_MESSAGE_LEN: usize = 500;

// ============ Request/Response Types ============

/// 제안 생성 요청
#[derive(Debug, Deserialize)]
pub struct CreateProposalRequest {
    pub offer_id: Uuid,
    pub amount: f64,
    pub payment_method: String,
    pub message: Option<String>,
}

/// 제안 응답 요청 (수락/거절)
#[derive(Debug, Deserialize)]
pub struct RespondProposalRequest {
    pub status: ProposalStatus,
    pub response_message: Option<String>,
}

/// 제안 목록 쿼리
#[derive(Debug, Deserialize)]
pub struct ProposalListQuery {
    /// received | sent (생략 시 둘 다)
    pub scope: Option<String>,
    pub offer_id: Option<Uuid>,
    pub status: Option<ProposalStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ProposalListResponse {
    pub proposals: Vec<Proposal>,
    pub pagination: Pagination,
}

/// 응답 결과 (수락이면 생성된 거래 포함)
#[derive(Debug, Serialize)]
pub struct RespondProposalResponse {
    pub proposal: Proposal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Transaction>,
}

// ============ Handlers ============

/// POST /api/proposals
///
/// 활성 오퍼에 제안 제출 (검증 완료 사용자만)
///
/// # Rejection Cases
///
/// - 오퍼 없음/비활성 → 404
/// - 자기 오퍼 → 400
/// - 금액이 오퍼 범위 밖 → 400
/// - 오퍼가 받지 않는 결제 수단 → 400
/// - 같은 오퍼에 이미 PENDING 제안 → 400 (CONFLICT)
pub async fn create_proposal(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateProposalRequest>,
) -> Result<Json<ApiResponse<Proposal>>, ApiError> {
    let user = require_user(&state, &auth).await?;

    if !user.verified {
        return Err(ApiError::Forbidden(
            "Identity verification is required before sending proposals".to_string(),
        ));
    }

    if let Some(message) = &req.message {
        if message.len() > MAX_MESSAGE_LEN {
            return Err(ApiError::Validation(format!(
                "Message cannot exceed {} characters",
                MAX_MESSAGE_LEN
            )));
        }
    }

    let offer = state
        .db
        .find_active_offer(req.offer_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Offer".to_string()))?;

    if offer.owner_id == user.id {
        return Err(ApiError::Validation(
            "You cannot propose on your own offer".to_string(),
        ));
    }

    // 범위는 양끝 포함
    if req.amount < offer.min_amount || req.amount > offer.max_amount {
        return Err(ApiError::Validation(format!(
            "Amount must be between {} and {}",
            offer.min_amount, offer.max_amount
        )));
    }

    if !offer.payment_methods.iter().any(|m| m == &req.payment_method) {
        return Err(ApiError::Validation(
            "Payment method is not accepted by this offer".to_string(),
        ));
    }

    if state
        .db
        .pending_proposal_exists(offer.id, user.id)
        .await?
    {
        return Err(ApiError::Conflict(
            "You already have a pending proposal for this offer".to_string(),
        ));
    }

    let proposal = state
        .db
        .insert_proposal(user.id, offer.id, req.amount, &req.payment_method, req.message)
        .await?;

    tracing::info!(proposal_id = %proposal.id, offer_id = %offer.id, "proposal created");

    Ok(Json(ApiResponse::success_with_message(
        "Proposal sent",
        proposal,
    )))
}

/// GET /api/proposals
///
/// 내가 보냈거나 내 오퍼로 받은 제안 목록
pub async fn list_proposals(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ProposalListQuery>,
) -> Result<Json<ProposalListResponse>, ApiError> {
    let user = require_user(&state, &auth).await?;

    let scope = match query.scope.as_deref() {
        Some("received") => ProposalScope::Received,
        Some("sent") => ProposalScope::Sent,
        None => ProposalScope::All,
        Some(other) => {
            return Err(ApiError::Validation(format!(
                "Unknown scope: {} (expected received or sent)",
                other
            )))
        }
    };

    let paging = PageQuery {
        page: query.page,
        limit: query.limit,
    };
    let (proposals, total) = state
        .db
        .list_proposals(
            user.id,
            scope,
            query.offer_id,
            query.status,
            paging.limit(),
            paging.offset(),
        )
        .await?;

    Ok(Json(ProposalListResponse {
        proposals,
        pagination: Pagination::build(paging.page(), paging.limit(), total),
    }))
}

/// PATCH /api/proposals/:id
///
/// 제안에 응답 (오퍼 소유자만, PENDING 상태만)
///
/// 수락 시 한 트랜잭션으로: 제안 ACCEPTED + 거래 생성 + 오퍼 비활성.
/// 역할 배정은 오퍼 방향에서 유도된다 (SELL 오퍼 → 제안자가 구매자).
pub async fn respond_to_proposal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(proposal_id): Path<Uuid>,
    Json(req): Json<RespondProposalRequest>,
) -> Result<Json<ApiResponse<RespondProposalResponse>>, ApiError> {
    let user = require_user(&state, &auth).await?;

    if req.status == ProposalStatus::Pending {
        return Err(ApiError::Validation(
            "Response status must be ACCEPTED or REJECTED".to_string(),
        ));
    }

    if let Some(message) = &req.response_message {
        if message.len() > MAX_MESSAGE_LEN {
            return Err(ApiError::Validation(format!(
                "Message cannot exceed {} characters",
                MAX_MESSAGE_LEN
            )));
        }
    }

    let (proposal, transaction) = state
        .db
        .respond_to_proposal(user.id, proposal_id, req.status, req.response_message)
        .await?;

    let message = match req.status {
        ProposalStatus::Accepted => "Proposal accepted - transaction created",
        _ => "Proposal rejected",
    };
    tracing::info!(proposal_id = %proposal.id, status = ?req.status, "proposal responded");

    Ok(Json(ApiResponse::success_with_message(
        message,
        RespondProposalResponse {
            proposal,
            transaction,
        },
    )))
}
