//! Payment Proof Endpoints
//!
//! 구매자의 결제 증빙 제출과 검증 이력 조회.
//!
//! # Interview Q&A
//!
//! Q: 게이트웨이 장애 시 왜 에러 대신 성공 응답인가?
//! A: 증빙 제출의 본질은 "구매자가 보냈다고 주장함"을 기록하는 것.
//!    자동 검증은 가속 수단일 뿐이라 게이트웨이가 죽어도 제출 자체는
//!    성립해야 한다. 실패 시 PAYMENT_SENT로만 전이하고 판매자의 수동
//!    확인 경로로 강등 - 레코드에 실패 사유를 남겨 감사 가능하게 유지
//!
//! Q: 금액 허용 오차 ±0.01은 왜 필요한가?
//! A: 영수증 금액은 수수료 표기나 반올림 때문에 전산상 금액과
//!    마지막 자릿수가 어긋날 수 있음. 그 이상 차이는 거부

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{
    PaymentProofRecord, PaymentRecordStatus, PaymentVerification, Transaction,
};
use crate::error::ApiError;
use crate::routes::{require_user, AuthUser};
use crate::services::state_machine::TransactionStatus;
use crate::types::{self, ApiResponse};
use crate::AppState;

// ============ Request/Response Types ============

/// 결제 증빙 제출 요청
#[derive(Debug, Deserialize)]
pub struct SubmitProofRequest {
    pub proof_url: String,
    pub reference: String,
    pub payment_method: String,
    /// 영수증에 표시된 금액
    pub amount: f64,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProofHistoryResponse {
    pub transaction_status: TransactionStatus,
    pub records: Vec<PaymentVerification>,
}

#[derive(Debug, Serialize)]
pub struct SubmitProofResponse {
    pub transaction: Transaction,
    pub verification: PaymentVerification,
    /// 자동 검증 여부 (false면 판매자 수동 확인 대기)
    pub auto_verified: bool,
}

// ============ Handlers ============

/// POST /api/transactions/:id/payment-proof
///
/// 결제 증빙 제출 (구매자만, AWAITING_PAYMENT/PAYMENT_SENT에서만)
///
/// 자동 검증 가능한 수단(TPA, Multicaixa)은 게이트웨이에 참조번호를
/// 조회해 성공 시 곧장 PAYMENT_CONFIRMED로 전이한다. 게이트웨이가
/// 실패를 보고하거나 연결이 안 되면 수동 검증 대기로 강등.
pub async fn submit_payment_proof(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(transaction_id): Path<Uuid>,
    Json(req): Json<SubmitProofRequest>,
) -> Result<Json<ApiResponse<SubmitProofResponse>>, ApiError> {
    let user = require_user(&state, &auth).await?;

    if req.proof_url.trim().is_empty() {
        return Err(ApiError::Validation("Proof URL is required".to_string()));
    }
    if req.reference.trim().is_empty() {
        return Err(ApiError::Validation(
            "Payment reference is required".to_string(),
        ));
    }
    if req.notes.as_deref().is_some_and(|n| n.len() > 500) {
        return Err(ApiError::Validation(
            "Notes cannot exceed 500 characters".to_string(),
        ));
    }
    if !types::is_allowed_method(&req.payment_method) {
        return Err(ApiError::Validation(format!(
            "Unsupported payment method: {}",
            req.payment_method
        )));
    }

    let transaction = state
        .db
        .find_transaction_for_participant(transaction_id, user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Transaction".to_string()))?;

    // 구매자가 아니거나 제출 가능한 상태가 아니면 404로 묶는다.
    // 판매자에게 증빙 제출 창구의 존재를 알릴 이유가 없음
    if transaction.buyer_id != user.id
        || !matches!(
            transaction.status,
            TransactionStatus::AwaitingPayment | TransactionStatus::PaymentSent
        )
    {
        return Err(ApiError::NotFound("Transaction".to_string()));
    }

    // 영수증 금액은 거래 금액과 ±0.01까지만 허용
    if !types::amounts_match(req.amount, transaction.amount) {
        return Err(ApiError::Validation(format!(
            "Receipt amount {} does not match the transaction amount {}",
            req.amount, transaction.amount
        )));
    }

    let record = if types::is_auto_verifiable(&req.payment_method) {
        let result = state
            .payment_gateway
            .verify_reference(&req.reference, req.amount, &req.payment_method)
            .await;

        if result.success && result.valid {
            PaymentProofRecord {
                proof_url: req.proof_url,
                reference: req.reference,
                payment_method: req.payment_method,
                amount: req.amount,
                notes: req.notes,
                auto_verified: true,
                provider_response: result.data,
                verification_error: None,
                record_status: PaymentRecordStatus::Verified,
                new_status: TransactionStatus::PaymentConfirmed,
                system_message: "Payment verified automatically via reference".to_string(),
            }
        } else {
            // 게이트웨이 실패/불일치 → 수동 검증 강등 (제출은 성공)
            let reason = result
                .error
                .unwrap_or_else(|| "Reference not confirmed by provider".to_string());
            tracing::warn!(
                transaction_id = %transaction.id,
                reason,
                "automatic verification degraded to manual"
            );
            PaymentProofRecord {
                proof_url: req.proof_url,
                reference: req.reference,
                payment_method: req.payment_method,
                amount: req.amount,
                notes: req.notes,
                auto_verified: false,
                provider_response: result.data,
                verification_error: Some(reason),
                record_status: PaymentRecordStatus::Pending,
                new_status: TransactionStatus::PaymentSent,
                system_message: "Payment proof submitted - awaiting seller confirmation"
                    .to_string(),
            }
        }
    } else {
        // 자동 검증 불가 수단은 처음부터 수동 경로
        PaymentProofRecord {
            proof_url: req.proof_url,
            reference: req.reference,
            payment_method: req.payment_method,
            amount: req.amount,
            notes: req.notes,
            auto_verified: false,
            provider_response: None,
            verification_error: None,
            record_status: PaymentRecordStatus::Pending,
            new_status: TransactionStatus::PaymentSent,
            system_message: "Payment proof submitted - awaiting seller confirmation".to_string(),
        }
    };

    let auto_verified = record.auto_verified;
    let (updated, verification) = state
        .db
        .record_payment_proof(user.id, transaction_id, record)
        .await?;

    let message = if auto_verified {
        "Payment confirmed automatically"
    } else {
        "Payment proof submitted - awaiting seller confirmation"
    };

    Ok(Json(ApiResponse::success_with_message(
        message,
        SubmitProofResponse {
            transaction: updated,
            verification,
            auto_verified,
        },
    )))
}

/// GET /api/transactions/:id/payment-proof
///
/// 증빙 제출 이력 (참여자만, 최신순)
pub async fn list_payment_proofs(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<ApiResponse<ProofHistoryResponse>>, ApiError> {
    let user = require_user(&state, &auth).await?;

    let transaction = state
        .db
        .find_transaction_for_participant(transaction_id, user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Transaction".to_string()))?;

    let records = state.db.list_payment_verifications(transaction_id).await?;

    Ok(Json(ApiResponse::success(ProofHistoryResponse {
        transaction_status: transaction.status,
        records,
    })))
}
