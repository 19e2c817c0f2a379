//! Offer Endpoints
//!
//! 환전 오퍼 게시/검색/수정.
//!
//! # Interview Q&A
//!
//! Q: 오퍼 쿼터(활성 5개)는 왜 생성 시에만 검사하는가?
//! A: 수정은 기존 오퍼의 조건 변경일 뿐 공급량을 늘리지 않음.
//!    비활성 → 재활성도 PATCH로 가능한데, 이 경로는 쿼터를 다시 세지
//!    않는다 - 쿼터는 스팸성 신규 게시를 막는 장치이지 보유 상한이 아님

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{NewOffer, Offer, OfferDirection, OfferFilter, OfferListing, OfferPatch};
use crate::error::ApiError;
use crate::routes::{require_user, AuthUser};
use crate::types::{self, ApiResponse, PageQuery, Pagination};
use crate::AppState;

/// 오퍼 메모 최대 길이
const MAX_NOTES_LEN: usize = 500;

// ============ Request/Response Types ============

/// 오퍼 생성 요청
#[derive(Debug, Deserialize)]
pub struct CreateOfferRequest {
    pub direction: OfferDirection,
    pub source_currency: String,
    pub target_currency: String,
    pub min_amount: f64,
    pub max_amount: f64,
    pub rate: f64,
    pub payment_methods: Vec<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

/// 오퍼 수정 요청 (부분)
#[derive(Debug, Deserialize)]
pub struct UpdateOfferRequest {
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub rate: Option<f64>,
    pub payment_methods: Option<Vec<String>>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub active: Option<bool>,
}

/// 오퍼 목록 쿼리 파라미터
#[derive(Debug, Deserialize)]
pub struct OfferListQuery {
    pub direction: Option<OfferDirection>,
    pub source_currency: Option<String>,
    pub target_currency: Option<String>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub location: Option<String>,
    // serde(flatten)은 urlencoded에서 숫자 역직렬화가 깨지므로 인라인
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// 오퍼 목록 응답
#[derive(Debug, Serialize)]
pub struct OfferListResponse {
    pub offers: Vec<OfferListing>,
    pub pagination: Pagination,
    /// 적용된 필터 echo (클라이언트 상태 복원용)
    pub filters: AppliedFilters,
}

#[derive(Debug, Serialize)]
pub struct AppliedFilters {
    pub direction: Option<OfferDirection>,
    pub source_currency: Option<String>,
    pub target_currency: Option<String>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub location: Option<String>,
}

// ============ Handlers ============

/// POST /api/offers
///
/// 오퍼 게시 (검증 완료 사용자만, 활성 오퍼 5개 제한)
pub async fn create_offer(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateOfferRequest>,
) -> Result<Json<ApiResponse<Offer>>, ApiError> {
    let user = require_user(&state, &auth).await?;

    if !user.verified {
        return Err(ApiError::Forbidden(
            "Identity verification is required before posting offers".to_string(),
        ));
    }

    validate_currency_pair(&req.source_currency, &req.target_currency)?;
    validate_amount_range(req.min_amount, req.max_amount)?;
    if req.rate <= 0.0 {
        return Err(ApiError::Validation("Rate must be positive".to_string()));
    }
    validate_payment_methods(&req.payment_methods)?;
    validate_notes(req.notes.as_deref())?;

    let offer = state
        .db
        .create_offer(
            user.id,
            NewOffer {
                direction: req.direction,
                source_currency: req.source_currency,
                target_currency: req.target_currency,
                min_amount: req.min_amount,
                max_amount: req.max_amount,
                rate: req.rate,
                payment_methods: req.payment_methods,
                location: req.location,
                notes: req.notes,
            },
        )
        .await?;

    tracing::info!(offer_id = %offer.id, owner_id = %user.id, "offer created");

    Ok(Json(ApiResponse::success_with_message(
        "Offer created",
        offer,
    )))
}

/// GET /api/offers
///
/// 활성 오퍼 공개 검색 (필터 + 페이지네이션)
///
/// 인증 불필요 - 마켓 둘러보기는 로그인 전에도 가능해야 함
pub async fn list_offers(
    State(state): State<AppState>,
    Query(query): Query<OfferListQuery>,
) -> Result<Json<OfferListResponse>, ApiError> {
    let filter = OfferFilter {
        direction: query.direction,
        source_currency: query.source_currency.clone(),
        target_currency: query.target_currency.clone(),
        min_amount: query.min_amount,
        max_amount: query.max_amount,
        location: query.location.clone(),
    };

    let paging = PageQuery {
        page: query.page,
        limit: query.limit,
    };
    let page = paging.page();
    let limit = paging.limit();
    let (offers, total) = state
        .db
        .list_offers(&filter, limit, paging.offset())
        .await?;

    Ok(Json(OfferListResponse {
        offers,
        pagination: Pagination::build(page, limit, total),
        filters: AppliedFilters {
            direction: query.direction,
            source_currency: query.source_currency,
            target_currency: query.target_currency,
            min_amount: query.min_amount,
            max_amount: query.max_amount,
            location: query.location,
        },
    }))
}

/// PATCH /api/offers/:id
///
/// 오퍼 부분 수정 (소유자만). 남의 오퍼는 존재 여부를 숨기려 404.
pub async fn update_offer(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(offer_id): Path<Uuid>,
    Json(req): Json<UpdateOfferRequest>,
) -> Result<Json<ApiResponse<Offer>>, ApiError> {
    let user = require_user(&state, &auth).await?;

    if let Some(min) = req.min_amount {
        if min <= 0.0 {
            return Err(ApiError::Validation(
                "Minimum amount must be positive".to_string(),
            ));
        }
    }
    if let Some(max) = req.max_amount {
        if max <= 0.0 {
            return Err(ApiError::Validation(
                "Maximum amount must be positive".to_string(),
            ));
        }
    }
    if let (Some(min), Some(max)) = (req.min_amount, req.max_amount) {
        if min > max {
            return Err(ApiError::Validation(
                "Minimum amount cannot exceed maximum amount".to_string(),
            ));
        }
    }
    if let Some(rate) = req.rate {
        if rate <= 0.0 {
            return Err(ApiError::Validation("Rate must be positive".to_string()));
        }
    }
    if let Some(methods) = &req.payment_methods {
        validate_payment_methods(methods)?;
    }
    validate_notes(req.notes.as_deref())?;

    let updated = state
        .db
        .update_offer(
            user.id,
            offer_id,
            OfferPatch {
                min_amount: req.min_amount,
                max_amount: req.max_amount,
                rate: req.rate,
                payment_methods: req.payment_methods,
                location: req.location,
                notes: req.notes,
                active: req.active,
            },
        )
        .await?
        .ok_or_else(|| ApiError::NotFound("Offer".to_string()))?;

    Ok(Json(ApiResponse::success_with_message(
        "Offer updated",
        updated,
    )))
}

// ============ Helpers ============

fn validate_currency_pair(source: &str, target: &str) -> Result<(), ApiError> {
    if !types::is_allowed_currency(source) {
        return Err(ApiError::Validation(format!(
            "Unsupported source currency: {}",
            source
        )));
    }
    if !types::is_allowed_currency(target) {
        return Err(ApiError::Validation(format!(
            "Unsupported target currency: {}",
            target
        )));
    }
    if source == target {
        return Err(ApiError::Validation(
            "Source and target currencies must differ".to_string(),
        ));
    }
    Ok(())
}

fn validate_amount_range(min: f64, max: f64) -> Result<(), ApiError> {
    if min <= 0.0 || max <= 0.0 {
        return Err(ApiError::Validation(
            "Amounts must be positive".to_string(),
        ));
    }
    if min > max {
        return Err(ApiError::Validation(
            "Minimum amount cannot exceed maximum amount".to_string(),
        ));
    }
    Ok(())
}

fn validate_payment_methods(methods: &[String]) -> Result<(), ApiError> {
    if methods.is_empty() {
        return Err(ApiError::Validation(
            "At least one payment method is required".to_string(),
        ));
    }
    for method in methods {
        if !types::is_allowed_method(method) {
            return Err(ApiError::Validation(format!(
                "Unsupported payment method: {}",
                method
            )));
        }
    }
    Ok(())
}

fn validate_notes(notes: Option<&str>) -> Result<(), ApiError> {
    if let Some(notes) = notes {
        if notes.len() > MAX_NOTES_LEN {
            return Err(ApiError::Validation(format!(
                "Notes cannot exceed {} characters",
                MAX_NOTES_LEN
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_pair_validation() {
        assert!(validate_currency_pair("USD", "AOA").is_ok());
        assert!(validate_currency_pair("USD", "USD").is_err());
        assert!(validate_currency_pair("GBP", "AOA").is_err());
        assert!(validate_currency_pair("USD", "JPY").is_err());
    }

    #[test]
    fn test_amount_range_validation() {
        assert!(validate_amount_range(100.0, 500.0).is_ok());
        assert!(validate_amount_range(100.0, 100.0).is_ok());
        assert!(validate_amount_range(500.0, 100.0).is_err());
        assert!(validate_amount_range(0.0, 100.0).is_err());
        assert!(validate_amount_range(-5.0, 100.0).is_err());
    }

    #[test]
    fn test_payment_methods_validation() {
        assert!(validate_payment_methods(&["TPA".into(), "Bank".into()]).is_ok());
        assert!(validate_payment_methods(&[]).is_err());
        assert!(validate_payment_methods(&["Bitcoin".into()]).is_err());
    }

    #[test]
    fn test_notes_length() {
        assert!(validate_notes(None).is_ok());
        assert!(validate_notes(Some("short note")).is_ok());
        assert!(validate_notes(Some(&"x".repeat(501))).is_err());
    }
}
