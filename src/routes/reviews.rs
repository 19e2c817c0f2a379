//! Review Endpoints
//!
//! 완료된 거래에 대한 리뷰와 평판 집계.
//! 리뷰 생성/삭제는 대상 사용자의 평판 재계산과 한 트랜잭션으로 묶인다.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Review;
use crate::error::ApiError;
use crate::routes::{require_user, AuthUser};
use crate::services::reputation;
use crate::types::{ApiResponse, PageQuery, Pagination};
use crate::AppState;

/// 리뷰 코멘트 길이 범위
const MIN_COMMENT_LEN: usize = 10;
const MAX_COMMENT_LEN: usize = 500;

// ============ Request/Response Types ============

/// 리뷰 작성 요청
///
/// subject_id를 생략하면 거래 상대방으로 유도한다.
/// 명시된 경우 상대방과 다르면 거부
#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub transaction_id: Uuid,
    pub subject_id: Option<Uuid>,
    /// 1~5
    pub rating: i32,
    pub comment: String,
}

/// 리뷰 목록 쿼리
#[derive(Debug, Deserialize)]
pub struct ReviewListQuery {
    pub subject_id: Option<Uuid>,
    pub transaction_id: Option<Uuid>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ReviewListResponse {
    pub reviews: Vec<Review>,
    pub pagination: Pagination,
    /// subject_id로 조회한 경우에만 포함
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ReviewStats>,
}

/// 대상 사용자의 평점 요약
#[derive(Debug, Serialize)]
pub struct ReviewStats {
    pub average: f64,
    pub count: i32,
    /// 평점(1~5)별 개수
    pub distribution: [i64; 5],
}

// ============ Handlers ============

/// POST /api/reviews
///
/// 완료된 거래의 상대방 평가 (거래당 참여자별 1회)
pub async fn create_review(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateReviewRequest>,
) -> Result<Json<ApiResponse<Review>>, ApiError> {
    let user = require_user(&state, &auth).await?;

    if !(1..=5).contains(&req.rating) {
        return Err(ApiError::Validation(
            "Rating must be between 1 and 5".to_string(),
        ));
    }
    let comment = req.comment.trim();
    if comment.len() < MIN_COMMENT_LEN || comment.len() > MAX_COMMENT_LEN {
        return Err(ApiError::Validation(format!(
            "Comment must be between {} and {} characters",
            MIN_COMMENT_LEN, MAX_COMMENT_LEN
        )));
    }

    let transaction = state
        .db
        .find_transaction_for_participant(req.transaction_id, user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Transaction".to_string()))?;

    // counterparty는 참여자 확인을 통과했으므로 항상 존재
    let counterparty = transaction
        .counterparty(user.id)
        .ok_or(ApiError::Internal)?;
    // 명시된 대상이 상대방이 아니면 거부 (db 레이어가 최종 검증)
    let subject_id = req.subject_id.unwrap_or(counterparty);

    let review = state
        .db
        .create_review(user.id, req.transaction_id, subject_id, req.rating, comment)
        .await?;

    tracing::info!(review_id = %review.id, subject_id = %subject_id, "review created");

    Ok(Json(ApiResponse::success_with_message(
        "Review submitted",
        review,
    )))
}

/// GET /api/reviews
///
/// 리뷰 목록 (대상 사용자 또는 거래로 필터).
/// subject_id 조회 시 평점 분포 요약 포함. 공개 엔드포인트.
pub async fn list_reviews(
    State(state): State<AppState>,
    Query(query): Query<ReviewListQuery>,
) -> Result<Json<ReviewListResponse>, ApiError> {
    let paging = PageQuery {
        page: query.page,
        limit: query.limit,
    };

    let (reviews, total) = state
        .db
        .list_reviews(
            query.subject_id,
            query.transaction_id,
            paging.limit(),
            paging.offset(),
        )
        .await?;

    let stats = match query.subject_id {
        Some(subject_id) => Some(build_stats(
            &state.db.review_distribution(subject_id).await?,
        )),
        None => None,
    };

    Ok(Json(ReviewListResponse {
        reviews,
        pagination: Pagination::build(paging.page(), paging.limit(), total),
        stats,
    }))
}

/// DELETE /api/reviews/:id
///
/// 리뷰 삭제 (작성자 본인, 작성 후 24시간 이내)
pub async fn delete_review(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(review_id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let user = require_user(&state, &auth).await?;

    state.db.delete_review(user.id, review_id).await?;

    Ok(Json(ApiResponse::success_with_message("Review removed", ())))
}

// ============ Helpers ============

/// (rating, count) 행에서 요약 블록 구성
fn build_stats(rows: &[(i32, i64)]) -> ReviewStats {
    let mut distribution = [0i64; 5];
    let mut ratings = Vec::new();
    for &(rating, count) in rows {
        if (1..=5).contains(&rating) {
            distribution[(rating - 1) as usize] = count;
            for _ in 0..count {
                ratings.push(rating);
            }
        }
    }

    let agg = reputation::aggregate(&ratings);
    ReviewStats {
        average: agg.score,
        count: agg.count,
        distribution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_from_distribution_rows() {
        let stats = build_stats(&[(5, 2), (4, 1), (3, 1)]);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.average, 4.25);
        assert_eq!(stats.distribution, [0, 0, 1, 1, 2]);
    }

    #[test]
    fn test_stats_empty() {
        let stats = build_stats(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.average, 0.0);
        assert_eq!(stats.distribution, [0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_stats_ignores_out_of_range_rows() {
        let stats = build_stats(&[(0, 3), (6, 2), (5, 1)]);
        assert_eq!(stats.count, 1);
        assert_eq!(stats.average, 5.0);
    }
}
