//! API Routes Module
//!
//! 모든 HTTP 엔드포인트 정의
//!
//! # Routes
//! - `/health` - 헬스 체크
//! - `/api/offers/*` - 환전 오퍼 CRUD
//! - `/api/proposals/*` - 오퍼에 대한 제안
//! - `/api/transactions/*` - 거래 상태 머신 + 결제 증빙
//! - `/api/messages` - 거래 채팅
//! - `/api/reviews/*` - 리뷰 및 평판
//! - `/api/verify/*` - 신원 검증 (문서 / 생체 / 전화)

pub mod health;
pub mod messages;
pub mod offers;
pub mod payments;
pub mod proposals;
pub mod reviews;
pub mod transactions;
pub mod verify;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::db::User;
use crate::error::ApiError;
use crate::AppState;

/// 인증된 요청의 주체
///
/// 세션 검증은 상위 게이트웨이가 수행하고, 이 서버는 게이트웨이가
/// 주입한 `x-auth-id` 헤더만 신뢰한다. 헤더가 없으면 401.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// 세션 제공자가 발급한 외부 식별자
    pub auth_id: String,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_id = parts
            .headers
            .get("x-auth-id")
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .ok_or(ApiError::Unauthenticated)?;

        Ok(AuthUser {
            auth_id: auth_id.to_string(),
        })
    }
}

/// 마켓플레이스 라우트용 사용자 조회
///
/// 검증 플로우를 거치지 않아 계정 레코드가 아직 없으면 인증 실패로
/// 처리한다 (verify 라우트는 대신 get_or_create를 쓴다).
pub(crate) async fn require_user(state: &AppState, auth: &AuthUser) -> Result<User, ApiError> {
    state
        .db
        .find_user_by_auth(&auth.auth_id)
        .await?
        .ok_or(ApiError::Unauthenticated)
}
