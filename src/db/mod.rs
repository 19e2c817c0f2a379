//! Database Module
//!
//! # Interview Q&A
//!
//! Q: 왜 PostgreSQL + SQLx인가?
//! A: 마켓플레이스 코어는 다중 엔티티 복합 연산이 전부라서
//!    ACID 트랜잭션이 필수
//!
//!    1. 제안 수락 = 제안 갱신 + 거래 생성 + 오퍼 비활성 (전부 또는 전무)
//!    2. 상태 전이 = 상태 갱신 + 시스템 메시지 (같은 단위)
//!    3. 리뷰 생성/삭제 = 리뷰 + 평판 재계산 (같은 단위)
//!    4. SQLx: async, 커넥션 풀, 마이그레이션 내장
//!
//! Q: 동시 요청 경합은 어떻게 직렬화하는가?
//! A: 복합 연산마다 하나의 트랜잭션 + 대상 행 `SELECT ... FOR UPDATE`
//!    - 전이 검증은 트랜잭션 안에서 상태를 다시 읽어 재검증 (낙관적 재확인)
//!    - 같은 거래/제안에 대한 경쟁 요청은 행 잠금에서 순서대로 처리됨
//!    - 중복 PENDING 제안은 부분 유니크 인덱스가 최후 방어선

mod models;

pub use models::*;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::ApiError;
use crate::services::reputation;
use crate::services::state_machine::{
    self, ParticipantRole, TransactionStatus, TransitionError,
};

/// 리뷰 삭제 가능 기간
const REVIEW_DELETE_WINDOW_HOURS: i64 = 24;

/// 작성 시점 기준 아직 삭제 가능한지 (정확히 24시간은 허용)
fn within_delete_window(created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - created_at <= Duration::hours(REVIEW_DELETE_WINDOW_HOURS)
}

/// 패치를 합친 오퍼 금액 범위 검증
///
/// 한쪽 경계만 온 패치도 저장된 값과 합쳐 `min <= max`를 만족해야 한다
fn patched_offer_range(
    current_min: f64,
    current_max: f64,
    patch: &OfferPatch,
) -> Result<(f64, f64), ApiError> {
    let min = patch.min_amount.unwrap_or(current_min);
    let max = patch.max_amount.unwrap_or(current_max);
    if min > max {
        return Err(ApiError::Validation(
            "Minimum amount cannot exceed maximum amount".into(),
        ));
    }
    Ok((min, max))
}

/// 데이터베이스 연결 및 쿼리 담당
pub struct Database {
    pool: PgPool,
}

// ============ Input structs ============

/// 오퍼 생성 입력 (핸들러에서 검증 완료된 상태)
#[derive(Debug)]
pub struct NewOffer {
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

/// 오퍼 부분 수정
#[derive(Debug, Default)]
pub struct OfferPatch {
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub rate: Option<f64>,
    pub payment_methods: Option<Vec<String>>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub active: Option<bool>,
}

/// 오퍼 목록 필터
#[derive(Debug, Default)]
pub struct OfferFilter {
    pub direction: Option<OfferDirection>,
    pub source_currency: Option<String>,
    pub target_currency: Option<String>,
    /// 이 금액 이상을 받아주는 오퍼 (max_amount >= value)
    pub min_amount: Option<f64>,
    /// 이 금액 이하부터 시작하는 오퍼 (min_amount <= value)
    pub max_amount: Option<f64>,
    pub location: Option<String>,
}

/// 제안 목록 범위
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalScope {
    /// 내 오퍼로 들어온 제안
    Received,
    /// 내가 보낸 제안
    Sent,
    /// 둘 다
    All,
}

/// 결제 증빙 기록 입력 (게이트웨이 호출 결과 반영 후)
#[derive(Debug)]
pub struct PaymentProofRecord {
    pub proof_url: String,
    pub reference: String,
    pub payment_method: String,
    pub amount: f64,
    pub notes: Option<String>,
    pub auto_verified: bool,
    pub provider_response: Option<serde_json::Value>,
    pub verification_error: Option<String>,
    pub record_status: PaymentRecordStatus,
    pub new_status: TransactionStatus,
    pub system_message: String,
}

impl Database {
    /// 데이터베이스 연결
    ///
    /// # Connection Pool Settings
    ///
    /// - max_connections: 10 (트래픽에 따라 조정)
    /// - min_connections: 1 (idle 시 최소 유지)
    /// - acquire_timeout: 3초 (커넥션 획득 대기)
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(3))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// 마이그레이션 실행
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ============ Users ============

    /// 세션 제공자 식별자로 사용자 조회
    pub async fn find_user_by_auth(&self, auth_id: &str) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE auth_id = $1")
            .bind(auth_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// 첫 접근 시 최소 레코드 자동 생성 (검증 플로우 진입점)
    pub async fn get_or_create_user(&self, auth_id: &str) -> Result<User, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (auth_id)
            VALUES ($1)
            ON CONFLICT (auth_id) DO UPDATE SET auth_id = EXCLUDED.auth_id
            RETURNING *
            "#,
        )
        .bind(auth_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn find_user(&self, id: Uuid) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    // ============ Offers ============

    /// 오퍼 생성 (활성 오퍼 쿼터 검사 포함)
    ///
    /// 쿼터는 소유자 행을 잠근 뒤 트랜잭션 안에서 세어 동시 생성 경쟁을
    /// 직렬화한다 - 쿼터는 생성 시에만 검사하고 수정 시에는 하지 않는다.
    pub async fn create_offer(&self, owner_id: Uuid, offer: NewOffer) -> Result<Offer, ApiError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(owner_id)
            .fetch_one(&mut *tx)
            .await?;

        let (active_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM offers WHERE owner_id = $1 AND active = TRUE",
        )
        .bind(owner_id)
        .fetch_one(&mut *tx)
        .await?;

        if active_count >= crate::types::MAX_ACTIVE_OFFERS {
            return Err(ApiError::Conflict(format!(
                "Active offer limit of {} reached",
                crate::types::MAX_ACTIVE_OFFERS
            )));
        }

        let created = sqlx::query_as::<_, Offer>(
            r#"
            INSERT INTO offers (
                owner_id, direction, source_currency, target_currency,
                min_amount, max_amount, rate, payment_methods, location, notes, active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, TRUE)
            RETURNING *
            "#,
        )
        .bind(owner_id)
        .bind(offer.direction)
        .bind(&offer.source_currency)
        .bind(&offer.target_currency)
        .bind(offer.min_amount)
        .bind(offer.max_amount)
        .bind(offer.rate)
        .bind(&offer.payment_methods)
        .bind(&offer.location)
        .bind(&offer.notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(created)
    }

    fn push_offer_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &OfferFilter) {
        qb.push(" WHERE o.active = TRUE");
        if let Some(direction) = filter.direction {
            qb.push(" AND o.direction = ").push_bind(direction);
        }
        if let Some(currency) = &filter.source_currency {
            qb.push(" AND o.source_currency = ").push_bind(currency.clone());
        }
        if let Some(currency) = &filter.target_currency {
            qb.push(" AND o.target_currency = ").push_bind(currency.clone());
        }
        if let Some(amount) = filter.min_amount {
            qb.push(" AND o.max_amount >= ").push_bind(amount);
        }
        if let Some(amount) = filter.max_amount {
            qb.push(" AND o.min_amount <= ").push_bind(amount);
        }
        if let Some(location) = &filter.location {
            qb.push(" AND o.location ILIKE ")
                .push_bind(format!("%{}%", location));
        }
    }

    /// 활성 오퍼 목록 (필터 + 페이지네이션)
    ///
    /// 최신순, 동일 시각이면 소유자 평판 내림차순
    pub async fn list_offers(
        &self,
        filter: &OfferFilter,
        limit: u32,
        offset: i64,
    ) -> Result<(Vec<OfferListing>, i64), ApiError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            r#"
            SELECT o.*,
                   u.name AS owner_name,
                   u.avatar AS owner_avatar,
                   u.reputation_score AS owner_reputation,
                   u.verified AS owner_verified
            FROM offers o
            JOIN users u ON u.id = o.owner_id
            "#,
        );
        Self::push_offer_filters(&mut qb, filter);
        qb.push(" ORDER BY o.created_at DESC, u.reputation_score DESC");
        qb.push(" LIMIT ").push_bind(limit as i64);
        qb.push(" OFFSET ").push_bind(offset);

        let offers = qb
            .build_query_as::<OfferListing>()
            .fetch_all(&self.pool)
            .await?;

        let mut count_qb = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM offers o JOIN users u ON u.id = o.owner_id",
        );
        Self::push_offer_filters(&mut count_qb, filter);
        let (total,): (i64,) = count_qb.build_query_as().fetch_one(&self.pool).await?;

        Ok((offers, total))
    }

    /// 활성 오퍼 조회 (제안 대상)
    pub async fn find_active_offer(&self, id: Uuid) -> Result<Option<Offer>, ApiError> {
        let offer =
            sqlx::query_as::<_, Offer>("SELECT * FROM offers WHERE id = $1 AND active = TRUE")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(offer)
    }

    /// 오퍼 부분 수정 (소유자만, 없거나 남의 것이면 None)
    ///
    /// 한쪽 경계만 담긴 패치가 저장된 반대쪽 경계를 넘을 수 있으므로,
    /// 행을 잠그고 패치를 합친 범위를 쓰기 전에 검증한다
    pub async fn update_offer(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: OfferPatch,
    ) -> Result<Option<Offer>, ApiError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Offer>(
            "SELECT * FROM offers WHERE id = $1 AND owner_id = $2 FOR UPDATE",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(current) = current else {
            return Ok(None);
        };

        patched_offer_range(current.min_amount, current.max_amount, &patch)?;

        let updated = sqlx::query_as::<_, Offer>(
            r#"
            UPDATE offers SET
                min_amount = COALESCE($3, min_amount),
                max_amount = COALESCE($4, max_amount),
                rate = COALESCE($5, rate),
                payment_methods = COALESCE($6, payment_methods),
                location = COALESCE($7, location),
                notes = COALESCE($8, notes),
                active = COALESCE($9, active)
            WHERE id = $1 AND owner_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(patch.min_amount)
        .bind(patch.max_amount)
        .bind(patch.rate)
        .bind(patch.payment_methods)
        .bind(patch.location)
        .bind(patch.notes)
        .bind(patch.active)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(updated))
    }

    // ============ Proposals ============

    /// 같은 (오퍼, 제안자)에 PENDING 제안이 이미 있는지
    pub async fn pending_proposal_exists(
        &self,
        offer_id: Uuid,
        proposer_id: Uuid,
    ) -> Result<bool, ApiError> {
        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM proposals
            WHERE offer_id = $1 AND proposer_id = $2 AND status = 'PENDING'
            "#,
        )
        .bind(offer_id)
        .bind(proposer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// 제안 생성
    ///
    /// 부분 유니크 인덱스가 중복 PENDING 경쟁을 막는다  - 
    /// 유니크 위반은 Conflict로 변환
    pub async fn insert_proposal(
        &self,
        proposer_id: Uuid,
        offer_id: Uuid,
        amount: f64,
        payment_method: &str,
        message: Option<String>,
    ) -> Result<Proposal, ApiError> {
        let result = sqlx::query_as::<_, Proposal>(
            r#"
            INSERT INTO proposals (offer_id, proposer_id, amount, payment_method, message, status)
            VALUES ($1, $2, $3, $4, $5, 'PENDING')
            RETURNING *
            "#,
        )
        .bind(offer_id)
        .bind(proposer_id)
        .bind(amount)
        .bind(payment_method)
        .bind(message)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(proposal) => Ok(proposal),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                ApiError::Conflict("You already have a pending proposal for this offer".into()),
            ),
            Err(err) => Err(err.into()),
        }
    }

    /// 사용자 관련 제안 목록
    pub async fn list_proposals(
        &self,
        user_id: Uuid,
        scope: ProposalScope,
        offer_id: Option<Uuid>,
        status: Option<ProposalStatus>,
        limit: u32,
        offset: i64,
    ) -> Result<(Vec<Proposal>, i64), ApiError> {
        let push_filters = |qb: &mut QueryBuilder<'_, Postgres>| {
            match scope {
                ProposalScope::Received => {
                    qb.push(" WHERE o.owner_id = ").push_bind(user_id);
                }
                ProposalScope::Sent => {
                    qb.push(" WHERE p.proposer_id = ").push_bind(user_id);
                }
                ProposalScope::All => {
                    qb.push(" WHERE (p.proposer_id = ")
                        .push_bind(user_id)
                        .push(" OR o.owner_id = ")
                        .push_bind(user_id)
                        .push(")");
                }
            }
            if let Some(offer_id) = offer_id {
                qb.push(" AND p.offer_id = ").push_bind(offer_id);
            }
            if let Some(status) = status {
                qb.push(" AND p.status = ").push_bind(status);
            }
        };

        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT p.* FROM proposals p JOIN offers o ON o.id = p.offer_id",
        );
        push_filters(&mut qb);
        qb.push(" ORDER BY p.created_at DESC");
        qb.push(" LIMIT ").push_bind(limit as i64);
        qb.push(" OFFSET ").push_bind(offset);
        let proposals = qb
            .build_query_as::<Proposal>()
            .fetch_all(&self.pool)
            .await?;

        let mut count_qb = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM proposals p JOIN offers o ON o.id = p.offer_id",
        );
        push_filters(&mut count_qb);
        let (total,): (i64,) = count_qb.build_query_as().fetch_one(&self.pool).await?;

        Ok((proposals, total))
    }

    /// 제안에 응답 (오퍼 소유자만, PENDING 상태만)
    ///
    /// 수락이면 한 트랜잭션 안에서:
    /// (a) 제안 상태/응답 필드 갱신
    /// (b) 거래 1건 생성 (역할은 오퍼 방향에서 유도)
    /// (c) 부모 오퍼 비활성화
    pub async fn respond_to_proposal(
        &self,
        owner_id: Uuid,
        proposal_id: Uuid,
        decision: ProposalStatus,
        response_message: Option<String>,
    ) -> Result<(Proposal, Option<Transaction>), ApiError> {
        debug_assert!(decision != ProposalStatus::Pending);

        let mut tx = self.pool.begin().await?;

        // 제안 행 잠금 + 소유권/상태 재검증 (존재/권한/상태는 묶어서 NotFound)
        let proposal = sqlx::query_as::<_, Proposal>(
            r#"
            SELECT p.* FROM proposals p
            JOIN offers o ON o.id = p.offer_id
            WHERE p.id = $1 AND o.owner_id = $2 AND p.status = 'PENDING'
            FOR UPDATE OF p
            "#,
        )
        .bind(proposal_id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound("Proposal".into()))?;

        let offer = sqlx::query_as::<_, Offer>("SELECT * FROM offers WHERE id = $1 FOR UPDATE")
            .bind(proposal.offer_id)
            .fetch_one(&mut *tx)
            .await?;

        let updated = sqlx::query_as::<_, Proposal>(
            r#"
            UPDATE proposals
            SET status = $2, response_message = $3, responded_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(proposal_id)
        .bind(decision)
        .bind(response_message)
        .fetch_one(&mut *tx)
        .await?;

        let transaction = if decision == ProposalStatus::Accepted {
            // SELL 오퍼면 제안자가 사고, BUY 오퍼면 제안자가 판다
            let (buyer_id, seller_id) = match offer.direction {
                OfferDirection::Sell => (proposal.proposer_id, offer.owner_id),
                OfferDirection::Buy => (offer.owner_id, proposal.proposer_id),
            };

            let created = sqlx::query_as::<_, Transaction>(
                r#"
                INSERT INTO transactions (
                    proposal_id, buyer_id, seller_id, amount,
                    source_currency, target_currency, rate, payment_method, status
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'AWAITING_PAYMENT')
                RETURNING *
                "#,
            )
            .bind(proposal.id)
            .bind(buyer_id)
            .bind(seller_id)
            .bind(proposal.amount)
            .bind(&offer.source_currency)
            .bind(&offer.target_currency)
            .bind(offer.rate)
            .bind(&proposal.payment_method)
            .fetch_one(&mut *tx)
            .await?;

            // 오퍼당 살아있는 거래는 최대 하나
            sqlx::query("UPDATE offers SET active = FALSE WHERE id = $1")
                .bind(offer.id)
                .execute(&mut *tx)
                .await?;

            Some(created)
        } else {
            None
        };

        tx.commit().await?;
        Ok((updated, transaction))
    }

    // ============ Transactions ============

    pub async fn find_transaction_for_participant(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Transaction>, ApiError> {
        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE id = $1 AND (buyer_id = $2 OR seller_id = $2)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(transaction)
    }

    /// 참여 거래 목록
    pub async fn list_transactions(
        &self,
        user_id: Uuid,
        status: Option<TransactionStatus>,
        role: Option<ParticipantRole>,
        limit: u32,
        offset: i64,
    ) -> Result<(Vec<Transaction>, i64), ApiError> {
        let push_filters = |qb: &mut QueryBuilder<'_, Postgres>| {
            match role {
                Some(ParticipantRole::Buyer) => {
                    qb.push(" WHERE buyer_id = ").push_bind(user_id);
                }
                Some(ParticipantRole::Seller) => {
                    qb.push(" WHERE seller_id = ").push_bind(user_id);
                }
                None => {
                    qb.push(" WHERE (buyer_id = ")
                        .push_bind(user_id)
                        .push(" OR seller_id = ")
                        .push_bind(user_id)
                        .push(")");
                }
            }
            if let Some(status) = status {
                qb.push(" AND status = ").push_bind(status);
            }
        };

        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM transactions");
        push_filters(&mut qb);
        qb.push(" ORDER BY created_at DESC");
        qb.push(" LIMIT ").push_bind(limit as i64);
        qb.push(" OFFSET ").push_bind(offset);
        let transactions = qb
            .build_query_as::<Transaction>()
            .fetch_all(&self.pool)
            .await?;

        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM transactions");
        push_filters(&mut count_qb);
        let (total,): (i64,) = count_qb.build_query_as().fetch_one(&self.pool).await?;

        Ok((transactions, total))
    }

    /// 거래 상태 전이
    ///
    /// 전이 테이블 검증은 행을 잠근 뒤 트랜잭션 안에서 수행한다  - 
    /// 같은 거래에 대한 경쟁 전이 요청은 여기서 직렬화되고, 늦게 온
    /// 쪽은 갱신된 상태 기준으로 재검증된다. 성공 시 상태 변경과
    /// 시스템 메시지 추가는 같은 원자 단위로 커밋된다.
    pub async fn transition_transaction(
        &self,
        actor_id: Uuid,
        transaction_id: Uuid,
        target: TransactionStatus,
        proof_url: Option<String>,
        notes: Option<String>,
    ) -> Result<Transaction, ApiError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE id = $1 AND (buyer_id = $2 OR seller_id = $2)
            FOR UPDATE
            "#,
        )
        .bind(transaction_id)
        .bind(actor_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound("Transaction".into()))?;

        let role = if current.buyer_id == actor_id {
            ParticipantRole::Buyer
        } else {
            ParticipantRole::Seller
        };

        state_machine::authorize_transition(current.status, target, role).map_err(|err| {
            match err {
                TransitionError::Illegal { allowed } => ApiError::IllegalTransition {
                    from: current.status.as_str(),
                    to: target.as_str(),
                    allowed,
                },
                TransitionError::WrongRole { rule } => {
                    let who = match rule {
                        state_machine::RoleRule::BuyerOnly => "the buyer",
                        state_machine::RoleRule::SellerOnly => "the seller",
                        state_machine::RoleRule::Either => "a participant",
                    };
                    ApiError::Forbidden(format!(
                        "Only {} can move the transaction to {}",
                        who,
                        target.as_str()
                    ))
                }
            }
        })?;

        let updated = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET status = $2,
                proof_url = COALESCE($3, proof_url),
                notes = COALESCE($4, notes),
                completed_at = CASE WHEN $2 = 'COMPLETED' THEN NOW() ELSE completed_at END
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(transaction_id)
        .bind(target)
        .bind(proof_url)
        .bind(notes)
        .fetch_one(&mut *tx)
        .await?;

        // 상태 변경 시스템 메시지는 같은 원자 단위
        sqlx::query(
            r#"
            INSERT INTO messages (transaction_id, sender_id, body, kind)
            VALUES ($1, $2, $3, 'SYSTEM')
            "#,
        )
        .bind(transaction_id)
        .bind(actor_id)
        .bind(format!(
            "Transaction status changed to: {}",
            target.as_str()
        ))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    // ============ Messages ============

    pub async fn insert_message(
        &self,
        transaction_id: Uuid,
        sender_id: Uuid,
        body: &str,
        attachment_url: Option<String>,
    ) -> Result<Message, ApiError> {
        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (transaction_id, sender_id, body, attachment_url, kind)
            VALUES ($1, $2, $3, $4, 'USER')
            RETURNING *
            "#,
        )
        .bind(transaction_id)
        .bind(sender_id)
        .bind(body)
        .bind(attachment_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(message)
    }

    /// 거래 채팅 (오래된 순)
    pub async fn list_messages(&self, transaction_id: Uuid) -> Result<Vec<Message>, ApiError> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE transaction_id = $1 ORDER BY created_at ASC",
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    // ============ Payment Verification ============

    /// 결제 증빙 기록 + 상태 반영
    ///
    /// 레코드 생성, 거래 상태 갱신, 시스템 메시지가 한 트랜잭션.
    /// 거래 상태는 잠금 후 재검증 - 제출 경쟁이나 그 사이의 취소를
    /// 걸러낸다. 레코드는 삭제되지 않고 이후 제출로만 대체된다.
    pub async fn record_payment_proof(
        &self,
        buyer_id: Uuid,
        transaction_id: Uuid,
        record: PaymentProofRecord,
    ) -> Result<(Transaction, PaymentVerification), ApiError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE id = $1 AND buyer_id = $2
              AND status IN ('AWAITING_PAYMENT', 'PAYMENT_SENT')
            FOR UPDATE
            "#,
        )
        .bind(transaction_id)
        .bind(buyer_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound("Transaction".into()))?;

        let verification = sqlx::query_as::<_, PaymentVerification>(
            r#"
            INSERT INTO payment_verifications (
                transaction_id, proof_url, reference, payment_method, amount,
                notes, auto_verified, provider_response, verification_error, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(transaction_id)
        .bind(&record.proof_url)
        .bind(&record.reference)
        .bind(&record.payment_method)
        .bind(record.amount)
        .bind(&record.notes)
        .bind(record.auto_verified)
        .bind(&record.provider_response)
        .bind(&record.verification_error)
        .bind(record.record_status)
        .fetch_one(&mut *tx)
        .await?;

        let updated = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET status = $2,
                proof_url = $3,
                notes = COALESCE($4, notes)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(transaction_id)
        .bind(record.new_status)
        .bind(&record.proof_url)
        .bind(&record.notes)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO messages (transaction_id, sender_id, body, attachment_url, kind)
            VALUES ($1, $2, $3, $4, 'SYSTEM')
            "#,
        )
        .bind(transaction_id)
        .bind(buyer_id)
        .bind(&record.system_message)
        .bind(&record.proof_url)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((updated, verification))
    }

    /// 거래의 증빙 제출 이력 (최신순)
    pub async fn list_payment_verifications(
        &self,
        transaction_id: Uuid,
    ) -> Result<Vec<PaymentVerification>, ApiError> {
        let records = sqlx::query_as::<_, PaymentVerification>(
            "SELECT * FROM payment_verifications WHERE transaction_id = $1 ORDER BY created_at DESC",
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    // ============ Reviews / Reputation ============

    /// 리뷰 생성 + 대상 평판 재계산 (한 트랜잭션)
    pub async fn create_review(
        &self,
        author_id: Uuid,
        transaction_id: Uuid,
        subject_id: Uuid,
        rating: i32,
        comment: &str,
    ) -> Result<Review, ApiError> {
        let mut tx = self.pool.begin().await?;

        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE id = $1 AND status = 'COMPLETED'
              AND (buyer_id = $2 OR seller_id = $2)
            "#,
        )
        .bind(transaction_id)
        .bind(author_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound("Transaction".into()))?;

        // 상대방만 평가 가능
        if transaction.counterparty(author_id) != Some(subject_id) {
            return Err(ApiError::Validation(
                "You can only review the other participant of the transaction".into(),
            ));
        }

        let result = sqlx::query_as::<_, Review>(
            r#"
            INSERT INTO reviews (transaction_id, author_id, subject_id, rating, comment)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(transaction_id)
        .bind(author_id)
        .bind(subject_id)
        .bind(rating)
        .bind(comment)
        .fetch_one(&mut *tx)
        .await;

        let review = match result {
            Ok(review) => review,
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(ApiError::Conflict(
                    "You already reviewed this transaction".into(),
                ));
            }
            Err(err) => return Err(err.into()),
        };

        Self::recompute_reputation(&mut tx, subject_id).await?;

        tx.commit().await?;
        Ok(review)
    }

    /// 리뷰 삭제 (작성자 본인, 24시간 이내) + 평판 재계산
    pub async fn delete_review(&self, author_id: Uuid, review_id: Uuid) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await?;

        let review = sqlx::query_as::<_, Review>(
            "SELECT * FROM reviews WHERE id = $1 AND author_id = $2 FOR UPDATE",
        )
        .bind(review_id)
        .bind(author_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound("Review".into()))?;

        if !within_delete_window(review.created_at, Utc::now()) {
            return Err(ApiError::Conflict(format!(
                "Reviews can only be removed within {} hours of creation",
                REVIEW_DELETE_WINDOW_HOURS
            )));
        }

        sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(review_id)
            .execute(&mut *tx)
            .await?;

        Self::recompute_reputation(&mut tx, review.subject_id).await?;

        tx.commit().await?;
        Ok(())
    }

    /// 현재 트랜잭션 안에서 대상 사용자의 평판 집계를 다시 계산
    async fn recompute_reputation(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        subject_id: Uuid,
    ) -> Result<(), ApiError> {
        let ratings: Vec<(i32,)> =
            sqlx::query_as("SELECT rating FROM reviews WHERE subject_id = $1")
                .bind(subject_id)
                .fetch_all(&mut **tx)
                .await?;
        let ratings: Vec<i32> = ratings.into_iter().map(|(r,)| r).collect();

        let agg = reputation::aggregate(&ratings);

        sqlx::query("UPDATE users SET reputation_score = $2, rating_count = $3 WHERE id = $1")
            .bind(subject_id)
            .bind(agg.score)
            .bind(agg.count)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// 리뷰 목록 (대상 사용자 / 거래 필터)
    pub async fn list_reviews(
        &self,
        subject_id: Option<Uuid>,
        transaction_id: Option<Uuid>,
        limit: u32,
        offset: i64,
    ) -> Result<(Vec<Review>, i64), ApiError> {
        let push_filters = |qb: &mut QueryBuilder<'_, Postgres>| {
            qb.push(" WHERE TRUE");
            if let Some(subject_id) = subject_id {
                qb.push(" AND subject_id = ").push_bind(subject_id);
            }
            if let Some(transaction_id) = transaction_id {
                qb.push(" AND transaction_id = ").push_bind(transaction_id);
            }
        };

        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM reviews");
        push_filters(&mut qb);
        qb.push(" ORDER BY created_at DESC");
        qb.push(" LIMIT ").push_bind(limit as i64);
        qb.push(" OFFSET ").push_bind(offset);
        let reviews = qb.build_query_as::<Review>().fetch_all(&self.pool).await?;

        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM reviews");
        push_filters(&mut count_qb);
        let (total,): (i64,) = count_qb.build_query_as().fetch_one(&self.pool).await?;

        Ok((reviews, total))
    }

    /// 대상 사용자의 평점 분포 (rating, count)
    pub async fn review_distribution(
        &self,
        subject_id: Uuid,
    ) -> Result<Vec<(i32, i64)>, ApiError> {
        let rows: Vec<(i32, i64)> = sqlx::query_as(
            "SELECT rating, COUNT(*) FROM reviews WHERE subject_id = $1 GROUP BY rating",
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ============ Identity Verification ============

    pub async fn get_verification(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Verification>, ApiError> {
        let verification =
            sqlx::query_as::<_, Verification>("SELECT * FROM verifications WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(verification)
    }

    /// 문서 검증 적용: 번호 유일성 확인 + 플래그/추출 데이터 기록
    pub async fn apply_document_verification(
        &self,
        user_id: Uuid,
        document_number: &str,
        extracted_data: serde_json::Value,
    ) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await?;

        // 같은 번호가 다른 사용자에게 등록되어 있으면 거부
        let taken: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE document_number = $1 AND id <> $2")
                .bind(document_number)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        if taken.is_some() {
            return Err(ApiError::Conflict(
                "This document number is already registered to another user".into(),
            ));
        }

        sqlx::query("UPDATE users SET document_number = $2 WHERE id = $1")
            .bind(user_id)
            .bind(document_number)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO verifications (user_id, id_verified, id_verified_at, extracted_data)
            VALUES ($1, TRUE, NOW(), $2)
            ON CONFLICT (user_id) DO UPDATE
            SET id_verified = TRUE, id_verified_at = NOW(), extracted_data = EXCLUDED.extracted_data
            "#,
        )
        .bind(user_id)
        .bind(&extracted_data)
        .execute(&mut *tx)
        .await?;

        Self::sync_verified_flags(&mut tx, user_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// 생체 등록 적용: 문서 검증 선행 + 핸들 유일성 확인 + 플래그 기록
    pub async fn apply_face_verification(
        &self,
        user_id: Uuid,
        face_id: &str,
        face_data: serde_json::Value,
    ) -> Result<bool, ApiError> {
        let mut tx = self.pool.begin().await?;

        // 단계 순서 강제: 문서 검증이 먼저
        let (id_verified,): (bool,) =
            sqlx::query_as("SELECT id_verified FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?;
        if !id_verified {
            return Err(ApiError::Conflict(
                "Document verification must be completed before facial enrollment".into(),
            ));
        }

        // 재등록은 DELETE로 해제한 뒤에만 가능
        let existing: Option<(bool,)> =
            sqlx::query_as("SELECT face_verified FROM verifications WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        if matches!(existing, Some((true,))) {
            return Err(ApiError::Conflict(
                "Facial verification is already registered".into(),
            ));
        }

        let taken: Option<(Uuid,)> = sqlx::query_as(
            "SELECT user_id FROM verifications WHERE face_id = $1 AND user_id <> $2",
        )
        .bind(face_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        if taken.is_some() {
            return Err(ApiError::Conflict(
                "This facial identity is already registered to another user".into(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO verifications (user_id, face_verified, face_verified_at, face_id, face_data)
            VALUES ($1, TRUE, NOW(), $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET face_verified = TRUE, face_verified_at = NOW(),
                face_id = EXCLUDED.face_id, face_data = EXCLUDED.face_data
            "#,
        )
        .bind(user_id)
        .bind(face_id)
        .bind(&face_data)
        .execute(&mut *tx)
        .await?;

        Self::sync_verified_flags(&mut tx, user_id).await?;

        let (all_verified,): (bool,) =
            sqlx::query_as("SELECT verified FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;
        Ok(all_verified)
    }

    /// 생체 등록 해제 (재시도 허용)
    pub async fn clear_face_verification(&self, user_id: Uuid) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE verifications
            SET face_verified = FALSE, face_verified_at = NULL, face_id = NULL, face_data = NULL
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("Verification".into()));
        }

        Self::sync_verified_flags(&mut tx, user_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// 전화번호 확인 코드 발급
    pub async fn issue_phone_code(
        &self,
        user_id: Uuid,
        phone_number: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO verifications (user_id, phone_number, phone_code, phone_code_expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET phone_number = EXCLUDED.phone_number,
                phone_code = EXCLUDED.phone_code,
                phone_code_expires_at = EXCLUDED.phone_code_expires_at
            "#,
        )
        .bind(user_id)
        .bind(phone_number)
        .bind(code)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 전화번호 확인 코드 검증 → phone_verified
    pub async fn confirm_phone(&self, user_id: Uuid, code: &str) -> Result<bool, ApiError> {
        let mut tx = self.pool.begin().await?;

        let verification = sqlx::query_as::<_, Verification>(
            "SELECT * FROM verifications WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound("Verification".into()))?;

        match (&verification.phone_code, verification.phone_code_expires_at) {
            (Some(stored), Some(expires_at)) if stored == code => {
                if expires_at < Utc::now() {
                    return Err(ApiError::BadRequest("Confirmation code expired".into()));
                }
            }
            _ => return Err(ApiError::BadRequest("Invalid confirmation code".into())),
        }

        sqlx::query(
            r#"
            UPDATE verifications
            SET phone_verified = TRUE, phone_verified_at = NOW(),
                phone_code = NULL, phone_code_expires_at = NULL
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        Self::sync_verified_flags(&mut tx, user_id).await?;

        let (all_verified,): (bool,) =
            sqlx::query_as("SELECT verified FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;
        Ok(all_verified)
    }

    /// users의 검증 플래그를 verifications 기준으로 재유도
    ///
    /// 불변식 `verified == id && face && phone`은 항상 이 한 문장으로
    /// 유지된다 - 플래그를 개별적으로 고치는 코드 경로는 없음
    async fn sync_verified_flags(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        user_id: Uuid,
    ) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE users u
            SET id_verified = v.id_verified,
                face_verified = v.face_verified,
                phone_verified = v.phone_verified,
                verified = v.id_verified AND v.face_verified AND v.phone_verified
            FROM verifications v
            WHERE v.user_id = u.id AND u.id = $1
            "#,
        )
        .bind(user_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_window_boundaries() {
        let created = Utc::now();

        // 23시간 59분: 아직 삭제 가능
        assert!(within_delete_window(
            created,
            created + Duration::hours(23) + Duration::minutes(59)
        ));
        // 정확히 24시간: 허용
        assert!(within_delete_window(created, created + Duration::hours(24)));
        // 24시간 + 1초: 거부
        assert!(!within_delete_window(
            created,
            created + Duration::hours(24) + Duration::seconds(1)
        ));
        // 25시간: 거부
        assert!(!within_delete_window(created, created + Duration::hours(25)));
    }

    #[test]
    fn test_patch_crossing_stored_bound_is_rejected() {
        // min만 올려 저장된 max를 넘는 패치
        let patch = OfferPatch {
            min_amount: Some(600.0),
            ..Default::default()
        };
        assert!(patched_offer_range(100.0, 500.0, &patch).is_err());

        // max만 내려 저장된 min 아래로 가는 패치
        let patch = OfferPatch {
            max_amount: Some(50.0),
            ..Default::default()
        };
        assert!(patched_offer_range(100.0, 500.0, &patch).is_err());
    }

    #[test]
    fn test_patch_merged_range_accepted() {
        // 한쪽 경계만 움직여도 합친 범위가 유효하면 통과
        let patch = OfferPatch {
            min_amount: Some(200.0),
            ..Default::default()
        };
        assert_eq!(patched_offer_range(100.0, 500.0, &patch).unwrap(), (200.0, 500.0));

        // 양쪽 모두 교체
        let patch = OfferPatch {
            min_amount: Some(600.0),
            max_amount: Some(900.0),
            ..Default::default()
        };
        assert_eq!(patched_offer_range(100.0, 500.0, &patch).unwrap(), (600.0, 900.0));

        // 빈 패치는 저장된 범위 그대로
        let patch = OfferPatch::default();
        assert_eq!(patched_offer_range(100.0, 500.0, &patch).unwrap(), (100.0, 500.0));
    }
}
