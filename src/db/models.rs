//! Database Models
//!
//! Entity structs backing the marketplace store. Relationships are held as
//! foreign-key ids only; traversal is an explicit lookup, never an embedded
//! object graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::services::state_machine::TransactionStatus;

/// 오퍼 방향
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferDirection {
    Buy,
    Sell,
}

/// 제안 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
}

/// 채팅 메시지 종류 (사용자 작성 / 시스템 생성)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    User,
    System,
}

/// 결제 검증 레코드 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentRecordStatus {
    /// 게이트웨이가 자동으로 검증함
    Verified,
    /// 판매자의 수동 검증 대기
    Pending,
}

/// 사용자 (신원 + 신뢰 레코드)
///
/// 불변식: `verified == id_verified && face_verified && phone_verified`
/// (검증 플래그가 바뀌는 트랜잭션 안에서 항상 재계산됨)
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    /// 세션 제공자가 발급한 외부 식별자
    #[serde(skip_serializing)]
    pub auth_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
    /// 신분증 번호 (검증 완료 시에만 존재, 사용자 간 유일)
    #[serde(skip_serializing)]
    pub document_number: Option<String>,
    pub id_verified: bool,
    pub face_verified: bool,
    pub phone_verified: bool,
    pub verified: bool,
    /// 받은 평점의 산술 평균 (소수 둘째 자리)
    pub reputation_score: f64,
    pub rating_count: i32,
    pub created_at: DateTime<Utc>,
}

/// 응답에 포함되는 공개 사용자 요약
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub reputation_score: f64,
    pub verified: bool,
}

/// 검증 플로우 상세 레코드 (사용자당 1행)
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Verification {
    pub user_id: Uuid,
    pub id_verified: bool,
    pub id_verified_at: Option<DateTime<Utc>>,
    /// OCR 추출 원본 (jsonb)
    pub extracted_data: Option<serde_json::Value>,
    pub face_verified: bool,
    pub face_verified_at: Option<DateTime<Utc>>,
    /// 생체 등록 핸들 (사용자 간 유일)
    pub face_id: Option<String>,
    pub face_data: Option<serde_json::Value>,
    pub phone_verified: bool,
    pub phone_verified_at: Option<DateTime<Utc>>,
    pub phone_number: Option<String>,
    #[serde(skip_serializing)]
    pub phone_code: Option<String>,
    #[serde(skip_serializing)]
    pub phone_code_expires_at: Option<DateTime<Utc>>,
}

/// 환전 오퍼
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Offer {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub direction: OfferDirection,
    pub source_currency: String,
    pub target_currency: String,
    pub min_amount: f64,
    pub max_amount: f64,
    /// 환율/수수료
    pub rate: f64,
    pub payment_methods: Vec<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// 오퍼 목록 조회용 (소유자 요약 조인)
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OfferListing {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub direction: OfferDirection,
    pub source_currency: String,
    pub target_currency: String,
    pub min_amount: f64,
    pub max_amount: f64,
    pub rate: f64,
    pub payment_methods: Vec<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub owner_name: Option<String>,
    pub owner_avatar: Option<String>,
    pub owner_reputation: f64,
    pub owner_verified: bool,
}

/// 오퍼에 대한 제안
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Proposal {
    pub id: Uuid,
    pub offer_id: Uuid,
    pub proposer_id: Uuid,
    pub amount: f64,
    pub payment_method: String,
    pub message: Option<String>,
    pub status: ProposalStatus,
    pub response_message: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// 제안 수락으로 생성되는 거래 (제안과 1:1)
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Transaction {
    pub id: Uuid,
    pub proposal_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub amount: f64,
    pub source_currency: String,
    pub target_currency: String,
    pub rate: f64,
    pub payment_method: String,
    pub status: TransactionStatus,
    pub proof_url: Option<String>,
    pub notes: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// 사용자가 참여자인지
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }

    /// 참여자의 상대방
    pub fn counterparty(&self, user_id: Uuid) -> Option<Uuid> {
        if self.buyer_id == user_id {
            Some(self.seller_id)
        } else if self.seller_id == user_id {
            Some(self.buyer_id)
        } else {
            None
        }
    }
}

/// 거래에 속한 채팅 메시지 (append-only)
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub attachment_url: Option<String>,
    pub kind: MessageKind,
    pub created_at: DateTime<Utc>,
}

/// 결제 증빙 제출 레코드 (append-only 이력)
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentVerification {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub proof_url: String,
    pub reference: String,
    pub payment_method: String,
    pub amount: f64,
    pub notes: Option<String>,
    pub auto_verified: bool,
    pub provider_response: Option<serde_json::Value>,
    pub verification_error: Option<String>,
    pub status: PaymentRecordStatus,
    pub created_at: DateTime<Utc>,
}

/// 완료된 거래에 대한 리뷰
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Review {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub author_id: Uuid,
    pub subject_id: Uuid,
    /// 1~5
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_transaction(buyer: Uuid, seller: Uuid) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            proposal_id: Uuid::new_v4(),
            buyer_id: buyer,
            seller_id: seller,
            amount: 500.0,
            source_currency: "USD".into(),
            target_currency: "AOA".into(),
            rate: 830.0,
            payment_method: "Bank".into(),
            status: TransactionStatus::AwaitingPayment,
            proof_url: None,
            notes: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_participant_and_counterparty() {
        let buyer = Uuid::new_v4();
        let seller = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let tx = sample_transaction(buyer, seller);

        assert!(tx.is_participant(buyer));
        assert!(tx.is_participant(seller));
        assert!(!tx.is_participant(stranger));

        assert_eq!(tx.counterparty(buyer), Some(seller));
        assert_eq!(tx.counterparty(seller), Some(buyer));
        assert_eq!(tx.counterparty(stranger), None);
    }

    #[test]
    fn test_enum_wire_format() {
        assert_eq!(
            serde_json::to_string(&OfferDirection::Sell).unwrap(),
            "\"SELL\""
        );
        assert_eq!(
            serde_json::to_string(&ProposalStatus::Pending).unwrap(),
            "\"PENDING\""
        );
        assert_eq!(
            serde_json::to_string(&MessageKind::System).unwrap(),
            "\"SYSTEM\""
        );
    }
}
