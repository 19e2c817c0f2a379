//! Transaction State Machine
//!
//! 거래 수명주기를 명시적 전이 테이블로 구현.
//! 테이블은 상태 → (목표 상태, 허용 역할) 집합이며, 저장 레이어와
//! 무관하게 단독으로 검증/테스트 가능하다.
//!
//! ```text
//! AWAITING_PAYMENT ──buyer──▶ PAYMENT_SENT ──seller──▶ PAYMENT_CONFIRMED ──seller──▶ COMPLETED
//!        │                        │
//!        └────either──▶ CANCELLED ◀──either────┘
//! ```
//!
//! COMPLETED / CANCELLED는 최종 상태 - 어떤 전이도 정의되지 않음.

use serde::{Deserialize, Serialize};

/// 거래 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    AwaitingPayment,
    PaymentSent,
    PaymentConfirmed,
    Completed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingPayment => "AWAITING_PAYMENT",
            Self::PaymentSent => "PAYMENT_SENT",
            Self::PaymentConfirmed => "PAYMENT_CONFIRMED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// 최종 상태 여부
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// 거래 참여자의 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantRole {
    Buyer,
    Seller,
}

/// 전이를 실행할 수 있는 역할 규칙
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleRule {
    BuyerOnly,
    SellerOnly,
    Either,
}

impl RoleRule {
    fn permits(&self, role: ParticipantRole) -> bool {
        match self {
            Self::BuyerOnly => role == ParticipantRole::Buyer,
            Self::SellerOnly => role == ParticipantRole::Seller,
            Self::Either => true,
        }
    }
}

/// 전이 거부 사유
#[derive(Debug, PartialEq, Eq)]
pub enum TransitionError {
    /// 테이블에 없는 전이. 현재 상태에서 갈 수 있는 목표 목록 포함
    Illegal { allowed: Vec<&'static str> },
    /// 전이는 존재하지만 역할이 맞지 않음
    WrongRole { rule: RoleRule },
}

/// 상태별 전이 테이블
fn transitions(from: TransactionStatus) -> &'static [(TransactionStatus, RoleRule)] {
    use RoleRule::*;
    use TransactionStatus::*;
    match from {
        AwaitingPayment => &[(PaymentSent, BuyerOnly), (Cancelled, Either)],
        PaymentSent => &[(PaymentConfirmed, SellerOnly), (Cancelled, Either)],
        PaymentConfirmed => &[(Completed, SellerOnly)],
        Completed | Cancelled => &[],
    }
}

/// 현재 상태에서 도달 가능한 목표 상태 목록
pub fn allowed_targets(from: TransactionStatus) -> Vec<&'static str> {
    transitions(from).iter().map(|(to, _)| to.as_str()).collect()
}

/// 전이 검증: 테이블 조회 후 역할 확인
///
/// 전이 자체가 불법이면 역할과 무관하게 `Illegal`,
/// 전이는 합법이지만 역할이 틀리면 `WrongRole`.
pub fn authorize_transition(
    from: TransactionStatus,
    to: TransactionStatus,
    role: ParticipantRole,
) -> Result<(), TransitionError> {
    let edge = transitions(from).iter().find(|(target, _)| *target == to);

    match edge {
        None => Err(TransitionError::Illegal {
            allowed: allowed_targets(from),
        }),
        Some((_, rule)) => {
            if rule.permits(role) {
                Ok(())
            } else {
                Err(TransitionError::WrongRole { rule: *rule })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ParticipantRole::*;
    use TransactionStatus::*;

    #[test]
    fn test_buyer_marks_payment_sent() {
        assert!(authorize_transition(AwaitingPayment, PaymentSent, Buyer).is_ok());
    }

    #[test]
    fn test_seller_cannot_mark_payment_sent() {
        assert_eq!(
            authorize_transition(AwaitingPayment, PaymentSent, Seller),
            Err(TransitionError::WrongRole {
                rule: RoleRule::BuyerOnly
            })
        );
    }

    #[test]
    fn test_seller_confirms_and_completes() {
        assert!(authorize_transition(PaymentSent, PaymentConfirmed, Seller).is_ok());
        assert!(authorize_transition(PaymentConfirmed, Completed, Seller).is_ok());
    }

    #[test]
    fn test_buyer_cannot_confirm_or_complete() {
        assert!(matches!(
            authorize_transition(PaymentSent, PaymentConfirmed, Buyer),
            Err(TransitionError::WrongRole { .. })
        ));
        assert!(matches!(
            authorize_transition(PaymentConfirmed, Completed, Buyer),
            Err(TransitionError::WrongRole { .. })
        ));
    }

    #[test]
    fn test_either_participant_cancels_early_states() {
        for role in [Buyer, Seller] {
            assert!(authorize_transition(AwaitingPayment, Cancelled, role).is_ok());
            assert!(authorize_transition(PaymentSent, Cancelled, role).is_ok());
        }
    }

    #[test]
    fn test_cannot_cancel_after_confirmation() {
        let err = authorize_transition(PaymentConfirmed, Cancelled, Buyer).unwrap_err();
        assert_eq!(
            err,
            TransitionError::Illegal {
                allowed: vec!["COMPLETED"]
            }
        );
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for terminal in [Completed, Cancelled] {
            assert!(terminal.is_terminal());
            assert!(allowed_targets(terminal).is_empty());
            for target in [AwaitingPayment, PaymentSent, PaymentConfirmed, Completed, Cancelled] {
                if target == terminal {
                    continue;
                }
                assert!(matches!(
                    authorize_transition(terminal, target, Seller),
                    Err(TransitionError::Illegal { .. })
                ));
            }
        }
    }

    #[test]
    fn test_skipping_states_is_illegal() {
        // AWAITING_PAYMENT에서 곧장 PAYMENT_CONFIRMED / COMPLETED 불가
        for target in [PaymentConfirmed, Completed] {
            assert!(matches!(
                authorize_transition(AwaitingPayment, target, Seller),
                Err(TransitionError::Illegal { .. })
            ));
        }
    }

    #[test]
    fn test_illegal_error_reports_allowed_targets() {
        let err = authorize_transition(AwaitingPayment, Completed, Buyer).unwrap_err();
        assert_eq!(
            err,
            TransitionError::Illegal {
                allowed: vec!["PAYMENT_SENT", "CANCELLED"]
            }
        );
    }

    #[test]
    fn test_status_round_trip_str() {
        assert_eq!(AwaitingPayment.as_str(), "AWAITING_PAYMENT");
        assert_eq!(
            serde_json::to_string(&PaymentSent).unwrap(),
            "\"PAYMENT_SENT\""
        );
        let s: TransactionStatus = serde_json::from_str("\"CANCELLED\"").unwrap();
        assert_eq!(s, Cancelled);
    }
}
