//! Services Module
//!
//! 비즈니스 로직을 담당하는 서비스 레이어
//!
//! # Services
//! - `state_machine`: 거래 상태 전이 테이블
//! - `reputation`: 평판 집계
//! - `PaymentGateway`: 결제 참조번호 검증 클라이언트
//! - `DocumentOcr`: 신분증 OCR 클라이언트

pub mod ocr;
pub mod payment_gateway;
pub mod reputation;
pub mod state_machine;

pub use ocr::{DocumentData, DocumentOcr};
pub use payment_gateway::{GatewayVerification, PaymentGateway};
pub use state_machine::{ParticipantRole, TransactionStatus, TransitionError};
