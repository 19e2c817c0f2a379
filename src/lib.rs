//! Cambio API Library
//!
//! # Overview
//!
//! P2P 환전 마켓플레이스 백엔드. 오퍼 게시부터 제안, 거래 상태 머신,
//! 결제 증빙 검증, 리뷰/평판, 신원 검증까지의 전체 수명주기를 담당한다.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        API                                │
//! │                                                           │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐  ┌─────────┐     │
//! │  │ Routes  │  │Services │  │   DB    │  │  Types  │     │
//! │  └────┬────┘  └────┬────┘  └────┬────┘  └────┬────┘     │
//! │       │            │            │            │           │
//! │       └────────────┴────────────┴────────────┘           │
//! │                         │                                 │
//! └─────────────────────────┼─────────────────────────────────┘
//!                           │
//!                           ▼
//!            ┌─────────────────────────────┐
//!            │  PostgreSQL │ Gateway │ OCR │
//!            └─────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: 환경 설정 관리
//! - `error`: 에러 타입 및 HTTP 매핑
//! - `routes`: HTTP 엔드포인트 핸들러
//! - `services`: 비즈니스 로직 (상태 머신, 평판, 게이트웨이, OCR)
//! - `db`: 데이터베이스 연동 및 원자적 복합 연산
//! - `types`: 공통 타입 정의 (허용 목록, 페이지네이션)

use std::sync::Arc;

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod services;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use db::Database;
pub use error::ApiError;
pub use services::{DocumentOcr, PaymentGateway};

/// 애플리케이션 전역 상태
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub payment_gateway: Arc<PaymentGateway>,
    pub ocr: Arc<DocumentOcr>,
    pub config: Arc<Config>,
}
