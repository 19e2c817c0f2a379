//! Cambio API Server
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Client (Frontend)                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum Web Server                         │
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                      Routes Layer                        ││
//! │  │  /health  /api/offers  /api/proposals  /api/transactions││
//! │  │  /api/messages  /api/reviews  /api/verify               ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                    Services Layer                        ││
//! │  │  StateMachine  Reputation  PaymentGateway  DocumentOcr  ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                    Data Layer                            ││
//! │  │  PostgreSQL (sqlx, 트랜잭션 기반 복합 연산)              ││
//! │  └─────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │       External: Payment Gateway (참조번호 검증) / OCR        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cambio_api::{routes, AppState, Config, Database, DocumentOcr, PaymentGateway};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 환경변수 로드
    dotenvy::dotenv().ok();

    // 로깅 초기화
    // RUST_LOG=debug,sqlx=warn 형태로 레벨 제어 가능
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cambio_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🚀 Starting Cambio API Server");

    // 설정 로드
    let config = Config::from_env()?;
    tracing::info!("📋 Configuration loaded");

    // 데이터베이스 연결
    let db = Database::connect(&config.database_url).await?;
    tracing::info!("🗄️  Database connected");

    // 마이그레이션 실행
    db.run_migrations().await?;
    tracing::info!("📦 Migrations completed");

    // 외부 서비스 클라이언트
    let payment_gateway = PaymentGateway::new(
        &config.payment_gateway_url,
        config.payment_gateway_key.clone(),
    );
    tracing::info!("💳 Payment gateway client ready");

    let ocr = DocumentOcr::new(&config.ocr_api_url, config.ocr_api_key.clone());
    tracing::info!("📄 Document OCR client ready");

    // 앱 상태 구성
    let state = AppState {
        db: Arc::new(db),
        payment_gateway: Arc::new(payment_gateway),
        ocr: Arc::new(ocr),
        config: Arc::new(config.clone()),
    };

    // 라우터 구성
    let app = create_router(state);

    // 서버 시작
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🌐 Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// 라우터 생성
///
/// # Route Structure
///
/// ```text
/// GET    /health                                - 서버 상태 확인
///
/// POST   /api/offers                            - 오퍼 게시
/// GET    /api/offers                            - 오퍼 검색 (공개)
/// PATCH  /api/offers/:id                        - 오퍼 수정
///
/// POST   /api/proposals                         - 제안 제출
/// GET    /api/proposals                         - 제안 목록
/// PATCH  /api/proposals/:id                     - 제안 수락/거절
///
/// GET    /api/transactions                      - 거래 목록
/// GET    /api/transactions/:id                  - 거래 상세
/// PATCH  /api/transactions/:id                  - 상태 전이
/// POST   /api/transactions/:id/payment-proof    - 결제 증빙 제출
/// GET    /api/transactions/:id/payment-proof    - 증빙 이력
///
/// POST   /api/messages                          - 메시지 전송
/// GET    /api/messages                          - 채팅 조회
///
/// POST   /api/reviews                           - 리뷰 작성
/// GET    /api/reviews                           - 리뷰 목록 (공개)
/// DELETE /api/reviews/:id                       - 리뷰 삭제 (24h 이내)
///
/// POST   /api/verify/document                   - 문서 OCR 검증
/// GET    /api/verify/document                   - 문서 검증 상태
/// POST   /api/verify/face                       - 생체 등록
/// DELETE /api/verify/face                       - 생체 등록 해제
/// POST   /api/verify/phone/request              - 전화 코드 발급
/// POST   /api/verify/phone/confirm              - 전화 코드 확인
/// GET    /api/verify/status                     - 검증 진행 상황
/// ```
fn create_router(state: AppState) -> Router {
    // CORS 설정
    // 프로덕션에서는 특정 도메인만 허용
    // 개발 환경에서는 localhost 허용
    let cors = if state.config.is_production() {
        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "https://cambio.example.com".to_string());
        let origins: Vec<_> = allowed_origins
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PATCH,
                axum::http::Method::DELETE,
            ])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::HeaderName::from_static("x-auth-id"),
            ])
    } else {
        CorsLayer::new()
            .allow_origin([
                "http://localhost:5173".parse().unwrap(),
                "http://localhost:3000".parse().unwrap(),
                "http://127.0.0.1:5173".parse().unwrap(),
            ])
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        // Health check
        .route("/health", get(routes::health::health_check))
        // Offers
        .route(
            "/api/offers",
            post(routes::offers::create_offer).get(routes::offers::list_offers),
        )
        .route("/api/offers/:id", patch(routes::offers::update_offer))
        // Proposals
        .route(
            "/api/proposals",
            post(routes::proposals::create_proposal).get(routes::proposals::list_proposals),
        )
        .route(
            "/api/proposals/:id",
            patch(routes::proposals::respond_to_proposal),
        )
        // Transactions
        .route(
            "/api/transactions",
            get(routes::transactions::list_transactions),
        )
        .route(
            "/api/transactions/:id",
            get(routes::transactions::get_transaction)
                .patch(routes::transactions::transition_transaction),
        )
        .route(
            "/api/transactions/:id/payment-proof",
            post(routes::payments::submit_payment_proof)
                .get(routes::payments::list_payment_proofs),
        )
        // Messages
        .route(
            "/api/messages",
            post(routes::messages::send_message).get(routes::messages::list_messages),
        )
        // Reviews
        .route(
            "/api/reviews",
            post(routes::reviews::create_review).get(routes::reviews::list_reviews),
        )
        .route("/api/reviews/:id", delete(routes::reviews::delete_review))
        // Identity verification
        .route(
            "/api/verify/document",
            post(routes::verify::submit_document).get(routes::verify::get_document_status),
        )
        .route(
            "/api/verify/face",
            post(routes::verify::submit_face).delete(routes::verify::delete_face),
        )
        .route(
            "/api/verify/phone/request",
            post(routes::verify::request_phone_code),
        )
        .route(
            "/api/verify/phone/confirm",
            post(routes::verify::confirm_phone_code),
        )
        .route("/api/verify/status", get(routes::verify::get_status))
        // 미들웨어
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // 상태 주입
        .with_state(state)
}
