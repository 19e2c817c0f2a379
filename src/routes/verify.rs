//! Identity Verification Endpoints
//!
//! 3단계 신원 검증: 신분증 문서(OCR), 생체 등록, 전화번호 확인.
//! 세 단계가 모두 끝나야 `verified`가 되고 마켓플레이스 쓰기 동작이
//! 열린다. 플래그 동기화는 전부 DB 레이어의 한 문장이 담당한다.

use axum::{extract::State, Json};
use chrono::{Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::db::Verification;
use crate::error::ApiError;
use crate::routes::AuthUser;
use crate::types::ApiResponse;
use crate::AppState;

/// 전화번호 확인 코드 유효 시간 (분)
const PHONE_CODE_TTL_MINUTES: i64 = 10;

// ============ Request/Response Types ============

/// 문서 검증 요청 (신분증 이미지)
#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
    pub image_base64: String,
}

/// 문서 검증 결과
#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub document_number: String,
    pub confidence: f64,
    /// 클라이언트가 이어갈 다음 검증 단계
    pub next_step: &'static str,
}

/// 생체 등록 요청 (외부 얼굴인식 제공자의 등록 핸들)
#[derive(Debug, Deserialize)]
pub struct FaceRequest {
    pub face_id: String,
    pub face_data: Option<serde_json::Value>,
}

/// 전화번호 코드 요청
#[derive(Debug, Deserialize)]
pub struct PhoneRequest {
    pub phone_number: String,
}

/// 전화번호 코드 확인
#[derive(Debug, Deserialize)]
pub struct PhoneConfirmRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct PhoneCodeResponse {
    pub expires_in_minutes: i64,
    /// 개발 환경에서만 노출 (SMS 발송 대체)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_code: Option<String>,
}

/// 검증 단계 요약
#[derive(Debug, Serialize)]
pub struct VerificationStatus {
    pub id_verified: bool,
    pub face_verified: bool,
    pub phone_verified: bool,
    /// 세 단계 모두 완료 여부
    pub verified: bool,
}

// ============ Handlers ============

/// POST /api/verify/document
///
/// 신분증 이미지를 OCR로 검증. 문서번호를 찾으면 사용자에 기록하고
/// (번호는 사용자 간 유일), 못 찾으면 400.
///
/// OCR 제공자 장애는 폴백이 없어 503으로 올린다.
pub async fn submit_document(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<DocumentRequest>,
) -> Result<Json<ApiResponse<DocumentResponse>>, ApiError> {
    let user = state.db.get_or_create_user(&auth.auth_id).await?;

    if req.image_base64.trim().is_empty() {
        return Err(ApiError::Validation(
            "Document image is required".to_string(),
        ));
    }

    let data = state
        .ocr
        .extract_document_data(&req.image_base64)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "document OCR failed");
            ApiError::ExternalServiceDegraded("Document OCR".to_string())
        })?;

    let document_number = data.document_number.clone().ok_or_else(|| {
        ApiError::Validation(
            "Could not find a valid document number on the image".to_string(),
        )
    })?;

    let extracted = serde_json::to_value(&data).map_err(|_| ApiError::Internal)?;
    state
        .db
        .apply_document_verification(user.id, &document_number, extracted)
        .await?;

    tracing::info!(user_id = %user.id, "document verified");

    Ok(Json(ApiResponse::success_with_message(
        "Document verified",
        DocumentResponse {
            document_number,
            confidence: data.confidence,
            next_step: "face_verification",
        },
    )))
}

/// GET /api/verify/document
///
/// 문서 검증 상태
pub async fn get_document_status(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Option<Verification>>>, ApiError> {
    let user = state.db.get_or_create_user(&auth.auth_id).await?;
    let verification = state.db.get_verification(user.id).await?;
    Ok(Json(ApiResponse::success(verification)))
}

/// POST /api/verify/face
///
/// 생체 등록 완료 보고. 등록 핸들은 사용자 간 유일해야 한다
/// (같은 얼굴로 두 계정 검증 불가).
pub async fn submit_face(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<FaceRequest>,
) -> Result<Json<ApiResponse<VerificationStatus>>, ApiError> {
    let user = state.db.get_or_create_user(&auth.auth_id).await?;

    if req.face_id.trim().is_empty() {
        return Err(ApiError::Validation(
            "Facial enrollment handle is required".to_string(),
        ));
    }

    let face_data = req.face_data.unwrap_or(serde_json::Value::Null);
    let all_verified = state
        .db
        .apply_face_verification(user.id, req.face_id.trim(), face_data)
        .await?;

    tracing::info!(user_id = %user.id, "face verified");

    let message = if all_verified {
        "Identity fully verified"
    } else {
        "Facial verification completed"
    };

    Ok(Json(ApiResponse::success_with_message(
        message,
        status_response(&state, user.id).await?,
    )))
}

/// DELETE /api/verify/face
///
/// 생체 등록 해제 (재등록 허용)
pub async fn delete_face(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<VerificationStatus>>, ApiError> {
    let user = state.db.get_or_create_user(&auth.auth_id).await?;
    state.db.clear_face_verification(user.id).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Facial verification removed",
        status_response(&state, user.id).await?,
    )))
}

/// POST /api/verify/phone/request
///
/// 전화번호 확인 코드 발급 (10분 유효).
/// 개발 환경에서는 SMS 대신 응답에 코드를 포함한다.
pub async fn request_phone_code(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<PhoneRequest>,
) -> Result<Json<ApiResponse<PhoneCodeResponse>>, ApiError> {
    let user = state.db.get_or_create_user(&auth.auth_id).await?;

    let phone = req.phone_number.trim();
    if !is_valid_phone(phone) {
        return Err(ApiError::Validation(
            "Invalid phone number format".to_string(),
        ));
    }

    let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
    let expires_at = Utc::now() + Duration::minutes(PHONE_CODE_TTL_MINUTES);

    state
        .db
        .issue_phone_code(user.id, phone, &code, expires_at)
        .await?;

    tracing::info!(user_id = %user.id, "phone confirmation code issued");

    let debug_code = if state.config.is_production() {
        None
    } else {
        Some(code)
    };

    Ok(Json(ApiResponse::success_with_message(
        "Confirmation code sent",
        PhoneCodeResponse {
            expires_in_minutes: PHONE_CODE_TTL_MINUTES,
            debug_code,
        },
    )))
}

/// POST /api/verify/phone/confirm
///
/// 확인 코드 검증 → phone_verified
pub async fn confirm_phone_code(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<PhoneConfirmRequest>,
) -> Result<Json<ApiResponse<VerificationStatus>>, ApiError> {
    let user = state.db.get_or_create_user(&auth.auth_id).await?;

    let all_verified = state.db.confirm_phone(user.id, req.code.trim()).await?;

    let message = if all_verified {
        "Identity fully verified"
    } else {
        "Phone number verified"
    };

    Ok(Json(ApiResponse::success_with_message(
        message,
        status_response(&state, user.id).await?,
    )))
}

/// GET /api/verify/status
///
/// 세 단계 검증 진행 상황
pub async fn get_status(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<VerificationStatus>>, ApiError> {
    let user = state.db.get_or_create_user(&auth.auth_id).await?;
    Ok(Json(ApiResponse::success(
        status_response(&state, user.id).await?,
    )))
}

// ============ Helpers ============

async fn status_response(
    state: &AppState,
    user_id: uuid::Uuid,
) -> Result<VerificationStatus, ApiError> {
    let user = state
        .db
        .find_user(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User".to_string()))?;

    Ok(VerificationStatus {
        id_verified: user.id_verified,
        face_verified: user.face_verified,
        phone_verified: user.phone_verified,
        verified: user.verified,
    })
}

/// 국제 형식 전화번호: 선택적 '+' 뒤 숫자 9~15자리
fn is_valid_phone(phone: &str) -> bool {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    (9..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_format() {
        assert!(is_valid_phone("+244923456789"));
        assert!(is_valid_phone("923456789"));
        assert!(!is_valid_phone("12345"));
        assert!(!is_valid_phone("+244 923 456 789"));
        assert!(!is_valid_phone("abc923456789"));
    }
}
