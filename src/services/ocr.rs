//! Document OCR Service
//!
//! 신분증 이미지에서 텍스트를 추출하는 외부 OCR 제공자 클라이언트
//! (Vision 스타일 REST API). 코어는 추출 결과 중 문서번호만 소비하며,
//! 문서번호 부재는 검증 실패로 처리한다.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OCR 호출 타임아웃
const OCR_TIMEOUT: Duration = Duration::from_secs(15);

/// 신분증에서 추출된 데이터
#[derive(Debug, Clone, Serialize)]
pub struct DocumentData {
    /// 국가 신분증 번호 (9자리 숫자 + 대문자 2 + 숫자 3)
    pub document_number: Option<String>,
    /// OCR 원문 전체
    pub extracted_text: String,
    /// 제공자가 보고한 신뢰도 (0.0 ~ 1.0)
    pub confidence: f64,
}

#[derive(Debug, Serialize)]
struct AnnotateRequest {
    requests: Vec<AnnotateEntry>,
}

#[derive(Debug, Serialize)]
struct AnnotateEntry {
    image: ImageContent,
    features: Vec<Feature>,
}

#[derive(Debug, Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Debug, Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    responses: Vec<AnnotateResult>,
}

#[derive(Debug, Deserialize, Default)]
struct AnnotateResult {
    #[serde(rename = "textAnnotations", default)]
    text_annotations: Vec<TextAnnotation>,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    description: String,
    #[serde(default)]
    confidence: Option<f64>,
}

/// 문서 OCR 클라이언트
pub struct DocumentOcr {
    client: reqwest::Client,
    api_url: String,
    /// API 키. 없으면 OCR 기능 비활성 (호출 시 에러)
    api_key: Option<String>,
}

impl DocumentOcr {
    pub fn new(api_url: &str, api_key: Option<String>) -> Self {
        if api_key.is_none() {
            tracing::warn!("OCR_API_KEY not set - document verification disabled");
        }
        let client = reqwest::Client::builder()
            .timeout(OCR_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_url: api_url.to_string(),
            api_key,
        }
    }

    /// 이미지(base64)에서 문서 데이터 추출
    pub async fn extract_document_data(&self, image_base64: &str) -> Result<DocumentData> {
        let key = self
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("OCR provider is not configured"))?;

        let request = AnnotateRequest {
            requests: vec![AnnotateEntry {
                image: ImageContent {
                    content: image_base64.to_string(),
                },
                features: vec![Feature {
                    kind: "TEXT_DETECTION",
                }],
            }],
        };

        let response = self
            .client
            .post(format!("{}?key={}", self.api_url, key))
            .json(&request)
            .send()
            .await
            .context("OCR provider unreachable")?;

        if !response.status().is_success() {
            return Err(anyhow!("OCR provider returned status {}", response.status()));
        }

        let body: AnnotateResponse = response
            .json()
            .await
            .context("invalid OCR provider response")?;

        // 첫 annotation이 전체 텍스트, 이후는 단어 단위
        let (extracted_text, confidence) = body
            .responses
            .first()
            .and_then(|r| r.text_annotations.first())
            .map(|a| (a.description.clone(), a.confidence.unwrap_or(0.0)))
            .unwrap_or_default();

        Ok(DocumentData {
            document_number: find_document_number(&extracted_text),
            extracted_text,
            confidence,
        })
    }
}

/// OCR 원문에서 신분증 번호 검색
///
/// 형식: 숫자 9개 + 대문자 2개 + 숫자 3개 (예: 004523817LA042),
/// 앞뒤로 영숫자가 붙어 있으면 매치로 보지 않는다.
pub fn find_document_number(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let n = bytes.len();
    let mut i = 0;

    while i + 14 <= n {
        let window = &bytes[i..i + 14];
        let shape_ok = window[..9].iter().all(u8::is_ascii_digit)
            && window[9..11].iter().all(u8::is_ascii_uppercase)
            && window[11..].iter().all(u8::is_ascii_digit);

        let left_ok = i == 0 || !bytes[i - 1].is_ascii_alphanumeric();
        let right_ok = i + 14 == n || !bytes[i + 14].is_ascii_alphanumeric();

        if shape_ok && left_ok && right_ok {
            return Some(String::from_utf8_lossy(window).into_owned());
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finds_number_in_ocr_text() {
        let text = "REPUBLICA DE ANGOLA\nBILHETE DE IDENTIDADE\nN 004523817LA042\nNOME";
        assert_eq!(
            find_document_number(text),
            Some("004523817LA042".to_string())
        );
    }

    #[test]
    fn test_rejects_wrong_shapes() {
        assert_eq!(find_document_number("00452381LA042"), None); // 숫자 8개
        assert_eq!(find_document_number("004523817la042"), None); // 소문자
        assert_eq!(find_document_number("004523817LAX42"), None); // 문자 3개
        assert_eq!(find_document_number(""), None);
    }

    #[test]
    fn test_requires_word_boundary() {
        // 앞뒤에 영숫자가 붙으면 매치 아님
        assert_eq!(find_document_number("X004523817LA042"), None);
        assert_eq!(find_document_number("004523817LA0421"), None);
        assert_eq!(
            find_document_number("(004523817LA042)"),
            Some("004523817LA042".to_string())
        );
    }

    #[tokio::test]
    async fn test_unconfigured_ocr_errors() {
        let ocr = DocumentOcr::new("http://mock", None);
        assert!(ocr.extract_document_data("aGVsbG8=").await.is_err());
    }
}
