//! Common Types Module
//!
//! 애플리케이션 전반에서 사용되는 공통 타입 정의

use serde::{Deserialize, Serialize};

/// 거래 가능 통화 (ISO 4217 3글자 코드)
pub const ALLOWED_CURRENCIES: [&str; 5] = ["AOA", "USD", "EUR", "BRL", "ZAR"];

/// 허용되는 결제 수단
pub const PAYMENT_METHODS: [&str; 6] = ["TPA", "Multicaixa", "PayPal", "Wise", "Bank", "Cash"];

/// 게이트웨이가 참조번호로 자동 검증할 수 있는 결제 수단
pub const AUTO_VERIFIABLE_METHODS: [&str; 2] = ["TPA", "Multicaixa"];

/// 영수증 금액과 거래 금액의 허용 오차 (절대값)
pub const AMOUNT_TOLERANCE: f64 = 0.01;

/// 사용자당 동시 활성 오퍼 최대 개수
pub const MAX_ACTIVE_OFFERS: i64 = 5;

pub fn is_allowed_currency(code: &str) -> bool {
    ALLOWED_CURRENCIES.contains(&code)
}

pub fn is_allowed_method(method: &str) -> bool {
    PAYMENT_METHODS.contains(&method)
}

pub fn is_auto_verifiable(method: &str) -> bool {
    AUTO_VERIFIABLE_METHODS.contains(&method)
}

/// 영수증 금액이 거래 금액과 일치하는지 (±0.01)
pub fn amounts_match(claimed: f64, expected: f64) -> bool {
    (claimed - expected).abs() <= AMOUNT_TOLERANCE
}

/// API 응답 래퍼
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn success_with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        }
    }
}

// ============ Pagination ============

/// 페이지네이션 쿼리 파라미터
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// 페이지 (1부터 시작)
    pub page: Option<u32>,
    /// 페이지 크기 (기본 20, 최대 100)
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        ((self.page() - 1) * self.limit()) as i64
    }
}

/// 페이지네이션 응답 블록
#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn build(page: u32, limit: u32, total: i64) -> Self {
        let total = total.max(0) as u64;
        let total_pages = ((total + limit as u64 - 1) / limit as u64) as u32;
        Self {
            page,
            limit,
            total,
            total_pages,
            has_next: (page as u64) * (limit as u64) < total,
            has_prev: page > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_allow_list() {
        assert!(is_allowed_currency("AOA"));
        assert!(is_allowed_currency("USD"));
        assert!(!is_allowed_currency("GBP"));
        assert!(!is_allowed_currency("usd"));
    }

    #[test]
    fn test_method_allow_list() {
        assert!(is_allowed_method("Bank"));
        assert!(is_allowed_method("Multicaixa"));
        assert!(!is_allowed_method("Bitcoin"));
    }

    #[test]
    fn test_auto_verifiable_subset() {
        for m in AUTO_VERIFIABLE_METHODS {
            assert!(is_allowed_method(m));
        }
        assert!(is_auto_verifiable("TPA"));
        assert!(!is_auto_verifiable("Bank"));
    }

    #[test]
    fn test_amount_tolerance_boundary() {
        // 0.01 차이까지는 허용, 그 이상은 거부
        assert!(amounts_match(500.0, 500.0));
        assert!(amounts_match(500.01, 500.0));
        assert!(amounts_match(499.99, 500.0));
        assert!(!amounts_match(500.02, 500.0));
        assert!(!amounts_match(499.98, 500.0));
    }

    #[test]
    fn test_page_defaults_and_clamp() {
        let q = PageQuery {
            page: None,
            limit: None,
        };
        assert_eq!(q.page(), 1);
        assert_eq!(q.limit(), 20);
        assert_eq!(q.offset(), 0);

        let q = PageQuery {
            page: Some(0),
            limit: Some(500),
        };
        assert_eq!(q.page(), 1);
        assert_eq!(q.limit(), 100);

        let q = PageQuery {
            page: Some(3),
            limit: Some(10),
        };
        assert_eq!(q.offset(), 20);
    }

    #[test]
    fn test_pagination_build() {
        let p = Pagination::build(1, 20, 45);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next);
        assert!(!p.has_prev);

        let p = Pagination::build(3, 20, 45);
        assert!(!p.has_next);
        assert!(p.has_prev);

        let p = Pagination::build(1, 20, 0);
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_next);
    }
}
