//! Reputation Aggregation
//!
//! 리뷰 생성/삭제 시 대상 사용자의 평판을 다시 계산한다.
//! 계산 자체는 순수 함수로 분리 - 저장 트랜잭션 안에서 호출된다.

/// 평판 집계 결과
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReputationAggregate {
    /// 전체 평점의 산술 평균, 소수 둘째 자리 반올림. 리뷰 없으면 0
    pub score: f64,
    pub count: i32,
}

/// 평점 목록에서 평균/개수 집계
pub fn aggregate(ratings: &[i32]) -> ReputationAggregate {
    let count = ratings.len() as i32;
    if count == 0 {
        return ReputationAggregate { score: 0.0, count: 0 };
    }
    let sum: i32 = ratings.iter().sum();
    let mean = sum as f64 / count as f64;
    ReputationAggregate {
        score: (mean * 100.0).round() / 100.0,
        count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_of_three() {
        let agg = aggregate(&[5, 4, 3]);
        assert_eq!(agg.score, 4.00);
        assert_eq!(agg.count, 3);
    }

    #[test]
    fn test_mean_after_removal() {
        // [5,4,3]에서 3을 지우면 4.50
        let agg = aggregate(&[5, 4]);
        assert_eq!(agg.score, 4.50);
        assert_eq!(agg.count, 2);
    }

    #[test]
    fn test_empty_resets_to_zero() {
        let agg = aggregate(&[]);
        assert_eq!(agg.score, 0.0);
        assert_eq!(agg.count, 0);
    }

    #[test]
    fn test_two_decimal_rounding() {
        // 1/3 = 0.333... → 반올림 후 두 자리
        let agg = aggregate(&[1, 1, 2]);
        assert_eq!(agg.score, 1.33);

        let agg = aggregate(&[5, 5, 4]);
        assert_eq!(agg.score, 4.67);
    }
}
