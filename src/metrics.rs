//! 스트리머 에러 카운터
//!
//! 프로세스 전역 BinlogStreamerErrors 카운터 집합을 metrics 레코더로
//! 내보냅니다. 버킷 라벨이 붙은 단일 카운터이며, 증가는 레코더가
//! 원자적으로 처리합니다.

use metrics::{counter, describe_counter};

/// 스트리머 에러 카운터 이름
pub const BINLOG_STREAMER_ERRORS_TOTAL: &str = "binlog_streamer_errors_total";

/// 조립기 경고 버킷 (열린 트랜잭션 위에 또 BEGIN이 온 경우 등)
pub const PARSE_EVENTS_BUCKET: &str = "parse_events";

/// 카운터 설명 등록 - 프로세스 시작 시 한 번 호출
pub fn init_metrics() {
    describe_counter!(
        BINLOG_STREAMER_ERRORS_TOTAL,
        "Total number of binlog streamer errors, labeled by bucket"
    );
}

/// 지정한 버킷의 에러 카운터를 1 올린다
pub fn increment_streamer_errors(bucket: &'static str) {
    counter!(BINLOG_STREAMER_ERRORS_TOTAL, "bucket" => bucket).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_without_recorder_is_noop() {
        // 레코더가 설치되지 않은 상태에서도 호출은 안전해야 한다
        init_metrics();
        increment_streamer_errors(PARSE_EVENTS_BUCKET);
    }
}
