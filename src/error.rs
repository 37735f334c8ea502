//! 스트리밍 엔진 에러 타입
//!
//! ClientEof / ServerEof는 정상 종료 센티넬이고, 나머지는 치명적
//! 에러로서 발생 시점 position 접두사와 함께 반환됩니다.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    /// 소비자가 더 이상 이벤트를 받지 않겠다고 알림 (정상 종료)
    #[error("binlog 스트림 소비자가 reply 스트림을 종료함")]
    ClientEof,

    /// 이벤트 채널이 닫힘 - mysqld 연결 유실 또는 서버 측 종료 (정상 종료)
    #[error("mysqld가 binlog 스트림 연결을 닫음")]
    ServerEof,

    #[error("MySQL 연결 에러: {0}")]
    Connection(String),

    #[error("charset 설정 에러: {0}")]
    Charset(String),

    #[error("Binlog 파싱 에러: {0}")]
    Parse(String),

    #[error("GTID 처리 에러: {0}")]
    Gtid(String),

    #[error("쿼리 실행 에러: {0}")]
    Query(String),

    #[error("send reply 에러: {0}")]
    SendReply(String),

    #[error("I/O 에러: {0}")]
    Io(#[from] io::Error),

    /// 치명적 에러에 발생 시점 position을 접두사로 붙인 래퍼
    #[error("stream error @ {position}: {source}")]
    AtPosition {
        position: String,
        #[source]
        source: Box<StreamError>,
    },
}

impl StreamError {
    /// 소비자 측 정상 종료인지 여부
    pub fn is_client_eof(&self) -> bool {
        matches!(self, StreamError::ClientEof)
    }

    /// 서버 측 정상 종료인지 여부
    pub fn is_server_eof(&self) -> bool {
        matches!(self, StreamError::ServerEof)
    }

    /// 센티넬이 아닌 에러를 position 접두사로 감싼다
    pub(crate) fn at_position(self, position: String) -> StreamError {
        match self {
            StreamError::ClientEof | StreamError::ServerEof => self,
            other => StreamError::AtPosition {
                position,
                source: Box::new(other),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_prefix() {
        let err = StreamError::Parse("bad header".to_string()).at_position("0-1-5".to_string());
        assert_eq!(
            err.to_string(),
            "stream error @ 0-1-5: Binlog 파싱 에러: bad header"
        );
    }

    #[test]
    fn test_sentinels_not_wrapped() {
        assert!(StreamError::ServerEof
            .at_position("0-1-5".to_string())
            .is_server_eof());
        assert!(StreamError::ClientEof
            .at_position("0-1-5".to_string())
            .is_client_eof());
    }
}
