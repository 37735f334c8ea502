//! MySQL binlog 스트리밍 엔진
//!
//! 복제 슬레이브로 접속해 binlog 이벤트 스트림을 소비하고, 트랜잭션
//! 단위로 재조립해 소비자 콜백에 전달합니다.
//! 주요 기능:
//! - Binlog 이벤트 파싱 및 형식/dialect 자동 발견
//! - GTID 기반 position 추적 (MySQL 5.6 / MariaDB / Google MySQL)
//! - autocommit과 명시적 트랜잭션 경계 처리
//! - 데이터베이스 단위 statement 필터링
//! - 협조적 취소와 정확한 재시작 지점 보고

pub mod auth;
pub mod connection;
pub mod error;
pub mod events;
pub mod gtid;
pub mod metrics;
pub mod protocol;
pub mod streamer;

pub use connection::{ConnectionConfig, MysqlDaemon, SlaveConnection};
pub use error::{Result, StreamError};
pub use events::{BinlogDialect, BinlogEvent, BinlogFormat, Charset, ChecksumAlg, EventType};
pub use gtid::{Gtid, GtidSet, Position};
pub use streamer::{
    SendError, SendTransactionFn, Statement, StatementCategory, Streamer, Transaction,
};
