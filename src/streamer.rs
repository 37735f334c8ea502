//! Binlog 이벤트 스트림을 트랜잭션 단위로 재조립하는 스트리머
//!
//! 복제 슬레이브 연결에서 이벤트를 하나씩 읽어 BEGIN/COMMIT 경계로
//! 묶고, 완성된 트랜잭션을 sendTransaction 콜백으로 내보냅니다.
//! 스트리머는 일회용입니다 - 이어서 받으려면 반환된 position으로 새
//! 스트리머를 만드세요.

use crate::connection::MysqlDaemon;
use crate::error::{Result, StreamError};
use crate::events::{BinlogEvent, BinlogFormat, Charset, EventType};
use crate::gtid::{Gtid, Position};
use crate::metrics;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info};

/// statement 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementCategory {
    Begin,
    Commit,
    Rollback,
    Dml,
    Ddl,
    Set,
    Unrecognized,
}

/// 트랜잭션을 구성하는 단일 statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub category: StatementCategory,
    pub sql: String,
    /// 클라이언트 기본 charset과 다를 때만 실리는 per-statement charset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charset: Option<Charset>,
}

/// 소비자에게 전달되는 완성 트랜잭션
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub statements: Vec<Statement>,
    /// 커밋을 일으킨 이벤트의 타임스탬프 (epoch 초)
    pub timestamp: i64,
    /// 가장 최근에 관측한 GTID의 문자열 표현
    pub transaction_id: String,
}

/// sendTransaction 콜백이 돌려주는 실패 사유
#[derive(Debug)]
pub enum SendError {
    /// 소비자가 더 이상 받지 않음 (end-of-stream)
    Eof,
    /// 전송 실패
    Failed(String),
}

/// 완성된 트랜잭션을 소비자에게 넘기는 콜백
///
/// 파서 스레드에서만 호출되며, 콜백 자체는 블로킹해도 됩니다.
pub type SendTransactionFn =
    Box<dyn FnMut(Transaction) -> std::result::Result<(), SendError> + Send>;

/// SQL 첫 토큰으로 statement를 분류한다
pub fn statement_category(sql: &str) -> StatementCategory {
    let token = sql.split_whitespace().next().unwrap_or("");
    match token.to_lowercase().as_str() {
        "begin" => StatementCategory::Begin,
        "commit" => StatementCategory::Commit,
        "rollback" => StatementCategory::Rollback,
        "insert" | "update" | "delete" => StatementCategory::Dml,
        "create" | "alter" | "drop" | "truncate" | "rename" => StatementCategory::Ddl,
        "set" => StatementCategory::Set,
        _ => StatementCategory::Unrecognized,
    }
}

/// 조립 중인 트랜잭션 상태
///
/// pending statement 버퍼, autocommit 플래그, 최신 GTID, 현재 binlog
/// 형식을 한 값으로 들고 다닙니다.
struct TransactionAssembler {
    pending: Option<Vec<Statement>>,
    autocommit: bool,
    format: BinlogFormat,
    gtid: Option<Gtid>,
    pos: Position,
}

impl TransactionAssembler {
    fn new(start_pos: Position) -> Self {
        TransactionAssembler {
            pending: None,
            autocommit: true,
            format: BinlogFormat::default(),
            gtid: None,
            pos: start_pos,
        }
    }

    /// 관측한 GTID를 최신값으로 기억하고 position에 접는다
    fn absorb_gtid(&mut self, gtid: Gtid) {
        self.pos.append(&gtid);
        self.gtid = Some(gtid);
    }

    /// 새 트랜잭션 시작 (BEGIN 쿼리 또는 begin 플래그가 선 GTID 이벤트)
    fn begin(&mut self) {
        if let Some(stale) = &self.pending {
            // 닫히지 않은 트랜잭션 위에 BEGIN이 오면 묵은 statement는 버린다
            error!(
                "BEGIN in binlog stream while still in another transaction; dropping {} statements",
                stale.len()
            );
            metrics::increment_streamer_errors(metrics::PARSE_EVENTS_BUCKET);
        }
        self.pending = Some(Vec::with_capacity(10));
        self.autocommit = false;
    }

    fn append(&mut self, statement: Statement) {
        self.pending.get_or_insert_with(Vec::new).push(statement);
    }

    /// 트랜잭션 커밋 (COMMIT 쿼리, XID 이벤트, 또는 autocommit statement)
    fn commit(&mut self, timestamp: u32, send: &mut SendTransactionFn) -> Result<()> {
        let transaction = Transaction {
            statements: self.pending.take().unwrap_or_default(),
            timestamp: i64::from(timestamp),
            transaction_id: self
                .gtid
                .as_ref()
                .map(|gtid| gtid.to_string())
                .unwrap_or_default(),
        };
        match send(transaction) {
            Ok(()) => {
                self.autocommit = true;
                Ok(())
            }
            Err(SendError::Eof) => Err(StreamError::ClientEof),
            Err(SendError::Failed(message)) => Err(StreamError::SendReply(message)),
        }
    }
}

/// MySQL에 복제 슬레이브로 접속해 binlog를 스트리밍하는 세션
///
/// stream()이 self를 소비하므로 구조적으로 재사용이 불가능합니다.
pub struct Streamer {
    dbname: String,
    daemon: MysqlDaemon,
    client_charset: Option<Charset>,
    start_pos: Position,
    send_transaction: SendTransactionFn,
}

impl Streamer {
    /// 새 스트리머 생성
    ///
    /// dbname은 statement 필터 기준 데이터베이스, client_charset은
    /// 소비자 측 기본 charset(있으면 스트림 시작 전 서버와 대조),
    /// start_pos는 스트림 시작 지점입니다. send_transaction은
    /// 트랜잭션이 완성될 때마다 호출됩니다.
    pub fn new(
        dbname: impl Into<String>,
        daemon: MysqlDaemon,
        client_charset: Option<Charset>,
        start_pos: Position,
        send_transaction: SendTransactionFn,
    ) -> Self {
        Streamer {
            dbname: dbname.into(),
            daemon,
            client_charset,
            start_pos,
            send_transaction,
        }
    }

    /// 스트림 실행 - 네 가지 종료 조건 중 하나까지 돈다
    ///
    /// 반환: 도달한 최종 position과 종료 사유.
    /// - None: shutdown 신호로 중단 (정상)
    /// - Some(ClientEof): 소비자가 스트림을 끝냄
    /// - Some(ServerEof): 이벤트 채널이 닫힘
    /// - Some(기타): position 접두사가 붙은 치명적 에러
    pub async fn stream(
        mut self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> (Position, Option<StreamError>) {
        let mut conn = match self.daemon.new_slave_connection().await {
            Ok(conn) => conn,
            Err(e) => return self.stopped_at_start(e),
        };

        // 클라이언트가 charset을 선언했으면 서버 기본값과 일치해야 한다
        if let Some(client_charset) = self.client_charset {
            match conn.get_charset().await {
                Ok(server_charset) => {
                    info!(
                        "binlog stream client charset = {:?}, server charset = {:?}",
                        client_charset, server_charset
                    );
                    if server_charset != client_charset {
                        conn.close().await;
                        return self.stopped_at_start(StreamError::Charset(format!(
                            "client charset ({:?}) doesn't match server ({:?})",
                            client_charset, server_charset
                        )));
                    }
                }
                Err(e) => {
                    conn.close().await;
                    return self.stopped_at_start(StreamError::Charset(format!(
                        "can't get charset to check binlog stream: {}",
                        e
                    )));
                }
            }
        }

        let mut events = match conn.start_binlog_dump(&self.start_pos).await {
            Ok(events) => events,
            Err(e) => {
                conn.close().await;
                return self.stopped_at_start(e);
            }
        };

        let (pos, err) = self.parse_events(&mut shutdown, &mut events).await;
        if let Some((file, file_pos)) = conn.last_rotate() {
            info!("last observed binlog file: {}:{}", file, file_pos);
        }
        conn.close().await;

        let err = err.map(|e| e.at_position(pos.to_string()));
        info!("stream ended @ {}, err = {:?}", pos, err);
        (pos, err)
    }

    /// 스트림 시작 전에 실패한 경우의 반환값
    fn stopped_at_start(&self, err: StreamError) -> (Position, Option<StreamError>) {
        let pos = self.start_pos.clone();
        let err = err.at_position(pos.to_string());
        (pos, Some(err))
    }

    /// 이벤트 채널과 shutdown 신호를 다중화하며 이벤트를 소비한다
    ///
    /// 이벤트 채널이 닫히면 ServerEof, shutdown이 오면 에러 없이
    /// 끝납니다. 조립 중이던 statement는 버려집니다 (부분 트랜잭션은
    /// 절대 내보내지 않음).
    async fn parse_events(
        &mut self,
        shutdown: &mut broadcast::Receiver<()>,
        events: &mut mpsc::UnboundedReceiver<BinlogEvent>,
    ) -> (Position, Option<StreamError>) {
        let mut asm = TransactionAssembler::new(self.start_pos.clone());

        loop {
            let ev = tokio::select! {
                ev = events.recv() => match ev {
                    Some(ev) => ev,
                    None => {
                        info!("reached end of binlog event stream");
                        return (asm.pos, Some(StreamError::ServerEof));
                    }
                },
                _ = shutdown.recv() => {
                    info!("stopping early due to binlog streamer shutdown");
                    return (asm.pos, None);
                }
            };

            // 필드를 읽기 전에 버퍼 자기 일관성부터 검사
            if !ev.is_valid() {
                return (
                    asm.pos,
                    Some(StreamError::Parse(format!(
                        "can't parse binlog event, invalid data: {:?}",
                        ev
                    ))),
                );
            }

            // FORMAT_DESCRIPTION은 한 번 보고 끝이 아니다 - 로그 로테이션으로
            // 형식이 바뀌면 또 온다
            if ev.is_format_description() {
                match ev.decode_format() {
                    Ok(format) => {
                        info!(
                            "binlog format: server_version={}, dialect={:?}, checksum={:?}",
                            format.server_version, format.dialect, format.checksum_alg
                        );
                        asm.format = format;
                        continue;
                    }
                    Err(e) => {
                        return (
                            asm.pos,
                            Some(StreamError::Parse(format!(
                                "can't parse FORMAT_DESCRIPTION_EVENT: {}",
                                e
                            ))),
                        );
                    }
                }
            }

            // 형식을 모르면 아무것도 디코드할 수 없다. 형식 전에 허용되는
            // 것은 master가 현재 로그 파일명을 알리려 보내는 가짜
            // ROTATE_EVENT뿐이다.
            if asm.format.is_zero() {
                if ev.is_rotate() {
                    continue;
                }
                return (
                    asm.pos,
                    Some(StreamError::Parse(format!(
                        "got a real event before FORMAT_DESCRIPTION_EVENT: {:?}",
                        ev.event_type()
                    ))),
                );
            }

            // 체크섬은 검증하지 않고 떼어서 버린다
            let ev = match ev.strip_checksum(&asm.format) {
                Ok(ev) => ev,
                Err(e) => return (asm.pos, Some(e)),
            };

            // GTID가 실려 있으면 이벤트 종류와 무관하게 먼저 흡수한다
            // (Google dialect는 임의 이벤트 헤더에 GTID가 실린다)
            if ev.has_gtid(&asm.format) {
                match ev.gtid(&asm.format) {
                    Ok(gtid) => asm.absorb_gtid(gtid),
                    Err(e) => {
                        return (
                            asm.pos,
                            Some(StreamError::Gtid(format!(
                                "can't get GTID from binlog event: {}",
                                e
                            ))),
                        );
                    }
                }
            }

            match ev.event_type() {
                EventType::Gtid | EventType::MariadbGtid => {
                    if ev.is_begin_gtid(&asm.format) {
                        asm.begin();
                    }
                }
                EventType::Xid => {
                    if let Err(e) = asm.commit(ev.timestamp(), &mut self.send_transaction) {
                        return (asm.pos, Some(e));
                    }
                }
                EventType::Intvar => match ev.intvar(&asm.format) {
                    Ok((name, value)) => asm.append(Statement {
                        category: StatementCategory::Set,
                        sql: format!("SET {}={}", name, value),
                        charset: None,
                    }),
                    Err(e) => {
                        return (
                            asm.pos,
                            Some(StreamError::Parse(format!(
                                "can't parse INTVAR_EVENT: {}",
                                e
                            ))),
                        );
                    }
                },
                EventType::Rand => match ev.rand(&asm.format) {
                    Ok((seed1, seed2)) => asm.append(Statement {
                        category: StatementCategory::Set,
                        sql: format!("SET @@RAND_SEED1={}, @@RAND_SEED2={}", seed1, seed2),
                        charset: None,
                    }),
                    Err(e) => {
                        return (
                            asm.pos,
                            Some(StreamError::Parse(format!(
                                "can't parse RAND_EVENT: {}",
                                e
                            ))),
                        );
                    }
                },
                EventType::Query => {
                    if let Err(e) = self.handle_query(&mut asm, &ev) {
                        return (asm.pos, Some(e));
                    }
                }
                // 나머지 이벤트 종류는 관심 없음
                _ => {}
            }
        }
    }

    /// QUERY 이벤트 한 건 처리 (분류, 필터, TIMESTAMP 합성, charset 부착)
    fn handle_query(&mut self, asm: &mut TransactionAssembler, ev: &BinlogEvent) -> Result<()> {
        let q = ev
            .query(&asm.format)
            .map_err(|e| StreamError::Parse(format!("can't get query from binlog event: {}", e)))?;

        let category = statement_category(&q.sql);
        match category {
            StatementCategory::Begin => asm.begin(),
            StatementCategory::Rollback | StatementCategory::Commit => {
                if category == StatementCategory::Rollback {
                    // rollback도 빈 트랜잭션을 내보낸다 - 소비자가 GTID로
                    // position을 전진시킬 수 있어야 하기 때문
                    asm.pending = None;
                }
                asm.commit(ev.timestamp(), &mut self.send_transaction)?;
            }
            _ => {
                // 다른 데이터베이스를 겨냥한 statement는 통째로 건너뛴다
                if !q.database.is_empty() && q.database != self.dbname {
                    return Ok(());
                }

                let mut set_timestamp = Statement {
                    category: StatementCategory::Set,
                    sql: format!("SET TIMESTAMP={}", ev.timestamp()),
                    charset: None,
                };
                let mut statement = Statement {
                    category,
                    sql: q.sql,
                    charset: None,
                };
                // 이벤트 charset이 클라이언트 기본값과 다르면 statement에
                // 같이 실어 보낸다. 클라이언트가 안 알려줬으면 항상 싣는다.
                if self.client_charset.is_none()
                    || (q.charset.is_some() && q.charset != self.client_charset)
                {
                    set_timestamp.charset = q.charset;
                    statement.charset = q.charset;
                }
                asm.append(set_timestamp);
                asm.append(statement);

                if asm.autocommit {
                    asm.commit(ev.timestamp(), &mut self.send_transaction)?;
                }
            }
        }
        Ok(())
    }
}
