//! 복제 슬레이브 연결 관리
//!
//! MysqlDaemon이 슬레이브 연결을 열고, SlaveConnection이 charset
//! 조회 / binlog dump 시작 / 해제를 담당합니다. dump는 원시 패킷
//! 채널로, 관리 쿼리는 mysql_async 연결로 나갑니다.

use crate::auth;
use crate::error::{Result, StreamError};
use crate::events::{BinlogEvent, Charset, EventType};
use crate::gtid::{parse_uuid, GtidSet, Position};
use crate::protocol::{classify_dump_packet, DumpPacket, GreetingPacket, PacketChannel};
use byteorder::{LittleEndian, WriteBytesExt};
use mysql_async::prelude::*;
use parking_lot::RwLock;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// COM_QUERY 명령어 코드
const COM_QUERY: u8 = 0x03;
/// COM_BINLOG_DUMP 명령어 코드
const COM_BINLOG_DUMP: u8 = 0x12;
/// COM_BINLOG_DUMP_GTID 명령어 코드
const COM_BINLOG_DUMP_GTID: u8 = 0x1e;

/// MySQL 연결 설정
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: Option<String>,
    pub server_id: u32,
    pub timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            hostname: "localhost".to_string(),
            port: 3306,
            username: "root".to_string(),
            password: String::new(),
            database: None,
            server_id: 1,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ConnectionConfig {
    pub fn new(hostname: impl Into<String>, username: impl Into<String>) -> Self {
        ConnectionConfig {
            hostname: hostname.into(),
            username: username.into(),
            ..Default::default()
        }
    }

    fn opts(&self) -> Result<mysql_async::Opts> {
        let connection_string = if let Some(ref db) = self.database {
            format!(
                "mysql://{}:{}@{}:{}/{}",
                self.username, self.password, self.hostname, self.port, db
            )
        } else {
            format!(
                "mysql://{}:{}@{}:{}",
                self.username, self.password, self.hostname, self.port
            )
        };

        connection_string.parse().map_err(|_| {
            StreamError::Connection("failed to parse connection string".to_string())
        })
    }
}

/// 슬레이브 연결을 만들어 주는 MySQL 데몬 핸들
#[derive(Debug, Clone)]
pub struct MysqlDaemon {
    config: ConnectionConfig,
}

impl MysqlDaemon {
    pub fn new(config: ConnectionConfig) -> Self {
        MysqlDaemon { config }
    }

    /// 복제 슬레이브 연결을 연다 (세션당 정확히 한 번)
    pub async fn new_slave_connection(&self) -> Result<SlaveConnection> {
        // 관리 쿼리용 연결 (charset 검사 등)
        let admin = mysql_async::Conn::new(self.config.opts()?)
            .await
            .map_err(|e| StreamError::Connection(format!("failed to connect to MySQL: {}", e)))?;

        // binlog dump용 원시 연결
        let mut channel = PacketChannel::connect(&self.config.hostname, self.config.port).await?;
        let greeting = GreetingPacket::parse(&channel.read_packet().await?)?;
        info!(
            "mysqld version {}, thread id {}",
            greeting.server_version, greeting.thread_id
        );

        let response = auth::handshake_response(
            &self.config.username,
            &self.config.password,
            self.config.database.as_deref(),
            &greeting.scramble,
            greeting.server_collation,
        )?;
        channel.write_packet(&response, 1).await?;

        match classify_dump_packet(channel.read_packet().await?) {
            DumpPacket::Err(code, message) => {
                return Err(StreamError::Connection(format!(
                    "authentication failed ({}): {}",
                    code, message
                )));
            }
            _ => debug!("authentication successful"),
        }

        Ok(SlaveConnection {
            server_id: self.config.server_id,
            channel: Some(channel),
            admin: Some(admin),
            reader: None,
            rotate_pos: Arc::new(RwLock::new(None)),
        })
    }
}

/// 열린 복제 슬레이브 연결
///
/// 세션이 단독으로 소유하며 어떤 종료 경로에서든 close()로 해제됩니다.
pub struct SlaveConnection {
    server_id: u32,
    channel: Option<PacketChannel>,
    admin: Option<mysql_async::Conn>,
    reader: Option<JoinHandle<()>>,
    rotate_pos: Arc<RwLock<Option<(String, u64)>>>,
}

impl SlaveConnection {
    /// 서버 세션 charset 3요소를 collation id로 조회
    pub async fn get_charset(&mut self) -> Result<Charset> {
        let admin = self
            .admin
            .as_mut()
            .ok_or_else(|| StreamError::Connection("connection already closed".to_string()))?;

        let row: Option<(u16, u16, u16)> = admin
            .query_first(
                "SELECT \
                 (SELECT ID FROM information_schema.COLLATIONS \
                  WHERE CHARACTER_SET_NAME = @@character_set_client AND IS_DEFAULT = 'Yes'), \
                 (SELECT ID FROM information_schema.COLLATIONS \
                  WHERE COLLATION_NAME = @@collation_connection), \
                 (SELECT ID FROM information_schema.COLLATIONS \
                  WHERE COLLATION_NAME = @@collation_server)",
            )
            .await
            .map_err(|e| StreamError::Query(format!("failed to query charset: {}", e)))?;

        let (client, conn, server) =
            row.ok_or_else(|| StreamError::Query("no charset row returned".to_string()))?;
        Ok(Charset {
            client,
            conn,
            server,
        })
    }

    /// binlog dump를 시작하고 이벤트 채널을 돌려준다
    ///
    /// dialect별 dump 명령을 보낸 뒤, 리더 태스크가 패킷을 이벤트로
    /// 바꿔 채널에 밀어 넣습니다. 서버 측 종료나 에러는 채널을 닫는
    /// 것으로 표현됩니다.
    pub async fn start_binlog_dump(
        &mut self,
        start_pos: &Position,
    ) -> Result<mpsc::UnboundedReceiver<BinlogEvent>> {
        let mut channel = self
            .channel
            .take()
            .ok_or_else(|| StreamError::Connection("binlog dump already started".to_string()))?;

        // 서버가 체크섬을 켜 뒀으면 이벤트에 그대로 실어 보내게 한다.
        // 떼어내는 쪽은 파서다.
        channel
            .write_packet(
                &com_query("SET @master_binlog_checksum = @@global.binlog_checksum"),
                0,
            )
            .await?;
        if let DumpPacket::Err(code, message) = classify_dump_packet(channel.read_packet().await?) {
            warn!(
                "failed to forward binlog checksum setting ({}): {}",
                code, message
            );
        }

        match start_pos {
            Position::Empty | Position::Mysql56(_) => {
                let set = match start_pos {
                    Position::Mysql56(set) => set.clone(),
                    _ => GtidSet::default(),
                };
                channel
                    .write_packet(&binlog_dump_gtid_command(self.server_id, &set)?, 0)
                    .await?;
                info!("sent COM_BINLOG_DUMP_GTID from position '{}'", start_pos);
            }
            Position::Mariadb(_) => {
                // MariaDB는 세션 변수로 시작 GTID를 받는다
                let connect_state = format!("SET @slave_connect_state = '{}'", start_pos);
                channel.write_packet(&com_query(&connect_state), 0).await?;
                if let DumpPacket::Err(code, message) =
                    classify_dump_packet(channel.read_packet().await?)
                {
                    return Err(StreamError::Connection(format!(
                        "failed to set slave_connect_state ({}): {}",
                        code, message
                    )));
                }
                channel
                    .write_packet(&binlog_dump_command(self.server_id), 0)
                    .await?;
                info!("sent COM_BINLOG_DUMP from position '{}'", start_pos);
            }
            Position::Google(_) => {
                return Err(StreamError::Connection(
                    "can't initiate a dump at a group id position; resolve it to a file position upstream"
                        .to_string(),
                ));
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let rotate_pos = self.rotate_pos.clone();
        self.reader = Some(tokio::spawn(async move {
            read_dump_stream(channel, tx, rotate_pos).await;
        }));
        Ok(rx)
    }

    /// 마지막으로 관측한 rotate 파일/위치 (로그용)
    pub fn last_rotate(&self) -> Option<(String, u64)> {
        self.rotate_pos.read().clone()
    }

    /// 연결 해제 - 몇 번을 불러도 안전하다
    pub async fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.channel = None;
        if let Some(admin) = self.admin.take() {
            if let Err(e) = admin.disconnect().await {
                debug!("error closing admin connection: {}", e);
            }
        }
    }
}

impl Drop for SlaveConnection {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// dump 스트림을 이벤트 채널로 퍼 나르는 리더 루프
async fn read_dump_stream(
    mut channel: PacketChannel,
    tx: mpsc::UnboundedSender<BinlogEvent>,
    rotate_pos: Arc<RwLock<Option<(String, u64)>>>,
) {
    loop {
        let packet = match channel.read_packet().await {
            Ok(packet) => packet,
            Err(e) => {
                info!("binlog dump connection closed: {}", e);
                break;
            }
        };

        match classify_dump_packet(packet) {
            DumpPacket::Event(data) => {
                let event = BinlogEvent::new(data);
                if event.is_valid() && event.event_type() == EventType::Rotate {
                    if let Ok((file, pos)) = event.rotate() {
                        debug!("binlog rotated to {}:{}", file, pos);
                        *rotate_pos.write() = Some((file, pos));
                    }
                }
                if tx.send(event).is_err() {
                    // 수신 측이 먼저 떠났다
                    break;
                }
            }
            DumpPacket::Eof => {
                info!("received EOF packet, binlog dump ended");
                break;
            }
            DumpPacket::Err(code, message) => {
                error!("binlog dump error ({}): {}", code, message);
                break;
            }
        }
    }
    // tx가 drop되며 채널이 닫히고, 파서는 server EOF로 끝난다
}

/// COM_QUERY 패킷 본문
fn com_query(sql: &str) -> Vec<u8> {
    let mut packet = Vec::with_capacity(1 + sql.len());
    packet.push(COM_QUERY);
    packet.extend_from_slice(sql.as_bytes());
    packet
}

/// COM_BINLOG_DUMP 명령어 (파일 기반, MariaDB 경로)
fn binlog_dump_command(server_id: u32) -> Vec<u8> {
    let mut buffer = Vec::new();
    buffer.push(COM_BINLOG_DUMP);
    buffer.extend_from_slice(&4u32.to_le_bytes()); // 매직 헤더 직후부터
    buffer.extend_from_slice(&0u16.to_le_bytes()); // 플래그
    buffer.extend_from_slice(&server_id.to_le_bytes());
    // 파일명 생략: slave_connect_state가 시작점을 결정한다
    buffer
}

/// COM_BINLOG_DUMP_GTID 명령어 (MySQL 5.6 GTID 집합 기반)
fn binlog_dump_gtid_command(server_id: u32, gtid_set: &GtidSet) -> Result<Vec<u8>> {
    let sid_block = encode_sid_block(gtid_set)?;
    let mut buffer = Vec::new();
    buffer.write_u8(COM_BINLOG_DUMP_GTID)?;
    buffer.write_u16::<LittleEndian>(0)?; // 플래그
    buffer.write_u32::<LittleEndian>(server_id)?;
    buffer.write_u32::<LittleEndian>(0)?; // 파일명 길이 (GTID가 시작점을 결정)
    buffer.write_u64::<LittleEndian>(4)?; // 파일 내 위치
    buffer.write_u32::<LittleEndian>(sid_block.len() as u32)?;
    buffer.write_all(&sid_block)?;
    Ok(buffer)
}

/// GTID 집합의 SID block 인코딩 (n_sids, sid별 interval 목록)
fn encode_sid_block(gtid_set: &GtidSet) -> Result<Vec<u8>> {
    let mut block = Vec::new();
    block.write_u64::<LittleEndian>(gtid_set.sets.len() as u64)?;
    for (server_uuid, ranges) in &gtid_set.sets {
        block.write_all(&parse_uuid(server_uuid)?)?;
        block.write_u64::<LittleEndian>(ranges.len() as u64)?;
        for range in ranges {
            block.write_u64::<LittleEndian>(range.start)?;
            // interval 끝은 exclusive
            block.write_u64::<LittleEndian>(range.end + 1)?;
        }
    }
    Ok(block)
}
