//! MySQL binlog 이벤트 추상화 및 개별 디코더
//!
//! 공통 이벤트 헤더 (19 바이트):
//!   - Timestamp (4 bytes)
//!   - Type (1 byte)
//!   - Server ID (4 bytes)
//!   - Event Length (4 bytes)
//!   - Next Position (4 bytes)
//!   - Flags (2 bytes)
//!
//! Google MySQL dialect는 확장 헤더(27 바이트)에 group id를 추가로
//! 싣습니다. 이벤트 본문의 해석은 전부 FORMAT_DESCRIPTION으로 발견한
//! BinlogFormat 하에서 지연 수행됩니다.

use crate::error::{Result, StreamError};
use crate::gtid::{format_uuid, Gtid};
use byteorder::{LittleEndian, ReadBytesExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};

/// 공통 이벤트 헤더 크기
pub const EVENT_HEADER_SIZE: usize = 19;
/// Google dialect 확장 헤더 크기 (group id 포함)
pub const GOOGLE_EVENT_HEADER_SIZE: usize = 27;
/// CRC32 체크섬 길이
const CHECKSUM_SIZE: usize = 4;

/// MariaDB GTID 이벤트의 standalone 플래그 - 서면 트랜잭션을 열지 않는다
const MARIADB_FL_STANDALONE: u8 = 1;

/// MySQL binlog 이벤트 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventType {
    /// 알 수 없는 이벤트
    Unknown = 0,
    /// 쿼리 이벤트 (DDL, DML, BEGIN/COMMIT/ROLLBACK)
    Query = 2,
    /// 스트림 정지
    Stop = 3,
    /// 로테이션 이벤트 (새 binlog 파일)
    Rotate = 4,
    /// INTVAR 이벤트 (LAST_INSERT_ID / INSERT_ID)
    Intvar = 5,
    /// RAND 이벤트 (난수 시드)
    Rand = 13,
    /// 형식 기술 이벤트 (헤더 크기, 체크섬 정책)
    FormatDescription = 15,
    /// XID 이벤트 (트랜잭션 커밋)
    Xid = 16,
    /// 테이블 맵 이벤트 (row 기반 복제)
    TableMap = 19,
    /// WRITE_ROWS 이벤트 (row 기반 복제)
    WriteRows = 30,
    /// UPDATE_ROWS 이벤트 (row 기반 복제)
    UpdateRows = 31,
    /// DELETE_ROWS 이벤트 (row 기반 복제)
    DeleteRows = 32,
    /// MySQL 5.6 GTID 이벤트
    Gtid = 33,
    /// 익명 GTID 이벤트
    AnonymousGtid = 34,
    /// 실행된 GTID 집합 이벤트
    PreviousGtids = 35,
    /// MariaDB GTID 이벤트
    MariadbGtid = 162,
    /// MariaDB GTID 목록 이벤트
    MariadbGtidList = 163,
}

impl EventType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            2 => EventType::Query,
            3 => EventType::Stop,
            4 => EventType::Rotate,
            5 => EventType::Intvar,
            13 => EventType::Rand,
            15 => EventType::FormatDescription,
            16 => EventType::Xid,
            19 => EventType::TableMap,
            30 => EventType::WriteRows,
            31 => EventType::UpdateRows,
            32 => EventType::DeleteRows,
            33 => EventType::Gtid,
            34 => EventType::AnonymousGtid,
            35 => EventType::PreviousGtids,
            162 => EventType::MariadbGtid,
            163 => EventType::MariadbGtidList,
            _ => EventType::Unknown,
        }
    }
}

/// Binlog 체크섬 알고리즘
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumAlg {
    /// 체크섬 없음
    #[default]
    Off,
    /// CRC32 (이벤트 꼬리 4 바이트)
    Crc32,
    /// 서버가 알고리즘을 알려주지 않음
    Undefined,
}

impl ChecksumAlg {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ChecksumAlg::Off,
            1 => ChecksumAlg::Crc32,
            _ => ChecksumAlg::Undefined,
        }
    }
}

/// Binlog dialect - FORMAT_DESCRIPTION의 server version 문자열로 판별
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinlogDialect {
    /// 5.6 GTID를 쓰는 stock MySQL
    #[default]
    Mysql56,
    /// MariaDB GTID
    Mariadb,
    /// 이벤트 헤더에 group id를 싣는 Google MySQL
    GoogleMysql,
}

/// 현재 binlog 파일의 이벤트 형식 메타데이터
///
/// FORMAT_DESCRIPTION 이벤트를 디코드하기 전까지는 zero 상태이며,
/// zero 상태에서 허용되는 이벤트는 rotate뿐입니다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinlogFormat {
    pub header_length: u8,
    pub checksum_alg: ChecksumAlg,
    pub server_version: String,
    pub dialect: BinlogDialect,
}

impl BinlogFormat {
    /// 아직 형식을 발견하지 못했는지 여부
    pub fn is_zero(&self) -> bool {
        self.header_length == 0
    }
}

/// 세션 charset 3요소 (collation id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charset {
    /// character_set_client
    pub client: u16,
    /// collation_connection
    pub conn: u16,
    /// collation_server
    pub server: u16,
}

/// QUERY 이벤트 payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEventData {
    pub database: String,
    pub charset: Option<Charset>,
    pub sql: String,
}

/// 원시 binlog 이벤트 버퍼
///
/// 드라이버가 패킷에서 떼어낸 그대로를 들고 있습니다. 필드 접근 전에
/// is_valid()로 자기 일관성을 검사해야 합니다.
#[derive(Debug, Clone, PartialEq)]
pub struct BinlogEvent {
    data: Vec<u8>,
}

impl BinlogEvent {
    pub fn new(data: Vec<u8>) -> Self {
        BinlogEvent { data }
    }

    /// 버퍼 자기 일관성 검사 (길이 필드와 실제 버퍼 길이 일치)
    pub fn is_valid(&self) -> bool {
        self.data.len() >= EVENT_HEADER_SIZE && self.event_length() as usize == self.data.len()
    }

    pub fn timestamp(&self) -> u32 {
        u32::from_le_bytes([self.data[0], self.data[1], self.data[2], self.data[3]])
    }

    pub fn event_type(&self) -> EventType {
        EventType::from_u8(self.data[4])
    }

    pub fn server_id(&self) -> u32 {
        u32::from_le_bytes([self.data[5], self.data[6], self.data[7], self.data[8]])
    }

    fn event_length(&self) -> u32 {
        u32::from_le_bytes([self.data[9], self.data[10], self.data[11], self.data[12]])
    }

    pub fn is_format_description(&self) -> bool {
        self.event_type() == EventType::FormatDescription
    }

    pub fn is_rotate(&self) -> bool {
        self.event_type() == EventType::Rotate
    }

    pub fn is_xid(&self) -> bool {
        self.event_type() == EventType::Xid
    }

    pub fn is_intvar(&self) -> bool {
        self.event_type() == EventType::Intvar
    }

    pub fn is_rand(&self) -> bool {
        self.event_type() == EventType::Rand
    }

    pub fn is_query(&self) -> bool {
        self.event_type() == EventType::Query
    }

    /// GTID 전용 이벤트인지 (dialect별 GTID 이벤트 타입)
    pub fn is_gtid_event(&self) -> bool {
        matches!(self.event_type(), EventType::Gtid | EventType::MariadbGtid)
    }

    /// 현재 형식의 헤더를 벗긴 이벤트 본문
    fn body(&self, format: &BinlogFormat) -> Result<&[u8]> {
        let header_length = format.header_length as usize;
        if self.data.len() < header_length {
            return Err(StreamError::Parse(format!(
                "event shorter than header: {} < {}",
                self.data.len(),
                header_length
            )));
        }
        Ok(&self.data[header_length..])
    }

    /// FORMAT_DESCRIPTION 이벤트에서 형식 메타데이터를 디코드
    pub fn decode_format(&self) -> Result<BinlogFormat> {
        if self.data.len() < EVENT_HEADER_SIZE + 57 {
            return Err(StreamError::Parse(format!(
                "FORMAT_DESCRIPTION too short: {} bytes",
                self.data.len()
            )));
        }

        let mut cursor = Cursor::new(&self.data[EVENT_HEADER_SIZE..]);
        let binlog_version = cursor.read_u16::<LittleEndian>()?;
        if binlog_version != 4 {
            return Err(StreamError::Parse(format!(
                "unsupported binlog version: {}",
                binlog_version
            )));
        }

        let mut version_bytes = [0u8; 50];
        Read::read_exact(&mut cursor, &mut version_bytes)?;
        let server_version = String::from_utf8_lossy(&version_bytes)
            .trim_end_matches('\0')
            .to_string();
        let _create_timestamp = cursor.read_u32::<LittleEndian>()?;
        let header_length = cursor.read_u8()?;

        // 체크섬을 아는 서버는 이벤트 꼬리 직전에 알고리즘 바이트를 싣는다
        let checksum_alg = if supports_checksum(&server_version)?
            && self.data.len() >= EVENT_HEADER_SIZE + 57 + 1 + CHECKSUM_SIZE
        {
            ChecksumAlg::from_u8(self.data[self.data.len() - CHECKSUM_SIZE - 1])
        } else {
            ChecksumAlg::Off
        };

        let dialect = detect_dialect(&server_version);
        Ok(BinlogFormat {
            header_length,
            checksum_alg,
            server_version,
            dialect,
        })
    }

    /// 체크섬 구간을 떼어낸 이벤트로 변환한다. 값은 검증 없이 버린다.
    pub fn strip_checksum(mut self, format: &BinlogFormat) -> Result<BinlogEvent> {
        match format.checksum_alg {
            ChecksumAlg::Crc32 => {
                if self.data.len() < format.header_length as usize + CHECKSUM_SIZE {
                    return Err(StreamError::Parse(format!(
                        "event too short to strip checksum: {} bytes",
                        self.data.len()
                    )));
                }
                self.data.truncate(self.data.len() - CHECKSUM_SIZE);
                Ok(self)
            }
            _ => Ok(self),
        }
    }

    /// 이벤트가 GTID를 싣고 있는지 (dialect 의존)
    ///
    /// Google dialect는 GTID 전용 이벤트가 아니라 임의 이벤트의 확장
    /// 헤더에 group id가 실립니다.
    pub fn has_gtid(&self, format: &BinlogFormat) -> bool {
        match format.dialect {
            BinlogDialect::Mysql56 => self.event_type() == EventType::Gtid,
            BinlogDialect::Mariadb => self.event_type() == EventType::MariadbGtid,
            BinlogDialect::GoogleMysql => self.google_group_id().unwrap_or(0) != 0,
        }
    }

    fn google_group_id(&self) -> Option<u64> {
        if self.data.len() < GOOGLE_EVENT_HEADER_SIZE {
            return None;
        }
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.data[EVENT_HEADER_SIZE..GOOGLE_EVENT_HEADER_SIZE]);
        Some(u64::from_le_bytes(raw))
    }

    /// 이벤트에서 GTID 디코드
    pub fn gtid(&self, format: &BinlogFormat) -> Result<Gtid> {
        match format.dialect {
            BinlogDialect::Mysql56 => {
                let mut cursor = Cursor::new(self.body(format)?);
                let _commit_flag = cursor.read_u8()?;
                let mut sid = [0u8; 16];
                Read::read_exact(&mut cursor, &mut sid)?;
                let sequence = cursor.read_u64::<LittleEndian>()?;
                Ok(Gtid::Mysql56 {
                    server_uuid: format_uuid(&sid),
                    sequence,
                })
            }
            BinlogDialect::Mariadb => {
                let mut cursor = Cursor::new(self.body(format)?);
                let sequence = cursor.read_u64::<LittleEndian>()?;
                let domain = cursor.read_u32::<LittleEndian>()?;
                Ok(Gtid::Mariadb {
                    domain,
                    server_id: self.server_id(),
                    sequence,
                })
            }
            BinlogDialect::GoogleMysql => {
                let group_id = self.google_group_id().ok_or_else(|| {
                    StreamError::Gtid("event header too short for group id".to_string())
                })?;
                Ok(Gtid::Google { group_id })
            }
        }
    }

    /// GTID 이벤트가 트랜잭션 시작을 겸하는지
    ///
    /// MariaDB GTID 이벤트는 standalone 플래그가 꺼져 있으면 BEGIN을
    /// 겸합니다. stock MySQL은 명시적 BEGIN 쿼리를, Google은 쿼리
    /// 이벤트를 따로 보냅니다.
    pub fn is_begin_gtid(&self, format: &BinlogFormat) -> bool {
        if format.dialect != BinlogDialect::Mariadb || self.event_type() != EventType::MariadbGtid {
            return false;
        }
        match self.body(format) {
            Ok(body) if body.len() >= 13 => body[12] & MARIADB_FL_STANDALONE == 0,
            _ => false,
        }
    }

    /// INTVAR 이벤트 디코드 → (변수명, 값)
    pub fn intvar(&self, format: &BinlogFormat) -> Result<(&'static str, u64)> {
        let mut cursor = Cursor::new(self.body(format)?);
        let kind = cursor.read_u8()?;
        let value = cursor.read_u64::<LittleEndian>()?;
        let name = match kind {
            1 => "LAST_INSERT_ID",
            2 => "INSERT_ID",
            other => {
                return Err(StreamError::Parse(format!(
                    "unknown INTVAR type: {}",
                    other
                )))
            }
        };
        Ok((name, value))
    }

    /// RAND 이벤트 디코드 → 두 개의 난수 시드
    pub fn rand(&self, format: &BinlogFormat) -> Result<(u64, u64)> {
        let mut cursor = Cursor::new(self.body(format)?);
        let seed1 = cursor.read_u64::<LittleEndian>()?;
        let seed2 = cursor.read_u64::<LittleEndian>()?;
        Ok((seed1, seed2))
    }

    /// QUERY 이벤트 디코드
    pub fn query(&self, format: &BinlogFormat) -> Result<QueryEventData> {
        let body = self.body(format)?;
        let mut cursor = Cursor::new(body);
        let _thread_id = cursor.read_u32::<LittleEndian>()?;
        let _exec_time = cursor.read_u32::<LittleEndian>()?;
        let db_len = cursor.read_u8()? as usize;
        let _error_code = cursor.read_u16::<LittleEndian>()?;
        let status_len = cursor.read_u16::<LittleEndian>()? as usize;

        let status_start = cursor.position() as usize;
        // status 블록 + 데이터베이스명 + null 종결자까지는 있어야 한다
        if body.len() < status_start + status_len + db_len + 1 {
            return Err(StreamError::Parse(format!(
                "query event too short: {} bytes",
                body.len()
            )));
        }

        let charset = parse_charset_status_var(&body[status_start..status_start + status_len]);

        let db_start = status_start + status_len;
        let database = String::from_utf8_lossy(&body[db_start..db_start + db_len]).to_string();
        let sql_start = db_start + db_len + 1;
        let sql = String::from_utf8_lossy(&body[sql_start..]).to_string();

        Ok(QueryEventData {
            database,
            charset,
            sql,
        })
    }

    /// ROTATE 이벤트 디코드 → (다음 파일명, 시작 위치)
    pub fn rotate(&self) -> Result<(String, u64)> {
        if self.data.len() < EVENT_HEADER_SIZE + 8 {
            return Err(StreamError::Parse(format!(
                "rotate event too short: {} bytes",
                self.data.len()
            )));
        }
        let mut cursor = Cursor::new(&self.data[EVENT_HEADER_SIZE..]);
        let position = cursor.read_u64::<LittleEndian>()?;
        let filename =
            String::from_utf8_lossy(&self.data[EVENT_HEADER_SIZE + 8..]).to_string();
        Ok((filename, position))
    }
}

/// server version 문자열에서 dialect 판별
fn detect_dialect(server_version: &str) -> BinlogDialect {
    let version = server_version.to_lowercase();
    if version.contains("mariadb") {
        BinlogDialect::Mariadb
    } else if version.contains("google") {
        BinlogDialect::GoogleMysql
    } else {
        BinlogDialect::Mysql56
    }
}

/// 체크섬 알고리즘 바이트를 싣는 서버인지 (MySQL 5.6.1+, MariaDB 5.3+)
fn supports_checksum(server_version: &str) -> Result<bool> {
    let pattern = Regex::new(r"^(\d+)\.(\d+)").map_err(|e| StreamError::Parse(e.to_string()))?;
    let captures = match pattern.captures(server_version) {
        Some(captures) => captures,
        None => return Ok(false),
    };
    let major: u32 = captures[1].parse().unwrap_or(0);
    let minor: u32 = captures[2].parse().unwrap_or(0);

    let lower = server_version.to_lowercase();
    if lower.contains("google") {
        Ok(false)
    } else if lower.contains("mariadb") {
        Ok((major, minor) >= (5, 3))
    } else {
        Ok((major, minor) >= (5, 6))
    }
}

/// status 변수 블록에서 Q_CHARSET_CODE를 찾는다
///
/// 알려진 키만 건너뛰고 모르는 키를 만나면 중단합니다. 블록 전체를
/// 해석할 필요는 없습니다.
fn parse_charset_status_var(mut block: &[u8]) -> Option<Charset> {
    while !block.is_empty() {
        let key = block[0];
        block = &block[1..];
        match key {
            // Q_FLAGS2
            0x00 => block = block.get(4..)?,
            // Q_SQL_MODE
            0x01 => block = block.get(8..)?,
            // Q_CATALOG (길이 + 데이터 + null)
            0x02 => {
                let len = *block.first()? as usize;
                block = block.get(len + 2..)?;
            }
            // Q_AUTO_INCREMENT
            0x03 => block = block.get(4..)?,
            // Q_CHARSET_CODE
            0x04 => {
                if block.len() < 6 {
                    return None;
                }
                return Some(Charset {
                    client: u16::from_le_bytes([block[0], block[1]]),
                    conn: u16::from_le_bytes([block[2], block[3]]),
                    server: u16::from_le_bytes([block[4], block[5]]),
                });
            }
            // Q_TIME_ZONE (길이 + 데이터)
            0x05 => {
                let len = *block.first()? as usize;
                block = block.get(len + 1..)?;
            }
            // Q_CATALOG_NZ (길이 + 데이터)
            0x06 => {
                let len = *block.first()? as usize;
                block = block.get(len + 1..)?;
            }
            _ => return None,
        }
    }
    None
}


#[cfg(test)]
mod tests {
    use super::synthetic::*;
    use super::*;

    const UUID: &str = "550e8400-e29b-41d4-a716-446655440000";

    #[test]
    fn test_validity() {
        assert!(format_description("5.6.33-log").is_valid());
        assert!(!BinlogEvent::new(vec![0u8; 10]).is_valid());

        // 길이 필드가 버퍼와 어긋나면 invalid
        let mut data = vec![0u8; 30];
        data[9] = 99;
        assert!(!BinlogEvent::new(data).is_valid());
    }

    #[test]
    fn test_decode_format_mysql56() {
        let format = format_description("5.6.33-log").decode_format().unwrap();
        assert_eq!(format.header_length as usize, EVENT_HEADER_SIZE);
        assert_eq!(format.dialect, BinlogDialect::Mysql56);
        assert_eq!(format.checksum_alg, ChecksumAlg::Off);
        assert_eq!(format.server_version, "5.6.33-log");
        assert!(!format.is_zero());
    }

    #[test]
    fn test_decode_format_mariadb_with_crc32() {
        let format = format_description_with("10.1.21-MariaDB", EVENT_HEADER_SIZE as u8, 1)
            .decode_format()
            .unwrap();
        assert_eq!(format.dialect, BinlogDialect::Mariadb);
        assert_eq!(format.checksum_alg, ChecksumAlg::Crc32);
    }

    #[test]
    fn test_decode_format_google() {
        let format =
            format_description_with("5.1.63-google-log", GOOGLE_EVENT_HEADER_SIZE as u8, 0)
                .decode_format()
                .unwrap();
        assert_eq!(format.dialect, BinlogDialect::GoogleMysql);
        assert_eq!(format.header_length as usize, GOOGLE_EVENT_HEADER_SIZE);
        assert_eq!(format.checksum_alg, ChecksumAlg::Off);
    }

    #[test]
    fn test_old_server_has_no_checksum_byte() {
        let format = format_description("5.5.40").decode_format().unwrap();
        assert_eq!(format.checksum_alg, ChecksumAlg::Off);
    }

    #[test]
    fn test_strip_checksum() {
        let format = BinlogFormat {
            header_length: EVENT_HEADER_SIZE as u8,
            checksum_alg: ChecksumAlg::Crc32,
            server_version: "5.6.33-log".to_string(),
            dialect: BinlogDialect::Mysql56,
        };

        let mut body = 7u64.to_le_bytes().to_vec();
        body.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]); // 체크섬 자리
        let stripped = build_event(16, 3, 1, &body)
            .strip_checksum(&format)
            .unwrap();
        // 꼬리 4바이트가 떨어져 나가고 XID 본문만 남는다
        assert_eq!(stripped.body(&format).unwrap(), &7u64.to_le_bytes());

        let off = BinlogFormat {
            checksum_alg: ChecksumAlg::Off,
            ..format
        };
        let untouched = build_event(16, 3, 1, &7u64.to_le_bytes())
            .strip_checksum(&off)
            .unwrap();
        assert_eq!(untouched.body(&off).unwrap().len(), 8);
    }

    #[test]
    fn test_mysql56_gtid_decode() {
        let format = format_description("5.6.33-log").decode_format().unwrap();
        let event = mysql56_gtid(UUID, 42);
        assert!(event.has_gtid(&format));
        assert!(event.is_gtid_event());
        assert!(!event.is_begin_gtid(&format));
        assert_eq!(
            event.gtid(&format).unwrap(),
            Gtid::Mysql56 {
                server_uuid: UUID.to_string(),
                sequence: 42
            }
        );
    }

    #[test]
    fn test_mariadb_gtid_decode_and_begin_flag() {
        let format = format_description("10.1.21-MariaDB").decode_format().unwrap();

        let begin = mariadb_gtid(0, 1, 10, false);
        assert!(begin.has_gtid(&format));
        assert!(begin.is_begin_gtid(&format));
        assert_eq!(
            begin.gtid(&format).unwrap(),
            Gtid::Mariadb {
                domain: 0,
                server_id: 1,
                sequence: 10
            }
        );

        let standalone = mariadb_gtid(0, 1, 11, true);
        assert!(!standalone.is_begin_gtid(&format));
    }

    #[test]
    fn test_google_group_id_in_any_event() {
        let format =
            format_description_with("5.1.63-google-log", GOOGLE_EVENT_HEADER_SIZE as u8, 0)
                .decode_format()
                .unwrap();

        let event = build_google_event(16, 9, 77, &1u64.to_le_bytes());
        assert!(event.has_gtid(&format));
        assert_eq!(event.gtid(&format).unwrap(), Gtid::Google { group_id: 77 });

        // group id 0은 GTID가 없다는 뜻
        let bare = build_google_event(16, 9, 0, &1u64.to_le_bytes());
        assert!(!bare.has_gtid(&format));
    }

    #[test]
    fn test_intvar_decode() {
        let format = format_description("5.6.33-log").decode_format().unwrap();
        assert_eq!(
            intvar(2, 5).intvar(&format).unwrap(),
            ("INSERT_ID", 5)
        );
        assert_eq!(
            intvar(1, 9).intvar(&format).unwrap(),
            ("LAST_INSERT_ID", 9)
        );
        assert!(intvar(3, 1).intvar(&format).is_err());
    }

    #[test]
    fn test_rand_decode() {
        let format = format_description("5.6.33-log").decode_format().unwrap();
        assert_eq!(rand_seeds(3, 4).rand(&format).unwrap(), (3, 4));
    }

    #[test]
    fn test_query_decode() {
        let format = format_description("5.6.33-log").decode_format().unwrap();
        let event = query("testdb", "insert into t values(1)", 100);
        let q = event.query(&format).unwrap();
        assert_eq!(q.database, "testdb");
        assert_eq!(q.sql, "insert into t values(1)");
        assert_eq!(q.charset, None);
        assert_eq!(event.timestamp(), 100);
    }

    #[test]
    fn test_query_decode_with_charset_status_var() {
        let format = format_description("5.6.33-log").decode_format().unwrap();
        let charset = Charset {
            client: 33,
            conn: 33,
            server: 33,
        };
        let event = query_with_charset("testdb", "update t set a=1", 7, Some(charset));
        let q = event.query(&format).unwrap();
        assert_eq!(q.charset, Some(charset));
    }

    #[test]
    fn test_charset_status_var_after_other_keys() {
        // Q_FLAGS2와 Q_SQL_MODE 뒤에 실린 Q_CHARSET_CODE도 찾아야 한다
        let mut block = vec![0x00];
        block.extend_from_slice(&0u32.to_le_bytes());
        block.push(0x01);
        block.extend_from_slice(&0u64.to_le_bytes());
        block.push(0x04);
        block.extend_from_slice(&8u16.to_le_bytes());
        block.extend_from_slice(&8u16.to_le_bytes());
        block.extend_from_slice(&8u16.to_le_bytes());

        assert_eq!(
            parse_charset_status_var(&block),
            Some(Charset {
                client: 8,
                conn: 8,
                server: 8
            })
        );
        assert_eq!(parse_charset_status_var(&[]), None);
    }

    #[test]
    fn test_rotate_decode() {
        let (filename, position) = rotate_event("mysql-bin.000002", 4).rotate().unwrap();
        assert_eq!(filename, "mysql-bin.000002");
        assert_eq!(position, 4);
    }
}
