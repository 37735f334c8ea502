//! GTID (Global Transaction ID) 및 재시작 position 관리
//!
//! 지원하는 dialect:
//! - MySQL 5.6: "uuid:sequence", position은 GTID 집합 ("uuid:1-100:200,...")
//! - MariaDB: "domain-server-sequence", position은 domain별 최신 GTID
//! - Google MySQL: 단조 증가 group id, position은 마지막 group id

use crate::error::{Result, StreamError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// dialect 태그가 붙은 단일 커밋 트랜잭션 식별자
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gtid {
    /// MySQL 5.6 스타일: 서버 UUID + 시퀀스 번호
    Mysql56 { server_uuid: String, sequence: u64 },
    /// MariaDB 스타일: 도메인 + 서버 ID + 시퀀스 번호
    Mariadb {
        domain: u32,
        server_id: u32,
        sequence: u64,
    },
    /// Google MySQL 스타일: 전역 단조 증가 group id
    Google { group_id: u64 },
}

impl Gtid {
    /// GTID 문자열 파싱 (dialect은 표기 형태로 판별)
    pub fn parse(input: &str) -> Result<Gtid> {
        if let Some((server_uuid, sequence)) = input.split_once(':') {
            let sequence = sequence
                .parse()
                .map_err(|_| StreamError::Gtid(format!("invalid sequence: {}", sequence)))?;
            return Ok(Gtid::Mysql56 {
                server_uuid: server_uuid.to_string(),
                sequence,
            });
        }

        let fields: Vec<&str> = input.split('-').collect();
        if fields.len() == 3 {
            let parse_field = |s: &str| {
                s.parse::<u64>()
                    .map_err(|_| StreamError::Gtid(format!("invalid GTID field: {}", s)))
            };
            return Ok(Gtid::Mariadb {
                domain: parse_field(fields[0])? as u32,
                server_id: parse_field(fields[1])? as u32,
                sequence: parse_field(fields[2])?,
            });
        }

        let group_id = input
            .parse()
            .map_err(|_| StreamError::Gtid(format!("unrecognized GTID: {}", input)))?;
        Ok(Gtid::Google { group_id })
    }
}

impl fmt::Display for Gtid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gtid::Mysql56 {
                server_uuid,
                sequence,
            } => write!(f, "{}:{}", server_uuid, sequence),
            Gtid::Mariadb {
                domain,
                server_id,
                sequence,
            } => write!(f, "{}-{}-{}", domain, server_id, sequence),
            Gtid::Google { group_id } => write!(f, "{}", group_id),
        }
    }
}

/// 단일 서버 UUID의 연속 시퀀스 구간
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GtidRange {
    pub start: u64,
    pub end: u64,
}

impl GtidRange {
    fn new(start: u64, end: u64) -> Result<GtidRange> {
        if start > end {
            return Err(StreamError::Gtid(format!(
                "invalid range: {}-{}",
                start, end
            )));
        }
        Ok(GtidRange { start, end })
    }

    fn contains(&self, sequence: u64) -> bool {
        sequence >= self.start && sequence <= self.end
    }

    /// 겹치거나 맞닿은 구간 병합
    fn merge(&self, other: &GtidRange) -> Option<GtidRange> {
        if self.end.saturating_add(1) >= other.start && other.end.saturating_add(1) >= self.start {
            Some(GtidRange {
                start: self.start.min(other.start),
                end: self.end.max(other.end),
            })
        } else {
            None
        }
    }
}

/// MySQL 5.6 GTID 집합 (서버 UUID별 병합된 구간 목록)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GtidSet {
    pub(crate) sets: BTreeMap<String, Vec<GtidRange>>,
}

impl GtidSet {
    pub fn new() -> Self {
        GtidSet::default()
    }

    /// GTID 집합 문자열 파싱 (format: "uuid:1-100:200,uuid2:1-50")
    pub fn parse(input: &str) -> Result<GtidSet> {
        let mut set = GtidSet::new();
        if input.is_empty() {
            return Ok(set);
        }

        for entry in input.split(',') {
            let entry = entry.trim();
            let (server_uuid, intervals) = entry
                .split_once(':')
                .ok_or_else(|| StreamError::Gtid(format!("invalid GTID set entry: {}", entry)))?;

            let mut ranges = Vec::new();
            for interval in intervals.split(':') {
                let range = if let Some((start, end)) = interval.split_once('-') {
                    GtidRange::new(parse_sequence(start)?, parse_sequence(end)?)?
                } else {
                    let sequence = parse_sequence(interval)?;
                    GtidRange {
                        start: sequence,
                        end: sequence,
                    }
                };
                ranges.push(range);
            }
            ranges.sort();
            set.sets.insert(server_uuid.to_string(), ranges);
        }

        Ok(set)
    }

    /// 시퀀스 하나를 더하고 인접 구간과 병합한다
    pub fn add(&mut self, server_uuid: &str, sequence: u64) {
        let ranges = self.sets.entry(server_uuid.to_string()).or_default();
        let single = GtidRange {
            start: sequence,
            end: sequence,
        };

        for i in 0..ranges.len() {
            if let Some(merged) = ranges[i].merge(&single) {
                ranges[i] = merged;
                // 다음 구간과도 이어졌을 수 있다
                if i + 1 < ranges.len() {
                    if let Some(joined) = ranges[i].merge(&ranges[i + 1]) {
                        ranges[i] = joined;
                        ranges.remove(i + 1);
                    }
                }
                return;
            }
        }

        ranges.push(single);
        ranges.sort();
    }

    pub fn contains(&self, server_uuid: &str, sequence: u64) -> bool {
        self.sets
            .get(server_uuid)
            .map(|ranges| ranges.iter().any(|r| r.contains(sequence)))
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.sets.values().all(|ranges| ranges.is_empty())
    }
}

impl fmt::Display for GtidSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (server_uuid, ranges) in &self.sets {
            if ranges.is_empty() {
                continue;
            }
            if !first {
                write!(f, ",")?;
            }
            first = false;
            write!(f, "{}", server_uuid)?;
            for range in ranges {
                if range.start == range.end {
                    write!(f, ":{}", range.start)?;
                } else {
                    write!(f, ":{}-{}", range.start, range.end)?;
                }
            }
        }
        Ok(())
    }
}

fn parse_sequence(input: &str) -> Result<u64> {
    input
        .trim()
        .parse()
        .map_err(|_| StreamError::Gtid(format!("invalid sequence: {}", input)))
}

/// 관측한 GTID를 접어 넣어 만드는 스트림 재시작 지점
///
/// 동등성과 문자열 직렬화만 제공하며, 순서 비교는 정의하지 않습니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Position {
    /// 아직 아무 GTID도 관측하지 않음
    #[default]
    Empty,
    /// MySQL 5.6: 관측한 GTID 집합
    Mysql56(GtidSet),
    /// MariaDB: domain별 최신 (server_id, sequence)
    Mariadb(BTreeMap<u32, (u32, u64)>),
    /// Google MySQL: 마지막으로 관측한 group id
    Google(u64),
}

impl Position {
    pub fn is_empty(&self) -> bool {
        matches!(self, Position::Empty)
    }

    /// GTID 하나를 position에 접어 넣는다
    pub fn append(&mut self, gtid: &Gtid) {
        match (&mut *self, gtid) {
            (
                Position::Mysql56(set),
                Gtid::Mysql56 {
                    server_uuid,
                    sequence,
                },
            ) => set.add(server_uuid, *sequence),
            (
                Position::Mariadb(domains),
                Gtid::Mariadb {
                    domain,
                    server_id,
                    sequence,
                },
            ) => {
                domains.insert(*domain, (*server_id, *sequence));
            }
            (Position::Google(last), Gtid::Google { group_id }) => *last = *group_id,
            (slot, gtid) => {
                if !slot.is_empty() {
                    warn!("binlog GTID dialect changed mid-stream, restarting position from {}", gtid);
                }
                *slot = Position::from_gtid(gtid);
            }
        }
    }

    fn from_gtid(gtid: &Gtid) -> Position {
        match gtid {
            Gtid::Mysql56 {
                server_uuid,
                sequence,
            } => {
                let mut set = GtidSet::new();
                set.add(server_uuid, *sequence);
                Position::Mysql56(set)
            }
            Gtid::Mariadb {
                domain,
                server_id,
                sequence,
            } => {
                let mut domains = BTreeMap::new();
                domains.insert(*domain, (*server_id, *sequence));
                Position::Mariadb(domains)
            }
            Gtid::Google { group_id } => Position::Google(*group_id),
        }
    }

    /// position 문자열 파싱 (Display의 역방향, 재시작 토큰 복원용)
    pub fn parse(input: &str) -> Result<Position> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Position::Empty);
        }

        if input.contains(':') {
            return Ok(Position::Mysql56(GtidSet::parse(input)?));
        }

        if input.contains('-') {
            let mut domains = BTreeMap::new();
            for entry in input.split(',') {
                match Gtid::parse(entry.trim())? {
                    Gtid::Mariadb {
                        domain,
                        server_id,
                        sequence,
                    } => {
                        domains.insert(domain, (server_id, sequence));
                    }
                    other => {
                        return Err(StreamError::Gtid(format!(
                            "mixed GTID dialects in position: {}",
                            other
                        )))
                    }
                }
            }
            return Ok(Position::Mariadb(domains));
        }

        let group_id = input
            .parse()
            .map_err(|_| StreamError::Gtid(format!("invalid position: {}", input)))?;
        Ok(Position::Google(group_id))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Empty => Ok(()),
            Position::Mysql56(set) => write!(f, "{}", set),
            Position::Mariadb(domains) => {
                let mut first = true;
                for (domain, (server_id, sequence)) in domains {
                    if !first {
                        write!(f, ",")?;
                    }
                    first = false;
                    write!(f, "{}-{}-{}", domain, server_id, sequence)?;
                }
                Ok(())
            }
            Position::Google(group_id) => write!(f, "{}", group_id),
        }
    }
}

/// UUID 바이트 배열을 하이픈 표기 문자열로 변환
pub(crate) fn format_uuid(bytes: &[u8; 16]) -> String {
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        bytes[6], bytes[7],
        bytes[8], bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15]
    )
}

/// 하이픈 표기 UUID를 바이트 배열로 복원
pub(crate) fn parse_uuid(text: &str) -> Result<[u8; 16]> {
    let hex: String = text.chars().filter(|c| *c != '-').collect();
    if hex.len() != 32 {
        return Err(StreamError::Gtid(format!("invalid server UUID: {}", text)));
    }

    let mut bytes = [0u8; 16];
    for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
        let pair = std::str::from_utf8(chunk)
            .map_err(|_| StreamError::Gtid(format!("invalid server UUID: {}", text)))?;
        bytes[i] = u8::from_str_radix(pair, 16)
            .map_err(|_| StreamError::Gtid(format!("invalid server UUID: {}", text)))?;
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const UUID: &str = "550e8400-e29b-41d4-a716-446655440000";

    #[test]
    fn test_gtid_parse_dialects() {
        assert_eq!(
            Gtid::parse("550e8400-e29b-41d4-a716-446655440000:42").unwrap(),
            Gtid::Mysql56 {
                server_uuid: UUID.to_string(),
                sequence: 42
            }
        );
        assert_eq!(
            Gtid::parse("0-1-123").unwrap(),
            Gtid::Mariadb {
                domain: 0,
                server_id: 1,
                sequence: 123
            }
        );
        assert_eq!(Gtid::parse("1234").unwrap(), Gtid::Google { group_id: 1234 });
        assert!(Gtid::parse("not-a-gtid-at-all-x").is_err());
    }

    #[test]
    fn test_gtid_display_round_trip() {
        let mysql56 = format!("{}:42", UUID);
        for text in [mysql56.as_str(), "0-1-123", "1234"] {
            let gtid = Gtid::parse(text).unwrap();
            assert_eq!(gtid.to_string(), text);
        }
    }

    #[test]
    fn test_gtid_set_parse() {
        let set = GtidSet::parse(&format!("{}:1-100:200", UUID)).unwrap();
        assert!(set.contains(UUID, 1));
        assert!(set.contains(UUID, 100));
        assert!(set.contains(UUID, 200));
        assert!(!set.contains(UUID, 150));
        assert_eq!(set.to_string(), format!("{}:1-100:200", UUID));
    }

    #[test]
    fn test_gtid_set_add_merges_adjacent() {
        let mut set = GtidSet::new();
        set.add(UUID, 1);
        set.add(UUID, 2);
        set.add(UUID, 5);
        assert_eq!(set.to_string(), format!("{}:1-2:5", UUID));

        // 3, 4를 채우면 하나의 구간으로 합쳐진다
        set.add(UUID, 4);
        set.add(UUID, 3);
        assert_eq!(set.to_string(), format!("{}:1-5", UUID));
    }

    #[test]
    fn test_position_append_mysql56() {
        let mut pos = Position::default();
        assert!(pos.is_empty());
        assert_eq!(pos.to_string(), "");

        pos.append(&Gtid::Mysql56 {
            server_uuid: UUID.to_string(),
            sequence: 1,
        });
        pos.append(&Gtid::Mysql56 {
            server_uuid: UUID.to_string(),
            sequence: 2,
        });
        assert_eq!(pos.to_string(), format!("{}:1-2", UUID));
    }

    #[test]
    fn test_position_append_mariadb_keeps_latest_per_domain() {
        let mut pos = Position::default();
        pos.append(&Gtid::parse("0-1-10").unwrap());
        pos.append(&Gtid::parse("0-1-11").unwrap());
        pos.append(&Gtid::parse("1-2-5").unwrap());
        assert_eq!(pos.to_string(), "0-1-11,1-2-5");
    }

    #[test]
    fn test_position_append_google() {
        let mut pos = Position::default();
        pos.append(&Gtid::Google { group_id: 100 });
        pos.append(&Gtid::Google { group_id: 101 });
        assert_eq!(pos, Position::Google(101));
        assert_eq!(pos.to_string(), "101");
    }

    #[test]
    fn test_position_parse_round_trip() {
        let mysql56 = format!("{}:1-100:200", UUID);
        for text in [mysql56.as_str(), "0-1-11,1-2-5", "1234", ""] {
            let pos = Position::parse(text).unwrap();
            assert_eq!(pos.to_string(), text);
        }
    }

    #[test]
    fn test_position_dialect_switch_restarts() {
        let mut pos = Position::Google(7);
        pos.append(&Gtid::parse("0-1-3").unwrap());
        assert_eq!(pos.to_string(), "0-1-3");
    }

    #[test]
    fn test_uuid_round_trip() {
        let bytes = parse_uuid(UUID).unwrap();
        assert_eq!(format_uuid(&bytes), UUID);
        assert!(parse_uuid("too-short").is_err());
    }
}
