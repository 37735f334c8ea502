//! MySQL 클라이언트/서버 패킷 프레이밍
//!
//! 3바이트 길이 + 1바이트 시퀀스 헤더를 읽고 쓰는 채널과, binlog
//! dump 스트림에서 오는 패킷의 분류를 담당합니다.

use crate::error::{Result, StreamError};
use byteorder::{LittleEndian, ReadBytesExt};
use bytes::{BufMut, BytesMut};
use std::io::{Cursor, Read};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// MySQL 패킷 채널
pub struct PacketChannel {
    stream: TcpStream,
}

impl PacketChannel {
    /// TCP 연결을 열어 패킷 채널을 만든다
    pub async fn connect(hostname: &str, port: u16) -> Result<Self> {
        let addr = format!("{}:{}", hostname, port);
        let stream = TcpStream::connect(&addr).await.map_err(|e| {
            StreamError::Connection(format!("failed to connect to {}: {}", addr, e))
        })?;
        debug!("connected to mysqld at {}", addr);
        Ok(PacketChannel { stream })
    }

    /// 패킷 하나 읽기 (프레이밍 헤더는 벗기고 본문만 반환)
    pub async fn read_packet(&mut self) -> Result<Vec<u8>> {
        let mut header = [0u8; 4];
        self.stream.read_exact(&mut header).await?;
        let length = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
        let _sequence = header[3];

        let mut body = vec![0u8; length];
        self.stream.read_exact(&mut body).await?;
        Ok(body)
    }

    /// 패킷 쓰기 (시퀀스 번호가 든 프레이밍 헤더를 붙인다)
    pub async fn write_packet(&mut self, payload: &[u8], sequence: u8) -> Result<()> {
        let mut frame = BytesMut::with_capacity(4 + payload.len());
        frame.put_uint_le(payload.len() as u64, 3);
        frame.put_u8(sequence);
        frame.put_slice(payload);

        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

/// binlog dump 스트림에서 읽은 패킷의 의미
#[derive(Debug, PartialEq)]
pub enum DumpPacket {
    /// OK 바이트 뒤에 실려 온 이벤트 버퍼
    Event(Vec<u8>),
    /// 서버가 스트림을 끝냄
    Eof,
    /// 서버 에러 (코드, 메시지)
    Err(u16, String),
}

/// dump 스트림 패킷 분류
pub fn classify_dump_packet(packet: Vec<u8>) -> DumpPacket {
    if packet.is_empty() {
        return DumpPacket::Eof;
    }
    match packet[0] {
        0xFF => {
            let code = if packet.len() >= 3 {
                u16::from_le_bytes([packet[1], packet[2]])
            } else {
                0
            };
            let message = if packet.len() > 9 {
                String::from_utf8_lossy(&packet[9..]).to_string()
            } else {
                String::new()
            };
            DumpPacket::Err(code, message)
        }
        0xFE if packet.len() < 9 => DumpPacket::Eof,
        0x00 => DumpPacket::Event(packet[1..].to_vec()),
        _ => DumpPacket::Event(packet),
    }
}

/// 서버 인사 패킷 (handshake v10)
pub struct GreetingPacket {
    pub protocol_version: u8,
    pub server_version: String,
    pub thread_id: u32,
    pub scramble: Vec<u8>,
    pub server_collation: u8,
}

impl GreetingPacket {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);

        let protocol_version = ReadBytesExt::read_u8(&mut cursor)?;
        let server_version = read_null_terminated(&mut cursor)?;
        let thread_id = ReadBytesExt::read_u32::<LittleEndian>(&mut cursor)?;

        let mut scramble = vec![0u8; 8];
        Read::read_exact(&mut cursor, &mut scramble)?;
        ReadBytesExt::read_u8(&mut cursor)?; // filler
        ReadBytesExt::read_u16::<LittleEndian>(&mut cursor)?; // capability 하위 2바이트
        let server_collation = ReadBytesExt::read_u8(&mut cursor)?;
        ReadBytesExt::read_u16::<LittleEndian>(&mut cursor)?; // status 플래그
        ReadBytesExt::read_u16::<LittleEndian>(&mut cursor)?; // capability 상위 2바이트
        let auth_data_len = ReadBytesExt::read_u8(&mut cursor)? as usize;
        let mut reserved = [0u8; 10];
        Read::read_exact(&mut cursor, &mut reserved)?;

        // scramble 후반부 (꼬리 null 제외)
        let tail_len = auth_data_len.saturating_sub(8).max(13);
        let mut tail = vec![0u8; tail_len];
        Read::read_exact(&mut cursor, &mut tail)?;
        tail.pop();
        scramble.extend_from_slice(&tail);

        Ok(GreetingPacket {
            protocol_version,
            server_version,
            thread_id,
            scramble,
            server_collation,
        })
    }
}

fn read_null_terminated<R: Read>(reader: &mut R) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        let byte = reader.read_u8()?;
        if byte == 0 {
            break;
        }
        bytes.push(byte);
    }
    String::from_utf8(bytes)
        .map_err(|e| StreamError::Parse(format!("invalid utf-8 in greeting: {}", e)))
}
