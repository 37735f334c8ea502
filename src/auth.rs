//! MySQL 핸드셰이크 인증
//!
//! 슬레이브 연결이 쓰는 mysql_native_password 응답 패킷을 만듭니다.

use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

/// HandshakeResponse41에 싣는 client capability 플래그
mod capability {
    pub const LONG_PASSWORD: u32 = 1;
    pub const LONG_FLAG: u32 = 4;
    pub const CONNECT_WITH_DB: u32 = 8;
    pub const PROTOCOL_41: u32 = 512;
    pub const SECURE_CONNECTION: u32 = 32768;
    pub const PLUGIN_AUTH: u32 = 1 << 19;
}

/// scramble에 대한 mysql_native_password 토큰
///
/// XOR(SHA1(password), SHA1(scramble + SHA1(SHA1(password))))
pub fn scramble_password(password: &str, scramble: &[u8]) -> Vec<u8> {
    use sha1::{Digest, Sha1};

    if password.is_empty() {
        return Vec::new();
    }

    let stage1 = Sha1::digest(password.as_bytes());
    let stage2 = Sha1::digest(stage1);
    let mut hasher = Sha1::new();
    hasher.update(scramble);
    hasher.update(stage2);
    let stage3 = hasher.finalize();

    stage1
        .iter()
        .zip(stage3.iter())
        .map(|(a, b)| a ^ b)
        .collect()
}

/// HandshakeResponse41 패킷 본문 생성
pub fn handshake_response(
    username: &str,
    password: &str,
    database: Option<&str>,
    scramble: &[u8],
    collation: u8,
) -> std::io::Result<Vec<u8>> {
    let mut flags = capability::LONG_PASSWORD
        | capability::LONG_FLAG
        | capability::PROTOCOL_41
        | capability::SECURE_CONNECTION
        | capability::PLUGIN_AUTH;
    if database.is_some() {
        flags |= capability::CONNECT_WITH_DB;
    }

    let mut packet = Vec::new();
    packet.write_u32::<LittleEndian>(flags)?;
    packet.write_u32::<LittleEndian>(0)?; // max packet size: 서버 기본값
    packet.write_u8(collation)?;
    packet.write_all(&[0u8; 23])?;

    packet.write_all(username.as_bytes())?;
    packet.write_u8(0)?;

    let token = scramble_password(password, scramble);
    packet.write_u8(token.len() as u8)?;
    packet.write_all(&token)?;

    if let Some(db) = database {
        packet.write_all(db.as_bytes())?;
        packet.write_u8(0)?;
    }
    packet.write_all(b"mysql_native_password")?;
    packet.write_u8(0)?;

    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scramble_empty_password() {
        assert!(scramble_password("", &[1, 2, 3, 4]).is_empty());
    }

    #[test]
    fn test_scramble_produces_sha1_sized_token() {
        let scramble = [0x40, 0x3B, 0x57, 0x68, 0x3A, 0x77, 0x23, 0x29];
        let token = scramble_password("password", &scramble);
        assert_eq!(token.len(), 20);
    }

    #[test]
    fn test_handshake_response_layout() {
        let scramble = [0x40, 0x3B, 0x57, 0x68, 0x3A, 0x77, 0x23, 0x29];
        let packet = handshake_response("repl", "secret", Some("testdb"), &scramble, 33).unwrap();

        // capability flags에 CONNECT_WITH_DB가 선다
        let flags = u32::from_le_bytes([packet[0], packet[1], packet[2], packet[3]]);
        assert_ne!(flags & 8, 0);
        // collation 바이트
        assert_eq!(packet[9], 33);
        // username은 고정 헤더(32바이트) 바로 뒤
        assert_eq!(&packet[32..36], b"repl");
    }
}
