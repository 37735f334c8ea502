/// MySQL binlog 스트리머 사용 예제
///
/// 복제 슬레이브로 접속해 완성된 트랜잭션을 JSON으로 출력합니다.
use binlog_streamer::connection::{ConnectionConfig, MysqlDaemon};
use binlog_streamer::gtid::Position;
use binlog_streamer::metrics;
use binlog_streamer::streamer::{SendTransactionFn, Streamer};
use chrono::DateTime;
use std::env;
use tokio::sync::broadcast;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 초기화
    tracing_subscriber::fmt::init();
    metrics::init_metrics();

    // 연결 설정
    let config = ConnectionConfig {
        hostname: env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
        port: env::var("DB_PORT")
            .unwrap_or_else(|_| "3306".to_string())
            .parse()
            .unwrap_or(3306),
        username: env::var("DB_USER").unwrap_or_else(|_| "repl".to_string()),
        password: env::var("DB_PASSWORD").unwrap_or_default(),
        database: None,
        server_id: 1,
        timeout: std::time::Duration::from_secs(30),
    };
    let dbname = env::var("DB_NAME").unwrap_or_else(|_| "testdb".to_string());
    let start_pos = match env::var("START_POS") {
        Ok(text) => Position::parse(&text)?,
        Err(_) => Position::default(),
    };

    info!(
        "starting binlog streamer against {}:{} (db filter: {})",
        config.hostname, config.port, dbname
    );

    // 트랜잭션을 받는 쪽: 커밋 시각과 JSON 본문 출력
    let send: SendTransactionFn = Box::new(|transaction| {
        let committed = DateTime::from_timestamp(transaction.timestamp, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| transaction.timestamp.to_string());
        match serde_json::to_string(&transaction) {
            Ok(json) => println!("[{}] {}", committed, json),
            Err(e) => error!("failed to encode transaction: {}", e),
        }
        Ok(())
    });

    let daemon = MysqlDaemon::new(config);
    let streamer = Streamer::new(dbname, daemon, None, start_pos, send);

    // ctrl-c를 shutdown 신호로 바꾼다
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            let _ = shutdown_tx.send(());
        }
    });

    let (position, reason) = streamer.stream(shutdown_rx).await;
    match reason {
        None => info!("stream cancelled @ {}", position),
        Some(e) if e.is_server_eof() || e.is_client_eof() => {
            info!("stream ended @ {}: {}", position, e)
        }
        Some(e) => error!("stream failed: {}", e),
    }

    Ok(())
}
