/// Canal 실행 예제
///
/// 환경 변수로 설정을 읽고, 필터에 맞는 row 이벤트를 출력한다.
/// binlog 디코더는 `decoder_tx`로 이벤트를 보낸다.
use rust_canal::{
    Canal, CanalConfig, DecodedEvent, EventHandler, EventHeader, EventType, Position, Result,
    RowsEvent, TableFilter,
};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

struct PrintHandler {
    filter: TableFilter,
}

impl EventHandler for PrintHandler {
    fn on_rotate(&mut self, next_log_name: &str, position: u64) -> Result<()> {
        println!("RotateEvent {}:{}", next_log_name, position);
        Ok(())
    }

    fn on_row(&mut self, event: &RowsEvent) -> Result<()> {
        if !self.filter.matches(&event.table.schema, &event.table.name) {
            return Ok(());
        }
        println!("RowsEvent: {}", event);
        Ok(())
    }

    fn on_ddl(&mut self, next_pos: &Position, schema: &str, query: &str) -> Result<()> {
        println!("DDL at {} on {}: {}", next_pos, schema, query);
        Ok(())
    }

    fn name(&self) -> &str {
        "PrintHandler"
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // 로깅 초기화
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = CanalConfig::from_env()?;
    info!(
        "Connecting to {} (server_id={}, flavor={:?})",
        config.connection.addr(),
        config.server_id,
        config.flavor
    );

    let filter = config.table_filter()?;
    let mut canal = Canal::new(config);
    canal.set_event_handler(PrintHandler { filter });
    canal.prepare().await?;

    let settings = canal.decoder_settings();
    info!(
        "Decoder start: {} gtid={} (server_id={}, heartbeat={:?}, read_timeout={:?})",
        settings.start,
        settings.gtid_set.as_ref().map(|g| g.to_string()).unwrap_or_default(),
        settings.server_id,
        settings.heartbeat_period,
        settings.read_timeout
    );

    let cursor = canal.cursor();
    let closer = canal.closer();
    let (decoder_tx, decoder_rx) = mpsc::unbounded_channel();

    // 디코더가 붙기 전까지 서버 heartbeat처럼 루프를 유지
    let heartbeat = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(settings.heartbeat_period);
        loop {
            ticker.tick().await;
            let event = DecodedEvent::Heartbeat {
                header: EventHeader::new(EventType::HeartbeatEvent, 0, 0),
            };
            if decoder_tx.send(event).is_err() {
                break;
            }
        }
    });

    let task = tokio::spawn(async move { canal.run(decoder_rx).await });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    closer.close();
    heartbeat.abort();

    match task.await? {
        Ok(()) => info!("Canal stopped"),
        Err(e) => error!("Canal stopped with error: {}", e),
    }

    println!("{}", serde_json::to_string_pretty(&cursor.checkpoint().to_json())?);
    Ok(())
}
