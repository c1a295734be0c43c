//! Canal 드라이버 - 디코딩된 이벤트를 커서와 핸들러로 분배
//!
//! 1. 외부 디코더가 이벤트를 채널로 보낸다
//! 2. Row 이벤트는 unsigned 보정 후 핸들러로 전달
//! 3. Rotate / Xid / DDL 이벤트마다 커서 위치를 갱신
//! 4. GTID는 트랜잭션이 커밋(Xid, DDL)될 때 커서 집합에 들어간다

use crate::connection::{ConnectionConfig, MasterStatus, MySqlConnection};
use crate::cursor::ReplicationCursor;
use crate::error::{CdcError, Result};
use crate::events::{Action, DecodedEvent, RowFormat};
use crate::filter::TableFilter;
use crate::gtid::GtidSet;
use crate::handler::{DummyEventHandler, EventHandler};
use crate::position::{Position, BINLOG_START_POSITION};
use crate::rows::RowsEvent;
use crate::schema::SchemaCache;
use regex::Regex;
use std::env;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// 서버 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    MySql,
    MariaDb,
}

impl Flavor {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(Flavor::MySql),
            "mariadb" => Ok(Flavor::MariaDb),
            other => Err(CdcError::ConfigError(format!("Unknown flavor: {}", other))),
        }
    }
}

/// Canal 설정
#[derive(Debug, Clone)]
pub struct CanalConfig {
    pub connection: ConnectionConfig,
    /// 복제 클라이언트 server id (서버들과 겹치면 안 됨)
    pub server_id: u32,
    pub flavor: Flavor,
    pub databases: Vec<String>,
    /// 지정하면 `table_db` 안의 테이블만 처리, `databases`는 무시
    pub tables: Vec<String>,
    pub table_db: Option<String>,
    /// "db.table" 형식
    pub ignore_tables: Vec<String>,
    /// None이면 서버의 현재 위치부터
    pub start_position: Option<Position>,
    pub heartbeat_period: Duration,
    pub read_timeout: Duration,
}

impl Default for CanalConfig {
    fn default() -> Self {
        CanalConfig {
            connection: ConnectionConfig::default(),
            server_id: 101,
            flavor: Flavor::MySql,
            databases: vec!["test".to_string()],
            tables: Vec::new(),
            table_db: Some("test".to_string()),
            ignore_tables: Vec::new(),
            start_position: None,
            heartbeat_period: Duration::from_secs(60),
            read_timeout: Duration::from_secs(90),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CdcError::ConfigError(format!("Invalid value for {}: {}", name, value)))
}

impl CanalConfig {
    /// 환경 변수에서 설정을 읽는다. 없는 값은 기본값.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = CanalConfig::default();

        if let Some(host) = lookup("DB_HOST") {
            config.connection.hostname = host;
        }
        if let Some(port) = lookup("DB_PORT") {
            config.connection.port = parse_var("DB_PORT", &port)?;
        }
        if let Some(user) = lookup("DB_USER") {
            config.connection.username = user;
        }
        if let Some(password) = lookup("DB_PASSWORD") {
            config.connection.password = password;
        }
        config.connection.database = lookup("DB_NAME").filter(|db| !db.is_empty());

        if let Some(server_id) = lookup("CANAL_SERVER_ID") {
            config.server_id = parse_var("CANAL_SERVER_ID", &server_id)?;
        }
        if let Some(flavor) = lookup("CANAL_FLAVOR") {
            config.flavor = Flavor::parse(&flavor)?;
        }
        if let Some(dbs) = lookup("CANAL_DBS") {
            config.databases = split_list(&dbs);
        }
        if let Some(tables) = lookup("CANAL_TABLES") {
            config.tables = split_list(&tables);
        }
        if let Some(table_db) = lookup("CANAL_TABLE_DB") {
            config.table_db = Some(table_db).filter(|db| !db.is_empty());
        }
        if let Some(ignore) = lookup("CANAL_IGNORE_TABLES") {
            config.ignore_tables = split_list(&ignore);
        }
        if let Some(name) = lookup("CANAL_BIN_NAME").filter(|n| !n.is_empty()) {
            let pos = match lookup("CANAL_BIN_POS") {
                Some(pos) => parse_var("CANAL_BIN_POS", &pos)?,
                None => BINLOG_START_POSITION,
            };
            config.start_position = Some(Position::new(name, pos));
        }
        if let Some(secs) = lookup("CANAL_HEARTBEAT_SECS") {
            config.heartbeat_period = Duration::from_secs(parse_var("CANAL_HEARTBEAT_SECS", &secs)?);
        }
        if let Some(secs) = lookup("CANAL_READ_TIMEOUT_SECS") {
            config.read_timeout = Duration::from_secs(parse_var("CANAL_READ_TIMEOUT_SECS", &secs)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// 디코더에 넘기기 전 값 검증
    pub fn validate(&self) -> Result<()> {
        if self.server_id == 0 {
            return Err(CdcError::ConfigError("server_id must be non-zero".to_string()));
        }
        if self.heartbeat_period.is_zero() || self.heartbeat_period >= self.read_timeout {
            return Err(CdcError::ConfigError(format!(
                "heartbeat period {:?} must be shorter than read timeout {:?}",
                self.heartbeat_period, self.read_timeout
            )));
        }
        Ok(())
    }

    pub fn table_filter(&self) -> Result<TableFilter> {
        TableFilter::new(
            &self.databases,
            self.table_db.as_deref(),
            &self.tables,
            &self.ignore_tables,
        )
    }
}

/// 외부 binlog 디코더가 덤프를 시작할 때 쓰는 값
#[derive(Debug, Clone)]
pub struct DecoderSettings {
    pub server_id: u32,
    pub flavor: Flavor,
    pub heartbeat_period: Duration,
    pub read_timeout: Duration,
    pub start: Position,
    /// 커밋이 끝난 GTID 집합. GTID 모드가 아니면 None.
    pub gtid_set: Option<GtidSet>,
}

/// 앞쪽의 `/* */`, `-- `, `#` 주석 제거
fn strip_leading_comments(query: &str) -> &str {
    let mut rest = query.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("/*") {
            match after.find("*/") {
                Some(end) => rest = after[end + 2..].trim_start(),
                None => return "",
            }
        } else if rest.starts_with("--") || rest.starts_with('#') {
            match rest.find('\n') {
                Some(end) => rest = rest[end + 1..].trim_start(),
                None => return "",
            }
        } else {
            return rest;
        }
    }
}

/// DDL 문에서 대상 테이블 추출 (ALTER/CREATE/DROP/RENAME/TRUNCATE TABLE)
fn ddl_target(query: &str) -> Option<(Option<String>, String)> {
    static DDL: OnceLock<Option<Regex>> = OnceLock::new();
    let re = DDL
        .get_or_init(|| {
            Regex::new(
                r"(?is)^(?:ALTER|CREATE|DROP|RENAME|TRUNCATE)\s+(?:TEMPORARY\s+)?TABLE\s+(?:IF\s+(?:NOT\s+)?EXISTS\s+)?(?:`([^`]+)`|(\w+))(?:\s*\.\s*(?:`([^`]+)`|(\w+)))?",
            )
            .ok()
        })
        .as_ref()?;

    let caps = re.captures(strip_leading_comments(query))?;
    // 백틱 이름은 `-` 같은 문자를 포함할 수 있다
    let name = |quoted: usize, bare: usize| {
        caps.get(quoted)
            .or_else(|| caps.get(bare))
            .map(|m| m.as_str().to_string())
    };

    let first = name(1, 2)?;
    match name(3, 4) {
        Some(table) => Some((Some(first), table)),
        None => Some((None, first)),
    }
}

/// 디코딩된 이벤트를 처리하는 드라이버
pub struct Canal {
    config: CanalConfig,
    cursor: Arc<ReplicationCursor>,
    handler: Box<dyn EventHandler>,
    schemas: Arc<SchemaCache>,
    /// 아직 커밋되지 않은 트랜잭션의 GTID
    pending_gtid: Option<GtidSet>,
    shutdown: watch::Sender<bool>,
}

impl Canal {
    /// 기본 핸들러는 `DummyEventHandler`
    pub fn new(config: CanalConfig) -> Self {
        let start = config
            .start_position
            .clone()
            .unwrap_or_default();
        let (shutdown, _) = watch::channel(false);

        Canal {
            config,
            cursor: Arc::new(ReplicationCursor::starting_at(start, None)),
            handler: Box::new(DummyEventHandler),
            schemas: Arc::new(SchemaCache::new()),
            pending_gtid: None,
            shutdown,
        }
    }

    pub fn set_event_handler<H: EventHandler + 'static>(&mut self, handler: H) {
        info!("use event handler {}", handler.name());
        self.handler = Box::new(handler);
    }

    pub fn config(&self) -> &CanalConfig {
        &self.config
    }

    /// 체크포인트 저장 쪽에서 읽는 커서
    pub fn cursor(&self) -> Arc<ReplicationCursor> {
        Arc::clone(&self.cursor)
    }

    pub fn schemas(&self) -> Arc<SchemaCache> {
        Arc::clone(&self.schemas)
    }

    /// `prepare` 이후 커서 기준으로 디코더 시작 설정을 만든다
    pub fn decoder_settings(&self) -> DecoderSettings {
        let checkpoint = self.cursor.checkpoint();
        DecoderSettings {
            server_id: self.config.server_id,
            flavor: self.config.flavor,
            heartbeat_period: self.config.heartbeat_period,
            read_timeout: self.config.read_timeout,
            start: checkpoint.position,
            gtid_set: checkpoint.gtid_set,
        }
    }

    /// 서버 상태로 시작 위치를 맞추고 필터에 걸리는 테이블 정의를 읽는다
    pub async fn prepare(&mut self) -> Result<()> {
        self.config.validate()?;
        let mut conn = MySqlConnection::connect(self.config.connection.clone()).await?;

        let format = conn.binlog_format().await?;
        if !format.eq_ignore_ascii_case("ROW") {
            warn!("binlog_format is {}, row events will be missing", format);
        }

        let status = conn.master_status().await?;
        info!("Current binlog: {}", status.position);
        let gtid_enabled = conn.is_gtid_mode_enabled().await?;
        self.seed_from_status(status, gtid_enabled);

        let filter = self.config.table_filter()?;
        for database in self.schema_candidates() {
            let tables = match conn.tables(&database).await {
                Ok(t) => t,
                Err(e) => {
                    warn!("Failed to get tables from {}: {}", database, e);
                    continue;
                }
            };

            for table in tables.iter().filter(|t| filter.matches(&database, t)) {
                match conn.table_descriptor(&database, table).await {
                    Ok(descriptor) => {
                        debug!("Loaded metadata for {}", descriptor.describe());
                        self.schemas.insert(descriptor);
                    }
                    Err(e) => warn!("Failed to get schema for {}.{}: {}", database, table, e),
                }
            }
        }

        info!("Loaded metadata for {} tables", self.schemas.len());
        conn.close().await
    }

    /// 시작 위치가 설정되어 있으면 서버 상태(위치와 GTID 집합 모두)는 쓰지 않는다
    fn seed_from_status(&self, status: MasterStatus, gtid_enabled: bool) {
        if let Some(ref start) = self.config.start_position {
            info!("Starting from configured position {}, ignoring server status {}", start, status.position);
            return;
        }

        if gtid_enabled && self.config.flavor == Flavor::MySql {
            info!("GTID mode enabled: {}", status.executed_gtid_set);
            self.cursor.update_gtid_set(status.executed_gtid_set);
        }
        self.cursor.update(status.position);
    }

    fn schema_candidates(&self) -> Vec<String> {
        match self.config.table_db {
            Some(ref db) if !self.config.tables.is_empty() => vec![db.clone()],
            _ => self.config.databases.clone(),
        }
    }

    /// 이벤트 하나를 처리
    pub fn handle_event(&mut self, event: DecodedEvent) -> Result<()> {
        if let Some(header) = event.header() {
            if header.timestamp > 0 {
                self.cursor.update_timestamp(header.timestamp);
            }
        }

        match event {
            DecodedEvent::Rotate {
                next_log_name,
                position,
            } => {
                info!("rotate binlog to {}:{}", next_log_name, position);
                let pos = Position::new(next_log_name, position);
                self.cursor.update(pos.clone());
                self.handler.on_rotate(&pos.filename, pos.position).map_err(|e| self.handler_error(e))?;
                self.sync_position(&pos, true)
            }
            DecodedEvent::Rows {
                table,
                action,
                rows,
                header,
                row_format,
            } => {
                if row_format == RowFormat::V0 && action == Action::Update {
                    return Err(CdcError::UnsupportedRowFormat(format!(
                        "v0 update rows event for {} at {}",
                        table, header.log_pos
                    )));
                }
                if action == Action::Update && rows.len() % 2 != 0 {
                    return Err(CdcError::UnsupportedRowFormat(format!(
                        "update rows event for {} has {} rows, expected pairs",
                        table,
                        rows.len()
                    )));
                }

                let event = RowsEvent::new(table, action, rows, header);
                self.handler.on_row(&event).map_err(|e| self.handler_error(e))
            }
            DecodedEvent::Gtid { gtid, .. } => {
                if self.config.flavor == Flavor::MySql {
                    let mut next = GtidSet::new();
                    next.add_gtid(&gtid)?;
                    // 새 트랜잭션이 시작되면 이전 트랜잭션은 끝난 것
                    self.commit_pending_gtid();
                    self.pending_gtid = Some(next);
                } else {
                    debug!("{:?} gtid {} is not tracked", self.config.flavor, gtid);
                }
                self.handler.on_gtid(&gtid).map_err(|e| self.handler_error(e))
            }
            DecodedEvent::Xid { header, .. } => {
                let pos = self.cursor.position().with_offset(u64::from(header.log_pos));
                self.cursor.update(pos.clone());
                self.commit_pending_gtid();
                self.handler.on_xid(&pos).map_err(|e| self.handler_error(e))?;
                self.sync_position(&pos, false)
            }
            DecodedEvent::Query {
                schema,
                query,
                header,
            } => {
                let pos = self.cursor.position().with_offset(u64::from(header.log_pos));
                self.cursor.update(pos.clone());

                let Some((db, table)) = ddl_target(&query) else {
                    return Ok(());
                };
                let db = db.unwrap_or_else(|| schema.clone());

                if self.schemas.invalidate(&db, &table) {
                    debug!("invalidated cached schema for {}.{}", db, table);
                }
                self.commit_pending_gtid();
                self.handler.on_table_changed(&db, &table).map_err(|e| self.handler_error(e))?;
                self.handler.on_ddl(&pos, &schema, &query).map_err(|e| self.handler_error(e))?;
                self.sync_position(&pos, true)
            }
            DecodedEvent::Heartbeat { .. } => Ok(()),
        }
    }

    fn commit_pending_gtid(&mut self) {
        if let Some(pending) = self.pending_gtid.take() {
            let mut gset = self.cursor.gtid_set().unwrap_or_default();
            gset.union(&pending);
            self.cursor.update_gtid_set(gset);
        }
    }

    fn sync_position(&mut self, pos: &Position, force: bool) -> Result<()> {
        let gset = self.cursor.gtid_set();
        self.handler
            .on_pos_synced(pos, gset.as_ref(), force)
            .map_err(|e| self.handler_error(e))
    }

    fn handler_error(&self, err: CdcError) -> CdcError {
        match err {
            CdcError::HandlerError { .. } => err,
            other => CdcError::HandlerError {
                handler: self.handler.name().to_string(),
                message: other.to_string(),
            },
        }
    }

    /// 채널이 닫히거나 `close()`가 호출될 때까지 이벤트 처리.
    /// `read_timeout` 동안 이벤트(heartbeat 포함)가 없으면 `ReadTimeout` 에러.
    pub async fn run(&mut self, mut events: mpsc::UnboundedReceiver<DecodedEvent>) -> Result<()> {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow_and_update() {
            return Ok(());
        }
        info!("Canal started at {}", self.cursor.position());
        let read_timeout = self.config.read_timeout;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Canal closed at {}", self.cursor.position());
                        return Ok(());
                    }
                }
                event = tokio::time::timeout(read_timeout, events.recv()) => {
                    let Ok(event) = event else {
                        error!("No event from decoder for {:?}", read_timeout);
                        return Err(CdcError::ReadTimeout(read_timeout));
                    };
                    let Some(event) = event else {
                        info!("Decoder channel closed at {}", self.cursor.position());
                        return Ok(());
                    };
                    if let Err(e) = self.handle_event(event) {
                        error!("Failed to handle event: {}", e);
                        return Err(e);
                    }
                }
            }
        }
    }

    /// `run` 루프를 멈추는 핸들
    pub fn closer(&self) -> CanalCloser {
        CanalCloser {
            shutdown: self.shutdown.clone(),
        }
    }

    pub fn close(&self) {
        self.closer().close();
    }
}

/// 다른 태스크에서 `Canal::run`을 멈추기 위한 핸들
#[derive(Clone)]
pub struct CanalCloser {
    shutdown: watch::Sender<bool>,
}

impl CanalCloser {
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CellValue, EventHeader, EventType};
    use crate::schema::TableDescriptor;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const SID: &str = "3e11fa47-71ca-11e1-9e33-c80aa9429562";

    #[derive(Default)]
    struct Recorded {
        rows: Vec<RowsEvent>,
        rotates: Vec<(String, u64)>,
        xids: Vec<Position>,
        synced: Vec<(Position, Option<String>, bool)>,
        tables_changed: Vec<(String, String)>,
        gtids: Vec<String>,
    }

    #[derive(Clone, Default)]
    struct RecordingHandler {
        recorded: Arc<Mutex<Recorded>>,
        fail_rows: bool,
    }

    impl EventHandler for RecordingHandler {
        fn on_rotate(&mut self, next_log_name: &str, position: u64) -> Result<()> {
            self.recorded.lock().unwrap().rotates.push((next_log_name.to_string(), position));
            Ok(())
        }

        fn on_table_changed(&mut self, schema: &str, table: &str) -> Result<()> {
            self.recorded
                .lock()
                .unwrap()
                .tables_changed
                .push((schema.to_string(), table.to_string()));
            Ok(())
        }

        fn on_row(&mut self, event: &RowsEvent) -> Result<()> {
            if self.fail_rows {
                return Err(CdcError::ChannelClosed);
            }
            self.recorded.lock().unwrap().rows.push(event.clone());
            Ok(())
        }

        fn on_xid(&mut self, next_pos: &Position) -> Result<()> {
            self.recorded.lock().unwrap().xids.push(next_pos.clone());
            Ok(())
        }

        fn on_gtid(&mut self, gtid: &str) -> Result<()> {
            self.recorded.lock().unwrap().gtids.push(gtid.to_string());
            Ok(())
        }

        fn on_pos_synced(&mut self, position: &Position, gtid_set: Option<&GtidSet>, force: bool) -> Result<()> {
            self.recorded.lock().unwrap().synced.push((
                position.clone(),
                gtid_set.map(|g| g.to_string()),
                force,
            ));
            Ok(())
        }

        fn name(&self) -> &str {
            "RecordingHandler"
        }
    }

    fn table() -> Arc<TableDescriptor> {
        Arc::new(TableDescriptor::from_columns(
            "test",
            "t",
            [
                ("id", "int(10) unsigned"),
                ("name", "varchar(32)"),
                ("balance", "mediumint(8) unsigned"),
            ],
        ))
    }

    fn rows_event(action: Action, rows: Vec<Vec<CellValue>>, row_format: RowFormat) -> DecodedEvent {
        DecodedEvent::Rows {
            table: table(),
            action,
            rows,
            header: EventHeader::new(EventType::WriteRowsEvent, 1700000100, 300),
            row_format,
        }
    }

    fn canal_with(handler: RecordingHandler) -> Canal {
        canal_with_config(
            CanalConfig {
                start_position: Some(Position::new("mysql-bin.000001", 4)),
                ..Default::default()
            },
            handler,
        )
    }

    fn canal_with_config(config: CanalConfig, handler: RecordingHandler) -> Canal {
        let mut canal = Canal::new(config);
        canal.set_event_handler(handler);
        canal
    }

    fn gtid_event(gtid: &str) -> DecodedEvent {
        DecodedEvent::Gtid {
            gtid: gtid.to_string(),
            header: EventHeader::new(EventType::GtidEvent, 0, 0),
        }
    }

    fn xid_event(log_pos: u32) -> DecodedEvent {
        DecodedEvent::Xid {
            xid: u64::from(log_pos),
            header: EventHeader::new(EventType::XidEvent, 1700000200, log_pos),
        }
    }

    #[test]
    fn test_default_handler_is_dummy() {
        let mut canal = Canal::new(CanalConfig::default());
        assert_eq!(canal.handler.name(), "DummyEventHandler");
        let event = rows_event(Action::Insert, vec![vec![CellValue::Int32(-1)]], RowFormat::V2);
        assert!(canal.handle_event(event).is_ok());
    }

    #[test]
    fn test_rows_are_corrected_before_handler() {
        let handler = RecordingHandler::default();
        let mut canal = canal_with(handler.clone());

        let raw = vec![vec![
            CellValue::Int32(-5),
            CellValue::String("alice".to_string()),
            CellValue::Int32(-1),
        ]];
        canal.handle_event(rows_event(Action::Insert, raw, RowFormat::V2)).unwrap();

        let recorded = handler.recorded.lock().unwrap();
        assert_eq!(recorded.rows.len(), 1);
        assert_eq!(recorded.rows[0].rows[0][0], CellValue::UInt32(4294967291));
        assert_eq!(recorded.rows[0].rows[0][2], CellValue::UInt32(16777215));
        assert_eq!(canal.cursor().timestamp(), 1700000100);
    }

    #[test]
    fn test_v0_update_rejected() {
        let handler = RecordingHandler::default();
        let mut canal = canal_with(handler.clone());

        let raw = vec![vec![CellValue::Int32(1)]];
        let err = canal.handle_event(rows_event(Action::Update, raw, RowFormat::V0)).unwrap_err();
        assert!(matches!(err, CdcError::UnsupportedRowFormat(_)));

        let odd = vec![vec![CellValue::Int32(1)], vec![CellValue::Int32(2)], vec![CellValue::Int32(3)]];
        let err = canal.handle_event(rows_event(Action::Update, odd, RowFormat::V2)).unwrap_err();
        assert!(matches!(err, CdcError::UnsupportedRowFormat(_)));

        assert!(handler.recorded.lock().unwrap().rows.is_empty());
    }

    #[test]
    fn test_rotate_and_xid_move_cursor() {
        let handler = RecordingHandler::default();
        let mut canal = canal_with(handler.clone());
        let cursor = canal.cursor();

        canal
            .handle_event(DecodedEvent::Rotate {
                next_log_name: "mysql-bin.000002".to_string(),
                position: 4,
            })
            .unwrap();
        assert_eq!(cursor.position(), Position::new("mysql-bin.000002", 4));

        canal
            .handle_event(DecodedEvent::Xid {
                xid: 77,
                header: EventHeader::new(EventType::XidEvent, 1700000200, 1234),
            })
            .unwrap();
        assert_eq!(cursor.position(), Position::new("mysql-bin.000002", 1234));
        assert_eq!(cursor.timestamp(), 1700000200);

        let recorded = handler.recorded.lock().unwrap();
        assert_eq!(recorded.rotates, vec![("mysql-bin.000002".to_string(), 4)]);
        assert_eq!(recorded.xids, vec![Position::new("mysql-bin.000002", 1234)]);
        assert_eq!(recorded.synced.len(), 2);
        assert!(recorded.synced[0].2);
        assert!(!recorded.synced[1].2);
    }

    #[test]
    fn test_gtid_events_extend_cursor_set() {
        let handler = RecordingHandler::default();
        let mut canal = canal_with(handler.clone());
        let cursor = canal.cursor();
        assert!(cursor.gtid_set().is_none());

        for seq in 1..=3u32 {
            canal.handle_event(gtid_event(&format!("{}:{}", SID, seq))).unwrap();
            canal.handle_event(xid_event(100 * seq)).unwrap();
        }

        assert_eq!(cursor.gtid_set().unwrap().to_string(), format!("{}:1-3", SID));
        let recorded = handler.recorded.lock().unwrap();
        assert_eq!(recorded.gtids.len(), 3);
        // 커밋 시점의 집합이 함께 전달된다
        assert_eq!(recorded.synced[0].1, Some(format!("{}:1", SID)));
    }

    #[test]
    fn test_gtid_committed_only_on_xid() {
        let handler = RecordingHandler::default();
        let mut canal = canal_with(handler.clone());
        let gtid = format!("{}:7", SID);

        canal.handle_event(gtid_event(&gtid)).unwrap();
        canal
            .handle_event(rows_event(Action::Insert, vec![vec![CellValue::Int32(1)]], RowFormat::V2))
            .unwrap();

        // 트랜잭션 도중 체크포인트에는 아직 없어야 한다
        let checkpoint = canal.cursor().checkpoint();
        assert!(!checkpoint.gtid_set.is_some_and(|g| g.contains(&gtid)));

        canal.handle_event(xid_event(700)).unwrap();
        let checkpoint = canal.cursor().checkpoint();
        assert!(checkpoint.gtid_set.unwrap().contains(&gtid));
        assert_eq!(checkpoint.position, Position::new("mysql-bin.000001", 700));
    }

    #[test]
    fn test_gtid_committed_on_ddl() {
        let handler = RecordingHandler::default();
        let mut canal = canal_with(handler.clone());
        let gtid = format!("{}:9", SID);

        canal.handle_event(gtid_event(&gtid)).unwrap();
        canal
            .handle_event(DecodedEvent::Query {
                schema: "test".to_string(),
                query: "BEGIN".to_string(),
                header: EventHeader::new(EventType::QueryEvent, 0, 800),
            })
            .unwrap();
        assert!(canal.cursor().gtid_set().is_none());

        canal
            .handle_event(DecodedEvent::Query {
                schema: "test".to_string(),
                query: "DROP TABLE t".to_string(),
                header: EventHeader::new(EventType::QueryEvent, 0, 900),
            })
            .unwrap();
        assert!(canal.cursor().gtid_set().unwrap().contains(&gtid));
        let recorded = handler.recorded.lock().unwrap();
        assert_eq!(recorded.synced.last().unwrap().1, Some(gtid.clone()));
    }

    #[test]
    fn test_invalid_mysql_gtid_is_error() {
        let mut canal = canal_with(RecordingHandler::default());
        assert!(matches!(
            canal.handle_event(gtid_event("not-a-gtid")),
            Err(CdcError::GtidError(_))
        ));
    }

    #[test]
    fn test_mariadb_gtid_not_tracked() {
        let handler = RecordingHandler::default();
        let mut canal = canal_with_config(
            CanalConfig {
                flavor: Flavor::MariaDb,
                start_position: Some(Position::new("mysql-bin.000001", 4)),
                ..Default::default()
            },
            handler.clone(),
        );

        canal.handle_event(gtid_event("0-1-100")).unwrap();
        canal.handle_event(xid_event(400)).unwrap();

        assert!(canal.cursor().gtid_set().is_none());
        assert_eq!(canal.cursor().position().position, 400);
        assert_eq!(handler.recorded.lock().unwrap().gtids, vec!["0-1-100".to_string()]);
    }

    #[test]
    fn test_seed_from_status_without_start_position() {
        let mut canal = Canal::new(CanalConfig::default());
        let status = MasterStatus {
            position: Position::new("mysql-bin.000042", 1540),
            executed_gtid_set: GtidSet::parse(&format!("{}:1-20", SID)).unwrap(),
        };

        canal.seed_from_status(status.clone(), false);
        assert_eq!(canal.cursor().position(), Position::new("mysql-bin.000042", 1540));
        assert!(canal.cursor().gtid_set().is_none());

        canal.seed_from_status(status, true);
        assert_eq!(canal.cursor().gtid_set().unwrap().to_string(), format!("{}:1-20", SID));

        canal.config.flavor = Flavor::MariaDb;
        let fresh = Canal::new(canal.config.clone());
        fresh.seed_from_status(
            MasterStatus {
                position: Position::new("mysql-bin.000042", 1540),
                executed_gtid_set: GtidSet::parse(&format!("{}:1-20", SID)).unwrap(),
            },
            true,
        );
        assert!(fresh.cursor().gtid_set().is_none());
    }

    #[test]
    fn test_seed_from_status_keeps_configured_start() {
        let canal = canal_with(RecordingHandler::default());
        let status = MasterStatus {
            position: Position::new("mysql-bin.000042", 1540),
            executed_gtid_set: GtidSet::parse(&format!("{}:1-20", SID)).unwrap(),
        };

        canal.seed_from_status(status, true);

        // 설정된 위치와 서버의 GTID 집합을 섞지 않는다
        let checkpoint = canal.cursor().checkpoint();
        assert_eq!(checkpoint.position, Position::new("mysql-bin.000001", 4));
        assert!(checkpoint.gtid_set.is_none());
    }

    #[test]
    fn test_decoder_settings() {
        let canal = canal_with(RecordingHandler::default());
        let settings = canal.decoder_settings();
        assert_eq!(settings.server_id, 101);
        assert_eq!(settings.flavor, Flavor::MySql);
        assert_eq!(settings.heartbeat_period, Duration::from_secs(60));
        assert_eq!(settings.read_timeout, Duration::from_secs(90));
        assert_eq!(settings.start, Position::new("mysql-bin.000001", 4));
        assert!(settings.gtid_set.is_none());
    }

    #[test]
    fn test_ddl_invalidates_schema() {
        let handler = RecordingHandler::default();
        let mut canal = canal_with(handler.clone());
        canal.schemas().insert((*table()).clone());

        canal
            .handle_event(DecodedEvent::Query {
                schema: "test".to_string(),
                query: "ALTER TABLE `t` ADD COLUMN note TEXT".to_string(),
                header: EventHeader::new(EventType::QueryEvent, 0, 900),
            })
            .unwrap();

        assert!(canal.schemas().get("test", "t").is_none());
        assert_eq!(canal.cursor().position().position, 900);
        let recorded = handler.recorded.lock().unwrap();
        assert_eq!(recorded.tables_changed, vec![("test".to_string(), "t".to_string())]);
    }

    #[test]
    fn test_non_ddl_query_only_moves_cursor() {
        let handler = RecordingHandler::default();
        let mut canal = canal_with(handler.clone());

        canal
            .handle_event(DecodedEvent::Query {
                schema: "test".to_string(),
                query: "BEGIN".to_string(),
                header: EventHeader::new(EventType::QueryEvent, 0, 500),
            })
            .unwrap();

        assert_eq!(canal.cursor().position(), Position::new("mysql-bin.000001", 500));
        assert!(handler.recorded.lock().unwrap().synced.is_empty());
    }

    #[test]
    fn test_ddl_target() {
        assert_eq!(
            ddl_target("alter table shop.`orders` add column x int"),
            Some((Some("shop".to_string()), "orders".to_string()))
        );
        assert_eq!(
            ddl_target("CREATE TABLE IF NOT EXISTS users (id int)"),
            Some((None, "users".to_string()))
        );
        assert_eq!(ddl_target("INSERT INTO users VALUES (1)"), None);
    }

    #[test]
    fn test_ddl_target_with_comments_and_quoted_names() {
        assert_eq!(
            ddl_target("/* app:billing */ ALTER TABLE t ADD COLUMN x INT"),
            Some((None, "t".to_string()))
        );
        assert_eq!(
            ddl_target("-- migration 12\n/* a */ /* b */\nDROP TABLE IF EXISTS `old`"),
            Some((None, "old".to_string()))
        );
        assert_eq!(
            ddl_target("ALTER TABLE `my-db`.`order-items` ADD COLUMN note TEXT"),
            Some((Some("my-db".to_string()), "order-items".to_string()))
        );
        assert_eq!(ddl_target("/* unterminated ALTER TABLE t"), None);
        assert_eq!(strip_leading_comments("  # note\nBEGIN"), "BEGIN");
    }

    #[test]
    fn test_handler_error_wrapped() {
        let handler = RecordingHandler {
            fail_rows: true,
            ..Default::default()
        };
        let mut canal = canal_with(handler);
        let err = canal
            .handle_event(rows_event(Action::Delete, vec![vec![CellValue::Int32(1)]], RowFormat::V1))
            .unwrap_err();
        match err {
            CdcError::HandlerError { handler, .. } => assert_eq!(handler, "RecordingHandler"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "3307"),
            ("CANAL_SERVER_ID", "2001"),
            ("CANAL_FLAVOR", "MariaDB"),
            ("CANAL_DBS", "shop, test ,"),
            ("CANAL_BIN_NAME", "mysql-bin.000010"),
            ("CANAL_BIN_POS", "1200"),
            ("CANAL_HEARTBEAT_SECS", "5"),
        ]
        .into_iter()
        .collect();

        let config = CanalConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.connection.hostname, "db.internal");
        assert_eq!(config.connection.port, 3307);
        assert_eq!(config.server_id, 2001);
        assert_eq!(config.flavor, Flavor::MariaDb);
        assert_eq!(config.databases, vec!["shop".to_string(), "test".to_string()]);
        assert_eq!(config.start_position, Some(Position::new("mysql-bin.000010", 1200)));
        assert_eq!(config.heartbeat_period, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(90));

        let bad = CanalConfig::from_lookup(|k| (k == "DB_PORT").then(|| "abc".to_string()));
        assert!(matches!(bad, Err(CdcError::ConfigError(_))));
    }

    #[test]
    fn test_config_validate() {
        assert!(CanalConfig::default().validate().is_ok());

        let zero_id = CanalConfig::from_lookup(|k| (k == "CANAL_SERVER_ID").then(|| "0".to_string()));
        assert!(matches!(zero_id, Err(CdcError::ConfigError(_))));

        let slow_heartbeat = CanalConfig {
            heartbeat_period: Duration::from_secs(90),
            read_timeout: Duration::from_secs(30),
            ..Default::default()
        };
        assert!(matches!(slow_heartbeat.validate(), Err(CdcError::ConfigError(_))));
    }

    #[test]
    fn test_config_defaults() {
        let config = CanalConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.server_id, 101);
        assert_eq!(config.databases, vec!["test".to_string()]);
        assert!(config.start_position.is_none());
        assert!(config.table_filter().unwrap().matches("test", "anything"));
        assert!(!config.table_filter().unwrap().matches("other", "anything"));
    }

    #[tokio::test]
    async fn test_run_until_channel_closed() {
        let handler = RecordingHandler::default();
        let mut canal = canal_with(handler.clone());
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(rows_event(Action::Insert, vec![vec![CellValue::Int32(-1)]], RowFormat::V2)).unwrap();
        tx.send(DecodedEvent::Xid {
            xid: 1,
            header: EventHeader::new(EventType::XidEvent, 1700000300, 640),
        })
        .unwrap();
        drop(tx);

        canal.run(rx).await.unwrap();

        assert_eq!(canal.cursor().position(), Position::new("mysql-bin.000001", 640));
        assert_eq!(handler.recorded.lock().unwrap().rows.len(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_close() {
        let mut canal = canal_with(RecordingHandler::default());
        let closer = canal.closer();
        let (_tx, rx) = mpsc::unbounded_channel::<DecodedEvent>();

        let task = tokio::spawn(async move {
            canal.run(rx).await?;
            Ok::<_, CdcError>(canal.cursor().position())
        });
        closer.close();

        let pos = task.await.unwrap().unwrap();
        assert_eq!(pos, Position::new("mysql-bin.000001", 4));
    }

    #[tokio::test]
    async fn test_run_returns_handler_error() {
        let handler = RecordingHandler {
            fail_rows: true,
            ..Default::default()
        };
        let mut canal = canal_with(handler);
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(rows_event(Action::Insert, vec![vec![CellValue::Int32(1)]], RowFormat::V2)).unwrap();

        let result = canal.run(rx).await;
        assert!(matches!(result, Err(CdcError::HandlerError { .. })));
    }

    #[tokio::test]
    async fn test_run_continues_past_mariadb_gtid() {
        let handler = RecordingHandler::default();
        let mut canal = canal_with_config(
            CanalConfig {
                flavor: Flavor::MariaDb,
                start_position: Some(Position::new("mysql-bin.000001", 4)),
                ..Default::default()
            },
            handler.clone(),
        );
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(gtid_event("0-1-100")).unwrap();
        tx.send(rows_event(Action::Insert, vec![vec![CellValue::Int32(5)]], RowFormat::V2)).unwrap();
        tx.send(xid_event(512)).unwrap();
        drop(tx);

        canal.run(rx).await.unwrap();

        assert_eq!(canal.cursor().position(), Position::new("mysql-bin.000001", 512));
        assert_eq!(handler.recorded.lock().unwrap().rows.len(), 1);
    }

    #[tokio::test]
    async fn test_run_read_timeout() {
        let mut canal = canal_with_config(
            CanalConfig {
                start_position: Some(Position::new("mysql-bin.000001", 4)),
                heartbeat_period: Duration::from_millis(10),
                read_timeout: Duration::from_millis(50),
                ..Default::default()
            },
            RecordingHandler::default(),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(DecodedEvent::Heartbeat {
            header: EventHeader::new(EventType::HeartbeatEvent, 0, 0),
        })
        .unwrap();

        // 송신측은 살아 있지만 더 이상 이벤트가 없다
        let result = canal.run(rx).await;
        assert!(matches!(result, Err(CdcError::ReadTimeout(d)) if d == Duration::from_millis(50)));
        drop(tx);
    }
}
