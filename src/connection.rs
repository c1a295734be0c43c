//! MySQL 메타데이터 연결
//!
//! 복제 시작 위치와 테이블 정의를 조회한다. binlog 스트림 자체는 다루지 않는다.

use crate::error::{CdcError, Result};
use crate::gtid::GtidSet;
use crate::position::Position;
use crate::schema::TableDescriptor;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Row};
use std::time::Duration;
use tracing::{debug, warn};

/// MySQL 연결 설정
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: Option<String>,
    pub timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            hostname: "127.0.0.1".to_string(),
            port: 3306,
            username: "root".to_string(),
            password: String::new(),
            database: None,
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

    pub fn addr(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }

    fn build_opts(&self) -> Opts {
        let builder = OptsBuilder::default()
            .ip_or_hostname(self.hostname.clone())
            .tcp_port(self.port)
            .user(Some(self.username.clone()))
            .pass(Some(self.password.clone()))
            .db_name(self.database.clone());
        Opts::from(builder)
    }
}

/// 서버의 현재 binlog 상태
#[derive(Debug, Clone)]
pub struct MasterStatus {
    pub position: Position,
    /// MariaDB 등 컬럼이 없으면 빈 집합
    pub executed_gtid_set: GtidSet,
}

impl MasterStatus {
    /// 상태 행의 File, Position, Executed_Gtid_Set 컬럼. 변환 실패는 `None`으로 받는다.
    fn from_columns(
        file: Option<String>,
        position: Option<u64>,
        executed: Option<String>,
    ) -> Result<Self> {
        let file = file.ok_or_else(|| CdcError::QueryError("Missing binlog file column".to_string()))?;
        let position = position
            .ok_or_else(|| CdcError::QueryError("Missing binlog position column".to_string()))?;

        let executed_gtid_set = match executed {
            Some(gtid_str) => GtidSet::parse(&gtid_str).unwrap_or_else(|e| {
                warn!("Ignoring unparsable Executed_Gtid_Set: {}", e);
                GtidSet::new()
            }),
            None => GtidSet::new(),
        };

        Ok(MasterStatus {
            position: Position::new(file, position),
            executed_gtid_set,
        })
    }
}

/// MySQL 연결 래퍼
pub struct MySqlConnection {
    conn: Conn,
    config: ConnectionConfig,
}

impl MySqlConnection {
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        let opts = config.build_opts();
        let conn = tokio::time::timeout(config.timeout, Conn::new(opts))
            .await
            .map_err(|_| CdcError::ConnectionError(format!("Timed out connecting to {}", config.addr())))?
            .map_err(|e| CdcError::ConnectionError(format!("Failed to connect to {}: {}", config.addr(), e)))?;

        debug!("Connected to MySQL at {}", config.addr());
        Ok(MySqlConnection { conn, config })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// 현재 binlog 파일/위치와 실행된 GTID 집합
    pub async fn master_status(&mut self) -> Result<MasterStatus> {
        // 8.4부터 SHOW MASTER STATUS가 제거됨
        let rows: Vec<Row> = match self.conn.query("SHOW BINARY LOG STATUS").await {
            Ok(rows) => rows,
            Err(e) => {
                debug!("SHOW BINARY LOG STATUS failed ({}), falling back", e);
                self.conn.query("SHOW MASTER STATUS").await.map_err(|e| {
                    CdcError::QueryError(format!("Failed to query binlog status: {}", e))
                })?
            }
        };

        let row = rows
            .first()
            .ok_or_else(|| CdcError::QueryError("No binlog status available (is log_bin enabled?)".to_string()))?;

        MasterStatus::from_columns(
            row.get_opt(0).and_then(|v| v.ok()),
            row.get_opt(1).and_then(|v| v.ok()),
            row.get_opt(4).and_then(|v| v.ok()),
        )
    }

    pub async fn is_gtid_mode_enabled(&mut self) -> Result<bool> {
        Ok(self
            .get_variable("gtid_mode")
            .await?
            .map(|v| v.eq_ignore_ascii_case("ON"))
            .unwrap_or(false))
    }

    pub async fn server_id(&mut self) -> Result<u32> {
        let result: Option<u32> = self
            .conn
            .query_first("SELECT @@server_id")
            .await
            .map_err(|e| CdcError::QueryError(format!("Failed to query server_id: {}", e)))?;

        result.ok_or_else(|| CdcError::QueryError("server_id not available".to_string()))
    }

    pub async fn get_variable(&mut self, name: &str) -> Result<Option<String>> {
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(CdcError::QueryError(format!("Invalid variable name: {}", name)));
        }

        let query = format!("SHOW GLOBAL VARIABLES LIKE '{}'", name);
        let result: Option<(String, String)> = self
            .conn
            .query_first(query)
            .await
            .map_err(|e| CdcError::QueryError(format!("Failed to query {}: {}", name, e)))?;

        Ok(result.map(|(_, v)| v))
    }

    /// Binlog 형식 확인 (ROW, STATEMENT, MIXED)
    pub async fn binlog_format(&mut self) -> Result<String> {
        self.get_variable("binlog_format")
            .await?
            .ok_or_else(|| CdcError::QueryError("Binlog format not found".to_string()))
    }

    /// 데이터베이스의 모든 테이블
    pub async fn tables(&mut self, database: &str) -> Result<Vec<String>> {
        let result: Vec<String> = self
            .conn
            .exec(
                "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE' \
                 ORDER BY TABLE_NAME",
                (database,),
            )
            .await
            .map_err(|e| CdcError::QueryError(format!("Failed to query tables: {}", e)))?;

        Ok(result)
    }

    /// INFORMATION_SCHEMA에서 현재 테이블 정의를 읽는다
    pub async fn table_descriptor(&mut self, database: &str, table: &str) -> Result<TableDescriptor> {
        let columns: Vec<(String, String)> = self
            .conn
            .exec(
                "SELECT COLUMN_NAME, COLUMN_TYPE \
                 FROM INFORMATION_SCHEMA.COLUMNS \
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
                 ORDER BY ORDINAL_POSITION",
                (database, table),
            )
            .await
            .map_err(|e| CdcError::QueryError(format!("Failed to query table schema: {}", e)))?;

        if columns.is_empty() {
            return Err(CdcError::SchemaError(format!(
                "Table {}.{} not found",
                database, table
            )));
        }

        Ok(TableDescriptor::from_columns(
            database,
            table,
            columns.iter().map(|(name, ty)| (name.as_str(), ty.as_str())),
        ))
    }

    pub async fn close(self) -> Result<()> {
        self.conn.disconnect().await?;
        Ok(())
    }
}
