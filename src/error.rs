//! Canal 에러 타입

use thiserror::Error;
use std::io;
use std::time::Duration;

#[derive(Error, Debug)]
pub enum CdcError {
    #[error("MySQL 연결 에러: {0}")]
    ConnectionError(String),

    #[error("쿼리 실행 에러: {0}")]
    QueryError(String),

    #[error("스키마 에러: {0}")]
    SchemaError(String),

    #[error("GTID 처리 에러: {0}")]
    GtidError(String),

    #[error("지원하지 않는 row 형식: {0}")]
    UnsupportedRowFormat(String),

    #[error("이벤트 핸들러 에러 ({handler}): {message}")]
    HandlerError { handler: String, message: String },

    #[error("설정 에러: {0}")]
    ConfigError(String),

    #[error("I/O 에러: {0}")]
    IoError(String),

    #[error("직렬화 에러: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("읽기 타임아웃: {0:?} 동안 이벤트 없음")]
    ReadTimeout(Duration),

    #[error("채널이 닫혔습니다")]
    ChannelClosed,
}

impl From<io::Error> for CdcError {
    fn from(err: io::Error) -> Self {
        CdcError::IoError(err.to_string())
    }
}

impl From<mysql_async::Error> for CdcError {
    fn from(err: mysql_async::Error) -> Self {
        CdcError::QueryError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CdcError>;
