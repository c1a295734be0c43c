//! 디코딩된 binlog 이벤트 타입 및 셀 값
//!
//! 바이트 디코딩은 외부 디코더가 담당한다. 여기서는 디코더가 넘겨주는 형태만 정의한다.

use crate::schema::TableDescriptor;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// MySQL Binlog 이벤트 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventType {
    /// 알 수 없는 이벤트
    Unknown = 0,
    /// 쿼리 이벤트 (DDL, BEGIN)
    QueryEvent = 2,
    /// 로테이션 이벤트 (새 binlog 파일)
    RotateEvent = 4,
    /// 트랜잭션 커밋
    XidEvent = 16,
    /// 하트비트
    HeartbeatEvent = 27,
    /// v0/v1 WRITE_ROWS
    WriteRowsEventV1 = 23,
    /// v0/v1 UPDATE_ROWS
    UpdateRowsEventV1 = 24,
    /// v0/v1 DELETE_ROWS
    DeleteRowsEventV1 = 25,
    /// WRITE_ROWS 이벤트 (INSERT)
    WriteRowsEvent = 30,
    /// UPDATE_ROWS 이벤트 (UPDATE)
    UpdateRowsEvent = 31,
    /// DELETE_ROWS 이벤트 (DELETE)
    DeleteRowsEvent = 32,
    /// GTID 이벤트
    GtidEvent = 33,
}

impl EventType {
    pub fn from_u8(val: u8) -> Self {
        match val {
            2 => EventType::QueryEvent,
            4 => EventType::RotateEvent,
            16 => EventType::XidEvent,
            23 => EventType::WriteRowsEventV1,
            24 => EventType::UpdateRowsEventV1,
            25 => EventType::DeleteRowsEventV1,
            27 => EventType::HeartbeatEvent,
            30 => EventType::WriteRowsEvent,
            31 => EventType::UpdateRowsEvent,
            32 => EventType::DeleteRowsEvent,
            33 => EventType::GtidEvent,
            _ => EventType::Unknown,
        }
    }
}

/// Binlog 이벤트 헤더
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHeader {
    /// 서버 타임스탬프 (초 단위)
    pub timestamp: u32,
    pub event_type: EventType,
    /// MySQL 서버 ID
    pub server_id: u32,
    /// 이벤트 길이 (바이트)
    pub event_size: u32,
    /// 다음 이벤트 위치
    pub log_pos: u32,
    pub flags: u16,
}

impl EventHeader {
    pub fn new(event_type: EventType, timestamp: u32, log_pos: u32) -> Self {
        EventHeader {
            timestamp,
            event_type,
            server_id: 0,
            event_size: 0,
            log_pos,
            flags: 0,
        }
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(i64::from(self.timestamp), 0).single()
    }
}

/// 셀 값
///
/// 디코더는 부호 있는 정수만 만들어낸다. unsigned 변형은 보정 후에만 나타난다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Null,
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    /// 플랫폼 기본 폭 정수
    Isize(isize),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Usize(usize),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
    Date(String),
    Time(String),
    Decimal(String),
    Json(serde_json::Value),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_string(&self) -> Option<String> {
        match self {
            CellValue::String(s) | CellValue::Decimal(s) | CellValue::Date(s) | CellValue::Time(s) => {
                Some(s.clone())
            }
            CellValue::Int8(i) => Some(i.to_string()),
            CellValue::Int16(i) => Some(i.to_string()),
            CellValue::Int32(i) => Some(i.to_string()),
            CellValue::Int64(i) => Some(i.to_string()),
            CellValue::Isize(i) => Some(i.to_string()),
            CellValue::UInt8(u) => Some(u.to_string()),
            CellValue::UInt16(u) => Some(u.to_string()),
            CellValue::UInt32(u) => Some(u.to_string()),
            CellValue::UInt64(u) => Some(u.to_string()),
            CellValue::Usize(u) => Some(u.to_string()),
            CellValue::Double(d) => Some(d.to_string()),
            CellValue::Float(f) => Some(f.to_string()),
            CellValue::DateTime(dt) => Some(dt.to_rfc3339()),
            CellValue::Null => Some("NULL".to_string()),
            CellValue::Bytes(_) | CellValue::Json(_) => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Bytes(b) => write!(f, "{:02x?}", b),
            CellValue::Json(v) => write!(f, "{}", v),
            other => f.write_str(&other.as_string().unwrap_or_default()),
        }
    }
}

/// 변경 연산 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Insert,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Insert => "insert",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rows 이벤트 형식 버전
///
/// v1, v2의 UPDATE는 (변경 전, 변경 후) 쌍으로 행이 온다. v0은 지원하지 않는다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowFormat {
    V0,
    V1,
    V2,
}

/// 외부 디코더가 넘겨주는 이벤트
#[derive(Debug, Clone)]
pub enum DecodedEvent {
    /// 새 binlog 파일로 전환
    Rotate {
        next_log_name: String,
        position: u64,
    },
    Rows {
        table: Arc<TableDescriptor>,
        action: Action,
        rows: Vec<Vec<CellValue>>,
        header: EventHeader,
        row_format: RowFormat,
    },
    /// 다음 트랜잭션의 GTID ("uuid:sequence")
    Gtid {
        gtid: String,
        header: EventHeader,
    },
    /// 트랜잭션 커밋
    Xid {
        xid: u64,
        header: EventHeader,
    },
    Query {
        schema: String,
        query: String,
        header: EventHeader,
    },
    Heartbeat {
        header: EventHeader,
    },
}

impl DecodedEvent {
    pub fn header(&self) -> Option<&EventHeader> {
        match self {
            DecodedEvent::Rotate { .. } => None,
            DecodedEvent::Rows { header, .. }
            | DecodedEvent::Gtid { header, .. }
            | DecodedEvent::Xid { header, .. }
            | DecodedEvent::Query { header, .. }
            | DecodedEvent::Heartbeat { header } => Some(header),
        }
    }
}
