//! MySQL binlog CDC 클라이언트 코어
//!
//! 이 라이브러리는 디코딩된 binlog 이벤트를 받아 정규화하고 복제 위치를 추적합니다.
//! 주요 기능:
//! - 복제 커서 (위치, GTID 집합, 타임스탬프) 동시성 관리
//! - Row 이벤트 생성 및 unsigned 컬럼 보정
//! - 이벤트 핸들러 / 테이블 필터
//! - 시작 위치 및 테이블 메타데이터 조회

pub mod canal;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod events;
pub mod filter;
pub mod gtid;
pub mod handler;
pub mod position;
pub mod rows;
pub mod schema;

pub use canal::{Canal, CanalCloser, CanalConfig, DecoderSettings, Flavor};
pub use connection::{ConnectionConfig, MySqlConnection};
pub use cursor::ReplicationCursor;
pub use error::{CdcError, Result};
pub use events::{Action, CellValue, DecodedEvent, EventHeader, EventType, RowFormat};
pub use filter::TableFilter;
pub use gtid::GtidSet;
pub use handler::{DummyEventHandler, EventHandler};
pub use position::{Checkpoint, Position};
pub use rows::RowsEvent;
pub use schema::{ColumnDescriptor, ColumnType, SchemaCache, TableDescriptor};
