//! 이벤트 핸들러
//!
//! 모든 콜백은 기본 구현이 no-op이다. 필요한 것만 구현하면 된다.

use crate::error::Result;
use crate::gtid::GtidSet;
use crate::position::Position;
use crate::rows::RowsEvent;

pub trait EventHandler: Send {
    /// 새 binlog 파일로 전환됨
    fn on_rotate(&mut self, _next_log_name: &str, _position: u64) -> Result<()> {
        Ok(())
    }

    /// DDL로 테이블 정의가 바뀜
    fn on_table_changed(&mut self, _schema: &str, _table: &str) -> Result<()> {
        Ok(())
    }

    fn on_ddl(&mut self, _next_pos: &Position, _schema: &str, _query: &str) -> Result<()> {
        Ok(())
    }

    fn on_row(&mut self, _event: &RowsEvent) -> Result<()> {
        Ok(())
    }

    /// 트랜잭션 커밋
    fn on_xid(&mut self, _next_pos: &Position) -> Result<()> {
        Ok(())
    }

    fn on_gtid(&mut self, _gtid: &str) -> Result<()> {
        Ok(())
    }

    /// 위치가 확정됨. `force`는 로테이션처럼 반드시 저장해야 하는 경우.
    fn on_pos_synced(
        &mut self,
        _position: &Position,
        _gtid_set: Option<&GtidSet>,
        _force: bool,
    ) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str;
}

/// 아무것도 하지 않는 기본 핸들러
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyEventHandler;

impl EventHandler for DummyEventHandler {
    fn name(&self) -> &str {
        "DummyEventHandler"
    }
}
