//! 복제 커서: 현재 소비 위치, GTID 집합, 마지막 타임스탬프
//!
//! 하나의 `RwLock`이 세 필드 전체를 보호한다. 필드 하나를 교체하는 동안
//! 쓰기 락을 잡고, 읽기는 동시에 여러 스레드가 할 수 있다.
//! 필드 사이의 원자성은 보장하지 않는다 (새 위치 + 이전 타임스탬프 조합이 보일 수 있음).

use crate::gtid::GtidSet;
use crate::position::{Checkpoint, Position};
use parking_lot::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct CursorState {
    position: Position,
    gtid_set: Option<GtidSet>,
    timestamp: u32,
}

/// 세션 동안 살아 있는 복제 위치 레코드
#[derive(Debug, Default)]
pub struct ReplicationCursor {
    state: RwLock<CursorState>,
}

impl ReplicationCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 시작 위치(와 GTID 집합)로 초기화
    pub fn starting_at(position: Position, gtid_set: Option<GtidSet>) -> Self {
        ReplicationCursor {
            state: RwLock::new(CursorState {
                position,
                gtid_set,
                timestamp: 0,
            }),
        }
    }

    pub fn update(&self, position: Position) {
        debug!("update master position {}", position);
        self.state.write().position = position;
    }

    pub fn update_timestamp(&self, timestamp: u32) {
        debug!("update master timestamp {}", timestamp);
        self.state.write().timestamp = timestamp;
    }

    /// 집합의 소유권을 가져간다. 호출자가 계속 쓰려면 clone을 넘겨야 한다.
    pub fn update_gtid_set(&self, gtid_set: GtidSet) {
        debug!("update master gtid set {}", gtid_set);
        self.state.write().gtid_set = Some(gtid_set);
    }

    pub fn position(&self) -> Position {
        self.state.read().position.clone()
    }

    pub fn timestamp(&self) -> u32 {
        self.state.read().timestamp
    }

    /// 내부 상태와 독립된 복사본. 한 번도 설정되지 않았으면 None.
    pub fn gtid_set(&self) -> Option<GtidSet> {
        self.state.read().gtid_set.clone()
    }

    /// 세 필드를 한 번의 읽기 락으로 복사
    pub fn checkpoint(&self) -> Checkpoint {
        let state = self.state.read();
        Checkpoint {
            position: state.position.clone(),
            gtid_set: state.gtid_set.clone(),
            timestamp: state.timestamp,
        }
    }
}
