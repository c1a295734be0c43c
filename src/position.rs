//! Binlog 좌표 (파일명 + 바이트 위치) 및 체크포인트 스냅샷
//!
//! 예: "mysql-bin.000003" 파일의 4097 바이트 위치

use crate::gtid::GtidSet;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Binlog 파일의 첫 이벤트 위치 (4 바이트 매직 넘버 다음)
pub const BINLOG_START_POSITION: u64 = 4;

/// Binlog 파일 위치 정보
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Position {
    /// 바이너리 로그 파일명 (e.g., "mysql-bin.000001")
    pub filename: String,
    /// 바이트 위치
    pub position: u64,
}

impl Position {
    pub fn new(filename: impl Into<String>, position: u64) -> Self {
        Position {
            filename: filename.into(),
            position,
        }
    }

    /// 파일명에서 시퀀스 번호 추출
    pub fn file_sequence(&self) -> Option<u64> {
        self.filename
            .rsplit('.')
            .next()
            .and_then(|s| s.parse().ok())
    }

    /// 같은 파일 안에서 오프셋만 바꾼 위치
    pub fn with_offset(&self, position: u64) -> Self {
        Position {
            filename: self.filename.clone(),
            position,
        }
    }
}

/// 같은 파일 안에서만 비교할 수 있다. 파일이 다르면 `None`.
impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.filename != other.filename {
            return None;
        }
        Some(self.position.cmp(&other.position))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.filename, self.position)
    }
}

/// 체크포인트 저장용 커서 스냅샷
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub position: Position,
    /// GTID 추적이 꺼져 있으면 None
    pub gtid_set: Option<GtidSet>,
    /// 마지막 이벤트 타임스탬프 (초 단위)
    pub timestamp: u32,
}

impl Checkpoint {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "file": self.position.filename,
            "pos": self.position.position,
            "gtid": self.gtid_set.as_ref().map(|g| g.to_string()),
            "ts_sec": self.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_sequence() {
        let pos = Position::new("mysql-bin.000123", 4096);
        assert_eq!(pos.file_sequence(), Some(123));
        assert_eq!(Position::new("relay", 4).file_sequence(), None);
    }

    #[test]
    fn test_compare_same_file() {
        let a = Position::new("mysql-bin.000001", 4);
        let b = Position::new("mysql-bin.000001", 120);
        assert!(a < b);
        assert_eq!(a.partial_cmp(&a.clone()), Some(Ordering::Equal));
    }

    #[test]
    fn test_compare_different_file_is_undefined() {
        let a = Position::new("mysql-bin.000001", 4);
        let b = Position::new("mysql-bin.000002", 4);
        assert_eq!(a.partial_cmp(&b), None);
    }

    #[test]
    fn test_display() {
        let pos = Position::new("mysql-bin.000007", 1234);
        assert_eq!(pos.to_string(), "mysql-bin.000007:1234");
        assert_eq!(pos.with_offset(99).to_string(), "mysql-bin.000007:99");
    }

    #[test]
    fn test_checkpoint_json() {
        let checkpoint = Checkpoint {
            position: Position::new("mysql-bin.000001", 154),
            gtid_set: None,
            timestamp: 1700000000,
        };
        let json = checkpoint.to_json();
        assert_eq!(json["pos"], 154);
        assert!(json["gtid"].is_null());
    }
}
