//! Row 변경 이벤트 생성 및 unsigned 컬럼 보정
//!
//! binlog의 정수 값에는 부호 정보가 없어서 디코더는 항상 부호 있는 타입으로 읽는다.
//! 테이블 메타데이터의 unsigned 컬럼에 대해 원래 값을 복원한다.

use crate::events::{Action, CellValue, EventHeader};
use crate::schema::{ColumnType, TableDescriptor};
use std::fmt;
use std::sync::Arc;

/// mediumint unsigned 최댓값 (2^24 - 1)
const MAX_MEDIUMINT_UNSIGNED: i32 = 16_777_215;

/// Row 복제 이벤트
///
/// UPDATE는 v1, v2 형식에서 행 개수가 짝수이며 [변경 전, 변경 후] 순서로 쌍을 이룬다.
#[derive(Debug, Clone, PartialEq)]
pub struct RowsEvent {
    pub table: Arc<TableDescriptor>,
    pub action: Action,
    pub rows: Vec<Vec<CellValue>>,
    pub header: EventHeader,
}

impl RowsEvent {
    /// 이벤트를 조립하고 unsigned 컬럼을 보정한다
    pub fn new(
        table: Arc<TableDescriptor>,
        action: Action,
        rows: Vec<Vec<CellValue>>,
        header: EventHeader,
    ) -> Self {
        let mut event = RowsEvent {
            table,
            action,
            rows,
            header,
        };
        event.handle_unsigned();
        event
    }

    fn handle_unsigned(&mut self) {
        if self.table.unsigned_columns.is_empty() {
            return;
        }

        for row in &mut self.rows {
            for &ordinal in &self.table.unsigned_columns {
                // 행이 현재 테이블 정의보다 짧으면 과거 스키마로 기록된 행이다.
                // 값을 추측하지 않고 그대로 둔다.
                let Some(value) = row.get_mut(ordinal) else {
                    continue;
                };
                let column_type = self.table.column_type(ordinal);
                *value = to_unsigned(std::mem::replace(value, CellValue::Null), column_type);
            }
        }
    }

    /// UPDATE 이벤트의 (변경 전, 변경 후) 쌍
    pub fn update_pairs(&self) -> impl Iterator<Item = (&[CellValue], &[CellValue])> {
        self.rows
            .chunks_exact(2)
            .map(|pair| (pair[0].as_slice(), pair[1].as_slice()))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "schema": self.table.schema,
            "table": self.table.name,
            "action": self.action,
            "rows": self.rows,
            "header": self.header,
        })
    }
}

/// 선언된 저장 폭에 맞춰 부호 있는 값을 unsigned로 재해석
pub fn to_unsigned(value: CellValue, column_type: Option<ColumnType>) -> CellValue {
    match value {
        CellValue::Int8(v) => CellValue::UInt8(v as u8),
        CellValue::Int16(v) => CellValue::UInt16(v as u16),
        // mediumint는 3 바이트라서 4 바이트 재해석으로는 값이 틀린다
        CellValue::Int32(v) if v < 0 && column_type == Some(ColumnType::MediumInt) => {
            CellValue::UInt32(MAX_MEDIUMINT_UNSIGNED.wrapping_add(v).wrapping_add(1) as u32)
        }
        CellValue::Int32(v) => CellValue::UInt32(v as u32),
        CellValue::Int64(v) => CellValue::UInt64(v as u64),
        CellValue::Isize(v) => CellValue::Usize(v as usize),
        other => other,
    }
}

impl fmt::Display for RowsEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [", self.action, self.table)?;
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str("[")?;
            for (j, value) in row.iter().enumerate() {
                if j > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{}", value)?;
            }
            f.write_str("]")?;
        }
        f.write_str("]")
    }
}
