//! 테이블/컬럼 메타데이터
//!
//! 스키마 정보는 INFORMATION_SCHEMA에서 읽어오며, 현재 테이블 정의 기준이다.
//! 이미 기록된 binlog row는 과거 정의로 만들어졌을 수 있다 (스키마 드리프트).

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 컬럼 선언 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// tinyint, smallint, int, bigint
    Number,
    /// 3 바이트 정수 (mediumint)
    MediumInt,
    Float,
    Decimal,
    Enum,
    Set,
    String,
    Binary,
    DateTime,
    Timestamp,
    Date,
    Time,
    Year,
    Bit,
    Json,
    Geometry,
}

impl ColumnType {
    /// COLUMN_TYPE 문자열에서 타입 추출 (e.g., "mediumint(8) unsigned")
    pub fn from_column_type(column_type: &str) -> Self {
        let lower = column_type.trim().to_ascii_lowercase();
        let base = lower
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or_default();

        match base {
            "tinyint" | "smallint" | "int" | "integer" | "bigint" => ColumnType::Number,
            "mediumint" | "int24" => ColumnType::MediumInt,
            "float" | "double" | "real" => ColumnType::Float,
            "decimal" | "numeric" => ColumnType::Decimal,
            "enum" => ColumnType::Enum,
            "set" => ColumnType::Set,
            "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" => {
                ColumnType::Binary
            }
            "datetime" => ColumnType::DateTime,
            "timestamp" => ColumnType::Timestamp,
            "date" => ColumnType::Date,
            "time" => ColumnType::Time,
            "year" => ColumnType::Year,
            "bit" => ColumnType::Bit,
            "json" => ColumnType::Json,
            "geometry" | "point" | "linestring" | "polygon" | "multipoint"
            | "multilinestring" | "multipolygon" | "geometrycollection" => ColumnType::Geometry,
            _ => ColumnType::String,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, ColumnType::Number | ColumnType::MediumInt)
    }
}

/// 컬럼 메타데이터
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// 0부터 시작하는 컬럼 순서
    pub ordinal: usize,
    pub column_type: ColumnType,
    pub is_unsigned: bool,
    /// 원본 COLUMN_TYPE 문자열
    pub raw_type: String,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, ordinal: usize, raw_type: impl Into<String>) -> Self {
        let raw_type = raw_type.into();
        let column_type = ColumnType::from_column_type(&raw_type);
        let is_unsigned = column_type.is_integer()
            && raw_type
                .to_ascii_lowercase()
                .split_whitespace()
                .any(|word| word == "unsigned");

        ColumnDescriptor {
            name: name.into(),
            ordinal,
            column_type,
            is_unsigned,
            raw_type,
        }
    }
}

/// 테이블 메타데이터
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    /// unsigned 정수 컬럼의 순서 번호
    pub unsigned_columns: Vec<usize>,
}

impl TableDescriptor {
    pub fn new(
        schema: impl Into<String>,
        name: impl Into<String>,
        columns: Vec<ColumnDescriptor>,
    ) -> Self {
        let unsigned_columns = columns
            .iter()
            .filter(|c| c.is_unsigned)
            .map(|c| c.ordinal)
            .collect();

        TableDescriptor {
            schema: schema.into(),
            name: name.into(),
            columns,
            unsigned_columns,
        }
    }

    /// (이름, COLUMN_TYPE) 목록으로 생성. 순서 번호는 목록 순서.
    pub fn from_columns<'a>(
        schema: impl Into<String>,
        name: impl Into<String>,
        columns: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let columns = columns
            .into_iter()
            .enumerate()
            .map(|(ordinal, (column, raw_type))| ColumnDescriptor::new(column, ordinal, raw_type))
            .collect();
        Self::new(schema, name, columns)
    }

    pub fn column(&self, ordinal: usize) -> Option<&ColumnDescriptor> {
        self.columns.get(ordinal)
    }

    pub fn column_type(&self, ordinal: usize) -> Option<ColumnType> {
        self.column(ordinal).map(|c| c.column_type)
    }

    pub fn key(&self) -> String {
        table_key(&self.schema, &self.name)
    }

    /// 로그용 요약
    pub fn describe(&self) -> String {
        format!(
            "{} ({} columns, {} unsigned)",
            self,
            self.columns.len(),
            self.unsigned_columns.len()
        )
    }
}

impl fmt::Display for TableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

fn table_key(schema: &str, table: &str) -> String {
    format!("{}.{}", schema, table)
}

/// 테이블 메타데이터 캐시 (schema.table -> descriptor)
#[derive(Debug, Default)]
pub struct SchemaCache {
    tables: RwLock<HashMap<String, Arc<TableDescriptor>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, schema: &str, table: &str) -> Option<Arc<TableDescriptor>> {
        self.tables.read().get(&table_key(schema, table)).cloned()
    }

    pub fn insert(&self, table: TableDescriptor) -> Arc<TableDescriptor> {
        let table = Arc::new(table);
        self.tables.write().insert(table.key(), Arc::clone(&table));
        table
    }

    /// DDL 이후 다시 읽어야 하는 항목 제거
    pub fn invalidate(&self, schema: &str, table: &str) -> bool {
        self.tables.write().remove(&table_key(schema, table)).is_some()
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }
}
