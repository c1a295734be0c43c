//! 데이터베이스/테이블 필터
//!
//! 각 항목은 대소문자를 무시하는 정규식이며 전체 이름에 매칭된다 (e.g., `order_.*`).

use crate::error::{CdcError, Result};
use regex::Regex;

#[derive(Debug, Clone)]
struct QualifiedPattern {
    schema: Regex,
    table: Regex,
}

impl QualifiedPattern {
    fn matches(&self, schema: &str, table: &str) -> bool {
        self.schema.is_match(schema) && self.table.is_match(table)
    }
}

fn anchored(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("(?i)^(?:{})$", pattern.trim()))
        .map_err(|e| CdcError::ConfigError(format!("Invalid filter pattern {}: {}", pattern, e)))
}

/// 처리할 테이블 선택 정책
#[derive(Debug, Clone, Default)]
pub struct TableFilter {
    ignore: Vec<QualifiedPattern>,
    table_db: Option<Regex>,
    tables: Vec<Regex>,
    databases: Vec<Regex>,
}

impl TableFilter {
    /// 모든 테이블 허용
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// `ignore_tables`는 "db.table" 형식. `tables`가 있으면 `table_db` 안에서만 고르고
    /// `databases`는 무시된다.
    pub fn new(
        databases: &[String],
        table_db: Option<&str>,
        tables: &[String],
        ignore_tables: &[String],
    ) -> Result<Self> {
        let ignore = ignore_tables
            .iter()
            .filter(|entry| !entry.trim().is_empty())
            .map(|entry| -> Result<QualifiedPattern> {
                let (schema, table) = entry.split_once('.').ok_or_else(|| {
                    CdcError::ConfigError(format!(
                        "Ignore table must be in db.table format: {}",
                        entry
                    ))
                })?;
                Ok(QualifiedPattern {
                    schema: anchored(schema)?,
                    table: anchored(table)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let compile_all = |entries: &[String]| -> Result<Vec<Regex>> {
            entries
                .iter()
                .filter(|e| !e.trim().is_empty())
                .map(|e| anchored(e))
                .collect()
        };

        let tables = compile_all(tables)?;
        let (table_db, databases) = match table_db {
            Some(db) if !tables.is_empty() && !db.trim().is_empty() => {
                (Some(anchored(db)?), Vec::new())
            }
            _ => (None, compile_all(databases)?),
        };

        Ok(TableFilter {
            ignore,
            table_db,
            tables,
            databases,
        })
    }

    pub fn matches(&self, schema: &str, table: &str) -> bool {
        if self.ignore.iter().any(|p| p.matches(schema, table)) {
            return false;
        }

        if let Some(ref table_db) = self.table_db {
            return table_db.is_match(schema) && self.tables.iter().any(|t| t.is_match(table));
        }

        self.databases.is_empty() || self.databases.iter().any(|d| d.is_match(schema))
    }
}
