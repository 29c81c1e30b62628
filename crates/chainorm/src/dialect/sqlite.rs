use super::{Dialect, InsertResult, StatementCompiler, wrap_quoted};
use crate::schema::ColumnType;
use crate::state::RowLock;

/// SQLite: no row locks, `LIMIT -1` for offset-only pagination, `RETURNING *` inserts.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteCompiler;

impl StatementCompiler for SqliteCompiler {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn quote(&self, name: &str) -> String {
        wrap_quoted(name, '"', '"')
    }

    fn insert_result(&self) -> InsertResult {
        InsertResult::Returning
    }

    fn lock_clause(&self, _lock: RowLock) -> Option<&'static str> {
        None
    }

    fn pagination(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (None, None) => None,
            (Some(l), None) => Some(format!("LIMIT {l}")),
            (None, Some(o)) => Some(format!("LIMIT -1 OFFSET {o}")),
            (Some(l), Some(o)) => Some(format!("LIMIT {l} OFFSET {o}")),
        }
    }

    // SQLite rejects DEFAULT inside a VALUES list.
    fn missing_value(&self) -> &'static str {
        "NULL"
    }

    fn column_type(&self, ty: &ColumnType) -> String {
        match ty {
            ColumnType::Integer | ColumnType::BigInteger | ColumnType::Boolean => "INTEGER".into(),
            ColumnType::Float => "REAL".into(),
            ColumnType::Decimal { .. } => "NUMERIC".into(),
            ColumnType::Binary => "BLOB".into(),
            ColumnType::Varchar(_)
            | ColumnType::Text
            | ColumnType::Date
            | ColumnType::DateTime
            | ColumnType::Timestamp
            | ColumnType::Json
            | ColumnType::Uuid => "TEXT".into(),
        }
    }

    fn auto_increment(&self, _ty: &ColumnType, primary_key: bool) -> String {
        if primary_key {
            "INTEGER PRIMARY KEY AUTOINCREMENT".into()
        } else {
            "INTEGER".into()
        }
    }

    fn table_exists(&self, table: &str) -> String {
        format!(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = {}",
            self.string_literal(table)
        )
    }

    fn list_tables(&self) -> String {
        "SELECT name FROM sqlite_master WHERE type = 'table' \
         AND name NOT LIKE 'sqlite_%' ORDER BY name"
            .to_string()
    }

    fn list_columns(&self, table: &str) -> String {
        format!(
            "SELECT name, type FROM pragma_table_info({})",
            self.string_literal(table)
        )
    }

    fn truncate(&self, table: &str) -> String {
        format!("DELETE FROM {}", self.identifier(table))
    }
}
