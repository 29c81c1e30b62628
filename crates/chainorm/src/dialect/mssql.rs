use super::{Dialect, InsertResult, StatementCompiler, wrap_quoted};
use crate::schema::{ColumnSchema, ColumnType, SchemaModel};
use crate::state::RowLock;

/// SQL Server: bracket quoting, `OFFSET ... FETCH` pagination (which needs an ORDER BY),
/// lock table hints and `OUTPUT INSERTED.*` inserts.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerCompiler;

impl StatementCompiler for SqlServerCompiler {
    fn dialect(&self) -> Dialect {
        Dialect::SqlServer
    }

    fn quote(&self, name: &str) -> String {
        wrap_quoted(name, '[', ']')
    }

    fn insert_result(&self) -> InsertResult {
        InsertResult::Output
    }

    fn lock_clause(&self, _lock: RowLock) -> Option<&'static str> {
        None
    }

    fn table_hint(&self, lock: RowLock) -> Option<&'static str> {
        Some(match lock {
            RowLock::Update => "WITH (UPDLOCK, ROWLOCK)",
            RowLock::Share => "WITH (HOLDLOCK, ROWLOCK)",
        })
    }

    fn string_literal(&self, s: &str) -> String {
        let escaped = s.replace('\'', "''");
        if s.is_ascii() {
            format!("'{escaped}'")
        } else {
            format!("N'{escaped}'")
        }
    }

    fn pagination(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        if limit.is_none() && offset.is_none() {
            return None;
        }
        let mut out = format!("OFFSET {} ROWS", offset.unwrap_or(0));
        if let Some(l) = limit {
            out.push_str(&format!(" FETCH NEXT {l} ROWS ONLY"));
        }
        Some(out)
    }

    fn pagination_requires_order(&self) -> bool {
        true
    }

    fn column_type(&self, ty: &ColumnType) -> String {
        match ty {
            ColumnType::Integer => "INT".into(),
            ColumnType::BigInteger => "BIGINT".into(),
            ColumnType::Float => "FLOAT".into(),
            ColumnType::Decimal { precision, scale } => format!("DECIMAL({precision},{scale})"),
            ColumnType::Boolean => "BIT".into(),
            ColumnType::Varchar(len) => format!("NVARCHAR({len})"),
            ColumnType::Text | ColumnType::Json => "NVARCHAR(MAX)".into(),
            ColumnType::Date => "DATE".into(),
            ColumnType::DateTime | ColumnType::Timestamp => "DATETIME2".into(),
            ColumnType::Uuid => "UNIQUEIDENTIFIER".into(),
            ColumnType::Binary => "VARBINARY(MAX)".into(),
        }
    }

    fn auto_increment(&self, ty: &ColumnType, primary_key: bool) -> String {
        let base = match ty {
            ColumnType::Integer => "INT",
            _ => "BIGINT",
        };
        if primary_key {
            format!("{base} IDENTITY(1,1) PRIMARY KEY")
        } else {
            format!("{base} IDENTITY(1,1)")
        }
    }

    fn table_exists(&self, table: &str) -> String {
        format!(
            "SELECT TABLE_NAME AS name FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_NAME = {}",
            self.string_literal(table)
        )
    }

    fn list_tables(&self) -> String {
        "SELECT TABLE_NAME AS name FROM INFORMATION_SCHEMA.TABLES \
         WHERE TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME"
            .to_string()
    }

    fn list_columns(&self, table: &str) -> String {
        format!(
            "SELECT COLUMN_NAME AS name, DATA_TYPE AS type FROM INFORMATION_SCHEMA.COLUMNS \
             WHERE TABLE_NAME = {} ORDER BY ORDINAL_POSITION",
            self.string_literal(table)
        )
    }

    fn create_table(&self, table: &str, schema: &SchemaModel) -> String {
        format!(
            "IF OBJECT_ID({}, 'U') IS NULL CREATE TABLE {} ({})",
            self.string_literal(table),
            self.identifier(table),
            self.table_body(schema)
        )
    }

    fn add_column(&self, table: &str, name: &str, column: &ColumnSchema) -> String {
        format!(
            "ALTER TABLE {} ADD {}",
            self.identifier(table),
            self.column_definition(name, column, false)
        )
    }

    fn drop_table(&self, table: &str) -> String {
        format!(
            "IF OBJECT_ID({}, 'U') IS NOT NULL DROP TABLE {}",
            self.string_literal(table),
            self.identifier(table)
        )
    }
}
