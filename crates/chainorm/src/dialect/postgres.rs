use super::{Dialect, InsertResult, StatementCompiler, wrap_quoted};
use crate::schema::ColumnType;
use crate::state::RowLock;

/// PostgreSQL: double-quote identifiers, native booleans and `ILIKE`, `RETURNING *` inserts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresCompiler;

impl StatementCompiler for PostgresCompiler {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn quote(&self, name: &str) -> String {
        wrap_quoted(name, '"', '"')
    }

    fn insert_result(&self) -> InsertResult {
        InsertResult::Returning
    }

    fn lock_clause(&self, lock: RowLock) -> Option<&'static str> {
        Some(match lock {
            RowLock::Update => "FOR UPDATE",
            RowLock::Share => "FOR SHARE",
        })
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "TRUE" } else { "FALSE" }
    }

    fn ilike(&self, column: &str, pattern: &str, negated: bool) -> String {
        let not = if negated { "NOT " } else { "" };
        format!("{column} {not}ILIKE {pattern}")
    }

    fn column_type(&self, ty: &ColumnType) -> String {
        match ty {
            ColumnType::Integer => "INTEGER".into(),
            ColumnType::BigInteger => "BIGINT".into(),
            ColumnType::Float => "DOUBLE PRECISION".into(),
            ColumnType::Decimal { precision, scale } => format!("NUMERIC({precision},{scale})"),
            ColumnType::Boolean => "BOOLEAN".into(),
            ColumnType::Varchar(len) => format!("VARCHAR({len})"),
            ColumnType::Text => "TEXT".into(),
            ColumnType::Date => "DATE".into(),
            ColumnType::DateTime => "TIMESTAMP".into(),
            ColumnType::Timestamp => "TIMESTAMPTZ".into(),
            ColumnType::Json => "JSONB".into(),
            ColumnType::Uuid => "UUID".into(),
            ColumnType::Binary => "BYTEA".into(),
        }
    }

    fn auto_increment(&self, ty: &ColumnType, primary_key: bool) -> String {
        let base = match ty {
            ColumnType::Integer => "SERIAL",
            _ => "BIGSERIAL",
        };
        if primary_key {
            format!("{base} PRIMARY KEY")
        } else {
            base.to_string()
        }
    }

    fn table_exists(&self, table: &str) -> String {
        format!(
            "SELECT table_name AS name FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = {}",
            self.string_literal(table)
        )
    }

    fn list_tables(&self) -> String {
        "SELECT table_name AS name FROM information_schema.tables \
         WHERE table_schema = current_schema() ORDER BY table_name"
            .to_string()
    }

    fn list_columns(&self, table: &str) -> String {
        format!(
            "SELECT column_name AS name, data_type AS type FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = {} ORDER BY ordinal_position",
            self.string_literal(table)
        )
    }
}
