use super::{Dialect, InsertResult, StatementCompiler, wrap_quoted};
use crate::schema::ColumnType;
use crate::state::RowLock;

/// MySQL and MariaDB.
///
/// Backtick quoting, backslash-aware string escaping, `LIMIT`/`OFFSET` pagination and
/// last-insert-id write results.
#[derive(Debug, Clone, Copy)]
pub struct MySqlCompiler {
    flavor: Dialect,
}

impl MySqlCompiler {
    /// `flavor` is reported by [`StatementCompiler::dialect`]; it must be MySQL or MariaDB.
    pub fn new(flavor: Dialect) -> Self {
        let flavor = match flavor {
            Dialect::MariaDb => Dialect::MariaDb,
            _ => Dialect::MySql,
        };
        Self { flavor }
    }
}

impl Default for MySqlCompiler {
    fn default() -> Self {
        Self::new(Dialect::MySql)
    }
}

/// Largest row count MySQL accepts; used for offset-only pagination.
const MAX_ROWS: u64 = 18_446_744_073_709_551_615;

impl StatementCompiler for MySqlCompiler {
    fn dialect(&self) -> Dialect {
        self.flavor
    }

    fn quote(&self, name: &str) -> String {
        wrap_quoted(name, '`', '`')
    }

    fn insert_result(&self) -> InsertResult {
        InsertResult::LastInsertId
    }

    fn lock_clause(&self, lock: RowLock) -> Option<&'static str> {
        Some(match lock {
            RowLock::Update => "FOR UPDATE",
            RowLock::Share => "LOCK IN SHARE MODE",
        })
    }

    fn string_literal(&self, s: &str) -> String {
        format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
    }

    fn pagination(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (None, None) => None,
            (Some(l), None) => Some(format!("LIMIT {l}")),
            (None, Some(o)) => Some(format!("LIMIT {MAX_ROWS} OFFSET {o}")),
            (Some(l), Some(o)) => Some(format!("LIMIT {l} OFFSET {o}")),
        }
    }

    fn empty_insert(&self) -> &'static str {
        "() VALUES ()"
    }

    fn column_type(&self, ty: &ColumnType) -> String {
        match ty {
            ColumnType::Integer => "INT".into(),
            ColumnType::BigInteger => "BIGINT".into(),
            ColumnType::Float => "DOUBLE".into(),
            ColumnType::Decimal { precision, scale } => format!("DECIMAL({precision},{scale})"),
            ColumnType::Boolean => "TINYINT(1)".into(),
            ColumnType::Varchar(len) => format!("VARCHAR({len})"),
            ColumnType::Text => "TEXT".into(),
            ColumnType::Date => "DATE".into(),
            ColumnType::DateTime => "DATETIME".into(),
            ColumnType::Timestamp => "TIMESTAMP".into(),
            ColumnType::Json => "JSON".into(),
            ColumnType::Uuid => "CHAR(36)".into(),
            ColumnType::Binary => "BLOB".into(),
        }
    }

    fn auto_increment(&self, ty: &ColumnType, primary_key: bool) -> String {
        let base = match ty {
            ColumnType::Integer => "INT",
            _ => "BIGINT",
        };
        if primary_key {
            format!("{base} NOT NULL AUTO_INCREMENT PRIMARY KEY")
        } else {
            format!("{base} NOT NULL AUTO_INCREMENT")
        }
    }

    fn table_exists(&self, table: &str) -> String {
        format!(
            "SELECT TABLE_NAME AS name FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = {}",
            self.string_literal(table)
        )
    }

    fn list_tables(&self) -> String {
        "SELECT TABLE_NAME AS name FROM information_schema.TABLES \
         WHERE TABLE_SCHEMA = DATABASE() ORDER BY TABLE_NAME"
            .to_string()
    }

    fn list_columns(&self, table: &str) -> String {
        format!(
            "SELECT COLUMN_NAME AS name, COLUMN_TYPE AS type FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = {} ORDER BY ORDINAL_POSITION",
            self.string_literal(table)
        )
    }
}
