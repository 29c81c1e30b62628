//! Error types for chainorm

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Result type alias for chainorm operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for query building and execution
#[derive(Debug, Clone, Error)]
pub enum OrmError {
    /// Invalid setup: unknown state key, unknown model/relation, malformed relation descriptor
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed input: bad subquery, wrong argument shape, failed schema validation,
    /// incompatible method sequence
    #[error("Validation error: {0}")]
    Validation(String),

    /// An "or-fail" terminal found zero rows
    #[error("Not found: {0}")]
    NotFound(String),

    /// The connection rejected a statement
    #[error("Execution error: {message}")]
    Execution {
        message: String,
        /// Database error code, when the driver exposes one (e.g. SQLSTATE)
        code: Option<String>,
        /// Statement that failed, when known
        sql: Option<String>,
    },

    /// Query timeout error
    #[error("Query timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// Row (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A model observer failed after the result was finalized
    #[error("Observer error: {0}")]
    Observer(String),
}

impl OrmError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create an execution error without an attached statement
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            code: None,
            sql: None,
        }
    }

    /// Attach the failing statement to an execution error.
    ///
    /// Other variants are returned unchanged; an already attached statement is kept.
    pub fn with_sql(self, statement: &str) -> Self {
        match self {
            Self::Execution {
                message,
                code,
                sql: None,
            } => Self::Execution {
                message,
                code,
                sql: Some(statement.to_string()),
            },
            other => other,
        }
    }

    /// Check if this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is an execution error
    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution { .. })
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if this is an observer error
    pub fn is_observer(&self) -> bool {
        matches!(self, Self::Observer(_))
    }

    /// Returns `true` for execution errors that report a missing column or table.
    ///
    /// Matches the wording used by MySQL/MariaDB, PostgreSQL, SQLite and SQL Server.
    pub fn is_schema_mismatch(&self) -> bool {
        self.schema_mismatch().is_some()
    }

    /// Classify a schema-mismatch execution error.
    pub(crate) fn schema_mismatch(&self) -> Option<SchemaMismatch> {
        let Self::Execution { message, .. } = self else {
            return None;
        };
        if !mismatch_re().is_match(message) {
            return None;
        }
        let column = missing_column_res().iter().find_map(|re| {
            re.captures(message)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().rsplit('.').next().unwrap_or(m.as_str()).to_string())
        });
        if column.is_none() && missing_table_re().is_match(message) {
            return Some(SchemaMismatch::MissingTable);
        }
        Some(SchemaMismatch::MissingColumn(column))
    }
}

/// What a schema-mismatch error says is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SchemaMismatch {
    MissingTable,
    /// The column name, when the message names it.
    MissingColumn(Option<String>),
}

fn mismatch_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)unknown column|doesn't exist|does not exist|no such (table|column)|invalid (column|object) name|has no column named",
        )
        .expect("invalid built-in schema mismatch regex")
    })
}

fn missing_table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)table\s+'[^']+'\s+doesn't exist|relation\s+"[^"]+"\s+does not exist|no such table|invalid object name"#,
        )
        .expect("invalid built-in missing table regex")
    })
}

fn missing_column_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"(?i)unknown column '([^']+)'",
            r#"(?i)column "([^"]+)"(?: of relation "[^"]+")? does not exist"#,
            r"(?i)no such column: ([\w.]+)",
            r"(?i)has no column named (\w+)",
            r"(?i)invalid column name '([^']+)'",
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("invalid built-in missing column regex"))
        .collect()
    })
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for OrmError {
    fn from(err: tokio_postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db_err) => Self::Execution {
                message: db_err.message().to_string(),
                code: Some(db_err.code().code().to_string()),
                sql: None,
            },
            None => Self::execution(err.to_string()),
        }
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for OrmError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::execution(format!("pool: {err}"))
    }
}
