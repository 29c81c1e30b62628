use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// The kind of statement being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
    /// DDL, transaction control and anything else.
    Other,
}

/// Whether `sql` starts with `keyword` as a whole word, ignoring case.
fn starts_with_keyword(sql: &str, keyword: &str) -> bool {
    let Some(head) = sql.get(..keyword.len()) else {
        return false;
    };
    head.eq_ignore_ascii_case(keyword)
        && sql[keyword.len()..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_ascii_alphanumeric() && c != '_')
}

impl QueryType {
    /// Classify a statement by its leading keyword.
    ///
    /// `WITH ...` statements are classified by the statement that follows the last
    /// top-level CTE body.
    pub fn from_sql(sql: &str) -> Self {
        let trimmed = sql.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
        Self::from_keyword(trimmed).unwrap_or_else(|| {
            if starts_with_keyword(trimmed, "WITH") {
                Self::after_ctes(trimmed)
            } else {
                QueryType::Other
            }
        })
    }

    fn from_keyword(sql: &str) -> Option<Self> {
        [
            ("SELECT", QueryType::Select),
            ("INSERT", QueryType::Insert),
            ("UPDATE", QueryType::Update),
            ("DELETE", QueryType::Delete),
        ]
        .into_iter()
        .find(|(keyword, _)| starts_with_keyword(sql, keyword))
        .map(|(_, kind)| kind)
    }

    fn after_ctes(sql: &str) -> Self {
        let bytes = sql.as_bytes();
        let mut depth: i32 = 0;
        let mut tail = 0;
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        tail = i + 1;
                    }
                }
                b'\'' => {
                    i += 1;
                    while i < bytes.len() {
                        if bytes[i] == b'\'' {
                            if bytes.get(i + 1) == Some(&b'\'') {
                                i += 1;
                            } else {
                                break;
                            }
                        }
                        i += 1;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        Self::from_keyword(sql[tail..].trim_start()).unwrap_or(QueryType::Select)
    }
}

/// What monitors and hooks see about one statement.
#[derive(Debug, Clone)]
pub struct QueryContext {
    /// SQL used as the aggregation key for metrics.
    pub canonical_sql: String,
    /// SQL actually sent to the connection.
    pub exec_sql: String,
    pub query_type: QueryType,
    /// Tag passed through `Connection::query_tagged` (the builder tags with the table name).
    pub tag: Option<String>,
    /// Low-cardinality fields for observability.
    pub fields: BTreeMap<String, String>,
}

impl QueryContext {
    pub fn new(sql: &str) -> Self {
        Self {
            canonical_sql: sql.to_string(),
            exec_sql: sql.to_string(),
            query_type: QueryType::from_sql(sql),
            tag: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Fold a hook's decision into the context. `Err` carries the abort reason.
    pub(crate) fn apply(&mut self, action: HookAction) -> Result<(), String> {
        match action {
            HookAction::Continue => Ok(()),
            HookAction::ModifySql { exec_sql, canonical_sql } => {
                self.exec_sql = exec_sql;
                if let Some(key) = canonical_sql {
                    self.query_type = QueryType::from_sql(&key);
                    self.canonical_sql = key;
                }
                Ok(())
            }
            HookAction::Abort(reason) => Err(reason),
        }
    }
}

const MAX_ERROR_LEN: usize = 512;

/// Outcome of a statement, as reported to monitors.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Rows returned.
    Rows(usize),
    /// Rows changed by a write that returned nothing.
    Affected(u64),
    /// Failure, message truncated to 512 bytes.
    Error(String),
}

impl QueryResult {
    pub fn error(message: impl fmt::Display) -> Self {
        Self::Error(super::shorten_sql(&message.to_string(), Some(MAX_ERROR_LEN)))
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryResult::Rows(n) => write!(f, "{n} rows"),
            QueryResult::Affected(n) => write!(f, "{n} affected"),
            QueryResult::Error(e) => write!(f, "error: {e}"),
        }
    }
}

/// Receives timing and outcome of every statement run through an
/// [`InstrumentedConnection`](super::InstrumentedConnection).
pub trait QueryMonitor: Send + Sync {
    fn on_query_start(&self, _ctx: &QueryContext) {}

    fn on_query_complete(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult);

    /// Called after `on_query_complete` when the statement exceeded the slow threshold.
    fn on_slow_query(&self, _ctx: &QueryContext, _duration: Duration) {}
}

/// What a hook wants done with a statement.
#[derive(Debug, Clone)]
pub enum HookAction {
    Continue,
    /// Run different SQL.
    ModifySql {
        exec_sql: String,
        /// Optional override of the metrics key.
        canonical_sql: Option<String>,
    },
    /// Refuse the statement with a validation error.
    Abort(String),
}

/// Inspects, rewrites or aborts statements before they run.
pub trait QueryHook: Send + Sync {
    fn before_query(&self, ctx: &QueryContext) -> HookAction {
        let _ = ctx;
        HookAction::Continue
    }

    /// Called on completion, before monitors are notified.
    fn after_query(&self, _ctx: &QueryContext, _duration: Duration, _result: &QueryResult) {}
}
