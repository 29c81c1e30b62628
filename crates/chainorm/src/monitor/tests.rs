use super::*;
use crate::client::{Connection, QueryOutput};
use crate::error::{OrmError, OrmResult};
use crate::row::Row;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Answers every statement with one row and records what it ran.
#[derive(Default)]
struct EchoConnection {
    ran: Mutex<Vec<String>>,
    tags: Mutex<Vec<String>>,
}

impl Connection for EchoConnection {
    async fn query(&self, sql: &str) -> OrmResult<QueryOutput> {
        self.ran.lock().unwrap().push(sql.to_string());
        let mut row = Row::new();
        row.insert("id".into(), json!(1));
        Ok(QueryOutput::rows(vec![row]))
    }

    async fn query_tagged(&self, tag: &str, sql: &str) -> OrmResult<QueryOutput> {
        self.tags.lock().unwrap().push(tag.to_string());
        self.query(sql).await
    }
}

struct SleepyConnection(Duration);

impl Connection for SleepyConnection {
    async fn query(&self, _: &str) -> OrmResult<QueryOutput> {
        tokio::time::sleep(self.0).await;
        Ok(QueryOutput::affected(1))
    }
}

#[derive(Default)]
struct Capture {
    completed: Mutex<Vec<(String, QueryResult, Option<String>)>>,
    slow: Mutex<usize>,
}

impl QueryMonitor for Capture {
    fn on_query_complete(&self, ctx: &QueryContext, _: Duration, result: &QueryResult) {
        self.completed
            .lock()
            .unwrap()
            .push((ctx.exec_sql.clone(), result.clone(), ctx.tag.clone()));
    }

    fn on_slow_query(&self, _: &QueryContext, _: Duration) {
        *self.slow.lock().unwrap() += 1;
    }
}

struct Prefix(&'static str);

impl QueryHook for Prefix {
    fn before_query(&self, ctx: &QueryContext) -> HookAction {
        HookAction::ModifySql {
            exec_sql: format!("{}{}", self.0, ctx.exec_sql),
            canonical_sql: None,
        }
    }
}

struct DenyDeletes;

impl QueryHook for DenyDeletes {
    fn before_query(&self, ctx: &QueryContext) -> HookAction {
        if ctx.query_type == QueryType::Delete {
            HookAction::Abort("deletes are disabled".into())
        } else {
            HookAction::Continue
        }
    }
}

// ==================== QUERY TYPE ====================

#[test]
fn query_type_by_leading_keyword() {
    assert_eq!(QueryType::from_sql("SELECT * FROM users"), QueryType::Select);
    assert_eq!(QueryType::from_sql("  select 1"), QueryType::Select);
    assert_eq!(QueryType::from_sql("(SELECT 1) UNION (SELECT 2)"), QueryType::Select);
    assert_eq!(
        QueryType::from_sql("INSERT INTO users (name) VALUES ('a')"),
        QueryType::Insert
    );
    assert_eq!(QueryType::from_sql("UPDATE users SET age = 1"), QueryType::Update);
    assert_eq!(QueryType::from_sql("DELETE FROM users"), QueryType::Delete);
    assert_eq!(QueryType::from_sql("CREATE TABLE t (id INT)"), QueryType::Other);
    assert_eq!(QueryType::from_sql("SELECTED"), QueryType::Other);
}

#[test]
fn query_type_looks_past_ctes() {
    assert_eq!(
        QueryType::from_sql("WITH a AS (SELECT 1), b AS (SELECT ')') SELECT * FROM a"),
        QueryType::Select
    );
    assert_eq!(
        QueryType::from_sql("WITH gone AS (SELECT id FROM t) DELETE FROM t"),
        QueryType::Delete
    );
    assert_eq!(
        QueryType::from_sql("WITH x AS (SELECT 1) UPDATE t SET a = 1"),
        QueryType::Update
    );
}

// ==================== MONITORS ====================

#[test]
fn query_result_error_is_truncated() {
    let QueryResult::Error(message) = QueryResult::error("é".repeat(400)) else {
        panic!("expected an error result");
    };
    assert!(message.ends_with("..."));
    assert!(message.len() <= 515);
    assert_eq!(QueryResult::Affected(2).to_string(), "2 affected");
}

#[test]
fn logging_monitor_line_shows_kind_table_and_outcome() {
    let monitor = LoggingMonitor::new().max_sql_length(10);
    let ctx = QueryContext::new("SELECT * FROM users").with_tag("users");
    assert_eq!(
        monitor.line(&ctx, Duration::from_millis(2), "3 rows"),
        "[chainorm] select users 2ms 3 rows | SELECT * F..."
    );

    let mut rewritten = QueryContext::new("DELETE FROM t");
    rewritten.exec_sql = "/* app */ DELETE FROM t".into();
    assert_eq!(
        LoggingMonitor::new()
            .prefix("db")
            .line(&rewritten, Duration::from_millis(1), "SLOW"),
        "db delete - 1ms SLOW | /* app */ DELETE FROM t (from: DELETE FROM t)"
    );
}

#[test]
fn stats_monitor_counts_by_kind_and_table() {
    let monitor = StatsMonitor::new();
    for (sql, tag, ms, result) in [
        ("SELECT 1", "users", 3, QueryResult::Rows(1)),
        ("INSERT INTO t (a) VALUES (1)", "t", 9, QueryResult::Affected(1)),
        ("UPDATE t SET a = 2", "t", 1, QueryResult::Affected(1)),
        ("DELETE FROM t", "t", 2, QueryResult::Error("locked".into())),
        ("CREATE TABLE t (a INT)", "t", 1, QueryResult::Rows(0)),
    ] {
        let ctx = QueryContext::new(sql).with_tag(tag);
        monitor.on_query_complete(&ctx, Duration::from_millis(ms), &result);
    }

    let stats = monitor.stats();
    assert_eq!(stats.total_queries, 5);
    assert_eq!(stats.failed_queries, 1);
    assert_eq!(
        [QueryType::Select, QueryType::Insert, QueryType::Update, QueryType::Delete, QueryType::Other]
            .map(|kind| stats.count(kind)),
        [1, 1, 1, 1, 1]
    );
    assert_eq!(stats.by_table["t"], 4);
    assert_eq!(stats.by_table["users"], 1);
    assert_eq!(stats.total_duration, Duration::from_millis(16));
    assert_eq!(stats.average_duration(), Duration::from_micros(3200));
    assert_eq!(stats.max_duration, Duration::from_millis(9));
    assert_eq!(stats.slowest_query.as_deref(), Some("INSERT INTO t (a) VALUES (1)"));

    monitor.reset();
    assert_eq!(monitor.stats(), QueryStats::default());
    assert_eq!(monitor.stats().average_duration(), Duration::ZERO);
}

#[test]
fn composite_monitor_fans_out() {
    let a = Arc::new(StatsMonitor::new());
    let b = Arc::new(StatsMonitor::new());
    let composite = CompositeMonitor::new().add_arc(a.clone()).add_arc(b.clone());
    composite.on_query_complete(
        &QueryContext::new("SELECT 1"),
        Duration::from_millis(1),
        &QueryResult::Rows(1),
    );
    assert_eq!(a.stats().total_queries, 1);
    assert_eq!(b.stats().total_queries, 1);
}

// ==================== HOOKS ====================

#[test]
fn composite_hook_chains_rewrites() {
    let hook = CompositeHook::new().add(Prefix("/* a */ ")).add(Prefix("/* b */ "));
    match hook.before_query(&QueryContext::new("SELECT 1")) {
        HookAction::ModifySql {
            exec_sql,
            canonical_sql,
        } => {
            assert_eq!(exec_sql, "/* b */ /* a */ SELECT 1");
            assert!(canonical_sql.is_none());
        }
        other => panic!("expected ModifySql, got {other:?}"),
    }
}

#[test]
fn composite_hook_abort_wins() {
    let hook = CompositeHook::new().add(DenyDeletes).add(Prefix("/* never */ "));
    assert!(matches!(
        hook.before_query(&QueryContext::new("DELETE FROM users")),
        HookAction::Abort(reason) if reason == "deletes are disabled"
    ));
    assert!(matches!(
        CompositeHook::new().add(DenyDeletes).before_query(&QueryContext::new("SELECT 1")),
        HookAction::Continue
    ));
}

// ==================== INSTRUMENTED CONNECTION ====================

#[tokio::test]
async fn rewritten_sql_reaches_the_connection_and_the_monitor() {
    let capture = Arc::new(Capture::default());
    let conn = InstrumentedConnection::new(EchoConnection::default())
        .with_config(MonitorConfig::new().enable_monitoring())
        .with_monitor_arc(capture.clone())
        .with_hook(Prefix("/* traced */ "));

    let output = conn.query_tagged("users", "SELECT * FROM users").await.unwrap();
    assert_eq!(output.rows.len(), 1);
    assert_eq!(
        *conn.inner().ran.lock().unwrap(),
        ["/* traced */ SELECT * FROM users"]
    );
    assert_eq!(*conn.inner().tags.lock().unwrap(), ["users"]);
    assert_eq!(
        *capture.completed.lock().unwrap(),
        [(
            "/* traced */ SELECT * FROM users".to_string(),
            QueryResult::Rows(1),
            Some("users".to_string())
        )]
    );
}

#[tokio::test]
async fn aborting_hook_skips_the_connection() {
    let conn = InstrumentedConnection::new(EchoConnection::default())
        .with_hook(Prefix("/* a */ "))
        .add_hook(DenyDeletes);

    let err = conn.query("DELETE FROM users").await.unwrap_err();
    assert!(err.is_validation());
    assert!(conn.inner().ran.lock().unwrap().is_empty());
}

#[tokio::test]
async fn disabled_monitoring_reports_nothing() {
    let capture = Arc::new(Capture::default());
    let conn = InstrumentedConnection::new(EchoConnection::default())
        .with_monitor_arc(capture.clone());
    conn.query("SELECT 1").await.unwrap();
    assert!(!conn.config().enabled);
    assert!(capture.completed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn slow_statements_are_flagged() {
    let capture = Arc::new(Capture::default());
    let conn = InstrumentedConnection::new(SleepyConnection(Duration::from_millis(30)))
        .with_config(
            MonitorConfig::new()
                .with_slow_query_threshold(Duration::from_millis(5))
                .enable_monitoring(),
        )
        .with_monitor_arc(capture.clone());

    conn.query("UPDATE t SET a = 1").await.unwrap();
    assert_eq!(*capture.slow.lock().unwrap(), 1);
    assert_eq!(capture.completed.lock().unwrap()[0].1, QueryResult::Affected(1));
}

#[tokio::test]
async fn timeout_fails_the_statement() {
    let capture = Arc::new(Capture::default());
    let conn = InstrumentedConnection::new(SleepyConnection(Duration::from_secs(60)))
        .with_query_timeout(Duration::from_millis(10))
        .enable_monitoring()
        .with_monitor_arc(capture.clone());

    let err = conn.query("SELECT 1").await.unwrap_err();
    assert!(matches!(err, OrmError::Timeout(d) if d == Duration::from_millis(10)));
    assert!(matches!(
        &capture.completed.lock().unwrap()[0].1,
        QueryResult::Error(message) if message.starts_with("timeout after")
    ));
}
