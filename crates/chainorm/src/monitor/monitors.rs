use super::shorten_sql;
use super::types::{HookAction, QueryContext, QueryHook, QueryMonitor, QueryResult, QueryType};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Monitor that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl QueryMonitor for NoopMonitor {
    fn on_query_complete(&self, _ctx: &QueryContext, _duration: Duration, _result: &QueryResult) {}
}

/// Writes one line per statement to stderr.
///
/// ```text
/// [chainorm] select users 1.2ms 3 rows | SELECT * FROM users WHERE users.id IN (1, 2)
/// ```
#[derive(Debug, Clone)]
pub struct LoggingMonitor {
    prefix: String,
    threshold: Option<Duration>,
    limit: Option<usize>,
}

impl Default for LoggingMonitor {
    fn default() -> Self {
        Self {
            prefix: "[chainorm]".to_string(),
            threshold: None,
            limit: Some(200),
        }
    }
}

impl LoggingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only log statements that took at least `duration`.
    pub fn min_duration(mut self, duration: Duration) -> Self {
        self.threshold = Some(duration);
        self
    }

    pub fn max_sql_length(mut self, bytes: usize) -> Self {
        self.limit = Some(bytes);
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub(crate) fn line(&self, ctx: &QueryContext, duration: Duration, outcome: &str) -> String {
        let mut sql = shorten_sql(&ctx.exec_sql, self.limit);
        if ctx.exec_sql != ctx.canonical_sql {
            sql.push_str(" (from: ");
            sql.push_str(&shorten_sql(&ctx.canonical_sql, self.limit));
            sql.push(')');
        }
        format!(
            "{} {} {} {duration:?} {outcome} | {sql}",
            self.prefix,
            kind_label(ctx.query_type),
            ctx.tag.as_deref().unwrap_or("-"),
        )
    }
}

fn kind_label(kind: QueryType) -> &'static str {
    match kind {
        QueryType::Select => "select",
        QueryType::Insert => "insert",
        QueryType::Update => "update",
        QueryType::Delete => "delete",
        QueryType::Other => "other",
    }
}

impl QueryMonitor for LoggingMonitor {
    fn on_query_complete(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult) {
        if self.threshold.is_none_or(|min| duration >= min) {
            eprintln!("{}", self.line(ctx, duration, &result.to_string()));
        }
    }

    fn on_slow_query(&self, ctx: &QueryContext, duration: Duration) {
        eprintln!("{}", self.line(ctx, duration, "SLOW"));
    }
}

/// Aggregates statement counts and timings, overall and per table.
///
/// The builder tags every statement with the table it targets, so `by_table` reads as
/// "statements sent for `users`", "for `posts`", and so on.
#[derive(Debug, Default)]
pub struct StatsMonitor {
    totals: Mutex<QueryStats>,
}

/// Snapshot of a [`StatsMonitor`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryStats {
    pub total_queries: u64,
    pub failed_queries: u64,
    pub total_duration: Duration,
    pub max_duration: Duration,
    pub slowest_query: Option<String>,
    pub by_table: BTreeMap<String, u64>,
    by_kind: [u64; 5],
}

impl QueryStats {
    /// Statements of one kind.
    pub fn count(&self, kind: QueryType) -> u64 {
        self.by_kind[kind as usize]
    }

    /// Mean statement duration, zero when nothing ran.
    pub fn average_duration(&self) -> Duration {
        match u32::try_from(self.total_queries) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_duration / n,
            Err(_) => self.total_duration.div_f64(self.total_queries as f64),
        }
    }
}

impl StatsMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> QueryStats {
        self.lock().clone()
    }

    pub fn reset(&self) {
        *self.lock() = QueryStats::default();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueryStats> {
        self.totals.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl QueryMonitor for StatsMonitor {
    fn on_query_complete(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult) {
        let mut stats = self.lock();
        stats.total_queries += 1;
        stats.total_duration = stats.total_duration.saturating_add(duration);
        stats.by_kind[ctx.query_type as usize] += 1;
        if let Some(tag) = &ctx.tag {
            *stats.by_table.entry(tag.clone()).or_default() += 1;
        }
        if matches!(result, QueryResult::Error(_)) {
            stats.failed_queries += 1;
        }
        if stats.slowest_query.is_none() || duration > stats.max_duration {
            stats.max_duration = duration;
            stats.slowest_query = Some(ctx.canonical_sql.clone());
        }
    }
}

/// Fans every event out to several monitors.
#[derive(Default)]
pub struct CompositeMonitor {
    monitors: Vec<Arc<dyn QueryMonitor>>,
}

impl CompositeMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add<M: QueryMonitor + 'static>(mut self, monitor: M) -> Self {
        self.monitors.push(Arc::new(monitor));
        self
    }

    pub fn add_arc(mut self, monitor: Arc<dyn QueryMonitor>) -> Self {
        self.monitors.push(monitor);
        self
    }
}

impl QueryMonitor for CompositeMonitor {
    fn on_query_start(&self, ctx: &QueryContext) {
        for monitor in &self.monitors {
            monitor.on_query_start(ctx);
        }
    }

    fn on_query_complete(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult) {
        for monitor in &self.monitors {
            monitor.on_query_complete(ctx, duration, result);
        }
    }

    fn on_slow_query(&self, ctx: &QueryContext, duration: Duration) {
        for monitor in &self.monitors {
            monitor.on_slow_query(ctx, duration);
        }
    }
}

/// Runs hooks in order; each sees the SQL produced by the previous one.
#[derive(Default)]
pub struct CompositeHook {
    hooks: Vec<Arc<dyn QueryHook>>,
}

impl CompositeHook {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add<H: QueryHook + 'static>(mut self, hook: H) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn add_arc(mut self, hook: Arc<dyn QueryHook>) -> Self {
        self.hooks.push(hook);
        self
    }
}

impl QueryHook for CompositeHook {
    fn before_query(&self, ctx: &QueryContext) -> HookAction {
        let mut next = ctx.clone();
        for hook in &self.hooks {
            let action = hook.before_query(&next);
            if let Err(reason) = next.apply(action) {
                return HookAction::Abort(reason);
            }
        }
        let canonical_sql = (next.canonical_sql != ctx.canonical_sql).then_some(next.canonical_sql);
        if next.exec_sql == ctx.exec_sql && canonical_sql.is_none() {
            HookAction::Continue
        } else {
            HookAction::ModifySql {
                exec_sql: next.exec_sql,
                canonical_sql,
            }
        }
    }

    fn after_query(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult) {
        for hook in &self.hooks {
            hook.after_query(ctx, duration, result);
        }
    }
}
