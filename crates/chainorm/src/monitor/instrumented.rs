use super::config::MonitorConfig;
use super::monitors::{CompositeHook, NoopMonitor};
use super::types::{QueryContext, QueryHook, QueryMonitor, QueryResult};
use crate::client::{Connection, QueryOutput};
use crate::error::{OrmError, OrmResult};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A [`Connection`] wrapper that runs hooks, reports to a monitor and enforces a timeout.
///
/// Transaction control (`begin`/`commit`/`rollback`/`release`) is forwarded to the inner
/// connection untouched.
pub struct InstrumentedConnection<C> {
    conn: C,
    monitor: Arc<dyn QueryMonitor>,
    hook: Option<Arc<dyn QueryHook>>,
    config: MonitorConfig,
}

impl<C: Connection> InstrumentedConnection<C> {
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            monitor: Arc::new(NoopMonitor),
            hook: None,
            config: MonitorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_monitor<M: QueryMonitor + 'static>(mut self, monitor: M) -> Self {
        self.monitor = Arc::new(monitor);
        self
    }

    pub fn with_monitor_arc(mut self, monitor: Arc<dyn QueryMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_hook<H: QueryHook + 'static>(mut self, hook: H) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Add a hook after any already installed one.
    pub fn add_hook<H: QueryHook + 'static>(mut self, hook: H) -> Self {
        let hook: Arc<dyn QueryHook> = Arc::new(hook);
        self.hook = Some(match self.hook.take() {
            None => hook,
            Some(existing) => Arc::new(CompositeHook::new().add_arc(existing).add_arc(hook)),
        });
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn enable_monitoring(mut self) -> Self {
        self.config.enabled = true;
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn inner(&self) -> &C {
        &self.conn
    }

    pub fn into_inner(self) -> C {
        self.conn
    }

    fn apply_hook(&self, ctx: &mut QueryContext) -> OrmResult<()> {
        let Some(hook) = &self.hook else {
            return Ok(());
        };
        let action = hook.before_query(ctx);
        ctx.apply(action)
            .map_err(|reason| OrmError::validation(format!("query aborted by hook: {reason}")))
    }

    fn report(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult) {
        if !self.config.enabled {
            return;
        }
        if let Some(hook) = &self.hook {
            hook.after_query(ctx, duration, result);
        }
        self.monitor.on_query_complete(ctx, duration, result);
        if self.config.is_slow(duration) {
            self.monitor.on_slow_query(ctx, duration);
        }
    }

    async fn run(&self, sql: &str, tag: Option<&str>) -> OrmResult<QueryOutput> {
        let mut ctx = QueryContext::new(sql);
        ctx.tag = tag.map(str::to_string);
        self.apply_hook(&mut ctx)?;

        if self.config.enabled {
            self.monitor.on_query_start(&ctx);
        }

        let start = Instant::now();
        let exec_sql = ctx.exec_sql.as_str();
        let future = async {
            match tag {
                Some(tag) => self.conn.query_tagged(tag, exec_sql).await,
                None => self.conn.query(exec_sql).await,
            }
        };
        let result = match self.config.timeout {
            Some(timeout) => tokio::time::timeout(timeout, future)
                .await
                .unwrap_or(Err(OrmError::Timeout(timeout))),
            None => future.await,
        };
        let duration = start.elapsed();

        let outcome = match &result {
            Ok(output) if output.rows.is_empty() && output.affected_rows > 0 => {
                QueryResult::Affected(output.affected_rows)
            }
            Ok(output) => QueryResult::Rows(output.rows.len()),
            Err(OrmError::Timeout(d)) => QueryResult::Error(format!("timeout after {d:?}")),
            Err(e) => QueryResult::error(e),
        };
        self.report(&ctx, duration, &outcome);
        result
    }
}

impl<C: Connection> Connection for InstrumentedConnection<C> {
    async fn query(&self, sql: &str) -> OrmResult<QueryOutput> {
        self.run(sql, None).await
    }

    async fn query_tagged(&self, tag: &str, sql: &str) -> OrmResult<QueryOutput> {
        self.run(sql, Some(tag)).await
    }

    async fn begin(&self) -> OrmResult<()> {
        self.conn.begin().await
    }

    async fn commit(&self) -> OrmResult<()> {
        self.conn.commit().await
    }

    async fn rollback(&self) -> OrmResult<()> {
        self.conn.rollback().await
    }

    async fn release(&self) -> OrmResult<()> {
        self.conn.release().await
    }
}
