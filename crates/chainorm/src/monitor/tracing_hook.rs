use super::shorten_sql;
use super::types::{HookAction, QueryContext, QueryHook};
use tracing::Level;

/// Logs each statement on the `chainorm.sql` target just before it is sent.
///
/// It is a hook rather than a monitor, so it keeps logging when monitoring is turned
/// off on the [`InstrumentedConnection`](super::InstrumentedConnection).
#[derive(Debug, Clone)]
pub struct TracingSqlHook {
    level: Level,
    limit: Option<usize>,
}

impl Default for TracingSqlHook {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            limit: Some(200),
        }
    }
}

impl TracingSqlHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Cut statements longer than `bytes` (at a char boundary) and append `...`.
    pub fn max_sql_length(mut self, bytes: usize) -> Self {
        self.limit = Some(bytes);
        self
    }

    pub fn no_truncate(mut self) -> Self {
        self.limit = None;
        self
    }

    fn shorten(&self, sql: &str) -> String {
        shorten_sql(sql, self.limit)
    }
}

impl QueryHook for TracingSqlHook {
    fn before_query(&self, ctx: &QueryContext) -> HookAction {
        let sql = self.shorten(&ctx.exec_sql);
        // only recorded when a hook rewrote the statement
        let original = (ctx.exec_sql != ctx.canonical_sql).then(|| self.shorten(&ctx.canonical_sql));
        let original = original.as_deref();
        let tag = ctx.tag.as_deref().unwrap_or("-");
        let kind = ctx.query_type;
        let fields = tracing::field::debug(&ctx.fields);
        let level = self.level;

        macro_rules! log_at {
            ($($event:ident => $level:ident),*) => {
                match level {
                    $(Level::$level => tracing::$event!(
                        target: "chainorm.sql",
                        ?kind,
                        tag,
                        sql = %sql,
                        original,
                        fields,
                    ),)*
                }
            };
        }
        log_at!(error => ERROR, warn => WARN, info => INFO, debug => DEBUG, trace => TRACE);

        HookAction::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_statements_are_shortened() {
        let hook = TracingSqlHook::new().max_sql_length(8);
        assert_eq!(hook.shorten("SELECT * FROM users"), "SELECT *...");
        assert_eq!(hook.clone().no_truncate().shorten("SELECT * FROM users"), "SELECT * FROM users");
    }

    #[test]
    fn never_interferes() {
        let ctx = QueryContext::new("DELETE FROM t WHERE t.id = 1");
        let hook = TracingSqlHook::new().level(Level::TRACE);
        assert!(matches!(hook.before_query(&ctx), HookAction::Continue));
    }
}
