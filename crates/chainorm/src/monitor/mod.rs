//! Statement monitoring, hooks and timeouts.
//!
//! [`InstrumentedConnection`] wraps any [`Connection`](crate::Connection) so every
//! statement the builder sends passes through an optional [`QueryHook`] (inspect, rewrite or
//! abort) and is reported to a [`QueryMonitor`] with its duration and outcome.
//!
//! ```rust,ignore
//! use chainorm::monitor::{InstrumentedConnection, LoggingMonitor, MonitorConfig};
//! use std::time::Duration;
//!
//! let conn = InstrumentedConnection::new(client)
//!     .with_config(
//!         MonitorConfig::new()
//!             .with_query_timeout(Duration::from_secs(30))
//!             .with_slow_query_threshold(Duration::from_secs(1))
//!             .enable_monitoring(),
//!     )
//!     .with_monitor(LoggingMonitor::new());
//!
//! let users = db.model("user")?.with("posts").get(&conn).await?;
//! ```

mod config;
mod instrumented;
mod monitors;
mod types;

#[cfg(feature = "tracing")]
mod tracing_hook;

#[cfg(test)]
mod tests;

pub use config::MonitorConfig;
pub use instrumented::InstrumentedConnection;
pub use monitors::{
    CompositeHook, CompositeMonitor, LoggingMonitor, NoopMonitor, QueryStats, StatsMonitor,
};
pub use types::{HookAction, QueryContext, QueryHook, QueryMonitor, QueryResult, QueryType};

#[cfg(feature = "tracing")]
pub use tracing_hook::TracingSqlHook;

/// The longest prefix of `sql` that fits in `max_bytes` without splitting a character.
fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let end = (0..=max_bytes).rev().find(|&i| sql.is_char_boundary(i)).unwrap_or(0);
    &sql[..end]
}

/// `sql` cut to `limit` bytes with a trailing `...`, or unchanged when it fits.
pub(crate) fn shorten_sql(sql: &str, limit: Option<usize>) -> String {
    match limit {
        Some(limit) if sql.len() > limit => format!("{}...", truncate_sql_bytes(sql, limit)),
        _ => sql.to_string(),
    }
}
