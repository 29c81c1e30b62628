//! Connection trait for unified database access.
//!
//! The builder only ever hands a connection fully rendered SQL text, so any transport that
//! can run a statement and return loosely typed rows can back it: a driver client, a
//! pooled connection, a transaction handle, or a scripted mock in tests.

use crate::error::OrmResult;
use crate::row::Row;
use serde_json::Value;

/// What a statement produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub rows: Vec<Row>,
    /// Rows changed by INSERT/UPDATE/DELETE.
    pub affected_rows: u64,
    /// Auto-increment id reported by the driver (MySQL/MariaDB).
    pub last_insert_id: Option<Value>,
}

impl QueryOutput {
    pub fn rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    pub fn affected(affected_rows: u64) -> Self {
        Self {
            affected_rows,
            ..Self::default()
        }
    }

    pub fn with_last_insert_id(mut self, id: impl Into<Value>) -> Self {
        self.last_insert_id = Some(id.into());
        self
    }
}

/// A database connection able to run SQL text.
///
/// Transaction control defaults to issuing `BEGIN` / `COMMIT` / `ROLLBACK` through
/// [`Connection::query`]; `release` is a no-op unless the connection is pooled.
pub trait Connection: Send + Sync {
    /// Execute one statement.
    fn query(&self, sql: &str) -> impl std::future::Future<Output = OrmResult<QueryOutput>> + Send;

    /// Execute one statement, associating a tag for monitoring/observability.
    ///
    /// The default implementation ignores `tag` and calls [`Connection::query`].
    fn query_tagged(
        &self,
        tag: &str,
        sql: &str,
    ) -> impl std::future::Future<Output = OrmResult<QueryOutput>> + Send {
        let _ = tag;
        self.query(sql)
    }

    fn begin(&self) -> impl std::future::Future<Output = OrmResult<()>> + Send {
        async move { self.query("BEGIN").await.map(|_| ()) }
    }

    fn commit(&self) -> impl std::future::Future<Output = OrmResult<()>> + Send {
        async move { self.query("COMMIT").await.map(|_| ()) }
    }

    fn rollback(&self) -> impl std::future::Future<Output = OrmResult<()>> + Send {
        async move { self.query("ROLLBACK").await.map(|_| ()) }
    }

    /// Hand the connection back to its pool.
    fn release(&self) -> impl std::future::Future<Output = OrmResult<()>> + Send {
        async { Ok(()) }
    }
}

impl<C: Connection> Connection for &C {
    async fn query(&self, sql: &str) -> OrmResult<QueryOutput> {
        (**self).query(sql).await
    }

    async fn query_tagged(&self, tag: &str, sql: &str) -> OrmResult<QueryOutput> {
        (**self).query_tagged(tag, sql).await
    }

    async fn begin(&self) -> OrmResult<()> {
        (**self).begin().await
    }

    async fn commit(&self) -> OrmResult<()> {
        (**self).commit().await
    }

    async fn rollback(&self) -> OrmResult<()> {
        (**self).rollback().await
    }

    async fn release(&self) -> OrmResult<()> {
        (**self).release().await
    }
}

#[cfg(feature = "postgres")]
mod postgres {
    use super::{Connection, QueryOutput};
    use crate::error::{OrmError, OrmResult};
    use crate::row::Row;
    use serde_json::Value;
    use tokio_postgres::SimpleQueryMessage;

    /// Run `sql` over the simple-query protocol. Every column arrives as text.
    pub(super) async fn simple_query(
        client: &tokio_postgres::Client,
        sql: &str,
    ) -> OrmResult<QueryOutput> {
        let messages = client
            .simple_query(sql)
            .await
            .map_err(|e| OrmError::from(e).with_sql(sql))?;

        let mut out = QueryOutput::default();
        for message in messages {
            match message {
                SimpleQueryMessage::Row(row) => {
                    let mut map = Row::new();
                    for (idx, column) in row.columns().iter().enumerate() {
                        let value = row
                            .get(idx)
                            .map_or(Value::Null, |text| Value::String(text.to_string()));
                        map.insert(column.name().to_string(), value);
                    }
                    out.rows.push(map);
                }
                SimpleQueryMessage::CommandComplete(n) => out.affected_rows += n,
                _ => {}
            }
        }
        Ok(out)
    }

    impl Connection for tokio_postgres::Client {
        async fn query(&self, sql: &str) -> OrmResult<QueryOutput> {
            simple_query(self, sql).await
        }
    }
}

#[cfg(feature = "pool")]
impl Connection for deadpool_postgres::Client {
    async fn query(&self, sql: &str) -> OrmResult<QueryOutput> {
        let client: &tokio_postgres::Client = self;
        postgres::simple_query(client, sql).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<String>>,
    }

    impl Connection for Recorder {
        async fn query(&self, sql: &str) -> OrmResult<QueryOutput> {
            self.log.lock().unwrap().push(sql.to_string());
            Ok(QueryOutput::affected(0))
        }
    }

    #[tokio::test]
    async fn transaction_control_defaults_to_plain_statements() {
        let conn = Recorder::default();
        conn.begin().await.unwrap();
        conn.commit().await.unwrap();
        conn.rollback().await.unwrap();
        conn.release().await.unwrap();
        (&conn).query_tagged("tag", "SELECT 1").await.unwrap();
        assert_eq!(
            *conn.log.lock().unwrap(),
            ["BEGIN", "COMMIT", "ROLLBACK", "SELECT 1"]
        );
    }

    #[test]
    fn output_constructors() {
        let out = QueryOutput::affected(3).with_last_insert_id(7);
        assert_eq!(out.affected_rows, 3);
        assert_eq!(out.last_insert_id, Some(Value::from(7)));
        assert!(out.rows.is_empty());
    }
}
