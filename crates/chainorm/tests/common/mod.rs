//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use chainorm::{Connection, OrmResult, QueryOutput, Row};
use serde_json::Value;
use std::sync::Mutex;

type Responder = Box<dyn Fn(&str) -> OrmResult<QueryOutput> + Send + Sync>;

/// A scripted connection: every statement is logged and answered by the responder.
pub struct MockConnection {
    responder: Responder,
    log: Mutex<Vec<String>>,
}

impl MockConnection {
    pub fn new(responder: impl Fn(&str) -> OrmResult<QueryOutput> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Answers every statement with no rows.
    pub fn empty() -> Self {
        Self::new(|_| Ok(QueryOutput::default()))
    }

    pub fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Statements that start with `prefix`.
    pub fn matching(&self, prefix: &str) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|sql| sql.starts_with(prefix))
            .collect()
    }
}

impl Connection for MockConnection {
    async fn query(&self, sql: &str) -> OrmResult<QueryOutput> {
        self.log.lock().unwrap().push(sql.to_string());
        (self.responder)(sql)
    }
}

/// Build a row from a JSON object literal.
pub fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

pub fn rows(values: impl IntoIterator<Item = Value>) -> QueryOutput {
    QueryOutput::rows(values.into_iter().map(row).collect())
}
