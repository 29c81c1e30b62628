//! Write terminals: save, delete/restore, increment, validation and observers.

mod common;

use chainorm::{
    ColumnSchema, ColumnType, Db, Dialect, Model, ModelDef, ModelObserver, OrmError, OrmResult,
    QueryOutput, Registry, Row, SchemaModel,
};
use common::{MockConnection, rows};
use serde_json::json;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Events(Arc<Mutex<Vec<String>>>);

impl Events {
    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

impl ModelObserver for Events {
    fn after_insert(&self, model: &Model, rows: &[Row]) -> OrmResult<()> {
        self.0.lock().unwrap().push(format!("insert {} {}", model.name(), rows.len()));
        Ok(())
    }

    fn after_update(&self, model: &Model, affected: u64) -> OrmResult<()> {
        self.0.lock().unwrap().push(format!("update {} {affected}", model.name()));
        Ok(())
    }

    fn after_delete(&self, model: &Model, affected: u64) -> OrmResult<()> {
        self.0.lock().unwrap().push(format!("delete {} {affected}", model.name()));
        Ok(())
    }
}

struct Refuse;

impl ModelObserver for Refuse {
    fn after_update(&self, _model: &Model, _affected: u64) -> OrmResult<()> {
        Err(OrmError::validation("audit log unavailable"))
    }
}

fn db(dialect: Dialect, events: &Events) -> Db {
    let registry = Registry::builder()
        .register(
            ModelDef::new("user")
                .table("users")
                .soft_deletes("deleted_at")
                .observer(events.clone()),
        )
        .register(
            ModelDef::new("ticket")
                .table("tickets")
                .uuid_primary_key()
                .timestamps(),
        )
        .register(
            ModelDef::new("account")
                .table("accounts")
                .schema(
                    SchemaModel::new()
                        .column("id", ColumnSchema::increments())
                        .column("name", ColumnSchema::new(ColumnType::Varchar(64)).not_null()),
                )
                .validate_with_schema(),
        )
        .register(ModelDef::new("audit").table("audits").observer(Refuse))
        .build()
        .unwrap();
    Db::new(dialect).with_registry(registry)
}

// ==================== SAVE ====================

#[tokio::test]
async fn postgres_insert_reads_back_with_returning() {
    let events = Events::default();
    let conn = MockConnection::new(|_| Ok(rows([json!({"id": 1, "name": "ann", "age": 3})])));

    let mut query = db(Dialect::Postgres, &events)
        .model("user")
        .unwrap()
        .create(&json!({"name": "ann", "age": 3}));
    let result = query.save(&conn).await.unwrap();

    assert_eq!(
        conn.statements(),
        ["INSERT INTO users (age, name) VALUES (3, 'ann') RETURNING *"]
    );
    assert_eq!(result.affected, 1);
    assert_eq!(result.rows[0]["id"], json!(1));
    assert_eq!(events.take(), ["insert user 1"]);
    assert!(query.state().clauses.statement.is_none());
}

#[tokio::test]
async fn mysql_insert_reselects_by_last_insert_id() {
    let events = Events::default();
    let conn = MockConnection::new(|sql| {
        if sql.starts_with("INSERT") {
            Ok(QueryOutput::affected(1).with_last_insert_id(9))
        } else {
            Ok(rows([json!({"id": 9, "name": "bo"})]))
        }
    });

    let result = db(Dialect::MySql, &events)
        .table("users")
        .create(&json!({"name": "bo"}))
        .save(&conn)
        .await
        .unwrap();

    assert_eq!(
        conn.statements(),
        [
            "INSERT INTO users (name) VALUES ('bo')",
            "SELECT * FROM users WHERE users.id = 9 LIMIT 1",
        ]
    );
    assert_eq!(result.last_insert_id, Some(json!(9)));
    assert_eq!(result.rows, [common::row(json!({"id": 9, "name": "bo"}))]);
}

#[tokio::test]
async fn void_skips_the_read_back() {
    let conn = MockConnection::new(|_| Ok(QueryOutput::affected(1).with_last_insert_id(4)));
    let result = db(Dialect::MySql, &Events::default())
        .table("users")
        .create(&json!({"name": "cy"}))
        .void()
        .save(&conn)
        .await
        .unwrap();
    assert_eq!(conn.statements().len(), 1);
    assert!(result.rows.is_empty());
}

#[tokio::test]
async fn mssql_insert_uses_output_inserted() {
    let conn = MockConnection::new(|_| Ok(rows([json!({"id": 1})])));
    db(Dialect::SqlServer, &Events::default())
        .table("users")
        .create(&json!({"name": "dee"}))
        .save(&conn)
        .await
        .unwrap();
    assert_eq!(
        conn.statements(),
        ["INSERT INTO users (name) OUTPUT INSERTED.* VALUES ('dee')"]
    );
}

#[tokio::test]
async fn uuid_and_timestamps_are_filled_in() {
    let conn = MockConnection::new(|_| Ok(QueryOutput::default()));
    db(Dialect::Postgres, &Events::default())
        .model("ticket")
        .unwrap()
        .create(&json!({"title": "broken"}))
        .save(&conn)
        .await
        .unwrap();

    let sql = &conn.statements()[0];
    assert!(sql.starts_with("INSERT INTO tickets (title, id, created_at, updated_at) VALUES ('broken', '"));
    let uuid = sql.split('\'').nth(3).unwrap();
    assert_eq!(uuid.len(), 36);
    assert!(uuid::Uuid::parse_str(uuid).is_ok());
}

#[tokio::test]
async fn schema_validation_runs_before_compilation() {
    let conn = MockConnection::empty();
    let err = db(Dialect::Postgres, &Events::default())
        .model("account")
        .unwrap()
        .create(&json!({"nickname": "x"}))
        .save(&conn)
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(conn.statements().is_empty());
}

#[tokio::test]
async fn save_without_a_pending_write_fails() {
    let conn = MockConnection::empty();
    let err = db(Dialect::Postgres, &Events::default())
        .table("users")
        .where_("id", 1)
        .save(&conn)
        .await
        .unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn update_without_where_is_refused() {
    let conn = MockConnection::empty();
    let db = db(Dialect::Postgres, &Events::default());
    let err = db
        .table("users")
        .update(&json!({"active": false}))
        .save(&conn)
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let err = db.table("users").force_delete(&conn).await.unwrap_err();
    assert!(err.is_validation());
    assert!(conn.statements().is_empty());
}

// ==================== SOFT DELETES ====================

#[tokio::test]
async fn soft_delete_and_restore() {
    let events = Events::default();
    let conn = MockConnection::new(|_| Ok(QueryOutput::affected(1)));
    let users = db(Dialect::Postgres, &events).model("user").unwrap().where_("id", 1);

    assert_eq!(users.delete(&conn).await.unwrap(), 1);
    assert_eq!(users.restore(&conn).await.unwrap(), 1);
    assert_eq!(users.force_delete(&conn).await.unwrap(), 1);

    let statements = conn.statements();
    assert!(statements[0].starts_with("UPDATE users SET deleted_at = '"));
    assert!(statements[0].ends_with("' WHERE users.id = 1 AND users.deleted_at IS NULL"));
    assert_eq!(
        statements[1],
        "UPDATE users SET deleted_at = NULL WHERE users.id = 1 AND users.deleted_at IS NOT NULL"
    );
    assert_eq!(
        statements[2],
        "DELETE FROM users WHERE users.id = 1 AND users.deleted_at IS NULL"
    );
    assert_eq!(events.take(), ["delete user 1", "update user 1", "delete user 1"]);
}

#[tokio::test]
async fn restore_needs_a_soft_delete_model() {
    let conn = MockConnection::empty();
    let err = db(Dialect::Postgres, &Events::default())
        .table("users")
        .where_("id", 1)
        .restore(&conn)
        .await
        .unwrap_err();
    assert!(err.is_configuration());
}

// ==================== INCREMENT ====================

#[tokio::test]
async fn increment_and_decrement() {
    let conn = MockConnection::new(|_| Ok(QueryOutput::affected(2)));
    let posts = db(Dialect::MySql, &Events::default())
        .table("posts")
        .where_in("id", [1, 2]);

    assert_eq!(posts.increment(&conn, "views", 5).await.unwrap(), 2);
    posts.decrement(&conn, "views", 1).await.unwrap();
    assert_eq!(
        conn.statements(),
        [
            "UPDATE posts SET views = views + 5 WHERE posts.id IN (1, 2)",
            "UPDATE posts SET views = views - 1 WHERE posts.id IN (1, 2)",
        ]
    );
}

// ==================== OBSERVERS ====================

#[tokio::test]
async fn observer_failures_surface_as_observer_errors() {
    let conn = MockConnection::new(|_| Ok(QueryOutput::affected(1)));
    let err = db(Dialect::Postgres, &Events::default())
        .model("audit")
        .unwrap()
        .where_("id", 3)
        .update(&json!({"seen": true}))
        .save(&conn)
        .await
        .unwrap_err();

    assert!(err.is_observer());
    assert!(err.to_string().contains("audit log unavailable"));
    assert_eq!(conn.statements(), ["UPDATE audits SET seen = TRUE WHERE audits.id = 3"]);
}
