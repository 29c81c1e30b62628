//! Read terminals: get/first/find, count, exists, pluck and pagination.

mod common;

use chainorm::{
    Db, Dialect, Model, ModelDef, ModelObserver, NamingPattern, OrmConfig, OrmResult, QueryOutput,
    Registry, Row,
};
use common::{MockConnection, rows};
use serde_json::json;
use std::sync::{Arc, Mutex};

fn posts(total: u64) -> MockConnection {
    MockConnection::new(move |sql| {
        if sql.starts_with("SELECT COUNT(*)") {
            Ok(rows([json!({"aggregate": total})]))
        } else if sql.starts_with("SELECT * FROM posts") {
            Ok(rows([json!({"id": 3}), json!({"id": 2}), json!({"id": 1})]))
        } else {
            Ok(QueryOutput::default())
        }
    })
}

// ==================== PAGINATION ====================

#[tokio::test]
async fn last_partial_page() {
    let conn = posts(23);
    let page = Db::new(Dialect::Postgres)
        .table("posts")
        .order_by_desc("id")
        .paginate(&conn, 3, 10)
        .await
        .unwrap();

    assert_eq!(
        conn.statements(),
        [
            "SELECT COUNT(*) AS aggregate FROM posts",
            "SELECT * FROM posts ORDER BY posts.id DESC LIMIT 10 OFFSET 20",
        ]
    );
    assert_eq!(page.data.len(), 3);
    assert_eq!(
        serde_json::to_value(page.meta).unwrap(),
        json!({
            "total": 23,
            "limit": 10,
            "currentPage": 3,
            "lastPage": 3,
            "nextPage": 4,
            "prevPage": 2,
        })
    );
}

#[tokio::test]
async fn empty_total_skips_the_data_query() {
    let conn = posts(0);
    let page = Db::new(Dialect::Postgres)
        .table("posts")
        .paginate(&conn, 0, 0)
        .await
        .unwrap();

    assert!(page.data.is_empty());
    assert_eq!(page.meta.current_page, 1);
    assert_eq!(page.meta.limit, 10);
    assert_eq!(page.meta.last_page, 0);
    assert_eq!(conn.statements().len(), 1);
}

#[tokio::test]
async fn mssql_pages_with_offset_fetch() {
    let conn = posts(40);
    Db::new(Dialect::SqlServer)
        .table("posts")
        .paginate(&conn, 2, 15)
        .await
        .unwrap();
    assert_eq!(
        conn.statements()[1],
        "SELECT * FROM posts ORDER BY (SELECT NULL) OFFSET 15 ROWS FETCH NEXT 15 ROWS ONLY"
    );
}

// ==================== SINGLE ROWS ====================

#[tokio::test]
async fn find_targets_the_primary_key() {
    let conn = posts(1);
    let row = Db::new(Dialect::Postgres)
        .table("posts")
        .find(&conn, 3)
        .await
        .unwrap();

    assert_eq!(row.unwrap()["id"], json!(3));
    assert_eq!(
        conn.statements(),
        ["SELECT * FROM posts WHERE posts.id = 3 LIMIT 1"]
    );
}

#[tokio::test]
async fn find_or_fail_reports_not_found() {
    let conn = MockConnection::empty();
    let err = Db::new(Dialect::MySql)
        .table("posts")
        .find_or_fail(&conn, 42)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("42"));
}

#[tokio::test]
async fn exists_count_and_pluck() {
    let conn = MockConnection::new(|sql| {
        if sql.starts_with("SELECT 1") {
            Ok(rows([json!({"1": 1})]))
        } else if sql.starts_with("SELECT COUNT(*)") {
            Ok(rows([json!({"aggregate": "7"})]))
        } else {
            Ok(rows([json!({"title": "a"}), json!({"title": null})]))
        }
    });
    let query = Db::new(Dialect::Sqlite).table("posts").where_("draft", false);

    assert!(query.exists(&conn).await.unwrap());
    assert_eq!(query.count(&conn).await.unwrap(), 7);
    assert_eq!(
        query.pluck(&conn, "title").await.unwrap(),
        [json!("a"), json!(null)]
    );
    assert_eq!(
        conn.statements(),
        [
            "SELECT 1 FROM posts WHERE posts.draft = 0 LIMIT 1",
            "SELECT COUNT(*) AS aggregate FROM posts WHERE posts.draft = 0",
            "SELECT posts.title FROM posts WHERE posts.draft = 0",
        ]
    );
}

// ==================== MODELS ====================

#[derive(Clone, Default)]
struct ReadLog(Arc<Mutex<Vec<usize>>>);

impl ModelObserver for ReadLog {
    fn after_read(&self, _model: &Model, rows: &[Row]) -> OrmResult<()> {
        self.0.lock().unwrap().push(rows.len());
        Ok(())
    }
}

#[tokio::test]
async fn model_reads_are_finalized_and_observed() {
    let log = ReadLog::default();
    let registry = Registry::builder()
        .register(
            ModelDef::new("member")
                .table("members")
                .hidden(["password_hash"])
                .observer(log.clone()),
        )
        .build()
        .unwrap();
    let db = Db::new(Dialect::Postgres)
        .with_config(OrmConfig::new().with_naming(NamingPattern::SnakeCase))
        .with_registry(registry);
    let conn = MockConnection::new(|_| {
        Ok(rows([json!({"id": 1, "first_name": "Ada", "password_hash": "x"})]))
    });

    let members = db
        .model("member")
        .unwrap()
        .where_("firstName", "Ada")
        .get(&conn)
        .await
        .unwrap();

    assert_eq!(
        conn.statements(),
        ["SELECT * FROM members WHERE members.first_name = 'Ada'"]
    );
    assert_eq!(members[0], common::row(json!({"id": 1, "firstName": "Ada"})));
    assert_eq!(*log.0.lock().unwrap(), [1]);
}

#[tokio::test]
async fn trashed_scopes_change_the_soft_delete_predicate() {
    let registry = Registry::builder()
        .register(ModelDef::new("user").table("users").soft_deletes("deleted_at"))
        .build()
        .unwrap();
    let db = Db::new(Dialect::Postgres).with_registry(registry);
    let conn = MockConnection::empty();

    let users = db.model("user").unwrap();
    users.clone().get(&conn).await.unwrap();
    users.clone().with_trashed().get(&conn).await.unwrap();
    users.clone().only_trashed().get(&conn).await.unwrap();

    assert_eq!(
        conn.statements(),
        [
            "SELECT * FROM users WHERE users.deleted_at IS NULL",
            "SELECT * FROM users",
            "SELECT * FROM users WHERE users.deleted_at IS NOT NULL",
        ]
    );
}
