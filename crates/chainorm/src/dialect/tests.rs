use super::*;
use crate::condition::{Connector, push_condition};
use crate::schema::{ColumnSchema, ColumnType, SchemaModel};
use crate::state::{Cte, QueryState, RowLock, Statement, Union};
use crate::value::{Operand, raw};
use serde_json::json;

fn state_with_where(table: &str, sql: &str) -> QueryState {
    let mut state = QueryState::table(table);
    push_condition(&mut state.clauses.wheres, Connector::And, sql.to_string());
    state
}

#[test]
fn dialect_names_parse() {
    assert_eq!("PostgreSQL".parse::<Dialect>().unwrap(), Dialect::Postgres);
    assert_eq!("pg".parse::<Dialect>().unwrap(), Dialect::Postgres);
    assert_eq!("sqlserver".parse::<Dialect>().unwrap(), Dialect::SqlServer);
    assert_eq!("mariadb".parse::<Dialect>().unwrap(), Dialect::MariaDb);
    assert!("oracle".parse::<Dialect>().unwrap_err().is_configuration());
    assert_eq!(Dialect::MariaDb.compiler().dialect(), Dialect::MariaDb);
}

#[test]
fn bare_select_is_star() {
    for dialect in [
        Dialect::MySql,
        Dialect::Postgres,
        Dialect::SqlServer,
        Dialect::Sqlite,
    ] {
        let sql = dialect.compiler().select(&QueryState::table("t")).unwrap();
        assert_eq!(sql, "SELECT * FROM t", "{dialect}");
    }
}

#[test]
fn identifier_quoting_per_dialect() {
    assert_eq!(Dialect::MySql.compiler().identifier("order.userId"), "`order`.`userId`");
    assert_eq!(Dialect::Postgres.compiler().identifier("user"), "\"user\"");
    assert_eq!(Dialect::SqlServer.compiler().identifier("a]b"), "a]b");
    assert_eq!(Dialect::SqlServer.compiler().quote("a]b"), "[a]]b]");
    assert_eq!(Dialect::Sqlite.compiler().identifier("COUNT(*)"), "COUNT(*)");
}

#[test]
fn literals_per_dialect() {
    let mysql = Dialect::MySql.compiler();
    assert_eq!(mysql.literal(&json!("it's")), "'it''s'");
    assert_eq!(mysql.literal(&json!("a\\b")), "'a\\\\b'");
    assert_eq!(mysql.literal(&json!(true)), "1");

    let pg = Dialect::Postgres.compiler();
    assert_eq!(pg.literal(&json!(false)), "FALSE");
    assert_eq!(pg.literal(&json!({"a": 1})), "'{\"a\":1}'");

    let mssql = Dialect::SqlServer.compiler();
    assert_eq!(mssql.literal(&json!("héllo")), "N'héllo'");
}

#[test]
fn pagination_keywords() {
    let mut state = QueryState::table("t");
    state.clauses.limit = Some(10);
    state.clauses.offset = Some(20);

    assert_eq!(
        Dialect::Postgres.compiler().select(&state).unwrap(),
        "SELECT * FROM t LIMIT 10 OFFSET 20"
    );
    assert_eq!(
        Dialect::SqlServer.compiler().select(&state).unwrap(),
        "SELECT * FROM t ORDER BY (SELECT NULL) OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
    );

    state.clauses.limit = None;
    assert_eq!(
        Dialect::Sqlite.compiler().select(&state).unwrap(),
        "SELECT * FROM t LIMIT -1 OFFSET 20"
    );
    assert_eq!(
        Dialect::MySql.compiler().select(&state).unwrap(),
        "SELECT * FROM t LIMIT 18446744073709551615 OFFSET 20"
    );
}

#[test]
fn clause_order_is_shared() {
    let mut state = state_with_where("users", "users.active = 1");
    state.clauses.alias = Some("u".into());
    state.clauses.columns = vec!["u.id".into(), "COUNT(*) AS n".into()];
    state.clauses.joins = vec!["LEFT JOIN posts ON posts.user_id = u.id".into()];
    state.clauses.group_by = vec!["u.id".into()];
    push_condition(&mut state.clauses.havings, Connector::And, "COUNT(*) > 1".into());
    state.clauses.order_by = vec!["u.id DESC".into()];
    state.clauses.limit = Some(5);
    state.clauses.lock = Some(RowLock::Update);

    assert_eq!(
        Dialect::Postgres.compiler().select(&state).unwrap(),
        "SELECT u.id, COUNT(*) AS n FROM users AS u LEFT JOIN posts ON posts.user_id = u.id \
         WHERE users.active = 1 GROUP BY u.id HAVING COUNT(*) > 1 ORDER BY u.id DESC \
         LIMIT 5 FOR UPDATE"
    );
    assert_eq!(
        Dialect::SqlServer.compiler().select(&state).unwrap(),
        "SELECT u.id, COUNT(*) AS n FROM users AS u WITH (UPDLOCK, ROWLOCK) \
         LEFT JOIN posts ON posts.user_id = u.id WHERE users.active = 1 GROUP BY u.id \
         HAVING COUNT(*) > 1 ORDER BY u.id DESC OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY"
    );
}

#[test]
fn ctes_and_unions_wrap_the_select() {
    let mut state = QueryState::table("recent");
    state.clauses.ctes.push(Cte {
        name: "recent".into(),
        sql: "SELECT * FROM posts".into(),
    });
    state.clauses.unions.push(Union {
        all: true,
        sql: "SELECT * FROM archived".into(),
    });
    assert_eq!(
        Dialect::Sqlite.compiler().select(&state).unwrap(),
        "WITH recent AS (SELECT * FROM posts) SELECT * FROM recent UNION ALL SELECT * FROM archived"
    );
}

#[test]
fn unions_are_ordered_and_paginated_as_a_whole() {
    let mut state = QueryState::table("a");
    state.clauses.order_by.push("a.id DESC".into());
    state.clauses.limit = Some(5);
    state.clauses.unions.push(Union {
        all: false,
        sql: "SELECT * FROM b".into(),
    });

    let compound = "SELECT * FROM (SELECT * FROM a UNION SELECT * FROM b) AS a ORDER BY a.id DESC";
    for (dialect, pagination) in [
        (Dialect::Postgres, "LIMIT 5"),
        (Dialect::MySql, "LIMIT 5"),
        (Dialect::Sqlite, "LIMIT 5"),
        (Dialect::SqlServer, "OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY"),
    ] {
        assert_eq!(
            dialect.compiler().select(&state).unwrap(),
            format!("{compound} {pagination}"),
            "{dialect}"
        );
    }

    state.clauses.order_by.clear();
    state.clauses.limit = None;
    assert_eq!(
        Dialect::SqlServer.compiler().select(&state).unwrap(),
        "SELECT * FROM a UNION SELECT * FROM b"
    );
}

#[test]
fn unions_refuse_row_locks() {
    let mut state = QueryState::table("a");
    state.clauses.lock = Some(RowLock::Update);
    state.clauses.unions.push(Union {
        all: true,
        sql: "SELECT * FROM b".into(),
    });
    assert!(Dialect::Postgres.compiler().select(&state).unwrap_err().is_validation());
}

#[test]
fn insert_result_semantics() {
    let mut state = QueryState::table("users");
    state.clauses.statement = Some(Statement::Insert(vec![
        vec![("name".into(), Operand::from("a")), ("age".into(), Operand::from(3))],
        vec![("name".into(), Operand::from("b"))],
    ]));

    assert_eq!(
        Dialect::Postgres.compiler().any(&state).unwrap(),
        "INSERT INTO users (name, age) VALUES ('a', 3), ('b', DEFAULT) RETURNING *"
    );
    assert_eq!(
        Dialect::Sqlite.compiler().any(&state).unwrap(),
        "INSERT INTO users (name, age) VALUES ('a', 3), ('b', NULL) RETURNING *"
    );
    assert_eq!(
        Dialect::SqlServer.compiler().any(&state).unwrap(),
        "INSERT INTO users (name, age) OUTPUT INSERTED.* VALUES ('a', 3), ('b', DEFAULT)"
    );
    assert_eq!(
        Dialect::MySql.compiler().any(&state).unwrap(),
        "INSERT INTO users (name, age) VALUES ('a', 3), ('b', DEFAULT)"
    );

    state.clauses.void = true;
    assert!(!Dialect::Postgres.compiler().any(&state).unwrap().contains("RETURNING"));
}

#[test]
fn empty_insert_uses_default_values() {
    let mut state = QueryState::table("t");
    state.clauses.statement = Some(Statement::Insert(vec![vec![]]));
    assert_eq!(
        Dialect::Postgres.compiler().insert(&state).unwrap(),
        "INSERT INTO t DEFAULT VALUES RETURNING *"
    );
    assert_eq!(
        Dialect::MySql.compiler().insert(&state).unwrap(),
        "INSERT INTO t () VALUES ()"
    );
}

#[test]
fn update_and_delete_guards() {
    let compiler = Dialect::Postgres.compiler();

    let mut state = QueryState::table("users");
    state.clauses.statement = Some(Statement::Update(vec![(
        "visits".into(),
        Operand::from(raw("visits + 1")),
    )]));
    assert!(compiler.any(&state).unwrap_err().is_validation());

    state.clauses.unfiltered = true;
    assert_eq!(compiler.any(&state).unwrap(), "UPDATE users SET visits = visits + 1");

    let mut state = state_with_where("users", "users.id = 1");
    state.clauses.statement = Some(Statement::Delete);
    assert_eq!(compiler.any(&state).unwrap(), "DELETE FROM users WHERE users.id = 1");

    state.clauses.alias = Some("u".into());
    assert!(compiler.any(&state).unwrap_err().is_validation());
}

#[test]
fn count_wraps_grouped_queries() {
    let compiler = Dialect::Postgres.compiler();
    let mut state = state_with_where("posts", "posts.published = TRUE");
    state.clauses.order_by = vec!["posts.id".into()];
    state.clauses.limit = Some(10);
    assert_eq!(
        compiler.count(&state).unwrap(),
        "SELECT COUNT(*) AS aggregate FROM posts WHERE posts.published = TRUE"
    );

    state.clauses.group_by = vec!["posts.user_id".into()];
    state.clauses.columns = vec!["posts.user_id".into()];
    assert_eq!(
        compiler.count(&state).unwrap(),
        "SELECT COUNT(*) AS aggregate FROM (SELECT posts.user_id FROM posts \
         WHERE posts.published = TRUE GROUP BY posts.user_id) AS counted"
    );
}

#[test]
fn ddl_per_dialect() {
    let schema = SchemaModel::new()
        .column("id", ColumnSchema::increments())
        .column("name", ColumnSchema::new(ColumnType::Varchar(100)).not_null())
        .column(
            "team_id",
            ColumnSchema::new(ColumnType::BigInteger)
                .references("teams", "id")
                .on_delete("CASCADE"),
        );

    assert_eq!(
        Dialect::Postgres.compiler().create_table("users", &schema),
        "CREATE TABLE IF NOT EXISTS users (id BIGSERIAL PRIMARY KEY, name VARCHAR(100) NOT NULL, \
         team_id BIGINT, FOREIGN KEY (team_id) REFERENCES teams (id) ON DELETE CASCADE)"
    );
    assert_eq!(
        Dialect::Sqlite.compiler().create_table("users", &schema),
        "CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY AUTOINCREMENT, \
         name TEXT NOT NULL, team_id INTEGER, FOREIGN KEY (team_id) REFERENCES teams (id) \
         ON DELETE CASCADE)"
    );
    assert!(
        Dialect::SqlServer
            .compiler()
            .create_table("users", &schema)
            .starts_with("IF OBJECT_ID('users', 'U') IS NULL CREATE TABLE users (id BIGINT IDENTITY(1,1) PRIMARY KEY")
    );

    let column = ColumnSchema::new(ColumnType::Boolean).default_value(false);
    assert_eq!(
        Dialect::MySql.compiler().add_column("users", "active", &column),
        "ALTER TABLE users ADD COLUMN active TINYINT(1) DEFAULT 0"
    );
    assert_eq!(
        Dialect::SqlServer.compiler().add_column("users", "active", &column),
        "ALTER TABLE users ADD active BIT DEFAULT 0"
    );
    assert_eq!(Dialect::Sqlite.compiler().truncate("users"), "DELETE FROM users");
}

#[test]
fn introspection_escapes_table_names() {
    let sql = Dialect::Postgres.compiler().table_exists("o'hara");
    assert!(sql.ends_with("table_name = 'o''hara'"));
    let sql = Dialect::Sqlite.compiler().list_columns("posts");
    assert_eq!(sql, "SELECT name, type FROM pragma_table_info('posts')");
}
