//! SQL dialects.
//!
//! Every builder carries one [`StatementCompiler`], chosen when the [`crate::Db`] handle is
//! created. The trait's provided methods render the clause order shared by all dialects:
//!
//! ```text
//! [WITH ...] SELECT [DISTINCT] ... FROM t [AS a] [hint] JOIN ... WHERE ... GROUP BY ...
//! HAVING ... ORDER BY ... <pagination> <row lock> [UNION ...]
//! ```
//!
//! Implementations only supply what differs: identifier quoting, literal escaping,
//! pagination keywords, row locks, insert-result behavior, column types and introspection.

mod mssql;
mod mysql;
mod postgres;
mod sqlite;

#[cfg(test)]
mod tests;

pub use mssql::SqlServerCompiler;
pub use mysql::MySqlCompiler;
pub use postgres::PostgresCompiler;
pub use sqlite::SqliteCompiler;

use crate::condition::render_conditions;
use crate::error::{OrmError, OrmResult};
use crate::ident::Ident;
use crate::schema::{ColumnSchema, ColumnType, SchemaModel};
use crate::state::{ClauseSet, QueryState, RowLock, Statement};
use crate::value::Operand;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    MySql,
    MariaDb,
    Postgres,
    SqlServer,
    Sqlite,
}

impl Dialect {
    /// The compiler implementing this dialect.
    pub fn compiler(self) -> Arc<dyn StatementCompiler> {
        match self {
            Dialect::MySql | Dialect::MariaDb => Arc::new(MySqlCompiler::new(self)),
            Dialect::Postgres => Arc::new(PostgresCompiler),
            Dialect::SqlServer => Arc::new(SqlServerCompiler),
            Dialect::Sqlite => Arc::new(SqliteCompiler),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dialect::MySql => "mysql",
            Dialect::MariaDb => "mariadb",
            Dialect::Postgres => "postgres",
            Dialect::SqlServer => "mssql",
            Dialect::Sqlite => "sqlite",
        })
    }
}

impl FromStr for Dialect {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(Dialect::MySql),
            "mariadb" => Ok(Dialect::MariaDb),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "mssql" | "sqlserver" => Ok(Dialect::SqlServer),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            other => Err(OrmError::configuration(format!("unknown dialect `{other}`"))),
        }
    }
}

/// How a dialect hands inserted rows back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// `INSERT ... RETURNING *`
    Returning,
    /// `INSERT ... OUTPUT INSERTED.* VALUES ...`
    Output,
    /// The connection reports the last insert id; rows are re-selected by primary key.
    LastInsertId,
}

/// Renders builder state into SQL for one dialect.
pub trait StatementCompiler: Send + Sync + fmt::Debug {
    fn dialect(&self) -> Dialect;

    /// Quote a single identifier part.
    fn quote(&self, name: &str) -> String;

    fn insert_result(&self) -> InsertResult;

    /// Row-lock suffix appended after pagination.
    fn lock_clause(&self, lock: RowLock) -> Option<&'static str>;

    /// Concrete column type for DDL.
    fn column_type(&self, ty: &ColumnType) -> String;

    /// Type and modifiers of an auto-incrementing column.
    fn auto_increment(&self, ty: &ColumnType, primary_key: bool) -> String;

    fn table_exists(&self, table: &str) -> String;

    fn list_tables(&self) -> String;

    /// Lists `name` and `type` of every column of `table`.
    fn list_columns(&self, table: &str) -> String;

    fn string_literal(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    /// `LIMIT`/`OFFSET` suffix, `None` when neither is set.
    fn pagination(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (None, None) => None,
            (Some(l), None) => Some(format!("LIMIT {l}")),
            (None, Some(o)) => Some(format!("OFFSET {o}")),
            (Some(l), Some(o)) => Some(format!("LIMIT {l} OFFSET {o}")),
        }
    }

    /// Whether pagination needs an ORDER BY to be valid.
    fn pagination_requires_order(&self) -> bool {
        false
    }

    /// Table hint emitted right after `FROM t` for a row lock.
    fn table_hint(&self, lock: RowLock) -> Option<&'static str> {
        let _ = lock;
        None
    }

    /// Case-insensitive LIKE.
    fn ilike(&self, column: &str, pattern: &str, negated: bool) -> String {
        let not = if negated { "NOT " } else { "" };
        format!("LOWER({column}) {not}LIKE LOWER({pattern})")
    }

    /// Placeholder for a column a multi-row insert leaves out.
    fn missing_value(&self) -> &'static str {
        "DEFAULT"
    }

    /// Insert with no columns at all.
    fn empty_insert(&self) -> &'static str {
        "DEFAULT VALUES"
    }

    /// Render an identifier; anything that is not a plain (possibly dotted) name is
    /// treated as a caller-owned expression and emitted unchanged.
    fn identifier(&self, name: &str) -> String {
        match Ident::parse(name) {
            Ok(ident) => ident.render(|part| self.quote(part)),
            Err(_) => name.to_string(),
        }
    }

    fn literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => self.bool_literal(*b).to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => self.string_literal(s),
            Value::Array(_) | Value::Object(_) => self.string_literal(&value.to_string()),
        }
    }

    fn operand(&self, operand: &Operand) -> String {
        match operand {
            Operand::Value(v) => self.literal(v),
            Operand::Raw(sql) => sql.clone(),
        }
    }

    /// SELECT in the shared clause order.
    ///
    /// With unions, ORDER BY and pagination belong to the whole compound statement: it is
    /// wrapped in a derived table named after the base query, so qualified ordering
    /// columns keep resolving.
    fn select(&self, state: &QueryState) -> OrmResult<String> {
        let c = &state.clauses;
        let mut sql = String::new();
        push_ctes(self, c, &mut sql);

        if c.unions.is_empty() {
            push_select_core(self, c, &mut sql);
            push_ordering(self, c, &mut sql);
            if let Some(lock) = c.lock.and_then(|lock| self.lock_clause(lock)) {
                sql.push(' ');
                sql.push_str(lock);
            }
            return Ok(sql);
        }

        if c.lock.is_some() {
            return Err(OrmError::validation("row locks cannot be combined with union"));
        }
        let mut compound = String::new();
        push_select_core(self, c, &mut compound);
        for union in &c.unions {
            compound.push_str(if union.all { " UNION ALL " } else { " UNION " });
            compound.push_str(&union.sql);
        }
        if c.order_by.is_empty() && c.limit.is_none() && c.offset.is_none() {
            sql.push_str(&compound);
        } else {
            sql.push_str(&format!(
                "SELECT * FROM ({compound}) AS {}",
                self.identifier(state.qualifier())
            ));
            push_ordering(self, c, &mut sql);
        }
        Ok(sql)
    }

    fn insert(&self, state: &QueryState) -> OrmResult<String> {
        let c = &state.clauses;
        let Some(Statement::Insert(rows)) = &c.statement else {
            return Err(OrmError::validation("insert() called without insert data"));
        };
        if rows.is_empty() {
            return Err(OrmError::validation("INSERT requires at least one row"));
        }

        let mut columns: Vec<&str> = Vec::new();
        for row in rows {
            for (column, _) in row {
                if !columns.contains(&column.as_str()) {
                    columns.push(column);
                }
            }
        }

        let read_back = !c.void;
        let mut sql = format!("INSERT INTO {}", self.identifier(&c.table));
        if columns.is_empty() {
            if read_back && self.insert_result() == InsertResult::Output {
                sql.push_str(" OUTPUT INSERTED.*");
            }
            sql.push(' ');
            sql.push_str(self.empty_insert());
        } else {
            let column_list = columns
                .iter()
                .map(|col| self.identifier(col))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" ({column_list})"));
            if read_back && self.insert_result() == InsertResult::Output {
                sql.push_str(" OUTPUT INSERTED.*");
            }
            sql.push_str(" VALUES ");
            let tuples = rows
                .iter()
                .map(|row| {
                    let values = columns
                        .iter()
                        .map(|col| {
                            row.iter()
                                .find(|(name, _)| name == col)
                                .map(|(_, value)| self.operand(value))
                                .unwrap_or_else(|| self.missing_value().to_string())
                        })
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("({values})")
                })
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&tuples);
        }
        if read_back && self.insert_result() == InsertResult::Returning {
            sql.push_str(" RETURNING *");
        }
        Ok(sql)
    }

    fn update(&self, state: &QueryState) -> OrmResult<String> {
        let c = &state.clauses;
        let Some(Statement::Update(assignments)) = &c.statement else {
            return Err(OrmError::validation("update() called without update data"));
        };
        if assignments.is_empty() {
            return Err(OrmError::validation("UPDATE requires at least one column"));
        }
        check_write_target(c, "UPDATE")?;

        let set = assignments
            .iter()
            .map(|(column, value)| format!("{} = {}", self.identifier(column), self.operand(value)))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("UPDATE {} SET {set}", self.identifier(&c.table));
        if !c.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&render_conditions(&c.wheres));
        }
        Ok(sql)
    }

    fn remove(&self, state: &QueryState) -> OrmResult<String> {
        let c = &state.clauses;
        check_write_target(c, "DELETE")?;
        let mut sql = format!("DELETE FROM {}", self.identifier(&c.table));
        if !c.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&render_conditions(&c.wheres));
        }
        Ok(sql)
    }

    /// Compile whichever statement the state holds, SELECT when none.
    fn any(&self, state: &QueryState) -> OrmResult<String> {
        match &state.clauses.statement {
            None => self.select(state),
            Some(Statement::Insert(_)) => self.insert(state),
            Some(Statement::Update(_)) => self.update(state),
            Some(Statement::Delete) => self.remove(state),
        }
    }

    /// `COUNT(*) AS aggregate` over the same FROM/JOIN/WHERE subset as `state`.
    ///
    /// Grouped, distinct and union queries are counted through a derived table.
    fn count(&self, state: &QueryState) -> OrmResult<String> {
        let mut inner = state.clone();
        inner.clauses.statement = None;
        inner.clauses.order_by.clear();
        inner.clauses.limit = None;
        inner.clauses.offset = None;
        inner.clauses.lock = None;

        let c = &inner.clauses;
        let needs_wrap =
            c.distinct || !c.group_by.is_empty() || !c.havings.is_empty() || !c.unions.is_empty();
        if !needs_wrap {
            inner.clauses.columns = vec!["COUNT(*) AS aggregate".to_string()];
            return self.select(&inner);
        }

        let outer = ClauseSet {
            ctes: std::mem::take(&mut inner.clauses.ctes),
            ..ClauseSet::default()
        };
        let mut sql = String::new();
        push_ctes(self, &outer, &mut sql);
        sql.push_str(&format!(
            "SELECT COUNT(*) AS aggregate FROM ({}) AS counted",
            self.select(&inner)?
        ));
        Ok(sql)
    }

    fn column_definition(&self, name: &str, column: &ColumnSchema, inline_pk: bool) -> String {
        let mut def = format!("{} ", self.identifier(name));
        if column.is_auto_increment() {
            def.push_str(&self.auto_increment(&column.ty, inline_pk && column.is_primary_key()));
            return def;
        }
        def.push_str(&self.column_type(&column.ty));
        if column.is_not_null() {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = column.column_default() {
            def.push_str(" DEFAULT ");
            def.push_str(&self.literal(default));
        }
        if column.is_unique() {
            def.push_str(" UNIQUE");
        }
        if inline_pk && column.is_primary_key() {
            def.push_str(" PRIMARY KEY");
        }
        def
    }

    /// Body of `CREATE TABLE t (...)`: column definitions and table constraints.
    fn table_body(&self, schema: &SchemaModel) -> String {
        let pk_columns: Vec<&str> = schema
            .columns()
            .filter(|(_, c)| c.is_primary_key())
            .map(|(n, _)| n)
            .collect();
        let inline_pk = pk_columns.len() == 1;

        let mut parts: Vec<String> = schema
            .columns()
            .map(|(name, column)| self.column_definition(name, column, inline_pk))
            .collect();
        if pk_columns.len() > 1 {
            let cols = pk_columns
                .iter()
                .map(|c| self.identifier(c))
                .collect::<Vec<_>>()
                .join(", ");
            parts.push(format!("PRIMARY KEY ({cols})"));
        }
        for (name, column) in schema.columns() {
            if let Some(fk) = &column.foreign_key {
                let mut constraint = format!(
                    "FOREIGN KEY ({}) REFERENCES {} ({})",
                    self.identifier(name),
                    self.identifier(&fk.table),
                    self.identifier(&fk.column)
                );
                if let Some(action) = &fk.on_delete {
                    constraint.push_str(" ON DELETE ");
                    constraint.push_str(action);
                }
                parts.push(constraint);
            }
        }
        parts.join(", ")
    }

    fn create_table(&self, table: &str, schema: &SchemaModel) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.identifier(table),
            self.table_body(schema)
        )
    }

    fn add_column(&self, table: &str, name: &str, column: &ColumnSchema) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.identifier(table),
            self.column_definition(name, column, false)
        )
    }

    fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.identifier(table))
    }

    fn truncate(&self, table: &str) -> String {
        format!("TRUNCATE TABLE {}", self.identifier(table))
    }
}

/// `SELECT … FROM … JOIN … WHERE … GROUP BY … HAVING …`.
fn push_select_core<C: StatementCompiler + ?Sized>(compiler: &C, c: &ClauseSet, sql: &mut String) {
    sql.push_str("SELECT ");
    if c.distinct {
        sql.push_str("DISTINCT ");
    }
    if c.columns.is_empty() {
        sql.push('*');
    } else {
        sql.push_str(&c.columns.join(", "));
    }
    sql.push_str(" FROM ");
    sql.push_str(&compiler.identifier(&c.table));
    if let Some(alias) = &c.alias {
        sql.push_str(" AS ");
        sql.push_str(&compiler.identifier(alias));
    }
    if let Some(hint) = c.lock.and_then(|lock| compiler.table_hint(lock)) {
        sql.push(' ');
        sql.push_str(hint);
    }
    for join in &c.joins {
        sql.push(' ');
        sql.push_str(join);
    }
    if !c.wheres.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&render_conditions(&c.wheres));
    }
    if !c.group_by.is_empty() {
        sql.push_str(" GROUP BY ");
        sql.push_str(&c.group_by.join(", "));
    }
    if !c.havings.is_empty() {
        sql.push_str(" HAVING ");
        sql.push_str(&render_conditions(&c.havings));
    }
}

/// `ORDER BY` plus the dialect's pagination suffix.
fn push_ordering<C: StatementCompiler + ?Sized>(compiler: &C, c: &ClauseSet, sql: &mut String) {
    let pagination = compiler.pagination(c.limit, c.offset);
    if !c.order_by.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&c.order_by.join(", "));
    } else if pagination.is_some() && compiler.pagination_requires_order() {
        sql.push_str(" ORDER BY (SELECT NULL)");
    }
    if let Some(pagination) = pagination {
        sql.push(' ');
        sql.push_str(&pagination);
    }
}

fn push_ctes<C: StatementCompiler + ?Sized>(compiler: &C, clauses: &ClauseSet, sql: &mut String) {
    if clauses.ctes.is_empty() {
        return;
    }
    let ctes = clauses
        .ctes
        .iter()
        .map(|cte| format!("{} AS ({})", compiler.identifier(&cte.name), cte.sql))
        .collect::<Vec<_>>()
        .join(", ");
    sql.push_str("WITH ");
    sql.push_str(&ctes);
    sql.push(' ');
}

fn check_write_target(c: &ClauseSet, verb: &str) -> OrmResult<()> {
    if c.alias.is_some() {
        return Err(OrmError::validation(format!(
            "{verb} cannot be combined with a table alias"
        )));
    }
    if !c.joins.is_empty() {
        return Err(OrmError::validation(format!(
            "{verb} cannot be combined with joins"
        )));
    }
    if c.wheres.is_empty() && !c.unfiltered {
        return Err(OrmError::validation(format!(
            "{verb} without WHERE is refused; call allow_unfiltered() to affect every row"
        )));
    }
    Ok(())
}

/// Quote by wrapping in `open`/`close` and doubling any embedded `close`.
pub(crate) fn wrap_quoted(name: &str, open: char, close: char) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push(open);
    for ch in name.chars() {
        if ch == close {
            out.push(close);
        }
        out.push(ch);
    }
    out.push(close);
    out
}
