use super::Query;
use crate::condition::{Connector, Operator, push_condition, render_conditions, render_predicate};
use crate::error::{OrmError, OrmResult};
use crate::state::{Assignments, Cte, RowLock, SoftDeleteScope, Statement, Union};
use crate::value::Operand;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::OnceLock;

/// Source of a subquery, UNION member or CTE body.
#[derive(Debug, Clone)]
pub enum SubQuery {
    Sql(String),
    Query(Box<Query>),
}

impl From<Query> for SubQuery {
    fn from(query: Query) -> Self {
        SubQuery::Query(Box::new(query))
    }
}

impl From<&str> for SubQuery {
    fn from(sql: &str) -> Self {
        SubQuery::Sql(sql.to_string())
    }
}

impl From<String> for SubQuery {
    fn from(sql: String) -> Self {
        SubQuery::Sql(sql)
    }
}

impl SubQuery {
    fn compile(&self) -> OrmResult<String> {
        match self {
            SubQuery::Sql(sql) => Ok(sql.trim().to_string()),
            SubQuery::Query(query) => query.to_sql(),
        }
    }

    /// Compile as one member of a compound statement. A builder member with its own
    /// ordering or pagination is wrapped in a derived table, where those clauses are legal.
    fn compile_union_member(&self) -> OrmResult<String> {
        let sql = self.compile()?;
        let SubQuery::Query(query) = self else {
            return Ok(sql);
        };
        let c = &query.state.clauses;
        if c.order_by.is_empty() && c.limit.is_none() && c.offset.is_none() && c.unions.is_empty() {
            return Ok(sql);
        }
        let name = query.compiler.identifier(query.state.qualifier());
        Ok(format!("SELECT * FROM ({sql}) AS {name}"))
    }

    /// Compile and require a SELECT returning exactly one column.
    fn compile_single_column(&self) -> OrmResult<String> {
        let sql = self.compile()?;
        let columns = match self {
            SubQuery::Query(query) => {
                if query.state.clauses.statement.is_some() {
                    return Err(OrmError::validation("subquery must be a SELECT"));
                }
                query.prepared_state()?.clauses.columns.len()
            }
            SubQuery::Sql(sql) => select_list_width(sql)
                .ok_or_else(|| OrmError::validation(format!("subquery is not a SELECT: {sql}")))?,
        };
        if columns != 1 {
            return Err(OrmError::validation(format!(
                "subquery must select exactly one column: {sql}"
            )));
        }
        Ok(sql)
    }
}

/// Number of top-level items in the select list of `sql`, `0` for `*`.
fn select_list_width(sql: &str) -> Option<usize> {
    static SELECT_RE: OnceLock<Regex> = OnceLock::new();
    let re = SELECT_RE.get_or_init(|| {
        Regex::new(r"(?is)^\s*SELECT\s+(?:DISTINCT\s+)?(.+?)\s+FROM\s+\S")
            .expect("invalid built-in subquery regex")
    });
    let list = re.captures(sql)?.get(1)?.as_str().trim();
    if list == "*" || list.ends_with(".*") {
        return Some(0);
    }
    let mut depth = 0i32;
    let mut items = 1;
    for ch in list.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => items += 1,
            _ => {}
        }
    }
    Some(items)
}

fn to_assignments(query: &Query, data: &impl Serialize) -> OrmResult<Assignments> {
    match serde_json::to_value(data)? {
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(key, value)| (query.config.naming.to_column(&key), Operand::Value(value)))
            .collect()),
        other => Err(OrmError::validation(format!(
            "write data must serialize to an object, got {other}"
        ))),
    }
}

impl Query {
    // ==================== SELECT ====================

    /// Replace the selected columns.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.record("select");
        self.state.clauses.columns = columns.into_iter().map(|c| self.column(c.as_ref())).collect();
        self
    }

    /// Append selected columns.
    pub fn add_select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.record("add_select");
        let added: Vec<String> = columns.into_iter().map(|c| self.column(c.as_ref())).collect();
        self.state.clauses.columns.extend(added);
        self
    }

    /// Append raw select expressions.
    pub fn select_raw(mut self, expression: impl Into<String>) -> Self {
        self.record("select_raw");
        self.state.clauses.columns.push(expression.into());
        self
    }

    pub fn distinct(mut self) -> Self {
        self.record("distinct");
        self.state.clauses.distinct = true;
        self
    }

    /// Alias the base table. Must come before any clause that names columns.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.record("alias");
        let c = &self.state.clauses;
        let referenced = !c.wheres.is_empty()
            || !c.columns.is_empty()
            || !c.order_by.is_empty()
            || !c.group_by.is_empty();
        if referenced {
            self.fail(OrmError::validation(
                "alias() must be called before columns are referenced",
            ));
            return self;
        }
        self.state.clauses.alias = Some(alias.into());
        self
    }

    // ==================== JOIN ====================

    fn push_join(&mut self, kind: &str, table: &str, first: &str, op: &str, second: &str) {
        let op = match op.parse::<Operator>() {
            Ok(op) => op,
            Err(err) => return self.fail(err),
        };
        let table_sql = self.join_table(table);
        self.state.clauses.joins.push(format!(
            "{kind} JOIN {table_sql} ON {} {op} {}",
            self.compiler.identifier(first),
            self.compiler.identifier(second)
        ));
    }

    fn join_table(&self, table: &str) -> String {
        match super::split_alias(table) {
            Some((name, alias)) => format!(
                "{} AS {}",
                self.compiler.identifier(name),
                self.compiler.identifier(alias)
            ),
            None => self.compiler.identifier(table),
        }
    }

    pub fn join(mut self, table: &str, first: &str, op: &str, second: &str) -> Self {
        self.record("join");
        self.push_join("INNER", table, first, op, second);
        self
    }

    pub fn left_join(mut self, table: &str, first: &str, op: &str, second: &str) -> Self {
        self.record("left_join");
        self.push_join("LEFT", table, first, op, second);
        self
    }

    pub fn right_join(mut self, table: &str, first: &str, op: &str, second: &str) -> Self {
        self.record("right_join");
        self.push_join("RIGHT", table, first, op, second);
        self
    }

    pub fn cross_join(mut self, table: &str) -> Self {
        self.record("cross_join");
        let table_sql = self.join_table(table);
        self.state.clauses.joins.push(format!("CROSS JOIN {table_sql}"));
        self
    }

    /// Append a raw join clause.
    pub fn join_raw(mut self, clause: impl Into<String>) -> Self {
        self.record("join_raw");
        self.state.clauses.joins.push(clause.into());
        self
    }

    // ==================== WHERE ====================

    fn push_where(&mut self, connector: Connector, column: &str, op: Operator, operand: Operand) {
        let column = self.column(column);
        match render_predicate(self.compiler.as_ref(), &column, op, &operand) {
            Ok(sql) => push_condition(&mut self.state.clauses.wheres, connector, sql),
            Err(err) => self.fail(err),
        }
    }

    fn push_where_op(&mut self, connector: Connector, column: &str, op: &str, value: Operand) {
        match op.parse::<Operator>() {
            Ok(op) => self.push_where(connector, column, op, value),
            Err(err) => self.fail(err),
        }
    }

    /// `column = value`; `NULL` becomes `IS NULL` and a list becomes `IN (...)`.
    pub fn where_(mut self, column: &str, value: impl Into<Operand>) -> Self {
        self.record("where");
        self.push_where(Connector::And, column, Operator::Eq, value.into());
        self
    }

    pub fn or_where(mut self, column: &str, value: impl Into<Operand>) -> Self {
        self.record("or_where");
        self.push_where(Connector::Or, column, Operator::Eq, value.into());
        self
    }

    /// `column <op> value`, e.g. `where_op("age", ">=", 18)`.
    pub fn where_op(mut self, column: &str, op: &str, value: impl Into<Operand>) -> Self {
        self.record("where");
        self.push_where_op(Connector::And, column, op, value.into());
        self
    }

    pub fn or_where_op(mut self, column: &str, op: &str, value: impl Into<Operand>) -> Self {
        self.record("or_where");
        self.push_where_op(Connector::Or, column, op, value.into());
        self
    }

    fn list<I, V>(values: I) -> Operand
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Operand::Value(Value::Array(values.into_iter().map(Into::into).collect()))
    }

    /// `column IN (...)`. An empty list matches nothing.
    pub fn where_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.record("where_in");
        self.push_where(Connector::And, column, Operator::In, Self::list(values));
        self
    }

    pub fn or_where_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.record("or_where_in");
        self.push_where(Connector::Or, column, Operator::In, Self::list(values));
        self
    }

    /// `column NOT IN (...)`. An empty list matches everything.
    pub fn where_not_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.record("where_not_in");
        self.push_where(Connector::And, column, Operator::NotIn, Self::list(values));
        self
    }

    pub fn or_where_not_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.record("or_where_not_in");
        self.push_where(Connector::Or, column, Operator::NotIn, Self::list(values));
        self
    }

    /// `column BETWEEN low AND high`. No bounds renders a NULL range.
    pub fn where_between<I, V>(mut self, column: &str, bounds: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.record("where_between");
        self.push_where(Connector::And, column, Operator::Between, Self::list(bounds));
        self
    }

    pub fn or_where_between<I, V>(mut self, column: &str, bounds: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.record("or_where_between");
        self.push_where(Connector::Or, column, Operator::Between, Self::list(bounds));
        self
    }

    pub fn where_not_between<I, V>(mut self, column: &str, bounds: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.record("where_not_between");
        self.push_where(Connector::And, column, Operator::NotBetween, Self::list(bounds));
        self
    }

    pub fn or_where_not_between<I, V>(mut self, column: &str, bounds: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.record("or_where_not_between");
        self.push_where(Connector::Or, column, Operator::NotBetween, Self::list(bounds));
        self
    }

    pub fn where_null(mut self, column: &str) -> Self {
        self.record("where_null");
        self.push_where(Connector::And, column, Operator::Is, Operand::Value(Value::Null));
        self
    }

    pub fn or_where_null(mut self, column: &str) -> Self {
        self.record("or_where_null");
        self.push_where(Connector::Or, column, Operator::Is, Operand::Value(Value::Null));
        self
    }

    pub fn where_not_null(mut self, column: &str) -> Self {
        self.record("where_not_null");
        self.push_where(Connector::And, column, Operator::IsNot, Operand::Value(Value::Null));
        self
    }

    pub fn or_where_not_null(mut self, column: &str) -> Self {
        self.record("or_where_not_null");
        self.push_where(Connector::Or, column, Operator::IsNot, Operand::Value(Value::Null));
        self
    }

    fn push_sub_query(&mut self, connector: Connector, column: &str, negated: bool, sub: SubQuery) {
        match sub.compile_single_column() {
            Ok(sql) => {
                let keyword = if negated { "NOT IN" } else { "IN" };
                let column = self.column(column);
                push_condition(
                    &mut self.state.clauses.wheres,
                    connector,
                    format!("{column} {keyword} ({sql})"),
                );
            }
            Err(err) => self.fail(err),
        }
    }

    /// `column IN (subquery)`; the subquery must select exactly one column.
    pub fn where_sub_query(mut self, column: &str, sub: impl Into<SubQuery>) -> Self {
        self.record("where_sub_query");
        self.push_sub_query(Connector::And, column, false, sub.into());
        self
    }

    pub fn or_where_sub_query(mut self, column: &str, sub: impl Into<SubQuery>) -> Self {
        self.record("or_where_sub_query");
        self.push_sub_query(Connector::Or, column, false, sub.into());
        self
    }

    pub fn where_not_sub_query(mut self, column: &str, sub: impl Into<SubQuery>) -> Self {
        self.record("where_not_sub_query");
        self.push_sub_query(Connector::And, column, true, sub.into());
        self
    }

    pub fn or_where_not_sub_query(mut self, column: &str, sub: impl Into<SubQuery>) -> Self {
        self.record("or_where_not_sub_query");
        self.push_sub_query(Connector::Or, column, true, sub.into());
        self
    }

    /// A scratch builder with this query's target and no conditions.
    fn scratch(&self) -> Query {
        let mut scratch = self.clone();
        scratch.state.clauses.wheres.clear();
        scratch.relations.clear();
        scratch.log = Default::default();
        scratch.build_error = None;
        scratch
    }

    fn push_group<F>(&mut self, connector: Connector, build: F)
    where
        F: FnOnce(Query) -> Query,
    {
        let group = build(self.scratch());
        if let Some(err) = group.build_error {
            return self.fail(err);
        }
        let wheres = group.state.clauses.wheres;
        if wheres.is_empty() {
            return;
        }
        let sql = format!("({})", render_conditions(&wheres));
        push_condition(&mut self.state.clauses.wheres, connector, sql);
    }

    /// Group the conditions built by `build` in parentheses.
    ///
    /// ```ignore
    /// query.where_("active", true)
    ///     .where_query(|q| q.where_("role", "admin").or_where("owner", true))
    /// ```
    pub fn where_query<F>(mut self, build: F) -> Self
    where
        F: FnOnce(Query) -> Query,
    {
        self.record("where_query");
        self.push_group(Connector::And, build);
        self
    }

    pub fn or_where_query<F>(mut self, build: F) -> Self
    where
        F: FnOnce(Query) -> Query,
    {
        self.record("or_where_query");
        self.push_group(Connector::Or, build);
        self
    }

    /// Append a caller-owned condition verbatim.
    pub fn where_raw(mut self, sql: impl Into<String>) -> Self {
        self.record("where_raw");
        push_condition(&mut self.state.clauses.wheres, Connector::And, sql.into());
        self
    }

    pub fn or_where_raw(mut self, sql: impl Into<String>) -> Self {
        self.record("or_where_raw");
        push_condition(&mut self.state.clauses.wheres, Connector::Or, sql.into());
        self
    }

    // ==================== GROUP BY / HAVING ====================

    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.record("group_by");
        let columns: Vec<String> = columns.into_iter().map(|c| self.column(c.as_ref())).collect();
        self.state.clauses.group_by.extend(columns);
        self
    }

    fn push_having(&mut self, connector: Connector, column: &str, op: &str, value: Operand) {
        let op = match op.parse::<Operator>() {
            Ok(op) => op,
            Err(err) => return self.fail(err),
        };
        let column = self.column(column);
        match render_predicate(self.compiler.as_ref(), &column, op, &value) {
            Ok(sql) => push_condition(&mut self.state.clauses.havings, connector, sql),
            Err(err) => self.fail(err),
        }
    }

    pub fn having(mut self, column: &str, op: &str, value: impl Into<Operand>) -> Self {
        self.record("having");
        self.push_having(Connector::And, column, op, value.into());
        self
    }

    pub fn or_having(mut self, column: &str, op: &str, value: impl Into<Operand>) -> Self {
        self.record("or_having");
        self.push_having(Connector::Or, column, op, value.into());
        self
    }

    // ==================== ORDER / PAGINATION ====================

    pub fn order_by(mut self, column: &str) -> Self {
        self.record("order_by");
        let column = self.column(column);
        self.state.clauses.order_by.push(format!("{column} ASC"));
        self
    }

    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.record("order_by");
        let column = self.column(column);
        self.state.clauses.order_by.push(format!("{column} DESC"));
        self
    }

    pub fn order_by_raw(mut self, sql: impl Into<String>) -> Self {
        self.record("order_by");
        self.state.clauses.order_by.push(sql.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.record("limit");
        self.state.clauses.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.record("offset");
        self.state.clauses.offset = Some(offset);
        self
    }

    /// `LIMIT per_page OFFSET (page - 1) * per_page`; pages start at 1.
    pub fn page(mut self, page: u64, per_page: u64) -> Self {
        self.record("page");
        let page = page.max(1);
        self.state.clauses.limit = Some(per_page);
        self.state.clauses.offset = Some((page - 1).saturating_mul(per_page));
        self
    }

    // ==================== LOCKS ====================

    pub fn lock_for_update(mut self) -> Self {
        self.record("lock_for_update");
        self.state.clauses.lock = Some(RowLock::Update);
        self
    }

    pub fn shared_lock(mut self) -> Self {
        self.record("shared_lock");
        self.state.clauses.lock = Some(RowLock::Share);
        self
    }

    // ==================== UNION / CTE ====================

    fn push_union(&mut self, all: bool, sub: SubQuery) {
        match sub.compile_union_member() {
            Ok(sql) => self.state.clauses.unions.push(Union { all, sql }),
            Err(err) => self.fail(err),
        }
    }

    pub fn union(mut self, other: impl Into<SubQuery>) -> Self {
        self.record("union");
        self.push_union(false, other.into());
        self
    }

    pub fn union_all(mut self, other: impl Into<SubQuery>) -> Self {
        self.record("union_all");
        self.push_union(true, other.into());
        self
    }

    /// Prepend `WITH name AS (body)`.
    pub fn with_cte(mut self, name: impl Into<String>, body: impl Into<SubQuery>) -> Self {
        self.record("with_cte");
        match body.into().compile() {
            Ok(sql) => self.state.clauses.ctes.push(Cte {
                name: name.into(),
                sql,
            }),
            Err(err) => self.fail(err),
        }
        self
    }

    // ==================== SOFT DELETES ====================

    fn set_scope(&mut self, method: &'static str, scope: SoftDeleteScope) {
        self.record(method);
        if !self.require_model(method) {
            return;
        }
        if let Some(model) = self.state.model_clauses_mut() {
            model.scope = scope;
        }
    }

    /// Read soft-deleted rows too.
    pub fn with_trashed(mut self) -> Self {
        self.set_scope("with_trashed", SoftDeleteScope::Include);
        self
    }

    /// Read only soft-deleted rows.
    pub fn only_trashed(mut self) -> Self {
        self.set_scope("only_trashed", SoftDeleteScope::Only);
        self
    }

    /// Drop the implicit soft-delete predicate.
    pub fn without_soft_delete(mut self) -> Self {
        self.set_scope("without_soft_delete", SoftDeleteScope::Include);
        self
    }

    // ==================== WRITES ====================

    fn queue_write(&mut self, method: &'static str, statement: OrmResult<Statement>) {
        if let Some(pending) = &self.state.clauses.statement {
            let err = OrmError::validation(format!(
                "{method}() cannot follow a pending {}()",
                pending.name()
            ));
            return self.fail(err);
        }
        match statement {
            Ok(statement) => self.state.clauses.statement = Some(statement),
            Err(err) => self.fail(err),
        }
    }

    /// Queue an INSERT of one row; run it with `save()`.
    pub fn create(mut self, data: &impl Serialize) -> Self {
        self.record("create");
        let row = to_assignments(&self, data).map(|row| Statement::Insert(vec![row]));
        self.queue_write("create", row);
        self
    }

    /// Queue a multi-row INSERT; run it with `save()`.
    pub fn create_many<T: Serialize>(mut self, rows: &[T]) -> Self {
        self.record("create_many");
        let statement = if rows.is_empty() {
            Err(OrmError::validation("create_many() needs at least one row"))
        } else {
            rows.iter()
                .map(|row| to_assignments(&self, row))
                .collect::<OrmResult<Vec<_>>>()
                .map(Statement::Insert)
        };
        self.queue_write("create_many", statement);
        self
    }

    /// Queue an UPDATE of the matching rows; run it with `save()`.
    pub fn update(mut self, data: &impl Serialize) -> Self {
        self.record("update");
        let statement = to_assignments(&self, data).map(Statement::Update);
        self.queue_write("update", statement);
        self
    }

    /// Run the pending write without reading rows back.
    pub fn void(mut self) -> Self {
        self.record("void");
        self.state.clauses.void = true;
        self
    }

    /// Allow UPDATE/DELETE without a WHERE clause.
    pub fn allow_unfiltered(mut self) -> Self {
        self.record("allow_unfiltered");
        self.state.clauses.unfiltered = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::select_list_width;

    #[test]
    fn select_list_width_counts_top_level_items() {
        assert_eq!(select_list_width("SELECT id FROM users"), Some(1));
        assert_eq!(select_list_width("select distinct user_id from posts"), Some(1));
        assert_eq!(select_list_width("SELECT COALESCE(a, b) FROM t"), Some(1));
        assert_eq!(select_list_width("SELECT id, name FROM users"), Some(2));
        assert_eq!(select_list_width("SELECT * FROM users"), Some(0));
        assert_eq!(select_list_width("DELETE FROM users"), None);
    }
}
