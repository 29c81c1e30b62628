//! The fluent query builder.
//!
//! One [`Query`] type serves both plain table queries and model queries. Clause methods
//! take `self` by value and return the builder, so chains read top to bottom and every
//! intermediate value owns its state outright:
//!
//! ```ignore
//! let db = Db::new(Dialect::Postgres).with_registry(registry);
//!
//! let users = db
//!     .model("user")?
//!     .where_("active", true)
//!     .where_in("role", ["admin", "editor"])
//!     .with("posts.comments")
//!     .with_count("followers")
//!     .order_by_desc("created_at")
//!     .get(&conn)
//!     .await?;
//! ```
//!
//! # Errors
//!
//! Clause methods never fail on the spot. The first problem (unknown operator, malformed
//! subquery, unknown relation, ...) is recorded and returned by [`Query::to_sql`] and by
//! every terminal before any I/O happens.

mod clauses;
mod read;
mod relations;
mod write;


pub use read::{Page, PaginationMeta};
pub use relations::{RelationRequest, RelationVariant};
pub use write::WriteResult;

use crate::config::OrmConfig;
use crate::condition::and_over_all;
use crate::dialect::StatementCompiler;
use crate::error::{OrmError, OrmResult};
use crate::ident::Ident;
use crate::model::{Model, Registry};
use crate::state::{QueryState, SoftDeleteScope, StateKey, StateValue};
use std::fmt;
use std::sync::Arc;

/// Clause methods that queue a write.
const WRITE_CLAUSES: &[&str] = &["create", "create_many", "update"];

/// Clause methods that only make sense on a read.
const READ_ONLY_CLAUSES: &[&str] = &[
    "with",
    "with_callback",
    "with_count",
    "with_exists",
    "with_not_exists",
    "with_trashed_relation",
    "with_all_relation",
    "group_by",
    "having",
    "or_having",
    "union",
    "union_all",
    "distinct",
    "lock_for_update",
    "shared_lock",
    "with_cte",
];

/// Ordered log of the clause methods invoked on one builder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodLog {
    calls: Vec<&'static str>,
}

impl MethodLog {
    pub fn record(&mut self, method: &'static str) {
        self.calls.push(method);
    }

    pub fn calls(&self) -> &[&'static str] {
        &self.calls
    }

    pub fn contains(&self, method: &str) -> bool {
        self.calls.contains(&method)
    }

    /// Reject a read terminal once a write has been queued.
    pub fn ensure_readable(&self, terminal: &str) -> OrmResult<()> {
        match self.calls.iter().find(|m| WRITE_CLAUSES.contains(m)) {
            Some(write) => Err(OrmError::validation(format!(
                "{terminal}() cannot run after {write}(); call save() instead"
            ))),
            None => Ok(()),
        }
    }

    /// Reject a write terminal when read-only clauses were used.
    pub fn ensure_writable(&self, terminal: &str) -> OrmResult<()> {
        match self.calls.iter().find(|m| READ_ONLY_CLAUSES.contains(m)) {
            Some(read) => Err(OrmError::validation(format!(
                "{terminal}() cannot be combined with {read}()"
            ))),
            None => Ok(()),
        }
    }

    /// Drop queued writes after a successful save.
    pub(crate) fn forget_writes(&mut self) {
        self.calls.retain(|m| !WRITE_CLAUSES.contains(m));
    }
}

/// A table or model query under construction.
#[derive(Clone)]
pub struct Query {
    pub(crate) compiler: Arc<dyn StatementCompiler>,
    pub(crate) config: Arc<OrmConfig>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) model: Option<Arc<Model>>,
    pub(crate) state: QueryState,
    pub(crate) relations: Vec<RelationRequest>,
    pub(crate) log: MethodLog,
    pub(crate) build_error: Option<OrmError>,
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("dialect", &self.compiler.dialect())
            .field("model", &self.model.as_ref().map(|m| m.name()))
            .field("state", &self.state)
            .field("relations", &self.relations)
            .field("log", &self.log)
            .field("build_error", &self.build_error)
            .finish()
    }
}

impl Query {
    pub(crate) fn for_table(
        compiler: Arc<dyn StatementCompiler>,
        config: Arc<OrmConfig>,
        registry: Arc<Registry>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            compiler,
            config,
            registry,
            model: None,
            state: QueryState::table(table),
            relations: Vec::new(),
            log: MethodLog::default(),
            build_error: None,
        }
    }

    pub(crate) fn for_model(
        compiler: Arc<dyn StatementCompiler>,
        config: Arc<OrmConfig>,
        registry: Arc<Registry>,
        model: Arc<Model>,
    ) -> Self {
        let state = QueryState::model(model.table(), model.clauses());
        Self {
            compiler,
            config,
            registry,
            model: Some(model),
            state,
            relations: Vec::new(),
            log: MethodLog::default(),
            build_error: None,
        }
    }

    /// A fresh query against another registered model, sharing this query's handles.
    pub(crate) fn related(&self, model: &str) -> OrmResult<Query> {
        let model = self.registry.model(model)?.clone();
        Ok(Self::for_model(
            self.compiler.clone(),
            self.config.clone(),
            self.registry.clone(),
            model,
        ))
    }

    /// A fresh table query sharing this query's handles.
    pub(crate) fn sibling_table(&self, table: &str) -> Query {
        Self::for_table(
            self.compiler.clone(),
            self.config.clone(),
            self.registry.clone(),
            table,
        )
    }

    pub fn model(&self) -> Option<&Model> {
        self.model.as_deref()
    }

    pub fn compiler(&self) -> &dyn StatementCompiler {
        self.compiler.as_ref()
    }

    /// The builder's clause state.
    pub fn state(&self) -> &QueryState {
        &self.state
    }

    pub fn method_log(&self) -> &MethodLog {
        &self.log
    }

    /// The first error recorded by a clause method, if any.
    pub fn build_error(&self) -> Option<&OrmError> {
        self.build_error.as_ref()
    }

    /// Read one clause value.
    pub fn get_state(&self, key: StateKey) -> OrmResult<StateValue> {
        self.state.get(key)
    }

    /// Replace one clause value.
    pub fn set_state(mut self, key: StateKey, value: StateValue) -> Self {
        if let Err(err) = self.state.set(key, value) {
            self.fail(err);
        }
        self
    }

    /// Compile the query without executing it.
    ///
    /// Includes the default soft-delete predicate, default columns and existence
    /// predicates, exactly as a terminal would send them.
    pub fn to_sql(&self) -> OrmResult<String> {
        self.check()?;
        let state = self.prepared_state()?;
        self.compiler.any(&state)
    }

    pub(crate) fn record(&mut self, method: &'static str) {
        self.log.record(method);
    }

    /// Keep the first build error; later ones are usually consequences of it.
    pub(crate) fn fail(&mut self, err: OrmError) {
        if self.build_error.is_none() {
            self.build_error = Some(err);
        }
    }

    pub(crate) fn check(&self) -> OrmResult<()> {
        match &self.build_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    pub(crate) fn require_model(&mut self, method: &str) -> bool {
        if self.model.is_some() {
            return true;
        }
        self.fail(OrmError::configuration(format!(
            "{method}() is only available on model queries"
        )));
        false
    }

    /// Translate a client-side column name and qualify it with the alias or table.
    ///
    /// `name AS alias` keeps the alias; anything that is not a plain identifier is an
    /// expression and passes through unchanged.
    pub(crate) fn column(&self, name: &str) -> String {
        if let Some((expr, alias)) = split_alias(name) {
            return format!("{} AS {}", self.column(expr), self.compiler.identifier(alias));
        }
        self.qualify(&self.config.naming.to_column(name))
    }

    /// Qualify a database column name without naming translation.
    pub(crate) fn qualify(&self, column: &str) -> String {
        match Ident::parse(column) {
            Ok(ident) => ident
                .qualified(self.state.qualifier())
                .render(|part| self.compiler.quote(part)),
            Err(_) => column.to_string(),
        }
    }

    /// State as a terminal sends it.
    pub(crate) fn prepared_state(&self) -> OrmResult<QueryState> {
        let mut state = self.state.clone();
        if state.clauses.statement.is_none() {
            self.apply_default_columns(&mut state);
            for predicate in self.existence_predicates()? {
                and_over_all(&mut state.clauses.wheres, predicate);
            }
        }
        self.apply_soft_delete_scope(&mut state);
        Ok(state)
    }

    fn apply_default_columns(&self, state: &mut QueryState) {
        if !state.clauses.columns.is_empty() {
            return;
        }
        let Some(schema) = self.model.as_deref().and_then(Model::schema) else {
            return;
        };
        state.clauses.columns = schema.column_names().map(|c| self.qualify(c)).collect();
    }

    pub(crate) fn apply_soft_delete_scope(&self, state: &mut QueryState) {
        let Some(model) = state.model_clauses() else {
            return;
        };
        let Some(column) = model.soft_delete_column.as_deref() else {
            return;
        };
        let predicate = match model.scope {
            SoftDeleteScope::Exclude => format!("{} IS NULL", self.qualify(column)),
            SoftDeleteScope::Only => format!("{} IS NOT NULL", self.qualify(column)),
            SoftDeleteScope::Include => return,
        };
        and_over_all(&mut state.clauses.wheres, predicate);
    }
}

/// Split `expr AS alias` when the alias is a plain identifier.
fn split_alias(name: &str) -> Option<(&str, &str)> {
    let lower = name.to_ascii_lowercase();
    let at = lower.rfind(" as ")?;
    let (expr, alias) = (name[..at].trim(), name[at + 4..].trim());
    let ident = Ident::parse(alias).ok()?;
    (ident.is_bare() && !ident.is_wildcard() && !expr.is_empty()).then_some((expr, alias))
}
