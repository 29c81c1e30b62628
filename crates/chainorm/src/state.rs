//! Per-builder clause state.
//!
//! A [`QueryState`] is a [`ClauseSet`] shared by table and model queries plus a
//! [`StateExt`] tag carrying model-only columns. Clauses are addressed through the closed
//! [`StateKey`] enum; `get`/`set` fail with a configuration error for model-only keys on a
//! table state and with a validation error for values of the wrong shape.
//!
//! Every field is owned, so `clone()` is a deep copy and mutating a clone never reaches
//! the original.

use crate::condition::Condition;
use crate::error::{OrmError, OrmResult};
use crate::value::Operand;
use std::fmt;
use std::str::FromStr;

/// Assignments for one row: `(column, value)` in caller order.
pub type Assignments = Vec<(String, Operand)>;

/// Row lock requested by `lock_for_update()` / `shared_lock()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLock {
    Update,
    Share,
}

/// A compiled query appended with `UNION` / `UNION ALL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Union {
    pub all: bool,
    pub sql: String,
}

/// A named common table expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cte {
    pub name: String,
    pub sql: String,
}

/// The pending write statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Insert(Vec<Assignments>),
    Update(Assignments),
    Delete,
}

impl Statement {
    pub fn name(&self) -> &'static str {
        match self {
            Statement::Insert(_) => "insert",
            Statement::Update(_) => "update",
            Statement::Delete => "delete",
        }
    }
}

/// Which rows a soft-delete model reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoftDeleteScope {
    /// Only rows whose soft-delete column is NULL.
    #[default]
    Exclude,
    /// Every row.
    Include,
    /// Only soft-deleted rows.
    Only,
}

/// Clauses shared by table and model queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClauseSet {
    pub table: String,
    pub alias: Option<String>,
    /// Rendered select items; empty means "default columns".
    pub columns: Vec<String>,
    pub distinct: bool,
    /// Rendered join clauses.
    pub joins: Vec<String>,
    pub wheres: Vec<Condition>,
    pub group_by: Vec<String>,
    pub havings: Vec<Condition>,
    pub order_by: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub lock: Option<RowLock>,
    pub unions: Vec<Union>,
    pub ctes: Vec<Cte>,
    pub statement: Option<Statement>,
    /// Execute writes without reading rows back.
    pub void: bool,
    /// Allow UPDATE/DELETE without a WHERE clause.
    pub unfiltered: bool,
}

/// Model-only clause values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelClauses {
    pub soft_delete_column: Option<String>,
    pub created_at_column: Option<String>,
    pub updated_at_column: Option<String>,
    /// Primary-key column filled with a UUID v4 on insert.
    pub uuid_column: Option<String>,
    pub scope: SoftDeleteScope,
}

/// Table or model tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateExt {
    Table,
    Model(ModelClauses),
}

/// Closed set of clause keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    Table,
    Alias,
    Columns,
    Distinct,
    Joins,
    Wheres,
    GroupBy,
    Havings,
    OrderBy,
    Limit,
    Offset,
    Lock,
    Unions,
    Ctes,
    Statement,
    Void,
    Unfiltered,
    SoftDeleteColumn,
    CreatedAtColumn,
    UpdatedAtColumn,
    UuidColumn,
    Scope,
}

impl StateKey {
    pub fn is_model_only(self) -> bool {
        matches!(
            self,
            StateKey::SoftDeleteColumn
                | StateKey::CreatedAtColumn
                | StateKey::UpdatedAtColumn
                | StateKey::UuidColumn
                | StateKey::Scope
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StateKey::Table => "table",
            StateKey::Alias => "alias",
            StateKey::Columns => "select",
            StateKey::Distinct => "distinct",
            StateKey::Joins => "join",
            StateKey::Wheres => "where",
            StateKey::GroupBy => "group_by",
            StateKey::Havings => "having",
            StateKey::OrderBy => "order_by",
            StateKey::Limit => "limit",
            StateKey::Offset => "offset",
            StateKey::Lock => "lock",
            StateKey::Unions => "union",
            StateKey::Ctes => "with",
            StateKey::Statement => "statement",
            StateKey::Void => "void",
            StateKey::Unfiltered => "unfiltered",
            StateKey::SoftDeleteColumn => "soft_delete",
            StateKey::CreatedAtColumn => "created_at",
            StateKey::UpdatedAtColumn => "updated_at",
            StateKey::UuidColumn => "uuid",
            StateKey::Scope => "scope",
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateKey {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = match s.to_ascii_lowercase().as_str() {
            "table" | "from" => StateKey::Table,
            "alias" => StateKey::Alias,
            "select" | "columns" => StateKey::Columns,
            "distinct" => StateKey::Distinct,
            "join" | "joins" => StateKey::Joins,
            "where" | "wheres" => StateKey::Wheres,
            "group_by" | "groupby" => StateKey::GroupBy,
            "having" | "havings" => StateKey::Havings,
            "order_by" | "orderby" => StateKey::OrderBy,
            "limit" => StateKey::Limit,
            "offset" => StateKey::Offset,
            "lock" => StateKey::Lock,
            "union" | "unions" => StateKey::Unions,
            "with" | "cte" => StateKey::Ctes,
            "insert" | "update" | "delete" | "save" | "statement" => StateKey::Statement,
            "void" => StateKey::Void,
            "unfiltered" => StateKey::Unfiltered,
            "soft_delete" | "deleted_at" => StateKey::SoftDeleteColumn,
            "created_at" => StateKey::CreatedAtColumn,
            "updated_at" => StateKey::UpdatedAtColumn,
            "uuid" => StateKey::UuidColumn,
            "scope" => StateKey::Scope,
            other => {
                return Err(OrmError::configuration(format!(
                    "unknown state key `{other}`"
                )));
            }
        };
        Ok(key)
    }
}

/// A value read from or written to one [`StateKey`].
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Text(Option<String>),
    Flag(bool),
    Number(Option<u64>),
    Fragments(Vec<String>),
    Conditions(Vec<Condition>),
    Lock(Option<RowLock>),
    Unions(Vec<Union>),
    Ctes(Vec<Cte>),
    Statement(Option<Statement>),
    Scope(SoftDeleteScope),
}

/// The full clause state of one builder.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    pub clauses: ClauseSet,
    pub ext: StateExt,
}

fn shape_error(key: StateKey) -> OrmError {
    OrmError::validation(format!("wrong value shape for state key `{key}`"))
}

impl QueryState {
    /// State for a plain table query.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            clauses: ClauseSet {
                table: table.into(),
                ..ClauseSet::default()
            },
            ext: StateExt::Table,
        }
    }

    /// State for a model query.
    pub fn model(table: impl Into<String>, model: ModelClauses) -> Self {
        Self {
            clauses: ClauseSet {
                table: table.into(),
                ..ClauseSet::default()
            },
            ext: StateExt::Model(model),
        }
    }

    pub fn is_model(&self) -> bool {
        matches!(self.ext, StateExt::Model(_))
    }

    pub fn model_clauses(&self) -> Option<&ModelClauses> {
        match &self.ext {
            StateExt::Model(m) => Some(m),
            StateExt::Table => None,
        }
    }

    pub fn model_clauses_mut(&mut self) -> Option<&mut ModelClauses> {
        match &mut self.ext {
            StateExt::Model(m) => Some(m),
            StateExt::Table => None,
        }
    }

    /// Alias if set, otherwise the table name.
    pub fn qualifier(&self) -> &str {
        self.clauses
            .alias
            .as_deref()
            .unwrap_or(&self.clauses.table)
    }

    fn model_for(&self, key: StateKey) -> OrmResult<&ModelClauses> {
        self.model_clauses().ok_or_else(|| {
            OrmError::configuration(format!("state key `{key}` is only valid on model queries"))
        })
    }

    fn model_for_mut(&mut self, key: StateKey) -> OrmResult<&mut ModelClauses> {
        self.model_clauses_mut().ok_or_else(|| {
            OrmError::configuration(format!("state key `{key}` is only valid on model queries"))
        })
    }

    /// Read the current value of `key`.
    pub fn get(&self, key: StateKey) -> OrmResult<StateValue> {
        let c = &self.clauses;
        let value = match key {
            StateKey::Table => StateValue::Text(Some(c.table.clone())),
            StateKey::Alias => StateValue::Text(c.alias.clone()),
            StateKey::Columns => StateValue::Fragments(c.columns.clone()),
            StateKey::Distinct => StateValue::Flag(c.distinct),
            StateKey::Joins => StateValue::Fragments(c.joins.clone()),
            StateKey::Wheres => StateValue::Conditions(c.wheres.clone()),
            StateKey::GroupBy => StateValue::Fragments(c.group_by.clone()),
            StateKey::Havings => StateValue::Conditions(c.havings.clone()),
            StateKey::OrderBy => StateValue::Fragments(c.order_by.clone()),
            StateKey::Limit => StateValue::Number(c.limit),
            StateKey::Offset => StateValue::Number(c.offset),
            StateKey::Lock => StateValue::Lock(c.lock),
            StateKey::Unions => StateValue::Unions(c.unions.clone()),
            StateKey::Ctes => StateValue::Ctes(c.ctes.clone()),
            StateKey::Statement => StateValue::Statement(c.statement.clone()),
            StateKey::Void => StateValue::Flag(c.void),
            StateKey::Unfiltered => StateValue::Flag(c.unfiltered),
            StateKey::SoftDeleteColumn => {
                StateValue::Text(self.model_for(key)?.soft_delete_column.clone())
            }
            StateKey::CreatedAtColumn => {
                StateValue::Text(self.model_for(key)?.created_at_column.clone())
            }
            StateKey::UpdatedAtColumn => {
                StateValue::Text(self.model_for(key)?.updated_at_column.clone())
            }
            StateKey::UuidColumn => StateValue::Text(self.model_for(key)?.uuid_column.clone()),
            StateKey::Scope => StateValue::Scope(self.model_for(key)?.scope),
        };
        Ok(value)
    }

    /// Replace the value of `key`.
    pub fn set(&mut self, key: StateKey, value: StateValue) -> OrmResult<()> {
        if key.is_model_only() {
            let model = self.model_for_mut(key)?;
            match (key, value) {
                (StateKey::SoftDeleteColumn, StateValue::Text(v)) => model.soft_delete_column = v,
                (StateKey::CreatedAtColumn, StateValue::Text(v)) => model.created_at_column = v,
                (StateKey::UpdatedAtColumn, StateValue::Text(v)) => model.updated_at_column = v,
                (StateKey::UuidColumn, StateValue::Text(v)) => model.uuid_column = v,
                (StateKey::Scope, StateValue::Scope(v)) => model.scope = v,
                _ => return Err(shape_error(key)),
            }
            return Ok(());
        }

        let c = &mut self.clauses;
        match (key, value) {
            (StateKey::Table, StateValue::Text(Some(v))) => c.table = v,
            (StateKey::Alias, StateValue::Text(v)) => c.alias = v,
            (StateKey::Columns, StateValue::Fragments(v)) => c.columns = v,
            (StateKey::Distinct, StateValue::Flag(v)) => c.distinct = v,
            (StateKey::Joins, StateValue::Fragments(v)) => c.joins = v,
            (StateKey::Wheres, StateValue::Conditions(v)) => c.wheres = v,
            (StateKey::GroupBy, StateValue::Fragments(v)) => c.group_by = v,
            (StateKey::Havings, StateValue::Conditions(v)) => c.havings = v,
            (StateKey::OrderBy, StateValue::Fragments(v)) => c.order_by = v,
            (StateKey::Limit, StateValue::Number(v)) => c.limit = v,
            (StateKey::Offset, StateValue::Number(v)) => c.offset = v,
            (StateKey::Lock, StateValue::Lock(v)) => c.lock = v,
            (StateKey::Unions, StateValue::Unions(v)) => c.unions = v,
            (StateKey::Ctes, StateValue::Ctes(v)) => c.ctes = v,
            (StateKey::Statement, StateValue::Statement(v)) => c.statement = v,
            (StateKey::Void, StateValue::Flag(v)) => c.void = v,
            (StateKey::Unfiltered, StateValue::Flag(v)) => c.unfiltered = v,
            _ => return Err(shape_error(key)),
        }
        Ok(())
    }

    /// Replace this state with a copy of `snapshot`.
    pub fn restore(&mut self, snapshot: &QueryState) {
        *self = snapshot.clone();
    }

    /// Clear the pending statement and the void flag so the builder can be saved again.
    pub fn reset(&mut self) {
        self.clauses.statement = None;
        self.clauses.void = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Connector;

    #[test]
    fn unknown_key_name_is_a_configuration_error() {
        assert!("frobnicate".parse::<StateKey>().unwrap_err().is_configuration());
        assert_eq!("save".parse::<StateKey>().unwrap(), StateKey::Statement);
    }

    #[test]
    fn model_keys_on_table_state_fail() {
        let mut state = QueryState::table("users");
        assert!(state.get(StateKey::SoftDeleteColumn).unwrap_err().is_configuration());
        let err = state
            .set(StateKey::Scope, StateValue::Scope(SoftDeleteScope::Only))
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn wrong_shape_is_a_validation_error() {
        let mut state = QueryState::table("users");
        let err = state.set(StateKey::Limit, StateValue::Flag(true)).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn clones_are_independent() {
        let mut original = QueryState::table("users");
        original.clauses.wheres.push(Condition {
            connector: None,
            sql: "users.id = 1".into(),
        });
        let mut copy = original.clone();
        copy.clauses.wheres.push(Condition {
            connector: Some(Connector::And),
            sql: "users.active = 1".into(),
        });
        assert_eq!(original.clauses.wheres.len(), 1);
        assert_eq!(copy.clauses.wheres.len(), 2);
    }

    #[test]
    fn reset_only_clears_statement_keys() {
        let mut state = QueryState::table("users");
        state.clauses.limit = Some(5);
        state.clauses.void = true;
        state.clauses.statement = Some(Statement::Delete);
        state.reset();
        assert_eq!(state.clauses.statement, None);
        assert!(!state.clauses.void);
        assert_eq!(state.get(StateKey::Limit).unwrap(), StateValue::Number(Some(5)));
    }

    #[test]
    fn restore_replaces_everything() {
        let snapshot = QueryState::model("posts", ModelClauses::default());
        let mut state = QueryState::table("users");
        state.restore(&snapshot);
        assert!(state.is_model());
        assert_eq!(state.qualifier(), "posts");
    }
}
