use super::Query;
use crate::client::{Connection, QueryOutput};
use crate::condition::{Operator, and_over_all, render_predicate};
use crate::dialect::InsertResult;
use crate::error::{OrmError, OrmResult};
use crate::pipeline;
use crate::row::Row;
use crate::state::{Assignments, QueryState, SoftDeleteScope, Statement};
use crate::validate::WriteAction;
use crate::value::{Operand, Raw, now_timestamp};
use serde_json::Value;

/// Outcome of a write terminal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteResult {
    /// Rows changed, as reported by the connection.
    pub affected: u64,
    /// Written rows read back (inserts only, empty with `void()`).
    pub rows: Vec<Row>,
    /// Auto-increment id reported by the connection, when any.
    pub last_insert_id: Option<Value>,
}

impl WriteResult {
    fn from_output(output: QueryOutput) -> Self {
        Self {
            affected: output.affected_rows,
            rows: output.rows,
            last_insert_id: output.last_insert_id,
        }
    }
}

/// The plain values of one assignment row, as validators see it.
fn validation_row(assignments: &Assignments) -> Row {
    assignments
        .iter()
        .filter_map(|(column, operand)| {
            operand
                .as_value()
                .map(|value| (column.clone(), value.clone()))
        })
        .collect()
}

fn set_if_missing(assignments: &mut Assignments, column: &str, value: impl FnOnce() -> Value) {
    if !assignments.iter().any(|(c, _)| c == column) {
        assignments.push((column.to_string(), Operand::Value(value())));
    }
}

impl Query {
    // ==================== SAVE ====================

    /// Execute the write queued by `create`, `create_many` or `update`.
    ///
    /// Model writes get automatic timestamps and UUID keys and are validated before
    /// compilation. Inserted rows are read back (RETURNING, OUTPUT or a re-select by the
    /// last insert id) unless `void()` was called. On success the queued statement is
    /// cleared so the same builder can queue and save another write.
    pub async fn save<C: Connection>(&mut self, conn: &C) -> OrmResult<WriteResult> {
        self.check()?;
        self.log.ensure_writable("save")?;
        let mut state = self.state.clone();
        let statement = state.clauses.statement.take().ok_or_else(|| {
            OrmError::validation("save() needs a pending create(), create_many() or update()")
        })?;

        let (statement, action) = match statement {
            Statement::Insert(mut rows) => {
                for row in &mut rows {
                    self.stamp_insert(row);
                }
                (Statement::Insert(rows), WriteAction::Insert)
            }
            Statement::Update(mut assignments) => {
                self.guard_unfiltered("update")?;
                self.stamp_update(&mut assignments);
                (Statement::Update(assignments), WriteAction::Update)
            }
            Statement::Delete => {
                return Err(OrmError::validation("save() cannot run a delete; call delete()"));
            }
        };
        self.validate_statement(&statement, action)?;

        state.clauses.statement = Some(statement);
        self.apply_soft_delete_scope(&mut state);
        let sql = self.compiler.any(&state)?;
        let output = pipeline::execute(conn, self, &sql).await?;

        let mut result = match action {
            WriteAction::Insert => self.read_back(conn, &state, output).await?,
            WriteAction::Update => WriteResult::from_output(output),
        };
        pipeline::finalize_rows(self, &mut result.rows);
        match action {
            WriteAction::Insert => pipeline::run_observers(self, |observer, model| {
                observer.after_insert(model, &result.rows)
            })?,
            WriteAction::Update => pipeline::run_observers(self, |observer, model| {
                observer.after_update(model, result.affected)
            })?,
        }

        self.state.reset();
        self.log.forget_writes();
        Ok(result)
    }

    fn stamp_insert(&self, row: &mut Assignments) {
        let Some(model) = self.state.model_clauses() else {
            return;
        };
        if let Some(column) = &model.uuid_column {
            set_if_missing(row, column, || {
                Value::String(uuid::Uuid::new_v4().to_string())
            });
        }
        for column in [&model.created_at_column, &model.updated_at_column]
            .into_iter()
            .flatten()
        {
            set_if_missing(row, column, now_timestamp);
        }
    }

    fn stamp_update(&self, assignments: &mut Assignments) {
        let column = self
            .state
            .model_clauses()
            .and_then(|m| m.updated_at_column.as_deref());
        if let Some(column) = column {
            set_if_missing(assignments, column, now_timestamp);
        }
    }

    fn validate_statement(&self, statement: &Statement, action: WriteAction) -> OrmResult<()> {
        let Some(validator) = self.model.as_deref().and_then(|m| m.validator()) else {
            return Ok(());
        };
        match statement {
            Statement::Insert(rows) => rows
                .iter()
                .try_for_each(|row| validator.validate(&validation_row(row), action)),
            Statement::Update(assignments) => {
                validator.validate(&validation_row(assignments), action)
            }
            Statement::Delete => Ok(()),
        }
    }

    /// Refuse an UPDATE/DELETE without WHERE before implicit predicates are added.
    fn guard_unfiltered(&self, verb: &str) -> OrmResult<()> {
        let c = &self.state.clauses;
        if c.wheres.is_empty() && !c.unfiltered {
            return Err(OrmError::validation(format!(
                "{verb} without WHERE is refused; call allow_unfiltered() to affect every row"
            )));
        }
        Ok(())
    }

    async fn read_back<C: Connection>(
        &self,
        conn: &C,
        state: &QueryState,
        output: QueryOutput,
    ) -> OrmResult<WriteResult> {
        let mut result = WriteResult::from_output(output);
        if state.clauses.void || self.compiler.insert_result() != InsertResult::LastInsertId {
            if result.affected == 0 {
                result.affected = result.rows.len() as u64;
            }
            return Ok(result);
        }

        let rows = match &state.clauses.statement {
            Some(Statement::Insert(rows)) if rows.len() == 1 => &rows[0],
            _ => return Ok(result),
        };
        let pk = self
            .model
            .as_deref()
            .map(|m| m.primary_key().to_string())
            .unwrap_or_else(|| "id".to_string());
        let id = rows
            .iter()
            .find(|(column, _)| *column == pk)
            .and_then(|(_, operand)| operand.as_value().cloned())
            .or_else(|| result.last_insert_id.clone());
        let Some(id) = id else {
            return Ok(result);
        };

        let mut reselect = self.sibling_table(&state.clauses.table);
        reselect.model = self.model.clone();
        let column = reselect.qualify(&pk);
        let predicate = render_predicate(
            self.compiler.as_ref(),
            &column,
            Operator::Eq,
            &Operand::Value(id),
        )?;
        and_over_all(&mut reselect.state.clauses.wheres, predicate);
        reselect.state.clauses.limit = Some(1);
        result.rows = reselect.fetch(conn).await?;
        Ok(result)
    }

    // ==================== DELETE / RESTORE ====================

    /// Delete matching rows; soft-delete models get their soft-delete column set instead.
    pub async fn delete<C: Connection>(&self, conn: &C) -> OrmResult<u64> {
        let soft = self
            .state
            .model_clauses()
            .and_then(|m| m.soft_delete_column.clone());
        match soft {
            Some(column) => {
                let mut assignments = vec![(column, Operand::Value(now_timestamp()))];
                self.stamp_update(&mut assignments);
                self.pending("delete", Statement::Update(assignments), Notify::Delete)
                    .run(conn)
                    .await
            }
            None => self.force_delete(conn).await,
        }
    }

    /// Remove matching rows even on soft-delete models.
    pub async fn force_delete<C: Connection>(&self, conn: &C) -> OrmResult<u64> {
        self.pending("force_delete", Statement::Delete, Notify::Delete)
            .run(conn)
            .await
    }

    /// Clear the soft-delete column of matching (soft-deleted) rows.
    pub async fn restore<C: Connection>(&self, conn: &C) -> OrmResult<u64> {
        let column = self
            .state
            .model_clauses()
            .and_then(|m| m.soft_delete_column.clone());
        let Some(column) = column else {
            return Err(OrmError::configuration(format!(
                "restore() needs a soft-delete model, `{}` has none",
                self.state.clauses.table
            )));
        };
        let mut assignments = vec![(column, Operand::Value(Value::Null))];
        self.stamp_update(&mut assignments);
        let mut pending = self.pending("restore", Statement::Update(assignments), Notify::Update);
        if let Some(model) = pending.state.model_clauses_mut() {
            if model.scope == SoftDeleteScope::Exclude {
                model.scope = SoftDeleteScope::Only;
            }
        }
        pending.run(conn).await
    }

    // ==================== INCREMENT ====================

    /// `column = column + by` on matching rows.
    pub async fn increment<C: Connection>(&self, conn: &C, column: &str, by: i64) -> OrmResult<u64> {
        let db_column = self.config.naming.to_column(column);
        let quoted = self.compiler.identifier(&db_column);
        let expression = if by < 0 {
            format!("{quoted} - {}", by.unsigned_abs())
        } else {
            format!("{quoted} + {by}")
        };
        let mut assignments = vec![(db_column, Operand::from(Raw(expression)))];
        self.stamp_update(&mut assignments);
        self.pending("increment", Statement::Update(assignments), Notify::Update)
            .run(conn)
            .await
    }

    /// `column = column - by` on matching rows.
    pub async fn decrement<C: Connection>(&self, conn: &C, column: &str, by: i64) -> OrmResult<u64> {
        self.increment(conn, column, by.saturating_neg()).await
    }

    fn pending(&self, terminal: &'static str, statement: Statement, notify: Notify) -> PendingWrite<'_> {
        let mut state = self.state.clone();
        state.clauses.statement = Some(statement);
        PendingWrite {
            query: self,
            terminal,
            state,
            notify,
        }
    }
}

/// Observer hook a pending write reports to.
#[derive(Clone, Copy)]
enum Notify {
    Update,
    Delete,
}

/// An UPDATE/DELETE prepared by `delete`, `force_delete`, `restore` or `increment`.
struct PendingWrite<'q> {
    query: &'q Query,
    terminal: &'static str,
    state: QueryState,
    notify: Notify,
}

impl PendingWrite<'_> {
    async fn run<C: Connection>(mut self, conn: &C) -> OrmResult<u64> {
        let query = self.query;
        query.check()?;
        query.log.ensure_readable(self.terminal)?;
        query.log.ensure_writable(self.terminal)?;
        query.guard_unfiltered(self.terminal)?;
        if let Some(Statement::Update(assignments)) = &self.state.clauses.statement {
            query.validate_statement(
                &Statement::Update(assignments.clone()),
                WriteAction::Update,
            )?;
        }

        query.apply_soft_delete_scope(&mut self.state);
        let sql = query.compiler.any(&self.state)?;
        let affected = pipeline::execute(conn, query, &sql).await?.affected_rows;
        pipeline::run_observers(query, |observer, model| match self.notify {
            Notify::Update => observer.after_update(model, affected),
            Notify::Delete => observer.after_delete(model, affected),
        })?;
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_if_missing_keeps_caller_values() {
        let mut row: Assignments = vec![("id".into(), Operand::from("given"))];
        set_if_missing(&mut row, "id", || Value::from("generated"));
        set_if_missing(&mut row, "created_at", || Value::from("now"));
        assert_eq!(
            row,
            vec![
                ("id".to_string(), Operand::from("given")),
                ("created_at".to_string(), Operand::from("now")),
            ]
        );
    }
}
