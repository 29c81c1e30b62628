//! Statement execution shared by every terminal.
//!
//! [`execute`] runs one compiled statement and, for model queries that carry schema
//! metadata, repairs a missing table or column and retries. [`finalize_rows`] and
//! [`run_observers`] are the post-processing steps applied once relations are loaded.

use crate::client::{Connection, QueryOutput};
use crate::error::{OrmError, OrmResult, SchemaMismatch};
use crate::model::{Model, ModelObserver};
use crate::qb::Query;
use crate::row::Row;
use crate::schema::{SchemaModel, parse_column_listing};

/// Execute `sql` for `query`, repairing the schema between attempts when allowed.
pub(crate) async fn execute<C: Connection>(
    conn: &C,
    query: &Query,
    sql: &str,
) -> OrmResult<QueryOutput> {
    let tag = query.state.clauses.table.as_str();
    let mut attempts = 0u32;
    loop {
        let err = match conn.query_tagged(tag, sql).await {
            Ok(output) => return Ok(output),
            Err(err) => err.with_sql(sql),
        };

        let Some(mismatch) = err.schema_mismatch() else {
            return Err(err);
        };
        let Some((model, schema)) = repairable(query) else {
            return Err(err);
        };
        if attempts >= query.config.max_repair_attempts {
            return Err(err);
        }
        attempts += 1;

        #[cfg(feature = "tracing")]
        tracing::warn!(
            table = model.table(),
            attempt = attempts,
            error = %err,
            "schema mismatch, attempting repair"
        );

        match repair(conn, query, model, schema, mismatch).await {
            Ok(true) => continue,
            Ok(false) => return Err(err),
            Err(_repair_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    table = model.table(),
                    error = %_repair_err,
                    "schema repair failed"
                );
                return Err(err);
            }
        }
    }
}

fn repairable(query: &Query) -> Option<(&Model, &SchemaModel)> {
    if !query.config.schema_repair {
        return None;
    }
    let model = query.model.as_deref()?;
    Some((model, model.schema()?))
}

/// Run the DDL that fixes `mismatch`. Returns `false` when nothing could be repaired.
async fn repair<C: Connection>(
    conn: &C,
    query: &Query,
    model: &Model,
    schema: &SchemaModel,
    mismatch: SchemaMismatch,
) -> OrmResult<bool> {
    let compiler = query.compiler();
    let table = model.table();
    let statements = match mismatch {
        SchemaMismatch::MissingTable => vec![compiler.create_table(table, schema)],
        SchemaMismatch::MissingColumn(Some(name)) if schema.contains(&name) => schema
            .get(&name)
            .map(|c| vec![compiler.add_column(table, &name, c)])
            .unwrap_or_default(),
        SchemaMismatch::MissingColumn(_) => {
            let listing = conn.query(&compiler.list_columns(table)).await?;
            let existing = parse_column_listing(&listing.rows);
            schema
                .columns()
                .filter(|(name, _)| !existing.iter().any(|e| e.eq_ignore_ascii_case(name)))
                .map(|(name, column)| compiler.add_column(table, name, column))
                .collect()
        }
    };
    if statements.is_empty() {
        return Ok(false);
    }
    for ddl in &statements {
        #[cfg(feature = "tracing")]
        tracing::info!(table, sql = %ddl, "running schema repair");
        conn.query(ddl).await.map_err(|e| e.with_sql(ddl))?;
    }
    Ok(true)
}

/// Strip hidden columns and translate column names to client field names.
pub(crate) fn finalize_rows(query: &Query, rows: &mut Vec<Row>) {
    let hidden = query.model.as_deref().map(Model::hidden).unwrap_or_default();
    let naming = query.config.naming;
    for row in rows.iter_mut() {
        let taken = std::mem::take(row);
        *row = taken
            .into_iter()
            .filter(|(column, _)| !hidden.iter().any(|h| h == column))
            .map(|(column, value)| (naming.to_field(&column), value))
            .collect();
    }
}

/// Call `hook` on every observer of the query's model.
pub(crate) fn run_observers<F>(query: &Query, hook: F) -> OrmResult<()>
where
    F: Fn(&dyn ModelObserver, &Model) -> OrmResult<()>,
{
    let Some(model) = query.model.as_deref() else {
        return Ok(());
    };
    for observer in model.observers() {
        hook(observer.as_ref(), model).map_err(|err| match err {
            OrmError::Observer(_) => err,
            other => OrmError::Observer(format!("{}: {other}", model.name())),
        })?;
    }
    Ok(())
}
