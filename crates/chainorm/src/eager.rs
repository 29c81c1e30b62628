//! Eager loading (batch preloading for relations).
//!
//! Every requested relation costs one extra query per nesting level, however many parent
//! rows there are: the distinct join keys of the parents are collected, the children are
//! fetched with a single `IN (...)` query (two for belongsToMany: pivot rows, then
//! targets) and spliced back into each parent under the relation name.
//!
//! - hasOne / belongsTo: the child object or `null`
//! - hasMany / belongsToMany: an array, empty when there are no children
//! - count variant: a number, from one `GROUP BY` query
//!
//! Existence variants never reach this module; they are compiled into the parent's WHERE.

use crate::client::Connection;
use crate::condition::{Operator, and_over_all, render_predicate};
use crate::error::{OrmError, OrmResult};
use crate::model::{Pivot, Relation, RelationKind};
use crate::pipeline;
use crate::qb::{Query, RelationRequest, RelationVariant};
use crate::row::Row;
use crate::value::{Operand, join_key, value_as_u64};
use futures_core::future::BoxFuture;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Load every non-existence request into `rows`, recursing into nested requests.
///
/// `rows` still carry database column names; the caller finalizes them afterwards.
pub(crate) fn load_relations<'a, C: Connection>(
    conn: &'a C,
    owner: &'a Query,
    rows: &'a mut [Row],
    requests: &'a [RelationRequest],
) -> BoxFuture<'a, OrmResult<()>> {
    Box::pin(async move {
        for request in requests.iter().filter(|r| !r.variant().is_existence()) {
            load_relation(conn, owner, rows, request).await?;
        }
        Ok(())
    })
}

async fn load_relation<C: Connection>(
    conn: &C,
    owner: &Query,
    rows: &mut [Row],
    request: &RelationRequest,
) -> OrmResult<()> {
    let model = owner
        .model()
        .ok_or_else(|| OrmError::configuration("relations can only be loaded on model queries"))?;
    let relation = model.relation(request.name()).ok_or_else(|| {
        OrmError::configuration(format!(
            "model `{}` has no relation `{}`",
            model.name(),
            request.name()
        ))
    })?;

    let keys = distinct_keys(rows.iter().map(|row| row.get(&relation.local_key)));
    if keys.is_empty() {
        splice_empty(rows, relation, request.variant());
        return Ok(());
    }

    let target = request.narrow_query(owner.related(&relation.target)?);
    target.check()?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        relation = %relation.name,
        kind = %relation.kind,
        parents = rows.len(),
        keys = keys.len(),
        "loading relation batch"
    );

    match (relation.kind, request.variant()) {
        (RelationKind::BelongsToMany, RelationVariant::Count) => {
            count_through_pivot(conn, owner, rows, relation, target, keys).await
        }
        (RelationKind::BelongsToMany, _) => {
            load_through_pivot(conn, owner, rows, relation, request, target, keys).await
        }
        (_, RelationVariant::Count) => count_direct(conn, rows, relation, target, keys).await,
        _ => load_direct(conn, rows, relation, request, target, keys).await,
    }
}

// ==================== DIRECT RELATIONS ====================

async fn load_direct<C: Connection>(
    conn: &C,
    rows: &mut [Row],
    relation: &Relation,
    request: &RelationRequest,
    target: Query,
    keys: Vec<Value>,
) -> OrmResult<()> {
    let mut target = target;
    constrain_in(&mut target, &relation.foreign_key, keys)?;
    ensure_selected(&mut target, &relation.foreign_key);

    let mut children = target.fetch(conn).await?;
    let index = index_children(conn, &target, &mut children, request, &relation.foreign_key).await?;

    for row in rows.iter_mut() {
        let key = row.get(&relation.local_key).and_then(join_key);
        let group = key.as_ref().and_then(|k| index.get(k));
        row.insert(relation.name.clone(), splice_value(relation.kind, group));
    }
    Ok(())
}

async fn count_direct<C: Connection>(
    conn: &C,
    rows: &mut [Row],
    relation: &Relation,
    target: Query,
    keys: Vec<Value>,
) -> OrmResult<()> {
    let mut target = target;
    constrain_in(&mut target, &relation.foreign_key, keys)?;
    let group_column = target.qualify(&relation.foreign_key);
    let counts = fetch_counts(conn, target, group_column, &relation.foreign_key).await?;

    for row in rows.iter_mut() {
        let count = row
            .get(&relation.local_key)
            .and_then(join_key)
            .and_then(|k| counts.get(&k).copied())
            .unwrap_or(0);
        row.insert(relation.name.clone(), Value::from(count));
    }
    Ok(())
}

// ==================== PIVOT RELATIONS ====================

async fn load_through_pivot<C: Connection>(
    conn: &C,
    owner: &Query,
    rows: &mut [Row],
    relation: &Relation,
    request: &RelationRequest,
    target: Query,
    keys: Vec<Value>,
) -> OrmResult<()> {
    let pivot = pivot_of(relation)?;
    let table = resolve_pivot(conn, owner, pivot).await?;

    let mut links_query = owner.sibling_table(table);
    constrain_in(&mut links_query, &pivot.owner_key, keys)?;
    links_query.state.clauses.columns = vec![
        links_query.qualify(&pivot.owner_key),
        links_query.qualify(&pivot.target_key),
    ];
    let link_rows = links_query.fetch(conn).await?;
    let links: Vec<(String, String)> = link_rows
        .iter()
        .filter_map(|link| {
            let owner_key = link.get(&pivot.owner_key).and_then(join_key)?;
            let target_key = link.get(&pivot.target_key).and_then(join_key)?;
            Some((owner_key, target_key))
        })
        .collect();

    let target_keys = distinct_keys(link_rows.iter().map(|link| link.get(&pivot.target_key)));
    if target_keys.is_empty() {
        splice_empty(rows, relation, request.variant());
        return Ok(());
    }

    let mut target = target;
    constrain_in(&mut target, &relation.foreign_key, target_keys)?;
    ensure_selected(&mut target, &relation.foreign_key);
    let mut children = target.fetch(conn).await?;
    let index = index_children(conn, &target, &mut children, request, &relation.foreign_key).await?;

    let mut grouped: HashMap<&str, Vec<Row>> = HashMap::new();
    for (owner_key, target_key) in &links {
        if let Some(child) = index.get(target_key).and_then(|c| c.first()) {
            grouped.entry(owner_key.as_str()).or_default().push(child.clone());
        }
    }

    for row in rows.iter_mut() {
        let key = row.get(&relation.local_key).and_then(join_key);
        let group = key.as_deref().and_then(|k| grouped.get(k));
        row.insert(relation.name.clone(), splice_value(relation.kind, group));
    }
    Ok(())
}

async fn count_through_pivot<C: Connection>(
    conn: &C,
    owner: &Query,
    rows: &mut [Row],
    relation: &Relation,
    target: Query,
    keys: Vec<Value>,
) -> OrmResult<()> {
    let pivot = pivot_of(relation)?;
    let table = resolve_pivot(conn, owner, pivot).await?;
    let compiler = owner.compiler();

    let mut target = target;
    let pivot_owner = compiler.identifier(&format!("{table}.{}", pivot.owner_key));
    let pivot_target = compiler.identifier(&format!("{table}.{}", pivot.target_key));
    target.state.clauses.joins.push(format!(
        "INNER JOIN {} ON {pivot_target} = {}",
        compiler.identifier(table),
        target.qualify(&relation.foreign_key)
    ));
    let predicate = render_predicate(
        compiler,
        &pivot_owner,
        Operator::In,
        &Operand::Value(Value::Array(keys)),
    )?;
    and_over_all(&mut target.state.clauses.wheres, predicate);
    let counts = fetch_counts(conn, target, pivot_owner, &pivot.owner_key).await?;

    for row in rows.iter_mut() {
        let count = row
            .get(&relation.local_key)
            .and_then(join_key)
            .and_then(|k| counts.get(&k).copied())
            .unwrap_or(0);
        row.insert(relation.name.clone(), Value::from(count));
    }
    Ok(())
}

fn pivot_of(relation: &Relation) -> OrmResult<&Pivot> {
    relation.pivot.as_ref().ok_or_else(|| {
        OrmError::configuration(format!("relation `{}` has no pivot table", relation.name))
    })
}

/// Pick the pivot table, probing each candidate once and caching the first that exists.
///
/// When no candidate exists the first one is used uncached, so the query fails with the
/// database's own error.
async fn resolve_pivot<'p, C: Connection>(
    conn: &C,
    owner: &Query,
    pivot: &'p Pivot,
) -> OrmResult<&'p str> {
    if let Some(table) = pivot.resolved() {
        return Ok(table);
    }
    for candidate in pivot.candidates() {
        let probe = owner.compiler().table_exists(candidate);
        let found = conn.query(&probe).await.map_err(|e| e.with_sql(&probe))?;
        if !found.rows.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::debug!(pivot = %candidate, "resolved pivot table");
            return Ok(pivot.resolve(candidate));
        }
    }
    Ok(pivot.table())
}

/// Resolve the pivots that existence requests compile against, before the parent SQL is
/// rendered. Narrowed sub-queries are walked too, since their own existence requests end
/// up in the same statement.
pub(crate) fn resolve_existence_pivots<'a, C: Connection>(
    conn: &'a C,
    owner: &'a Query,
) -> BoxFuture<'a, OrmResult<()>> {
    Box::pin(async move {
        let Some(model) = owner.model() else {
            return Ok(());
        };
        for request in owner.relations.iter().filter(|r| r.variant().is_existence()) {
            // unknown names are reported when the predicates are compiled
            let Some(relation) = model.relation(request.name()) else {
                continue;
            };
            if let Some(pivot) = &relation.pivot {
                resolve_pivot(conn, owner, pivot).await?;
            }
            let sub = request.narrow_query(owner.related(&relation.target)?);
            resolve_existence_pivots(conn, &sub).await?;
        }
        Ok(())
    })
}

// ==================== HELPERS ====================

/// Distinct, non-null join keys in first-seen order.
fn distinct_keys<'v>(values: impl Iterator<Item = Option<&'v Value>>) -> Vec<Value> {
    let mut seen = HashSet::new();
    values
        .flatten()
        .filter(|v| join_key(v).is_some_and(|k| seen.insert(k)))
        .cloned()
        .collect()
}

/// AND `column IN (keys)` over the whole WHERE of `query`, without naming translation.
fn constrain_in(query: &mut Query, column: &str, keys: Vec<Value>) -> OrmResult<()> {
    let column = query.qualify(column);
    let predicate = render_predicate(
        query.compiler(),
        &column,
        Operator::In,
        &Operand::Value(Value::Array(keys)),
    )?;
    and_over_all(&mut query.state.clauses.wheres, predicate);
    Ok(())
}

/// Make sure an explicit column list still returns the join column.
fn ensure_selected(query: &mut Query, column: &str) {
    if query.state.clauses.columns.is_empty() {
        return;
    }
    let qualified = query.qualify(column);
    if !query.state.clauses.columns.contains(&qualified) {
        query.state.clauses.columns.push(qualified);
    }
}

/// Load nested relations on `children`, then finalize them and group them by join key.
async fn index_children<C: Connection>(
    conn: &C,
    target: &Query,
    children: &mut Vec<Row>,
    request: &RelationRequest,
    key_column: &str,
) -> OrmResult<HashMap<String, Vec<Row>>> {
    if !children.is_empty() {
        load_relations(conn, target, children, request.nested()).await?;
    }
    let keys: Vec<Option<String>> = children
        .iter()
        .map(|child| child.get(key_column).and_then(join_key))
        .collect();
    pipeline::finalize_rows(target, children);

    let mut index: HashMap<String, Vec<Row>> = HashMap::new();
    for (key, child) in keys.into_iter().zip(children.drain(..)) {
        if let Some(key) = key {
            index.entry(key).or_default().push(child);
        }
    }
    Ok(index)
}

/// Run `target` as `SELECT group_column, COUNT(*) AS aggregate ... GROUP BY group_column`.
async fn fetch_counts<C: Connection>(
    conn: &C,
    mut target: Query,
    group_column: String,
    key_column: &str,
) -> OrmResult<HashMap<String, u64>> {
    let clauses = &mut target.state.clauses;
    clauses.columns = vec![group_column.clone(), "COUNT(*) AS aggregate".to_string()];
    clauses.group_by = vec![group_column];
    clauses.order_by.clear();
    clauses.limit = None;
    clauses.offset = None;

    let rows = target.fetch(conn).await?;
    Ok(rows
        .iter()
        .filter_map(|row| {
            let key = row.get(key_column).and_then(join_key)?;
            let count = row.get("aggregate").and_then(value_as_u64)?;
            Some((key, count))
        })
        .collect())
}

fn splice_value(kind: RelationKind, group: Option<&Vec<Row>>) -> Value {
    if kind.is_collection() {
        let children = group.map(|g| g.iter().cloned().map(Value::Object).collect());
        Value::Array(children.unwrap_or_default())
    } else {
        group
            .and_then(|g| g.first())
            .map_or(Value::Null, |child| Value::Object(child.clone()))
    }
}

fn splice_empty(rows: &mut [Row], relation: &Relation, variant: RelationVariant) {
    let empty = match variant {
        RelationVariant::Count => Value::from(0u64),
        _ => splice_value(relation.kind, None),
    };
    for row in rows.iter_mut() {
        row.insert(relation.name.clone(), empty.clone());
    }
}
