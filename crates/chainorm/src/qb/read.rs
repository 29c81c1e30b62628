use super::Query;
use crate::client::Connection;
use crate::eager;
use crate::error::{OrmError, OrmResult};
use crate::pipeline;
use crate::row::{FromRow, Row};
use crate::value::{Operand, value_as_u64};
use serde::Serialize;
use serde_json::Value;

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub meta: PaginationMeta,
}

/// Pagination metadata, computed once per `paginate` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub total: u64,
    pub limit: u64,
    pub current_page: u64,
    pub last_page: u64,
    pub next_page: u64,
    pub prev_page: u64,
}

impl PaginationMeta {
    pub fn new(total: u64, limit: u64, current_page: u64) -> Self {
        let limit = limit.max(1);
        Self {
            total,
            limit,
            current_page,
            last_page: total.div_ceil(limit),
            next_page: current_page.saturating_add(1),
            prev_page: current_page.saturating_sub(1),
        }
    }
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

impl Query {
    /// Compile and run the SELECT without relation loading or post-processing.
    pub(crate) async fn fetch<C: Connection>(&self, conn: &C) -> OrmResult<Vec<Row>> {
        self.check()?;
        eager::resolve_existence_pivots(conn, self).await?;
        let state = self.prepared_state()?;
        let sql = self.compiler.select(&state)?;
        Ok(pipeline::execute(conn, self, &sql).await?.rows)
    }

    /// Fetch rows, load requested relations, strip hidden columns and run observers.
    pub async fn get<C: Connection>(&self, conn: &C) -> OrmResult<Vec<Row>> {
        self.log.ensure_readable("get")?;
        let mut rows = self.fetch(conn).await?;
        if rows.is_empty() {
            return Ok(rows);
        }
        eager::load_relations(conn, self, &mut rows, &self.relations).await?;
        pipeline::finalize_rows(self, &mut rows);
        pipeline::run_observers(self, |observer, model| observer.after_read(model, &rows))?;
        Ok(rows)
    }

    /// Like [`Query::get`], deserializing every row into `T`.
    pub async fn get_as<T: FromRow, C: Connection>(&self, conn: &C) -> OrmResult<Vec<T>> {
        self.get(conn).await?.into_iter().map(T::from_row).collect()
    }

    /// The first matching row, if any.
    pub async fn first<C: Connection>(&self, conn: &C) -> OrmResult<Option<Row>> {
        self.log.ensure_readable("first")?;
        let rows = self.clone().limit(1).get(conn).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn first_as<T: FromRow, C: Connection>(&self, conn: &C) -> OrmResult<Option<T>> {
        self.first(conn).await?.map(T::from_row).transpose()
    }

    /// The first matching row, or [`OrmError::NotFound`].
    pub async fn first_or_fail<C: Connection>(&self, conn: &C) -> OrmResult<Row> {
        self.first(conn).await?.ok_or_else(|| {
            OrmError::not_found(format!("no rows in `{}`", self.state.clauses.table))
        })
    }

    fn by_primary_key(&self, id: Operand) -> OrmResult<Query> {
        let pk = match self.model.as_deref() {
            Some(model) => model.primary_key().to_string(),
            None => "id".to_string(),
        };
        let query = self.clone().where_(&pk, id);
        query.check()?;
        Ok(query)
    }

    /// Look up one row by primary key.
    pub async fn find<C: Connection>(
        &self,
        conn: &C,
        id: impl Into<Operand>,
    ) -> OrmResult<Option<Row>> {
        self.log.ensure_readable("find")?;
        self.by_primary_key(id.into())?.first(conn).await
    }

    pub async fn find_or_fail<C: Connection>(
        &self,
        conn: &C,
        id: impl Into<Operand>,
    ) -> OrmResult<Row> {
        let id = id.into();
        let label = match &id {
            Operand::Value(v) => v.to_string(),
            Operand::Raw(sql) => sql.clone(),
        };
        self.find(conn, id).await?.ok_or_else(|| {
            OrmError::not_found(format!(
                "no row in `{}` with key {label}",
                self.state.clauses.table
            ))
        })
    }

    /// `COUNT(*)` over the same FROM/JOIN/WHERE subset.
    pub async fn count<C: Connection>(&self, conn: &C) -> OrmResult<u64> {
        self.log.ensure_readable("count")?;
        self.check()?;
        eager::resolve_existence_pivots(conn, self).await?;
        let state = self.prepared_state()?;
        let sql = self.compiler.count(&state)?;
        let output = pipeline::execute(conn, self, &sql).await?;
        Ok(output
            .rows
            .first()
            .and_then(|row| row.get("aggregate"))
            .and_then(value_as_u64)
            .unwrap_or(0))
    }

    pub async fn exists<C: Connection>(&self, conn: &C) -> OrmResult<bool> {
        self.log.ensure_readable("exists")?;
        let probe = self.clone().select_raw_only("1").limit(1);
        Ok(!probe.fetch(conn).await?.is_empty())
    }

    /// Values of one column, in row order.
    pub async fn pluck<C: Connection>(&self, conn: &C, column: &str) -> OrmResult<Vec<Value>> {
        self.log.ensure_readable("pluck")?;
        let db_column = self.config.naming.to_column(column);
        let key = db_column.rsplit('.').next().unwrap_or(&db_column).to_string();
        let rows = self.clone().select([column]).fetch(conn).await?;
        Ok(rows
            .into_iter()
            .map(|mut row| row.remove(&key).unwrap_or(Value::Null))
            .collect())
    }

    /// One page of rows plus pagination metadata.
    ///
    /// `page` starts at 1 (`0` is treated as 1); a `limit` of 0 uses the configured
    /// default page size. The COUNT runs first and the data query is skipped when it is 0.
    pub async fn paginate<C: Connection>(
        &self,
        conn: &C,
        page: u64,
        limit: u64,
    ) -> OrmResult<Page<Row>> {
        self.log.ensure_readable("paginate")?;
        let page = page.max(1);
        let limit = if limit == 0 {
            self.config.default_per_page
        } else {
            limit
        };

        let total = self.count(conn).await?;
        let meta = PaginationMeta::new(total, limit, page);
        let data = if total == 0 {
            Vec::new()
        } else {
            self.clone().page(page, meta.limit).get(conn).await?
        };
        Ok(Page { data, meta })
    }

    pub async fn paginate_as<T: FromRow, C: Connection>(
        &self,
        conn: &C,
        page: u64,
        limit: u64,
    ) -> OrmResult<Page<T>> {
        let page = self.paginate(conn, page, limit).await?;
        let data = page
            .data
            .into_iter()
            .map(T::from_row)
            .collect::<OrmResult<Vec<_>>>()?;
        Ok(Page {
            data,
            meta: page.meta,
        })
    }

    fn select_raw_only(mut self, expression: &str) -> Self {
        self.state.clauses.columns = vec![expression.to_string()];
        self
    }
}
