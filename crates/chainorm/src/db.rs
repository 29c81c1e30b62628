//! The `Db` handle: dialect, configuration and model registry shared by every builder.

use crate::client::{Connection, QueryOutput};
use crate::config::OrmConfig;
use crate::dialect::{Dialect, StatementCompiler};
use crate::error::{OrmError, OrmResult};
use crate::model::Registry;
use crate::qb::Query;
use crate::schema::parse_column_listing;
use std::sync::Arc;

/// Entry point for building queries.
///
/// Cloning is cheap; every clone shares the same compiler, configuration and registry.
///
/// ```ignore
/// let db = Db::new(Dialect::Postgres)
///     .with_config(OrmConfig::new().with_naming(NamingPattern::SnakeCase))
///     .with_registry(registry);
///
/// let rows = db.table("audit_log").where_("level", "error").get(&conn).await?;
/// let users = db.model("user")?.with("posts").get(&conn).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Db {
    compiler: Arc<dyn StatementCompiler>,
    config: Arc<OrmConfig>,
    registry: Arc<Registry>,
}

impl Db {
    pub fn new(dialect: Dialect) -> Self {
        Self::with_compiler(dialect.compiler())
    }

    /// Use a custom statement compiler.
    pub fn with_compiler(compiler: Arc<dyn StatementCompiler>) -> Self {
        Self {
            compiler,
            config: Arc::new(OrmConfig::default()),
            registry: Arc::new(Registry::default()),
        }
    }

    pub fn with_config(mut self, config: OrmConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.compiler.dialect()
    }

    pub fn compiler(&self) -> &dyn StatementCompiler {
        self.compiler.as_ref()
    }

    pub fn config(&self) -> &OrmConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// A plain query against `table`.
    pub fn table(&self, table: impl Into<String>) -> Query {
        Query::for_table(
            self.compiler.clone(),
            self.config.clone(),
            self.registry.clone(),
            table,
        )
    }

    /// A query against the model registered as `name`.
    pub fn model(&self, name: &str) -> OrmResult<Query> {
        let model = self.registry.model(name)?.clone();
        Ok(Query::for_model(
            self.compiler.clone(),
            self.config.clone(),
            self.registry.clone(),
            model,
        ))
    }

    // ==================== SCHEMA ====================

    /// `CREATE TABLE IF NOT EXISTS` from the model's schema metadata.
    pub async fn create_table<C: Connection>(&self, conn: &C, model: &str) -> OrmResult<()> {
        let model = self.registry.model(model)?;
        let schema = model.schema().ok_or_else(|| {
            OrmError::configuration(format!("model `{}` has no schema", model.name()))
        })?;
        self.raw(conn, &self.compiler.create_table(model.table(), schema))
            .await
            .map(|_| ())
    }

    pub async fn drop_table<C: Connection>(&self, conn: &C, table: &str) -> OrmResult<()> {
        self.raw(conn, &self.compiler.drop_table(table)).await.map(|_| ())
    }

    pub async fn truncate<C: Connection>(&self, conn: &C, table: &str) -> OrmResult<()> {
        self.raw(conn, &self.compiler.truncate(table)).await.map(|_| ())
    }

    pub async fn table_exists<C: Connection>(&self, conn: &C, table: &str) -> OrmResult<bool> {
        let output = self.raw(conn, &self.compiler.table_exists(table)).await?;
        Ok(!output.rows.is_empty())
    }

    pub async fn list_tables<C: Connection>(&self, conn: &C) -> OrmResult<Vec<String>> {
        let output = self.raw(conn, &self.compiler.list_tables()).await?;
        Ok(parse_column_listing(&output.rows))
    }

    /// Column names of `table`, in ordinal order.
    pub async fn list_columns<C: Connection>(&self, conn: &C, table: &str) -> OrmResult<Vec<String>> {
        let output = self.raw(conn, &self.compiler.list_columns(table)).await?;
        Ok(parse_column_listing(&output.rows))
    }

    /// Run caller-owned SQL as is.
    pub async fn raw<C: Connection>(&self, conn: &C, sql: &str) -> OrmResult<QueryOutput> {
        conn.query(sql).await.map_err(|e| e.with_sql(sql))
    }
}
