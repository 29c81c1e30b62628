//! # chainorm
//!
//! A chainable, dialect-agnostic ORM query builder.
//!
//! ## Features
//!
//! - **One builder, four dialects**: PostgreSQL, MySQL/MariaDB, SQLite and SQL Server share
//!   one clause model; only the statement compiler differs
//! - **Batched relations**: `with("posts.comments")` loads each relation level with one
//!   `IN (...)` query, however many parent rows there are
//! - **Model awareness**: soft deletes, timestamps, UUID keys, hidden columns, validation
//!   and observers come from a registered model definition
//! - **Schema repair**: a missing table or column is created from schema metadata and the
//!   statement retried
//! - **Safe defaults**: UPDATE/DELETE require WHERE unless `allow_unfiltered()` is called
//! - **Query monitoring**: timing, logging, hooks and timeouts through
//!   [`monitor::InstrumentedConnection`]
//!
//! ## Quick start
//!
//! ```ignore
//! use chainorm::prelude::*;
//!
//! let registry = Registry::builder()
//!     .register(
//!         ModelDef::new("user")
//!             .table("users")
//!             .soft_deletes("deleted_at")
//!             .has_many("posts", "post"),
//!     )
//!     .register(ModelDef::new("post").table("posts"))
//!     .build()?;
//! let db = Db::new(Dialect::Postgres).with_registry(registry);
//!
//! // SELECT * FROM users WHERE users.deleted_at IS NULL AND users.age > 18 LIMIT 10
//! // SELECT * FROM posts WHERE posts.user_id IN (...)
//! let users = db
//!     .model("user")?
//!     .where_op("age", ">", 18)
//!     .with("posts")
//!     .limit(10)
//!     .get(&conn)
//!     .await?;
//!
//! let page = db.table("posts").order_by_desc("id").paginate(&conn, 2, 20).await?;
//! ```

pub mod client;
pub mod condition;
pub mod config;
pub mod db;
pub mod dialect;
mod eager;
pub mod error;
pub mod ident;
pub mod model;
pub mod monitor;
pub mod naming;
mod pipeline;
pub mod prelude;
pub mod qb;
pub mod row;
pub mod schema;
pub mod state;
pub mod transaction;
pub mod validate;
pub mod value;

pub use client::{Connection, QueryOutput};
pub use condition::{Condition, Connector, Operator};
pub use config::OrmConfig;
pub use db::Db;
pub use dialect::{Dialect, InsertResult, StatementCompiler};
pub use error::{OrmError, OrmResult};
pub use ident::Ident;
pub use model::{
    Model, ModelDef, ModelObserver, Pivot, Registry, RegistryBuilder, Relation, RelationDescriptor,
    RelationKind,
};
pub use monitor::{
    CompositeHook, CompositeMonitor, HookAction, InstrumentedConnection, LoggingMonitor,
    MonitorConfig, NoopMonitor, QueryContext, QueryHook, QueryMonitor, QueryResult, QueryStats,
    QueryType, StatsMonitor,
};
pub use naming::NamingPattern;
pub use qb::{Page, PaginationMeta, Query, RelationRequest, RelationVariant, WriteResult};
pub use row::{FromRow, Row, RowExt};
pub use schema::{ColumnAttribute, ColumnSchema, ColumnType, SchemaModel, SchemaProvider};
pub use state::{SoftDeleteScope, StateKey, StateValue};
pub use validate::{SchemaValidator, WriteAction};
pub use value::{Operand, Raw, raw};

#[cfg(feature = "tracing")]
pub use monitor::TracingSqlHook;
