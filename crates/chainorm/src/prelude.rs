//! Convenient imports for typical `chainorm` usage.
//!
//! ```ignore
//! use chainorm::prelude::*;
//! ```

pub use crate::{
    ColumnSchema, ColumnType, Connection, Db, Dialect, FromRow, ModelDef, NamingPattern,
    OrmConfig, OrmError, OrmResult, Query, Registry, Row, RowExt, SchemaModel, raw,
};
