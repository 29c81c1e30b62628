//! Schema metadata attached to models.
//!
//! A [`SchemaModel`] lists a table's columns in declaration order. The pipeline uses it
//! to pick default select columns, to validate writes, and to synthesize `CREATE TABLE` /
//! `ALTER TABLE ... ADD` statements when the database reports a missing table or column.

use crate::error::OrmError;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Logical column type, mapped to a concrete type per dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    BigInteger,
    Float,
    Decimal { precision: u8, scale: u8 },
    Boolean,
    Varchar(u32),
    Text,
    Date,
    DateTime,
    Timestamp,
    Json,
    Uuid,
    Binary,
}

impl ColumnType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::Integer | ColumnType::BigInteger | ColumnType::Float | ColumnType::Decimal { .. }
        )
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::BigInteger)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Integer => f.write_str("integer"),
            ColumnType::BigInteger => f.write_str("bigint"),
            ColumnType::Float => f.write_str("float"),
            ColumnType::Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
            ColumnType::Boolean => f.write_str("boolean"),
            ColumnType::Varchar(len) => write!(f, "varchar({len})"),
            ColumnType::Text => f.write_str("text"),
            ColumnType::Date => f.write_str("date"),
            ColumnType::DateTime => f.write_str("datetime"),
            ColumnType::Timestamp => f.write_str("timestamp"),
            ColumnType::Json => f.write_str("json"),
            ColumnType::Uuid => f.write_str("uuid"),
            ColumnType::Binary => f.write_str("binary"),
        }
    }
}

impl FromStr for ColumnType {
    type Err = OrmError;

    /// Parse a type name as reported by introspection (`varchar(255)`, `int`, `jsonb`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let (name, args) = match lower.split_once('(') {
            Some((name, rest)) => (name.trim(), rest.trim_end_matches(')').trim()),
            None => (lower.as_str(), ""),
        };
        let nums: Vec<u32> = args
            .split(',')
            .filter_map(|a| a.trim().parse().ok())
            .collect();

        let ty = match name {
            "int" | "integer" | "int4" | "smallint" | "tinyint" | "mediumint" | "serial" => {
                if name == "tinyint" && nums.first() == Some(&1) {
                    ColumnType::Boolean
                } else {
                    ColumnType::Integer
                }
            }
            "bigint" | "int8" | "bigserial" => ColumnType::BigInteger,
            "float" | "double" | "double precision" | "real" | "float8" | "float4" => {
                ColumnType::Float
            }
            "decimal" | "numeric" => ColumnType::Decimal {
                precision: nums.first().copied().unwrap_or(10).min(255) as u8,
                scale: nums.get(1).copied().unwrap_or(0).min(255) as u8,
            },
            "bool" | "boolean" | "bit" => ColumnType::Boolean,
            "varchar" | "character varying" | "nvarchar" | "char" | "nchar" | "character" => {
                ColumnType::Varchar(nums.first().copied().unwrap_or(255))
            }
            "text" | "longtext" | "mediumtext" | "tinytext" | "ntext" | "clob" => ColumnType::Text,
            "date" => ColumnType::Date,
            "datetime" | "datetime2" | "timestamp without time zone" => ColumnType::DateTime,
            "timestamp" | "timestamptz" | "timestamp with time zone" | "datetimeoffset" => {
                ColumnType::Timestamp
            }
            "json" | "jsonb" => ColumnType::Json,
            "uuid" | "uniqueidentifier" => ColumnType::Uuid,
            "blob" | "bytea" | "binary" | "varbinary" | "longblob" => ColumnType::Binary,
            other => {
                return Err(OrmError::configuration(format!(
                    "unknown column type `{other}`"
                )));
            }
        };
        Ok(ty)
    }
}

/// Column attribute flags.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnAttribute {
    PrimaryKey,
    AutoIncrement,
    NotNull,
    Unique,
    Default(Value),
}

/// Foreign-key target of a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
    /// Referential action (`CASCADE`, `SET NULL`, ...).
    pub on_delete: Option<String>,
}

/// One column's metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    pub ty: ColumnType,
    pub attributes: Vec<ColumnAttribute>,
    pub foreign_key: Option<ForeignKeyRef>,
}

impl ColumnSchema {
    pub fn new(ty: ColumnType) -> Self {
        Self {
            ty,
            attributes: Vec::new(),
            foreign_key: None,
        }
    }

    /// Auto-incrementing integer primary key.
    pub fn increments() -> Self {
        Self::new(ColumnType::BigInteger)
            .primary_key()
            .auto_increment()
    }

    pub fn primary_key(mut self) -> Self {
        self.attributes.push(ColumnAttribute::PrimaryKey);
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.attributes.push(ColumnAttribute::AutoIncrement);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.attributes.push(ColumnAttribute::NotNull);
        self
    }

    pub fn unique(mut self) -> Self {
        self.attributes.push(ColumnAttribute::Unique);
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.attributes.push(ColumnAttribute::Default(value.into()));
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = Some(ForeignKeyRef {
            table: table.into(),
            column: column.into(),
            on_delete: None,
        });
        self
    }

    /// Set the `ON DELETE` action of the foreign key declared with [`Self::references`].
    pub fn on_delete(mut self, action: impl Into<String>) -> Self {
        if let Some(fk) = &mut self.foreign_key {
            fk.on_delete = Some(action.into());
        }
        self
    }

    pub fn is_primary_key(&self) -> bool {
        self.attributes.contains(&ColumnAttribute::PrimaryKey)
    }

    pub fn is_auto_increment(&self) -> bool {
        self.attributes.contains(&ColumnAttribute::AutoIncrement)
    }

    pub fn is_not_null(&self) -> bool {
        self.attributes.contains(&ColumnAttribute::NotNull)
    }

    pub fn is_unique(&self) -> bool {
        self.attributes.contains(&ColumnAttribute::Unique)
    }

    pub fn column_default(&self) -> Option<&Value> {
        self.attributes.iter().find_map(|a| match a {
            ColumnAttribute::Default(v) => Some(v),
            _ => None,
        })
    }

    /// `true` when an insert may omit this column.
    pub fn is_optional_on_insert(&self) -> bool {
        !self.is_not_null() || self.is_auto_increment() || self.column_default().is_some()
    }
}

/// Ordered column metadata of one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaModel {
    columns: Vec<(String, ColumnSchema)>,
}

impl SchemaModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a column.
    pub fn column(mut self, name: impl Into<String>, column: ColumnSchema) -> Self {
        let name = name.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = column,
            None => self.columns.push((name, column)),
        }
        self
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &ColumnSchema)> {
        self.columns.iter().map(|(n, c)| (n.as_str(), c))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|(_, c)| c.is_primary_key())
            .map(|(n, _)| n.as_str())
    }
}

/// Source of schema metadata for a table.
pub trait SchemaProvider: Send + Sync {
    fn schema_model(&self) -> Option<&SchemaModel>;
}

impl SchemaProvider for SchemaModel {
    fn schema_model(&self) -> Option<&SchemaModel> {
        Some(self)
    }
}

/// Parse `(name, type)` pairs returned by a dialect's column listing.
pub(crate) fn parse_column_listing(rows: &[crate::row::Row]) -> Vec<String> {
    rows.iter()
        .filter_map(|row| {
            row.get("name")
                .or_else(|| row.get("NAME"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .collect()
}
