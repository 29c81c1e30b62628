//! Write validation.
//!
//! A model can carry a [`SchemaValidator`] that is invoked with the final column → value
//! map of every INSERT and UPDATE row before the statement is compiled. [`SchemaModel`]
//! implements it by checking column names, required columns and value/type compatibility.

use crate::error::{OrmError, OrmResult};
use crate::row::Row;
use crate::schema::{ColumnSchema, ColumnType, SchemaModel};
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;

/// Which write a row is validated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    Insert,
    Update,
}

impl fmt::Display for WriteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriteAction::Insert => "insert",
            WriteAction::Update => "update",
        })
    }
}

/// Validation hook run before INSERT/UPDATE compilation.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, data: &Row, action: WriteAction) -> OrmResult<()>;
}

impl<F> SchemaValidator for F
where
    F: Fn(&Row, WriteAction) -> OrmResult<()> + Send + Sync,
{
    fn validate(&self, data: &Row, action: WriteAction) -> OrmResult<()> {
        self(data, action)
    }
}

impl SchemaValidator for SchemaModel {
    fn validate(&self, data: &Row, action: WriteAction) -> OrmResult<()> {
        let mut errors = Vec::new();

        for (name, value) in data {
            let Some(column) = self.get(name) else {
                errors.push(format!("unknown column `{name}`"));
                continue;
            };
            if let Err(reason) = check_value(column, value) {
                errors.push(format!("`{name}` {reason}"));
            }
        }

        if action == WriteAction::Insert {
            for (name, column) in self.columns() {
                if !column.is_optional_on_insert() && !data.contains_key(name) {
                    errors.push(format!("`{name}` is required"));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(OrmError::validation(format!(
                "{action} rejected: {}",
                errors.join("; ")
            )))
        }
    }
}

fn check_value(column: &ColumnSchema, value: &Value) -> Result<(), String> {
    if value.is_null() {
        return if column.is_not_null() && !column.is_auto_increment() {
            Err("cannot be NULL".to_string())
        } else {
            Ok(())
        };
    }

    let ok = match &column.ty {
        ColumnType::Integer | ColumnType::BigInteger => match value {
            Value::Number(n) => n.is_i64() || n.is_u64(),
            Value::String(s) => s.trim().parse::<i64>().is_ok(),
            _ => false,
        },
        ColumnType::Float | ColumnType::Decimal { .. } => match value {
            Value::Number(_) => true,
            Value::String(s) => s.trim().parse::<f64>().is_ok(),
            _ => false,
        },
        ColumnType::Boolean => match value {
            Value::Bool(_) => true,
            Value::Number(n) => matches!(n.as_u64(), Some(0 | 1)),
            Value::String(s) => matches!(s.as_str(), "0" | "1" | "true" | "false"),
            _ => false,
        },
        ColumnType::Varchar(max) => match value {
            Value::String(s) => {
                if s.chars().count() > *max as usize {
                    return Err(format!("is longer than {max} characters"));
                }
                true
            }
            _ => false,
        },
        ColumnType::Text => value.is_string(),
        ColumnType::Date => value.as_str().is_some_and(is_date),
        ColumnType::DateTime | ColumnType::Timestamp => value.as_str().is_some_and(is_datetime),
        ColumnType::Json => true,
        ColumnType::Uuid => value.as_str().is_some_and(is_uuid),
        ColumnType::Binary => value.is_string() || value.is_array(),
    };

    if ok {
        Ok(())
    } else {
        Err(format!("expects {}, got {value}", column.ty))
    }
}

pub fn is_uuid(s: &str) -> bool {
    uuid::Uuid::parse_str(s).is_ok()
}

/// `YYYY-MM-DD`.
pub fn is_date(s: &str) -> bool {
    static DATE_RE: OnceLock<Regex> = OnceLock::new();
    DATE_RE
        .get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("invalid built-in date regex"))
        .is_match(s)
}

/// `YYYY-MM-DD HH:MM[:SS[.fff]]` with an optional `T` separator and UTC offset.
pub fn is_datetime(s: &str) -> bool {
    static DATETIME_RE: OnceLock<Regex> = OnceLock::new();
    DATETIME_RE
        .get_or_init(|| {
            Regex::new(r"^\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?$")
                .expect("invalid built-in datetime regex")
        })
        .is_match(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn users() -> SchemaModel {
        SchemaModel::new()
            .column("id", ColumnSchema::increments())
            .column("name", ColumnSchema::new(ColumnType::Varchar(5)).not_null())
            .column("age", ColumnSchema::new(ColumnType::Integer))
            .column("born_on", ColumnSchema::new(ColumnType::Date))
            .column(
                "active",
                ColumnSchema::new(ColumnType::Boolean)
                    .not_null()
                    .default_value(true),
            )
    }

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn insert_requires_non_null_columns_without_default() {
        let schema = users();
        let err = schema
            .validate(&row(json!({"age": 3})), WriteAction::Insert)
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("`name` is required"));

        schema
            .validate(&row(json!({"age": 3})), WriteAction::Update)
            .unwrap();
    }

    #[test]
    fn unknown_columns_and_bad_types_are_reported_together() {
        let err = users()
            .validate(
                &row(json!({"name": "ann", "nickname": "a", "age": "x", "born_on": "2020-13"})),
                WriteAction::Insert,
            )
            .unwrap_err()
            .to_string();
        assert!(err.contains("unknown column `nickname`"));
        assert!(err.contains("`age` expects integer"));
        assert!(err.contains("`born_on` expects date"));
    }

    #[test]
    fn varchar_length_and_null_checks() {
        let schema = users();
        let err = schema
            .validate(&row(json!({"name": "abcdefg"})), WriteAction::Update)
            .unwrap_err();
        assert!(err.to_string().contains("longer than 5"));

        let err = schema
            .validate(&row(json!({"name": null})), WriteAction::Update)
            .unwrap_err();
        assert!(err.to_string().contains("cannot be NULL"));
    }

    #[test]
    fn closures_are_validators() {
        let reject_all = |_: &Row, action: WriteAction| -> OrmResult<()> {
            Err(OrmError::validation(format!("no {action}")))
        };
        assert!(reject_all.validate(&Row::new(), WriteAction::Insert).is_err());
    }

    #[test]
    fn datetime_formats() {
        assert!(is_datetime("2024-01-02 03:04:05"));
        assert!(is_datetime("2024-01-02T03:04:05.123Z"));
        assert!(is_datetime("2024-01-02T03:04:05+02:00"));
        assert!(!is_datetime("yesterday"));
        assert!(is_uuid("67e55044-10b1-426f-9247-bb680e5fe0c8"));
    }
}
