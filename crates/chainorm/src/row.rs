//! Row mapping traits and utilities

use crate::error::{OrmError, OrmResult};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A loosely-typed result row: column (or relation) name → value.
///
/// Relation loading adds one key per requested relation, holding an object or `null`
/// for single relations and an array for collections.
pub type Row = serde_json::Map<String, Value>;

/// Trait for converting a result row into a Rust type.
///
/// Implemented for every `serde::de::DeserializeOwned` type, so `#[derive(Deserialize)]`
/// is all a struct needs.
///
/// # Example
///
/// ```ignore
/// #[derive(serde::Deserialize)]
/// struct User {
///     id: i64,
///     username: String,
///     posts: Vec<Post>,
/// }
///
/// let users: Vec<User> = db.model("User")?.with("posts").get_as(&conn).await?;
/// ```
pub trait FromRow: Sized {
    /// Convert a result row into Self
    fn from_row(row: Row) -> OrmResult<Self>;
}

impl<T: DeserializeOwned> FromRow for T {
    fn from_row(row: Row) -> OrmResult<Self> {
        serde_json::from_value(Value::Object(row)).map_err(OrmError::from)
    }
}

/// Extension trait for Row to provide typed access
pub trait RowExt {
    /// Try to get a column value, returning `OrmError::Serialization` on failure
    fn try_get_column<T: DeserializeOwned>(&self, column: &str) -> OrmResult<T>;
}

impl RowExt for Row {
    fn try_get_column<T: DeserializeOwned>(&self, column: &str) -> OrmResult<T> {
        let value = self.get(column).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value)
            .map_err(|e| OrmError::Serialization(format!("column '{column}': {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Post {
        id: i64,
        title: String,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: i64,
        posts: Vec<Post>,
    }

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn from_row_reads_nested_relations() {
        let user = User::from_row(row(json!({
            "id": 1,
            "posts": [{"id": 10, "title": "a"}]
        })))
        .unwrap();
        assert_eq!(user.posts, vec![Post { id: 10, title: "a".into() }]);
    }

    #[test]
    fn try_get_column_reports_the_column() {
        let r = row(json!({"id": "x"}));
        let err = r.try_get_column::<i64>("id").unwrap_err();
        assert!(err.to_string().contains("column 'id'"));
        assert_eq!(r.try_get_column::<Option<i64>>("missing").unwrap(), None);
    }
}
