//! Values accepted by clause methods.
//!
//! Every clause argument is converted into an [`Operand`]: either a JSON-like value that
//! the dialect renders as an escaped literal, or a [`Raw`] fragment that is spliced into
//! the statement verbatim.

use serde_json::Value;

/// Caller-owned SQL fragment that bypasses escaping.
///
/// # Safety
/// Never build a `Raw` from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raw(pub String);

/// Wrap a SQL fragment so it is emitted verbatim.
pub fn raw(sql: impl Into<String>) -> Raw {
    Raw(sql.into())
}

/// A clause argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Rendered as an escaped literal (`NULL`, number, string, list).
    Value(Value),
    /// Emitted verbatim.
    Raw(String),
}

impl Operand {
    pub fn is_null(&self) -> bool {
        matches!(self, Operand::Value(Value::Null))
    }

    /// The JSON value, when this is not a raw fragment.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Operand::Value(v) => Some(v),
            Operand::Raw(_) => None,
        }
    }
}

impl From<Raw> for Operand {
    fn from(raw: Raw) -> Self {
        Operand::Raw(raw.0)
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Value(value)
    }
}

impl From<&Value> for Operand {
    fn from(value: &Value) -> Self {
        Operand::Value(value.clone())
    }
}

macro_rules! operand_from_json {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Operand::Value(Value::from(value))
                }
            }
        )*
    };
}

operand_from_json!(
    bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, String, &str,
);

impl From<&String> for Operand {
    fn from(value: &String) -> Self {
        Operand::Value(Value::String(value.clone()))
    }
}

impl From<uuid::Uuid> for Operand {
    fn from(value: uuid::Uuid) -> Self {
        Operand::Value(Value::String(value.to_string()))
    }
}

impl From<chrono::NaiveDate> for Operand {
    fn from(value: chrono::NaiveDate) -> Self {
        Operand::Value(Value::String(value.format("%Y-%m-%d").to_string()))
    }
}

impl From<chrono::NaiveDateTime> for Operand {
    fn from(value: chrono::NaiveDateTime) -> Self {
        Operand::Value(Value::String(value.format("%Y-%m-%d %H:%M:%S").to_string()))
    }
}

impl From<chrono::DateTime<chrono::Utc>> for Operand {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        value.naive_utc().into()
    }
}

impl<T: Into<Operand>> From<Option<T>> for Operand {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Operand::Value(Value::Null),
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Operand {
    fn from(values: Vec<T>) -> Self {
        Operand::Value(Value::Array(values.into_iter().map(Into::into).collect()))
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Operand {
    fn from(values: [T; N]) -> Self {
        Operand::Value(Value::Array(values.into_iter().map(Into::into).collect()))
    }
}

/// Current UTC time in the `YYYY-MM-DD HH:MM:SS` form every supported dialect accepts.
pub(crate) fn now_timestamp() -> Value {
    Value::String(chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Normalize a join-key value so `1`, `"1"` and `1.0`-free integers compare equal.
pub(crate) fn join_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        other => Some(other.to_string()),
    }
}

/// Read a count-like value that drivers may return as a number or as text.
pub(crate) fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_i64().and_then(|v| u64::try_from(v).ok()))
            .or_else(|| n.as_f64().map(|v| v as u64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(u64::from(*b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conversions() {
        assert_eq!(Operand::from(5), Operand::Value(json!(5)));
        assert_eq!(Operand::from("bob"), Operand::Value(json!("bob")));
        assert_eq!(Operand::from(None::<i32>), Operand::Value(Value::Null));
        assert_eq!(Operand::from(vec![1, 2]), Operand::Value(json!([1, 2])));
        assert_eq!(Operand::from([3, 4]), Operand::Value(json!([3, 4])));
        assert_eq!(Operand::from(raw("NOW()")), Operand::Raw("NOW()".into()));
    }

    #[test]
    fn join_keys_normalize_numbers_and_text() {
        assert_eq!(join_key(&json!(1)), join_key(&json!("1")));
        assert_eq!(join_key(&Value::Null), None);
    }

    #[test]
    fn counts_from_text_or_numbers() {
        assert_eq!(value_as_u64(&json!(3)), Some(3));
        assert_eq!(value_as_u64(&json!("42")), Some(42));
        assert_eq!(value_as_u64(&Value::Null), None);
    }
}
