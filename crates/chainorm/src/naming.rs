//! Column-name translation between client code and the database.
//!
//! [`NamingPattern`] maps the names client code writes to the names stored in the
//! database (`to_column`) and back for returned rows (`to_field`).

use heck::{ToLowerCamelCase, ToSnakeCase};
use std::fmt;
use std::str::FromStr;

use crate::error::OrmError;

/// How client-side field names relate to database column names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingPattern {
    /// Names are passed through unchanged.
    #[default]
    Preserve,
    /// Database columns are `snake_case`, client fields are `camelCase`.
    SnakeCase,
    /// Database columns are `camelCase`, client fields are `snake_case`.
    CamelCase,
}

impl NamingPattern {
    /// Translate a client-side name (possibly dotted, `table.column`) to its column name.
    ///
    /// Expressions (anything that is not a plain dotted identifier) are returned unchanged.
    pub fn to_column(&self, name: &str) -> String {
        match self {
            Self::Preserve => name.to_string(),
            Self::SnakeCase => map_segments(name, |s| s.to_snake_case()),
            Self::CamelCase => map_segments(name, |s| s.to_lower_camel_case()),
        }
    }

    /// Translate a database column name to the client-side field name.
    pub fn to_field(&self, name: &str) -> String {
        match self {
            Self::Preserve => name.to_string(),
            Self::SnakeCase => map_segments(name, |s| s.to_lower_camel_case()),
            Self::CamelCase => map_segments(name, |s| s.to_snake_case()),
        }
    }
}

impl fmt::Display for NamingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Preserve => "preserve",
            Self::SnakeCase => "snake_case",
            Self::CamelCase => "camelCase",
        })
    }
}

impl FromStr for NamingPattern {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "preserve" | "none" => Ok(Self::Preserve),
            "snake_case" | "snake" => Ok(Self::SnakeCase),
            "camelcase" | "camel" => Ok(Self::CamelCase),
            other => Err(OrmError::configuration(format!(
                "unknown naming pattern `{other}`"
            ))),
        }
    }
}

fn is_plain_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn map_segments(name: &str, f: impl Fn(&str) -> String) -> String {
    if !name.split('.').all(is_plain_segment) {
        return name.to_string();
    }
    name.split('.').map(f).collect::<Vec<_>>().join(".")
}

/// Best-effort English singular of a table name (`users` → `user`, `categories` → `category`).
pub fn singular(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if lower.ends_with("ies") && word.len() > 3 {
        return format!("{}y", &word[..word.len() - 3]);
    }
    for suffix in ["sses", "shes", "ches", "xes", "zes"] {
        if lower.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if lower.ends_with("ss") || lower.ends_with("us") || lower.ends_with("is") {
        return word.to_string();
    }
    match word.strip_suffix('s') {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => word.to_string(),
    }
}
