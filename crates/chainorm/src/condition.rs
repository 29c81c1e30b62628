//! WHERE/HAVING condition primitives.
//!
//! Conditions are rendered to SQL text when the clause method is called, with their
//! boolean connector attached. The first condition of a group never carries one, so a
//! group of `n` conditions always renders with exactly `n - 1` connectors.

use crate::dialect::StatementCompiler;
use crate::error::{OrmError, OrmResult};
use crate::value::Operand;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Boolean connector joining a condition to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

impl Connector {
    pub fn as_sql(self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
        }
    }
}

/// One rendered condition fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// `None` only for the first condition of a group.
    pub connector: Option<Connector>,
    pub sql: String,
}

/// Append `sql` to `list`, dropping the connector when the list is empty.
pub(crate) fn push_condition(list: &mut Vec<Condition>, connector: Connector, sql: String) {
    let connector = if list.is_empty() { None } else { Some(connector) };
    list.push(Condition { connector, sql });
}

/// Render a condition list as `a AND b OR c`.
pub fn render_conditions(list: &[Condition]) -> String {
    let mut out = String::new();
    for cond in list {
        if let Some(connector) = cond.connector {
            out.push(' ');
            out.push_str(connector.as_sql());
            out.push(' ');
        }
        out.push_str(&cond.sql);
    }
    out
}

/// Append `sql` with AND semantics over the whole existing list.
///
/// When the list already contains an OR, it is first collapsed into one parenthesized
/// condition so the new predicate applies to every branch.
pub(crate) fn and_over_all(list: &mut Vec<Condition>, sql: String) {
    if list.iter().any(|c| c.connector == Some(Connector::Or)) {
        let grouped = format!("({})", render_conditions(list));
        list.clear();
        list.push(Condition {
            connector: None,
            sql: grouped,
        });
    }
    push_condition(list, Connector::And, sql);
}

/// Comparison operator accepted by `where_op` and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
    ILike,
    NotILike,
    In,
    NotIn,
    Between,
    NotBetween,
    Is,
    IsNot,
}

impl Operator {
    pub fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::ILike => "ILIKE",
            Operator::NotILike => "NOT ILIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Between => "BETWEEN",
            Operator::NotBetween => "NOT BETWEEN",
            Operator::Is => "IS",
            Operator::IsNot => "IS NOT",
        }
    }

    fn is_negated(self) -> bool {
        matches!(
            self,
            Operator::Ne
                | Operator::NotLike
                | Operator::NotILike
                | Operator::NotIn
                | Operator::NotBetween
                | Operator::IsNot
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Operator {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        let op = match normalized.to_ascii_lowercase().as_str() {
            "=" | "==" | "eq" => Operator::Eq,
            "!=" | "<>" | "ne" => Operator::Ne,
            ">" | "gt" => Operator::Gt,
            ">=" | "gte" => Operator::Gte,
            "<" | "lt" => Operator::Lt,
            "<=" | "lte" => Operator::Lte,
            "like" => Operator::Like,
            "not like" => Operator::NotLike,
            "ilike" => Operator::ILike,
            "not ilike" => Operator::NotILike,
            "in" => Operator::In,
            "not in" => Operator::NotIn,
            "between" => Operator::Between,
            "not between" => Operator::NotBetween,
            "is" => Operator::Is,
            "is not" => Operator::IsNot,
            _ => {
                return Err(OrmError::validation(format!("unknown operator `{s}`")));
            }
        };
        Ok(op)
    }
}

/// Render `column op operand` for one dialect.
///
/// - `NULL` with `=`/`IS` becomes `IS NULL`, with `<>`/`IS NOT` becomes `IS NOT NULL`
/// - an array with `=` becomes `IN`, with `<>` becomes `NOT IN`
/// - `IN ()` renders as the always-false `IN (NULL)`; `NOT IN ()` as the always-true `1 = 1`
/// - `BETWEEN` needs exactly two bounds; none renders as `BETWEEN NULL AND NULL`
pub(crate) fn render_predicate(
    compiler: &dyn StatementCompiler,
    column: &str,
    op: Operator,
    operand: &Operand,
) -> OrmResult<String> {
    let value = match operand {
        Operand::Raw(sql) => return Ok(format!("{column} {} {sql}", op.as_sql())),
        Operand::Value(value) => value,
    };

    match (op, value) {
        (Operator::Eq | Operator::Is, Value::Null) => Ok(format!("{column} IS NULL")),
        (Operator::Ne | Operator::IsNot, Value::Null) => Ok(format!("{column} IS NOT NULL")),
        (_, Value::Null) => Err(OrmError::validation(format!(
            "operator `{op}` cannot compare `{column}` with NULL"
        ))),
        (Operator::Eq | Operator::In, Value::Array(items)) => {
            Ok(render_in(compiler, column, items, false))
        }
        (Operator::Ne | Operator::NotIn, Value::Array(items)) => {
            Ok(render_in(compiler, column, items, true))
        }
        (Operator::In | Operator::NotIn, scalar) => Ok(render_in(
            compiler,
            column,
            std::slice::from_ref(scalar),
            op == Operator::NotIn,
        )),
        (Operator::Between | Operator::NotBetween, Value::Array(items)) => match items.as_slice()
        {
            [] => Ok(format!("{column} {} NULL AND NULL", op.as_sql())),
            [low, high] => Ok(format!(
                "{column} {} {} AND {}",
                op.as_sql(),
                compiler.literal(low),
                compiler.literal(high)
            )),
            other => Err(OrmError::validation(format!(
                "`{op}` on `{column}` needs exactly 2 bounds, got {}",
                other.len()
            ))),
        },
        (Operator::Between | Operator::NotBetween, _) => Err(OrmError::validation(format!(
            "`{op}` on `{column}` needs a list of 2 bounds"
        ))),
        (_, Value::Array(_)) => Err(OrmError::validation(format!(
            "operator `{op}` cannot take a list for `{column}`"
        ))),
        (Operator::ILike | Operator::NotILike, scalar) => {
            Ok(compiler.ilike(column, &compiler.literal(scalar), op.is_negated()))
        }
        (_, scalar) => Ok(format!("{column} {} {}", op.as_sql(), compiler.literal(scalar))),
    }
}

fn render_in(
    compiler: &dyn StatementCompiler,
    column: &str,
    items: &[Value],
    negated: bool,
) -> String {
    if items.is_empty() {
        return if negated {
            "1 = 1".to_string()
        } else {
            format!("{column} IN (NULL)")
        };
    }
    let list = items
        .iter()
        .map(|v| compiler.literal(v))
        .collect::<Vec<_>>()
        .join(", ");
    let keyword = if negated { "NOT IN" } else { "IN" };
    format!("{column} {keyword} ({list})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::value::raw;
    use serde_json::json;

    fn pg(op: &str, operand: impl Into<Operand>) -> OrmResult<String> {
        let compiler = Dialect::Postgres.compiler();
        render_predicate(compiler.as_ref(), "t.c", op.parse()?, &operand.into())
    }

    #[test]
    fn operator_aliases() {
        assert_eq!("==".parse::<Operator>().unwrap(), Operator::Eq);
        assert_eq!("NOT   LIKE".parse::<Operator>().unwrap(), Operator::NotLike);
        assert!("~~".parse::<Operator>().unwrap_err().is_validation());
    }

    #[test]
    fn null_and_list_translation() {
        assert_eq!(pg("=", Value::Null).unwrap(), "t.c IS NULL");
        assert_eq!(pg("!=", Value::Null).unwrap(), "t.c IS NOT NULL");
        assert_eq!(pg("=", json!([1, 2])).unwrap(), "t.c IN (1, 2)");
        assert_eq!(pg("<>", json!(["a"])).unwrap(), "t.c NOT IN ('a')");
        assert!(pg(">", Value::Null).unwrap_err().is_validation());
    }

    #[test]
    fn empty_lists_never_fail() {
        assert_eq!(pg("in", json!([])).unwrap(), "t.c IN (NULL)");
        assert_eq!(pg("not in", json!([])).unwrap(), "1 = 1");
        assert_eq!(pg("between", json!([])).unwrap(), "t.c BETWEEN NULL AND NULL");
        assert!(pg("between", json!([1])).unwrap_err().is_validation());
    }

    #[test]
    fn raw_operands_bypass_escaping() {
        assert_eq!(pg(">", raw("NOW()")).unwrap(), "t.c > NOW()");
    }

    #[test]
    fn connectors_are_baked_in() {
        let mut list = Vec::new();
        push_condition(&mut list, Connector::Or, "a = 1".into());
        push_condition(&mut list, Connector::Or, "b = 2".into());
        assert_eq!(list[0].connector, None);
        assert_eq!(render_conditions(&list), "a = 1 OR b = 2");

        and_over_all(&mut list, "c IS NULL".into());
        assert_eq!(render_conditions(&list), "(a = 1 OR b = 2) AND c IS NULL");
    }
}
