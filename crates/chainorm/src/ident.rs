//! SQL identifier handling.
//!
//! [`Ident`] represents a table or column reference, supporting dotted notation
//! (`table.column`), quoted parts (`"CamelCase"."User"`) and a trailing wildcard (`users.*`).
//! Rendering is dialect-neutral: the caller supplies the quoting function, so the same
//! identifier renders as `` `name` `` on MySQL and `[name]` on SQL Server.
//!
//! Bare parts follow `[A-Za-z_][A-Za-z0-9_$]*` and are emitted unquoted unless they are
//! reserved words or contain characters a case-folding database would rewrite. Quoted
//! parts take anything but NUL, with `""` standing for a literal `"`.

use crate::error::{OrmError, OrmResult};

/// One dot-separated segment of an [`Ident`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentPart {
    Unquoted(String),
    /// Written in double quotes; stored unescaped.
    Quoted(String),
    /// `*`, only valid as the last part.
    Wildcard,
}

impl IdentPart {
    /// The unescaped name of this part (`*` for the wildcard).
    pub fn name(&self) -> &str {
        match self {
            IdentPart::Unquoted(s) | IdentPart::Quoted(s) => s,
            IdentPart::Wildcard => "*",
        }
    }
}

/// A table or column reference, optionally qualified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub parts: Vec<IdentPart>,
}

const RESERVED: &[&str] = &[
    "all", "and", "as", "asc", "between", "by", "case", "check", "column", "create", "default",
    "delete", "desc", "distinct", "drop", "else", "end", "exists", "from", "group", "having",
    "in", "index", "insert", "into", "is", "join", "key", "like", "limit", "not", "null",
    "offset", "on", "or", "order", "primary", "references", "select", "set", "table", "then",
    "to", "union", "unique", "update", "user", "values", "when", "where", "with",
];

/// Returns `true` if the unquoted `name` must be quoted to survive every supported dialect.
pub fn needs_quoting(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_uppercase() || c == '$')
        || RESERVED.binary_search(&name.to_ascii_lowercase().as_str()).is_ok()
}

impl Ident {
    /// Parse `users`, `users.name`, `"CamelCase"."User"`, `*` or `users.*`.
    ///
    /// Anything else (function calls, spaces, `AS` aliases) is rejected so callers can
    /// fall back to treating the text as a raw expression.
    pub fn parse(input: &str) -> OrmResult<Self> {
        let mut parts = Vec::new();
        let mut rest = input;
        loop {
            let (part, tail) = split_part(input, rest)?;
            parts.push(part);
            match tail.strip_prefix('.') {
                Some("") => return Err(invalid(input, "trailing '.'")),
                Some(next) if parts.last() != Some(&IdentPart::Wildcard) => rest = next,
                Some(_) => return Err(invalid(input, "'*' must be the last part")),
                None => match tail.chars().next() {
                    None => return Ok(Self { parts }),
                    Some(c) => return Err(invalid(input, format!("unexpected '{c}'"))),
                },
            }
        }
    }

    /// `true` when the identifier names a single column or table without a qualifier.
    pub fn is_bare(&self) -> bool {
        self.parts.len() == 1
    }

    /// `true` for `*` and `table.*`.
    pub fn is_wildcard(&self) -> bool {
        self.parts.last() == Some(&IdentPart::Wildcard)
    }

    /// The last part's name, i.e. the column a qualified reference points at.
    pub fn column_name(&self) -> &str {
        self.parts.last().map(IdentPart::name).unwrap_or_default()
    }

    /// Prefix a bare identifier with `qualifier`; qualified identifiers are returned unchanged.
    pub fn qualified(mut self, qualifier: &str) -> Self {
        if self.is_bare() {
            self.parts.insert(0, IdentPart::Unquoted(qualifier.to_string()));
        }
        self
    }

    /// Render the identifier with a dialect's quoting function.
    pub fn render(&self, quote: impl Fn(&str) -> String) -> String {
        let mut out = String::new();
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            match part {
                IdentPart::Unquoted(s) if !needs_quoting(s) => out.push_str(s),
                IdentPart::Unquoted(s) | IdentPart::Quoted(s) => out.push_str(&quote(s)),
                IdentPart::Wildcard => out.push('*'),
            }
        }
        out
    }
}

fn invalid(input: &str, reason: impl std::fmt::Display) -> OrmError {
    OrmError::validation(format!("invalid identifier {input:?}: {reason}"))
}

/// Split the leading part off `rest`, returning it with the unconsumed tail.
fn split_part<'a>(input: &str, rest: &'a str) -> OrmResult<(IdentPart, &'a str)> {
    if let Some(tail) = rest.strip_prefix('*') {
        return Ok((IdentPart::Wildcard, tail));
    }

    if let Some(body) = rest.strip_prefix('"') {
        let mut name = String::new();
        let mut chars = body.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\0' => return Err(invalid(input, "NUL character")),
                '"' if body[i + 1..].starts_with('"') => {
                    chars.next();
                    name.push('"');
                }
                '"' if name.is_empty() => return Err(invalid(input, "empty quoted part")),
                '"' => return Ok((IdentPart::Quoted(name), &body[i + 1..])),
                c => name.push(c),
            }
        }
        return Err(invalid(input, "unclosed quote"));
    }

    // [A-Za-z_][A-Za-z0-9_$]*
    let end = rest
        .char_indices()
        .find(|&(i, c)| {
            let continues = i > 0 && (c == '$' || c.is_ascii_digit());
            !(c == '_' || c.is_ascii_alphabetic() || continues)
        })
        .map_or(rest.len(), |(i, _)| i);
    if end == 0 {
        return Err(match rest.chars().next() {
            Some(c) => invalid(input, format!("unexpected '{c}'")),
            None => invalid(input, "empty part"),
        });
    }
    Ok((IdentPart::Unquoted(rest[..end].to_string()), &rest[end..]))
}
