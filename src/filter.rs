//! Resource filters - a small query language over resource attributes.
//!
//! # Syntax
//!
//! ```text
//! tag:news                      attribute equals value
//! tag:-news                     negation
//! tag:[news,tech]               any of a set
//! featured:true+tag:news        and
//! tag:news,tag:tech             or (binds looser than `+`)
//! (tag:a,tag:b)+featured:true   grouping
//! published_at:>'2024-01-01'    comparison (>, >=, <, <=), quoted values
//! ```
//!
//! `tag` and `author` are aliases for the `tags` and `authors` relations;
//! `primary_tag` and `primary_author` look at the first element only.
//! Relation elements match by their `slug`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::resource::{Resource, relation_slug};

/// Filter parse errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("unexpected end of filter `{0}`")]
    UnexpectedEnd(String),

    #[error("unexpected `{found}` at offset {offset} in filter `{filter}`")]
    Unexpected {
        filter: String,
        found: char,
        offset: usize,
    },

    #[error("missing `:` after `{key}` in filter `{filter}`")]
    MissingColon { filter: String, key: String },

    #[error("empty value for `{key}` in filter `{filter}`")]
    EmptyValue { filter: String, key: String },
}

/// Comparison operator of a term
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Literal kind inferred from the unquoted token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LiteralKind {
    Str,
    Num,
    Bool,
    Null,
}

#[derive(Debug, Clone, PartialEq)]
struct Literal {
    text: String,
    kind: LiteralKind,
}

impl Literal {
    fn quoted(text: String) -> Self {
        Self {
            text,
            kind: LiteralKind::Str,
        }
    }

    fn bare(text: String) -> Self {
        let kind = match text.as_str() {
            "true" | "false" => LiteralKind::Bool,
            "null" => LiteralKind::Null,
            t if t.parse::<f64>().is_ok() => LiteralKind::Num,
            _ => LiteralKind::Str,
        };
        Self { text, kind }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Term {
    key: String,
    negated: bool,
    op: Op,
    values: Vec<Literal>,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Any(Vec<Expr>),
    All(Vec<Expr>),
    Term(Term),
}

/// A parsed resource filter
///
/// Keeps its source text for display, hashing and serialization.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    source: String,
    expr: Option<Expr>,
}

impl Filter {
    /// Parse a filter expression. Blank input matches everything.
    pub fn parse(source: &str) -> Result<Self, FilterError> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        let mut parser = Parser::new(trimmed);
        let expr = parser.parse_any()?;
        parser.expect_end()?;

        Ok(Self {
            source: trimmed.to_string(),
            expr: Some(expr),
        })
    }

    /// Filter that matches every resource.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.expr.is_none()
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Evaluate against a resource.
    pub fn matches(&self, resource: &Resource) -> bool {
        self.expr
            .as_ref()
            .is_none_or(|expr| eval(expr, resource))
    }
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Filter {}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Filter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Filter {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.source.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Parser
// ============================================================================

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self) -> FilterError {
        match self.peek() {
            Some(found) => FilterError::Unexpected {
                filter: self.source.to_string(),
                found,
                offset: self.pos,
            },
            None => FilterError::UnexpectedEnd(self.source.to_string()),
        }
    }

    fn expect_end(&mut self) -> Result<(), FilterError> {
        self.skip_ws();
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.unexpected()),
        }
    }

    /// any := all (',' all)*
    fn parse_any(&mut self) -> Result<Expr, FilterError> {
        let mut items = vec![self.parse_all()?];
        while self.eat(',') {
            items.push(self.parse_all()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Any(items)
        })
    }

    /// all := atom ('+' atom)*
    fn parse_all(&mut self) -> Result<Expr, FilterError> {
        let mut items = vec![self.parse_atom()?];
        while self.eat('+') {
            items.push(self.parse_atom()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::All(items)
        })
    }

    /// atom := '(' any ')' | term
    fn parse_atom(&mut self) -> Result<Expr, FilterError> {
        if self.eat('(') {
            let inner = self.parse_any()?;
            if !self.eat(')') {
                return Err(self.unexpected());
            }
            return Ok(inner);
        }
        self.parse_term().map(Expr::Term)
    }

    /// term := key ':' '-'? op? (value | '[' value (',' value)* ']')
    fn parse_term(&mut self) -> Result<Term, FilterError> {
        self.skip_ws();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.unexpected());
        }
        let key: String = self.chars[start..self.pos].iter().collect();

        if !self.eat(':') {
            return Err(FilterError::MissingColon {
                filter: self.source.to_string(),
                key,
            });
        }

        self.skip_ws();
        let negated = self.peek() == Some('-') && {
            self.pos += 1;
            true
        };
        let op = self.parse_op();

        let values = if self.eat('[') {
            let mut values = vec![self.parse_value(&key)?];
            while self.eat(',') {
                values.push(self.parse_value(&key)?);
            }
            if !self.eat(']') {
                return Err(self.unexpected());
            }
            values
        } else {
            vec![self.parse_value(&key)?]
        };

        Ok(Term {
            key,
            negated,
            op,
            values,
        })
    }

    fn parse_op(&mut self) -> Op {
        let op = match (self.peek(), self.chars.get(self.pos + 1).copied()) {
            (Some('>'), Some('=')) => Some((Op::Gte, 2)),
            (Some('<'), Some('=')) => Some((Op::Lte, 2)),
            (Some('>'), _) => Some((Op::Gt, 1)),
            (Some('<'), _) => Some((Op::Lt, 1)),
            _ => None,
        };
        match op {
            Some((op, width)) => {
                self.pos += width;
                op
            }
            None => Op::Eq,
        }
    }

    fn parse_value(&mut self, key: &str) -> Result<Literal, FilterError> {
        self.skip_ws();
        if let Some(quote @ ('\'' | '"')) = self.peek() {
            self.pos += 1;
            let start = self.pos;
            while self.peek().is_some_and(|c| c != quote) {
                self.pos += 1;
            }
            if self.peek().is_none() {
                return Err(FilterError::UnexpectedEnd(self.source.to_string()));
            }
            let text: String = self.chars[start..self.pos].iter().collect();
            self.pos += 1;
            return Ok(Literal::quoted(text));
        }

        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| !c.is_whitespace() && !"+,()[]'\"".contains(c))
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(FilterError::EmptyValue {
                filter: self.source.to_string(),
                key: key.to_string(),
            });
        }
        Ok(Literal::bare(self.chars[start..self.pos].iter().collect()))
    }
}

// ============================================================================
// Evaluation
// ============================================================================

fn eval(expr: &Expr, resource: &Resource) -> bool {
    match expr {
        Expr::Any(items) => items.iter().any(|e| eval(e, resource)),
        Expr::All(items) => items.iter().all(|e| eval(e, resource)),
        Expr::Term(term) => eval_term(term, resource),
    }
}

fn eval_term(term: &Term, resource: &Resource) -> bool {
    let candidates = resolve(&term.key, resource);
    let hit = match term.op {
        Op::Eq => {
            if candidates.is_empty() {
                term.values.iter().any(|lit| lit.kind == LiteralKind::Null)
            } else {
                candidates
                    .iter()
                    .any(|v| term.values.iter().any(|lit| literal_eq(v, lit)))
            }
        }
        op => {
            let Some(lit) = term.values.first() else {
                return false;
            };
            candidates.iter().any(|v| {
                compare(v, lit).is_some_and(|ord| match op {
                    Op::Gt => ord == Ordering::Greater,
                    Op::Gte => ord != Ordering::Less,
                    Op::Lt => ord == Ordering::Less,
                    Op::Lte => ord != Ordering::Greater,
                    Op::Eq => ord == Ordering::Equal,
                })
            })
        }
    };
    hit != term.negated
}

/// Resolve a filter key to candidate values (arrays flattened).
fn resolve(key: &str, resource: &Resource) -> Vec<Value> {
    let (key, primary_only) = match key {
        "tag" | "tags" => ("tags", false),
        "author" | "authors" => ("authors", false),
        "primary_tag" => ("tags", true),
        "primary_author" => ("authors", true),
        "id" => return vec![Value::String(resource.id.as_str().to_string())],
        other => (other, false),
    };

    let mut parts = key.split('.');
    let Some(head) = parts.next().and_then(|h| resource.attr(h)) else {
        return Vec::new();
    };

    let mut current = vec![head.clone()];
    for part in parts {
        current = current
            .into_iter()
            .flat_map(|v| match v {
                Value::Array(items) => items,
                other => vec![other],
            })
            .filter_map(|v| v.get(part).cloned())
            .collect();
    }

    let flattened: Vec<Value> = current
        .into_iter()
        .flat_map(|v| match v {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        })
        .collect();

    if primary_only {
        flattened.into_iter().take(1).collect()
    } else {
        flattened
    }
}

fn literal_eq(value: &Value, lit: &Literal) -> bool {
    match value {
        Value::Null => lit.kind == LiteralKind::Null,
        Value::Bool(b) => lit.kind == LiteralKind::Bool && lit.text == b.to_string(),
        Value::Number(n) => match (n.as_f64(), lit.text.parse::<f64>()) {
            (Some(a), Ok(b)) => a == b,
            _ => false,
        },
        Value::String(s) => *s == lit.text,
        Value::Object(_) => relation_slug(value).is_some_and(|s| s == lit.text),
        Value::Array(_) => false,
    }
}

fn compare(value: &Value, lit: &Literal) -> Option<Ordering> {
    match value {
        Value::Number(n) => {
            let a = n.as_f64()?;
            let b = lit.text.parse::<f64>().ok()?;
            a.partial_cmp(&b)
        }
        Value::String(s) => Some(s.as_str().cmp(lit.text.as_str())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceType;
    use serde_json::json;

    fn post() -> Resource {
        Resource::new("p1", ResourceType::Posts)
            .with("slug", "hello-world")
            .with("status", "published")
            .with("featured", true)
            .with("word_count", 420)
            .with("published_at", "2024-05-01T10:00:00Z")
            .with("tags", json!([{"slug": "news"}, {"slug": "tech"}]))
            .with("authors", json!([{"slug": "jo"}]))
    }

    fn m(filter: &str) -> bool {
        Filter::parse(filter).unwrap().matches(&post())
    }

    #[test]
    fn test_empty_matches_everything() {
        let filter = Filter::parse("  ").unwrap();
        assert!(filter.is_empty());
        assert!(filter.matches(&post()));
    }

    #[test]
    fn test_simple_equality() {
        assert!(m("status:published"));
        assert!(!m("status:draft"));
        assert!(m("slug:hello-world"));
        assert!(m("id:p1"));
    }

    #[test]
    fn test_relations_and_aliases() {
        assert!(m("tag:news"));
        assert!(m("tags:tech"));
        assert!(m("author:jo"));
        assert!(m("primary_tag:news"));
        assert!(!m("primary_tag:tech"));
        assert!(m("tags.slug:tech"));
    }

    #[test]
    fn test_negation_and_sets() {
        assert!(m("tag:-podcast"));
        assert!(!m("tag:-news"));
        assert!(m("tag:[podcast,tech]"));
        assert!(!m("tag:-[podcast,tech]"));
    }

    #[test]
    fn test_boolean_and_numbers() {
        assert!(m("featured:true"));
        assert!(!m("featured:false"));
        assert!(m("word_count:420"));
        assert!(m("word_count:>400+word_count:<=420"));
        assert!(!m("word_count:<100"));
    }

    #[test]
    fn test_and_or_precedence() {
        assert!(m("status:draft,tag:news+featured:true"));
        assert!(!m("(status:draft,tag:news)+featured:false"));
        assert!(m("(status:draft,tag:news)+featured:true"));
    }

    #[test]
    fn test_quoted_date_comparison() {
        assert!(m("published_at:>'2024-01-01'"));
        assert!(!m("published_at:<'2024-01-01'"));
    }

    #[test]
    fn test_missing_attribute() {
        assert!(!m("visibility:public"));
        assert!(m("visibility:-public"));
        assert!(m("visibility:null"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Filter::parse("status"),
            Err(FilterError::MissingColon { .. })
        ));
        assert!(matches!(
            Filter::parse("status:"),
            Err(FilterError::EmptyValue { .. })
        ));
        assert!(matches!(
            Filter::parse("tag:'open"),
            Err(FilterError::UnexpectedEnd(_))
        ));
        assert!(matches!(
            Filter::parse("tag:a)"),
            Err(FilterError::Unexpected { found: ')', .. })
        ));
    }

    #[test]
    fn test_serde_as_string() {
        let filter: Filter = serde_json::from_str("\"tag:news\"").unwrap();
        assert_eq!(filter.as_str(), "tag:news");
        assert_eq!(serde_json::to_string(&filter).unwrap(), "\"tag:news\"");
        assert!(serde_json::from_str::<Filter>("\"tag\"").is_err());
    }
}
