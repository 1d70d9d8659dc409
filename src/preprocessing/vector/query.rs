//! Attribute filters for vector features.
//!
//! A query is a disjunction of conjunctions of comparisons between a column and a
//! literal, e.g. `type == 'fault' and length > 10 or age < 5`. `and` binds tighter
//! than `or`. Column names containing spaces can be written in backticks.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::preprocessing::common::error::{ProcessingError, Result};
use crate::preprocessing::vector::types::{AttributeValue, Feature};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub column: String,
    pub op: CompareOp,
    pub literal: AttributeValue,
}

impl Comparison {
    /// Null or mismatched operands compare unequal and unordered.
    pub fn matches(&self, value: &AttributeValue) -> bool {
        let ordering = match (value, &self.literal) {
            (AttributeValue::Text(a), AttributeValue::Text(b)) => Some(a.cmp(b)),
            (AttributeValue::Bool(a), AttributeValue::Bool(b)) => Some(a.cmp(b)),
            (AttributeValue::Null, _) | (_, AttributeValue::Null) => None,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        };
        match (self.op, ordering) {
            (CompareOp::Ne, None) => true,
            (_, None) => false,
            (CompareOp::Eq, Some(o)) => o == Ordering::Equal,
            (CompareOp::Ne, Some(o)) => o != Ordering::Equal,
            (CompareOp::Lt, Some(o)) => o == Ordering::Less,
            (CompareOp::Le, Some(o)) => o != Ordering::Greater,
            (CompareOp::Gt, Some(o)) => o == Ordering::Greater,
            (CompareOp::Ge, Some(o)) => o != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureQuery {
    any_of: Vec<Vec<Comparison>>,
}

impl FeatureQuery {
    pub fn matches(&self, feature: &Feature) -> bool {
        self.any_of.iter().any(|clause| {
            clause
                .iter()
                .all(|comparison| comparison.matches(feature.attribute(&comparison.column)))
        })
    }

    /// Columns referenced anywhere in the query.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.any_of
            .iter()
            .flatten()
            .map(|comparison| comparison.column.as_str())
    }
}

impl fmt::Display for FeatureQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.any_of.iter().enumerate() {
            if i > 0 {
                f.write_str(" or ")?;
            }
            for (j, c) in clause.iter().enumerate() {
                if j > 0 {
                    f.write_str(" and ")?;
                }
                match &c.literal {
                    AttributeValue::Text(text) => {
                        write!(f, "`{}` {} '{}'", c.column, c.op.symbol(), text)?
                    }
                    other => write!(f, "`{}` {} {}", c.column, c.op.symbol(), other)?,
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(AttributeValue),
    Op(CompareOp),
    And,
    Or,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            _ if c.is_whitespace() => i += 1,
            '\'' | '"' | '`' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .map(|offset| i + 1 + offset)
                    .ok_or_else(|| {
                        ProcessingError::config(format!("unterminated quote in query '{input}'"))
                    })?;
                let text: String = chars[i + 1..end].iter().collect();
                tokens.push(if c == '`' {
                    Token::Ident(text)
                } else {
                    Token::Literal(AttributeValue::Text(text))
                });
                i = end + 1;
            }
            '=' | '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (op, width) = match (c, next) {
                    ('=', Some('=')) => (CompareOp::Eq, 2),
                    ('!', Some('=')) => (CompareOp::Ne, 2),
                    ('<', Some('=')) => (CompareOp::Le, 2),
                    ('>', Some('=')) => (CompareOp::Ge, 2),
                    ('<', _) => (CompareOp::Lt, 1),
                    ('>', _) => (CompareOp::Gt, 1),
                    _ => {
                        return Err(ProcessingError::config(format!(
                            "unexpected '{c}' in query '{input}'"
                        )));
                    }
                };
                tokens.push(Token::Op(op));
                i += width;
            }
            _ if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                let start = i;
                i += 1;
                let in_number =
                    |ch: char| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '+');
                while i < chars.len() && in_number(chars[i]) {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text.parse::<f64>().map_err(|_| {
                    ProcessingError::config(format!("invalid number '{text}' in query"))
                })?;
                tokens.push(Token::Literal(AttributeValue::Number(number)));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                let in_word = |ch: char| ch.is_alphanumeric() || matches!(ch, '_' | '.');
                while i < chars.len() && in_word(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "true" => Token::Literal(AttributeValue::Bool(true)),
                    "false" => Token::Literal(AttributeValue::Bool(false)),
                    _ => Token::Ident(word),
                });
            }
            _ => {
                return Err(ProcessingError::config(format!(
                    "unexpected character '{c}' in query '{input}'"
                )));
            }
        }
    }
    Ok(tokens)
}

impl FromStr for FeatureQuery {
    type Err = ProcessingError;

    fn from_str(input: &str) -> Result<Self> {
        let tokens = tokenize(input)?;
        let malformed = || ProcessingError::config(format!("malformed query '{input}'"));

        let mut any_of = vec![Vec::new()];
        let mut rest = tokens.as_slice();
        loop {
            let comparison = match rest {
                [Token::Ident(column), Token::Op(op), Token::Literal(literal), tail @ ..] => {
                    rest = tail;
                    Comparison {
                        column: column.clone(),
                        op: *op,
                        literal: literal.clone(),
                    }
                }
                // `5 < depth` reads the same as `depth > 5`
                [Token::Literal(literal), Token::Op(op), Token::Ident(column), tail @ ..] => {
                    rest = tail;
                    let op = match op {
                        CompareOp::Lt => CompareOp::Gt,
                        CompareOp::Le => CompareOp::Ge,
                        CompareOp::Gt => CompareOp::Lt,
                        CompareOp::Ge => CompareOp::Le,
                        same => *same,
                    };
                    Comparison {
                        column: column.clone(),
                        op,
                        literal: literal.clone(),
                    }
                }
                _ => return Err(malformed()),
            };
            any_of.last_mut().ok_or_else(malformed)?.push(comparison);

            match rest {
                [] => break,
                [Token::And, tail @ ..] => rest = tail,
                [Token::Or, tail @ ..] => {
                    any_of.push(Vec::new());
                    rest = tail;
                }
                _ => return Err(malformed()),
            }
        }

        Ok(FeatureQuery { any_of })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, Geometry};

    fn feature(kind: &str, length: f64) -> Feature {
        Feature::new(Geometry::Point(point!(x: 0.0, y: 0.0)))
            .with_attribute("type", kind)
            .with_attribute("length", length)
    }

    #[test]
    fn test_conjunction() {
        let query: FeatureQuery = "type == 'fault' and length > 10".parse().unwrap();
        assert!(query.matches(&feature("fault", 12.0)));
        assert!(!query.matches(&feature("fault", 10.0)));
        assert!(!query.matches(&feature("dike", 12.0)));
    }

    #[test]
    fn test_or_binds_looser_than_and() {
        let text = "type == \"dike\" or type == 'fault' and length >= 10";
        let query: FeatureQuery = text.parse().unwrap();
        assert!(query.matches(&feature("dike", 1.0)));
        assert!(query.matches(&feature("fault", 10.0)));
        assert!(!query.matches(&feature("fault", 9.0)));
    }

    #[test]
    fn test_missing_attribute_is_unequal() {
        let query: FeatureQuery = "age != 3".parse().unwrap();
        assert!(query.matches(&feature("fault", 1.0)));
        let query: FeatureQuery = "age == 3".parse().unwrap();
        assert!(!query.matches(&feature("fault", 1.0)));
    }

    #[test]
    fn test_reversed_operands_and_backticks() {
        let query: FeatureQuery = "10 < `length`".parse().unwrap();
        assert!(query.matches(&feature("fault", 11.0)));
        assert_eq!(query.columns().collect::<Vec<_>>(), vec!["length"]);
    }

    #[test]
    fn test_malformed_query_is_config_error() {
        for input in ["type ==", "type = 'a'", "and type == 'a'", "type == 'a' or", "type == 'a"] {
            assert!(
                matches!(input.parse::<FeatureQuery>(), Err(ProcessingError::Config(_))),
                "{input}"
            );
        }
    }
}
