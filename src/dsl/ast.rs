//! Filter tree produced by the parser.

use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;

/// Root of a compiled filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterTree {
    /// One or more AND-expressions joined by `OR`.
    Or(Vec<FilterTree>),

    /// One or more sub-expressions joined by `AND`.
    And(Vec<FilterTree>),

    /// Parenthesized expression: `( ... )`
    Sub(Box<FilterTree>),

    /// `identifier comparator literal`
    Simple(Predicate),
}

/// Comparison operator of a simple predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Equal,              // =
    NotEqual,           // <>
    Like,               // LIKE
    LessThan,           // <
    LessThanOrEqual,    // <=
    GreaterThan,        // >
    GreaterThanOrEqual, // >=
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparator::Equal => write!(f, "="),
            Comparator::NotEqual => write!(f, "<>"),
            Comparator::Like => write!(f, "LIKE"),
            Comparator::LessThan => write!(f, "<"),
            Comparator::LessThanOrEqual => write!(f, "<="),
            Comparator::GreaterThan => write!(f, ">"),
            Comparator::GreaterThanOrEqual => write!(f, ">="),
        }
    }
}

/// A single tag test. The LIKE pattern and the numeric form of the literal
/// are prepared once here so evaluation never allocates.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub identifier: String,
    pub comparator: Comparator,
    pub literal: String,
    pattern: Option<Regex>,
    number: Option<f64>,
}

impl Predicate {
    pub fn new(identifier: String, comparator: Comparator, literal: String) -> Self {
        let pattern = match comparator {
            Comparator::Like => like_to_regex(&literal),
            _ => None,
        };
        let number = parse_number(&literal);
        Self {
            identifier,
            comparator,
            literal,
            pattern,
            number,
        }
    }

    pub(crate) fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }

    pub(crate) fn number(&self) -> Option<f64> {
        self.number
    }
}

impl PartialEq for Predicate {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
            && self.comparator == other.comparator
            && self.literal == other.literal
    }
}

/// Translate a SQL LIKE pattern into an anchored, case-insensitive regex.
/// `%` matches any run of characters and `?` any single character; every
/// other character, dots included, is matched literally.
fn like_to_regex(pattern: &str) -> Option<Regex> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push_str("(?is)^");
    let mut literal = String::new();
    for c in pattern.chars() {
        match c {
            '%' | '?' => {
                source.push_str(&regex::escape(&literal));
                literal.clear();
                source.push_str(if c == '%' { ".*" } else { "." });
            }
            other => literal.push(other),
        }
    }
    source.push_str(&regex::escape(&literal));
    source.push('$');
    Regex::new(&source).ok()
}

/// Parse a decimal number, rejecting NaN and infinities.
pub(crate) fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

impl FilterTree {
    /// Collect every tag key the expression looks at.
    pub fn identifiers(&self) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        self.collect_identifiers(&mut keys);
        keys
    }

    fn collect_identifiers(&self, keys: &mut BTreeSet<String>) {
        match self {
            FilterTree::Or(children) | FilterTree::And(children) => {
                for child in children {
                    child.collect_identifiers(keys);
                }
            }
            FilterTree::Sub(inner) => inner.collect_identifiers(keys),
            FilterTree::Simple(predicate) => {
                keys.insert(predicate.identifier.clone());
            }
        }
    }
}

/// Serializes back into the expression language; the output parses to a
/// tree that evaluates identically.
impl fmt::Display for FilterTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterTree::Or(children) => write_joined(f, children, " OR "),
            FilterTree::And(children) => write_joined(f, children, " AND "),
            FilterTree::Sub(inner) => write!(f, "({inner})"),
            FilterTree::Simple(p) => write!(f, "{} {} '{}'", p.identifier, p.comparator, p.literal),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, children: &[FilterTree], sep: &str) -> fmt::Result {
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{child}")?;
    }
    Ok(())
}
