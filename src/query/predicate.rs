use regex::Regex;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Record;
use crate::query::cache::PatternCache;

/// One condition on one field.
#[derive(Debug, Clone)]
pub enum Clause {
    Equals(String),
    Pattern(Regex),
}

/// Conjunction of per-field clauses. A record matches when every clause's
/// field is present and satisfies it; absent fields never match. Matching
/// is case-sensitive and patterns carry no implicit anchors — callers
/// write `^...$` themselves when they mean a full-value match.
#[derive(Debug, Clone, Default)]
pub struct Predicate {
    clauses: Vec<(String, Clause)>,
}

impl Predicate {
    /// Matches every record.
    pub fn empty() -> Self {
        Predicate::default()
    }

    pub fn equals(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.clauses.push((field.into(), Clause::Equals(value.into())));
        self
    }

    pub fn pattern(mut self, field: impl Into<String>, regex: Regex) -> Self {
        self.clauses.push((field.into(), Clause::Pattern(regex)));
        self
    }

    /// Wire format: one `field: value` line per clause. A value containing
    /// regex metacharacters is compiled as a pattern clause; a plain value
    /// is an equality clause.
    pub fn parse(input: &str, patterns: &PatternCache) -> Result<Predicate> {
        let mut predicate = Predicate::empty();
        for line in input.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let Some((field, value)) = line.split_once(": ") else {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    format!("predicate clause {line:?} is not `field: value`"),
                ));
            };
            let clause = if looks_like_pattern(value) {
                Clause::Pattern(patterns.get_or_compile(value)?)
            } else {
                Clause::Equals(value.to_string())
            };
            predicate.clauses.push((field.to_string(), clause));
        }
        Ok(predicate)
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.clauses.iter().all(|(field, clause)| {
            match record.get(field) {
                None => false,
                Some(value) => match clause {
                    Clause::Equals(want) => value == want,
                    Clause::Pattern(regex) => regex.is_match(value),
                },
            }
        })
    }

    /// The exact key this predicate pins down, when it carries an equality
    /// clause on the collection's key field. Pattern clauses imply no
    /// usable bound.
    pub fn key_bound(&self, key_field: &str) -> Option<&str> {
        self.clauses.iter().find_map(|(field, clause)| match clause {
            Clause::Equals(value) if field == key_field => Some(value.as_str()),
            _ => None,
        })
    }
}

fn looks_like_pattern(value: &str) -> bool {
    value.contains(|c| {
        matches!(
            c,
            '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\'
        )
    })
}
