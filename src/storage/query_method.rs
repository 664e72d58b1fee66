//! Derived query methods
//!
//! Evaluates search methods from their names, e.g.
//! `findByFirstNameStartsWithAndAgeGreaterThan`. Criteria bind to the
//! method's declared parameters by position.

use crate::core::entity::Record;
use crate::core::pluralize::Pluralizer;
use crate::core::query::compare_values;
use serde_json::Value;
use std::cmp::Ordering;
use thiserror::Error;

const PREFIXES: [&str; 4] = ["findAllBy", "findBy", "readBy", "getBy"];

/// Operator suffixes, longest first so `Containing` wins over `Contains`
const OPERATORS: [(&str, Operator); 7] = [
    ("GreaterThan", Operator::GreaterThan),
    ("StartsWith", Operator::StartsWith),
    ("Containing", Operator::Containing),
    ("LessThan", Operator::LessThan),
    ("EndsWith", Operator::EndsWith),
    ("Contains", Operator::Containing),
    ("Equals", Operator::Equals),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryMethodError {
    #[error("'{0}' is not a derived query method (expected findBy...)")]
    UnsupportedPrefix(String),

    #[error("'{method}' has an empty criterion")]
    EmptyCriterion { method: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    StartsWith,
    EndsWith,
    Containing,
    GreaterThan,
    LessThan,
}

/// One `<Property><Operator>[IgnoreCase]` part of a method name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criterion {
    pub property: String,
    pub operator: Operator,
    pub ignore_case: bool,
}

impl Criterion {
    fn parse(method: &str, part: &str) -> Result<Self, QueryMethodError> {
        let (part, ignore_case) = match part.strip_suffix("IgnoreCase") {
            Some(rest) => (rest, true),
            None => (part, false),
        };
        let (property, operator) = OPERATORS
            .iter()
            .find_map(|(suffix, op)| part.strip_suffix(suffix).map(|p| (p, *op)))
            .unwrap_or((part, Operator::Equals));

        if property.is_empty() {
            return Err(QueryMethodError::EmptyCriterion {
                method: method.to_string(),
            });
        }
        Ok(Self {
            property: Pluralizer::uncapitalize(property),
            operator,
            ignore_case,
        })
    }

    /// Whether the record's property satisfies the criterion for `argument`
    pub fn matches(&self, record: &Record, argument: &Value) -> bool {
        let Some(actual) = record.scalar(&self.property) else {
            return false;
        };

        if let (Some(actual), Some(expected)) = (actual.as_str(), argument.as_str()) {
            let (actual, expected) = if self.ignore_case {
                (actual.to_lowercase(), expected.to_lowercase())
            } else {
                (actual.to_string(), expected.to_string())
            };
            return match self.operator {
                Operator::Equals => actual == expected,
                Operator::StartsWith => actual.starts_with(&expected),
                Operator::EndsWith => actual.ends_with(&expected),
                Operator::Containing => actual.contains(&expected),
                Operator::GreaterThan => actual > expected,
                Operator::LessThan => actual < expected,
            };
        }

        match self.operator {
            Operator::Equals => compare_values(actual, argument) == Ordering::Equal,
            Operator::GreaterThan => compare_values(actual, argument) == Ordering::Greater,
            Operator::LessThan => compare_values(actual, argument) == Ordering::Less,
            Operator::StartsWith | Operator::EndsWith | Operator::Containing => false,
        }
    }
}

/// A parsed derived query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMethod {
    pub criteria: Vec<Criterion>,
}

impl QueryMethod {
    pub fn parse(method_name: &str) -> Result<Self, QueryMethodError> {
        let body = PREFIXES
            .iter()
            .find_map(|prefix| method_name.strip_prefix(prefix))
            .ok_or_else(|| QueryMethodError::UnsupportedPrefix(method_name.to_string()))?;

        let criteria = split_and(body)
            .into_iter()
            .map(|part| Criterion::parse(method_name, part))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { criteria })
    }

    /// Evaluate all criteria; a criterion without an argument matches
    pub fn matches(&self, record: &Record, arguments: &[Option<&Value>]) -> bool {
        self.criteria
            .iter()
            .zip(arguments.iter().chain(std::iter::repeat(&None)))
            .all(|(criterion, argument)| match argument {
                Some(argument) => criterion.matches(record, argument),
                None => true,
            })
    }
}

/// Split on `And` where it starts a new capitalized word
fn split_and(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut search_from = 0;
    while let Some(offset) = body[search_from..].find("And") {
        let at = search_from + offset;
        let next_is_upper = body[at + 3..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_uppercase());
        if at > start && next_is_upper {
            parts.push(&body[start..at]);
            start = at + 3;
        }
        search_from = at + 3;
    }
    parts.push(&body[start..]);
    parts
}
