//! Conjunctive metadata filters.
//!
//! A filter is a list of predicates that must all hold. Each predicate
//! names a top-level metadata field and either an equality value or a
//! numeric range. A point missing the field never matches.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single condition on one metadata field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Eq(Value),
    Range { gte: Option<f64>, lte: Option<f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub field: String,
    pub condition: Condition,
}

impl Predicate {
    fn matches(&self, metadata: &Value) -> bool {
        let Some(actual) = metadata.get(&self.field) else {
            return false;
        };
        match &self.condition {
            Condition::Eq(expected) => actual == expected,
            Condition::Range { gte, lte } => {
                let Some(n) = actual.as_f64() else {
                    return false;
                };
                gte.map_or(true, |min| n >= min) && lte.map_or(true, |max| n <= max)
            }
        }
    }
}

/// Conjunction of predicates. The empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub predicates: Vec<Predicate>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`.
    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate {
            field: field.to_string(),
            condition: Condition::Eq(value.into()),
        });
        self
    }

    /// Require `gte <= field <= lte` (either bound optional).
    pub fn range(mut self, field: &str, gte: Option<f64>, lte: Option<f64>) -> Self {
        self.predicates.push(Predicate {
            field: field.to_string(),
            condition: Condition::Range { gte, lte },
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn matches(&self, metadata: &Value) -> bool {
        self.predicates.iter().all(|p| p.matches(metadata))
    }
}
