//! Segment definitions shared by strategies across features.

use serde::{Deserialize, Serialize};

use super::features::Constraint;

/// A reusable set of constraints referenced from strategies by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSegment {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl ClientSegment {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            constraints: Vec::new(),
        }
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }
}
