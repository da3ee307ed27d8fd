//! Planner configuration

use serde::{Deserialize, Serialize};

/// Default bound on AST nesting, sub-queries included
pub const DEFAULT_MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Deepest AST nesting a compilation may reach before failing
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Column names treated as metadata by wildcard projections
    #[serde(default = "default_metadata_fields")]
    pub metadata_fields: Vec<String>,
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_metadata_fields() -> Vec<String> {
    ["_id", "_index", "_score", "_maxscore", "_sort", "_routing"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            metadata_fields: default_metadata_fields(),
        }
    }
}

impl PlannerConfig {
    pub fn is_metadata_field(&self, name: &str) -> bool {
        self.metadata_fields.iter().any(|m| m == name)
    }
}
