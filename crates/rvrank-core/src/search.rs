use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::categories::Category;

/// Listing condition filter understood by the search endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    New,
    Used,
}

impl Condition {
    /// Single-letter code sent as the `condition` query parameter.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Condition::New => "N",
            Condition::Used => "U",
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "n" | "new" => Ok(Condition::New),
            "u" | "used" => Ok(Condition::Used),
            other => Err(format!("unknown condition '{other}' (expected N or U)")),
        }
    }
}

/// One logical search. Every rank is relative to exactly one `SearchContext`;
/// ranks from different contexts are not comparable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchContext {
    pub zip: String,
    pub radius_miles: u32,
    pub category: Category,
    pub condition: Condition,
}

impl SearchContext {
    #[must_use]
    pub fn new(zip: &str, radius_miles: u32, category: Category, condition: Condition) -> Self {
        Self {
            zip: zip.trim().to_owned(),
            radius_miles,
            category,
            condition,
        }
    }
}

impl std::fmt::Display for SearchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} near {} ({} mi, condition {})",
            self.category, self.zip, self.radius_miles, self.condition
        )
    }
}
