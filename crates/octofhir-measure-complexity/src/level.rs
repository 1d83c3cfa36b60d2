use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest score still considered low
pub const LOW_MAX: u32 = 3;
/// Highest score still considered medium
pub const MEDIUM_MAX: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
}

impl ComplexityLevel {
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=LOW_MAX => ComplexityLevel::Low,
            s if s <= MEDIUM_MAX => ComplexityLevel::Medium,
            _ => ComplexityLevel::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityLevel::Low => "low",
            ComplexityLevel::Medium => "medium",
            ComplexityLevel::High => "high",
        }
    }
}

impl fmt::Display for ComplexityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
