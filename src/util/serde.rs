//! Serializable identifiers and priority classes shared across components.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier assigned to a request on submission.
pub type RequestId = String;

/// Generate a fresh request identifier (`req_<uuid>`).
#[must_use]
pub fn new_request_id() -> RequestId {
    format!("req_{}", uuid::Uuid::new_v4().simple())
}

/// Priority class used to order pending work.
///
/// Declaration order drives `Ord`: `High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Background work, dispatched last.
    Low,
    /// Default interactive work.
    Medium,
    /// Work that should jump ahead of everything else.
    High,
}

impl Priority {
    /// All classes, highest first.
    pub const ALL: [Self; 3] = [Self::High, Self::Medium, Self::Low];

    /// Stable uppercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
