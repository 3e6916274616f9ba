//! Theme model used to tag questions.

use serde::{Deserialize, Serialize};

/// A theme a question can be filed under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Theme {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Theme reference embedded in a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ThemeRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}
