//! Question model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AuthorRef, ThemeRef};

/// A question in its canonical, normalized shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<ThemeRef>,
}

/// Form state for a question that has not been posted yet.
#[derive(Debug, Clone, Default)]
pub struct QuestionDraft {
    pub title: String,
    pub content: String,
    pub theme_id: Option<String>,
}

/// Request body for inserting a question.
#[derive(Debug, Clone, Serialize)]
pub struct NewQuestion {
    pub title: String,
    pub content: String,
    pub theme_id: String,
    pub author_id: String,
}
