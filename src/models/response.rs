//! Response model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AuthorRef;

/// A response to a question in its canonical, normalized shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub id: String,
    pub question_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorRef>,
}

/// Request body for inserting a response.
#[derive(Debug, Clone, Serialize)]
pub struct NewResponse {
    pub question_id: String,
    pub content: String,
    pub author_id: String,
}
