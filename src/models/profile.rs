//! Profile model for question and response authors.

use serde::{Deserialize, Serialize};

/// A user profile as stored in the `profiles` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Author reference embedded in a question or response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AuthorRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub username: String,
}

impl AuthorRef {
    /// Name shown next to a post, falling back to an anonymous label.
    pub fn display_name(author: Option<&AuthorRef>) -> &str {
        match author {
            Some(a) if !a.username.is_empty() => &a.username,
            _ => "Anonymous",
        }
    }
}

/// Request body for creating a profile.
#[derive(Debug, Clone, Serialize)]
pub struct NewProfile {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}
