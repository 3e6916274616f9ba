//! Row normalization.
//!
//! Backends return embedded relations in whatever shape the join produced: a list for
//! to-many embeds, a bare object for to-one embeds, `null` when nothing matched. Every
//! relation read goes through [`RawRelation`] so callers only ever see `Option<T>`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::models::{AuthorRef, Question, Response, Theme, ThemeRef};

/// Shape of an embedded relation as it arrived on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRelation<'a> {
    Absent,
    One(&'a Value),
    Many(&'a [Value]),
    Malformed(&'a Value),
}

impl<'a> RawRelation<'a> {
    pub fn classify(raw: Option<&'a Value>) -> Self {
        match raw {
            None | Some(Value::Null) => RawRelation::Absent,
            Some(Value::Array(items)) => RawRelation::Many(items),
            Some(value @ Value::Object(_)) => RawRelation::One(value),
            Some(other) => RawRelation::Malformed(other),
        }
    }

    /// Collapse to at most one record. Lists yield their first element.
    pub fn into_single<T: DeserializeOwned>(self) -> Option<T> {
        let value = match self {
            RawRelation::Absent => return None,
            RawRelation::One(value) => value,
            RawRelation::Many(items) => items.first()?,
            RawRelation::Malformed(value) => {
                tracing::debug!(?value, "Ignoring malformed relation");
                return None;
            }
        };

        if !value.is_object() {
            tracing::debug!(?value, "Ignoring non-object relation element");
            return None;
        }
        T::deserialize(value).ok()
    }
}

/// Read one relation field of a raw row.
pub fn relation<T: DeserializeOwned>(row: &Value, field: &str) -> Option<T> {
    RawRelation::classify(row.get(field)).into_single()
}

/// Relation objects may carry nulls or miss fields; those become empty strings.
#[derive(Deserialize)]
struct RawAuthor {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

impl From<RawAuthor> for AuthorRef {
    fn from(raw: RawAuthor) -> Self {
        AuthorRef {
            id: raw.id.unwrap_or_default(),
            username: raw.username.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct RawTheme {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl From<RawTheme> for ThemeRef {
    fn from(raw: RawTheme) -> Self {
        ThemeRef {
            id: raw.id.unwrap_or_default(),
            name: raw.name.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct QuestionRow {
    id: String,
    title: String,
    content: String,
    #[serde(default)]
    author_id: Option<String>,
    #[serde(default)]
    theme_id: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ResponseRow {
    id: String,
    question_id: String,
    #[serde(default)]
    author_id: Option<String>,
    content: String,
    created_at: DateTime<Utc>,
}

/// Normalize a question row. Returns `None` if the base fields cannot be decoded.
pub fn normalize_question(row: &Value) -> Option<Question> {
    let base = match QuestionRow::deserialize(row) {
        Ok(base) => base,
        Err(e) => {
            tracing::warn!("Skipping undecodable question row: {}", e);
            return None;
        }
    };

    Some(Question {
        id: base.id,
        title: base.title,
        content: base.content,
        author_id: base.author_id,
        theme_id: base.theme_id,
        created_at: base.created_at,
        author: relation::<RawAuthor>(row, "author").map(AuthorRef::from),
        theme: relation::<RawTheme>(row, "theme").map(ThemeRef::from),
    })
}

/// Normalize a response row. Returns `None` if the base fields cannot be decoded.
pub fn normalize_response(row: &Value) -> Option<Response> {
    let base = match ResponseRow::deserialize(row) {
        Ok(base) => base,
        Err(e) => {
            tracing::warn!("Skipping undecodable response row: {}", e);
            return None;
        }
    };

    Some(Response {
        id: base.id,
        question_id: base.question_id,
        author_id: base.author_id,
        content: base.content,
        created_at: base.created_at,
        author: relation::<RawAuthor>(row, "author").map(AuthorRef::from),
    })
}

pub fn normalize_questions(rows: Vec<Value>) -> Vec<Question> {
    rows.iter().filter_map(normalize_question).collect()
}

pub fn normalize_responses(rows: Vec<Value>) -> Vec<Response> {
    rows.iter().filter_map(normalize_response).collect()
}

pub fn normalize_themes(rows: Vec<Value>) -> Vec<Theme> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<Theme>(row) {
            Ok(theme) => Some(theme),
            Err(e) => {
                tracing::warn!("Skipping undecodable theme row: {}", e);
                None
            }
        })
        .collect()
}
