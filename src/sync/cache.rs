//! Question list and per-question response cache.

use std::collections::HashMap;

use crate::models::{Question, Response};

/// Questions in display order (newest first). Only ever replaced wholesale.
#[derive(Debug, Clone, Default)]
pub struct QuestionList {
    items: Vec<Question>,
}

impl QuestionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, items: Vec<Question>) {
        self.items = items;
    }

    pub fn get(&self, id: &str) -> Option<&Question> {
        self.items.iter().find(|q| q.id == id)
    }

    pub fn as_slice(&self) -> &[Question] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Responses keyed by question, each entry ordered by creation time ascending.
#[derive(Debug, Clone, Default)]
pub struct ResponseCache {
    entries: HashMap<String, Vec<Response>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entry for a question. The sort is stable, so rows with equal
    /// timestamps keep the order the backend returned them in.
    pub fn replace(&mut self, question_id: &str, mut responses: Vec<Response>) {
        responses.sort_by_key(|r| r.created_at);
        self.entries.insert(question_id.to_string(), responses);
    }

    /// Insert a single response at its chronological position.
    ///
    /// Returns `false` if the response is already cached.
    pub fn append(&mut self, response: Response) -> bool {
        let entry = self.entries.entry(response.question_id.clone()).or_default();
        if entry.iter().any(|r| r.id == response.id) {
            return false;
        }
        let at = entry.partition_point(|r| r.created_at <= response.created_at);
        entry.insert(at, response);
        true
    }

    pub fn get(&self, question_id: &str) -> Option<&[Response]> {
        self.entries.get(question_id).map(Vec::as_slice)
    }

    pub fn contains(&self, question_id: &str) -> bool {
        self.entries.contains_key(question_id)
    }

    /// Whether the entry is missing or holds no responses.
    pub fn is_empty_for(&self, question_id: &str) -> bool {
        self.entries.get(question_id).map_or(true, Vec::is_empty)
    }

    /// Questions that currently have an entry.
    pub fn question_ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    fn at(minutes: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + Duration::minutes(minutes)
    }

    fn response(id: &str, question_id: &str, minutes: i64) -> Response {
        Response {
            id: id.to_string(),
            question_id: question_id.to_string(),
            author_id: None,
            content: format!("body of {}", id),
            created_at: at(minutes),
            author: None,
        }
    }

    fn ids(cache: &ResponseCache, question_id: &str) -> Vec<String> {
        cache
            .get(question_id)
            .unwrap_or_default()
            .iter()
            .map(|r| r.id.clone())
            .collect()
    }

    #[test]
    fn test_replace_sorts_by_creation_time() {
        let mut cache = ResponseCache::new();
        cache.replace(
            "q1",
            vec![response("c", "q1", 3), response("a", "q1", 1), response("b", "q1", 2)],
        );
        assert_eq!(ids(&cache, "q1"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_replace_keeps_backend_order_for_ties() {
        let mut cache = ResponseCache::new();
        cache.replace("q1", vec![response("y", "q1", 1), response("x", "q1", 1)]);
        assert_eq!(ids(&cache, "q1"), vec!["y", "x"]);
    }

    #[test]
    fn test_append_keeps_order_and_dedupes() {
        let mut cache = ResponseCache::new();
        cache.replace("q1", vec![response("a", "q1", 1), response("c", "q1", 3)]);

        assert!(cache.append(response("b", "q1", 2)));
        assert!(cache.append(response("d", "q1", 3)));
        assert!(!cache.append(response("b", "q1", 2)));

        assert_eq!(ids(&cache, "q1"), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_append_creates_entry() {
        let mut cache = ResponseCache::new();
        assert!(cache.is_empty_for("q2"));
        cache.append(response("a", "q2", 0));
        assert!(cache.contains("q2"));
        assert!(!cache.is_empty_for("q2"));
    }

    #[test]
    fn test_empty_replace_is_an_entry() {
        let mut cache = ResponseCache::new();
        cache.replace("absent", Vec::new());
        assert!(cache.contains("absent"));
        assert_eq!(cache.get("absent").map(<[Response]>::len), Some(0));
    }

    #[test]
    fn test_question_list_replace() {
        let mut list = QuestionList::new();
        assert!(list.is_empty());
        list.replace(vec![Question {
            id: "q1".into(),
            title: "t".into(),
            content: "c".into(),
            author_id: None,
            theme_id: None,
            created_at: at(0),
            author: None,
            theme: None,
        }]);
        assert_eq!(list.len(), 1);
        assert!(list.get("q1").is_some());
        list.replace(Vec::new());
        assert!(list.get("q1").is_none());
    }
}
