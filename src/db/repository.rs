//! Database repository for forum rows and user accounts.
//!
//! Rows are returned as JSON objects with their relations embedded, the same way a hosted
//! backend would hand them to the client.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::errors::AppError;
use crate::gateway::{Collection, Query};

/// Stored account credentials.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: String,
}

/// Format a timestamp so that string order equals time order.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ==================== ROW OPERATIONS ====================

    /// Run a filtered, ordered query against a collection.
    pub async fn fetch_rows(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<Vec<Value>, AppError> {
        let alias = table_alias(collection);
        let mut builder = QueryBuilder::<Sqlite>::new(select_sql(collection));

        for (i, filter) in query.filters.iter().enumerate() {
            ensure_column(collection, &filter.column)?;
            builder.push(if i == 0 { " WHERE " } else { " AND " });
            builder.push(format!("{}.{} = ", alias, filter.column));
            builder.push_bind(filter.value.clone());
        }

        if let Some(order) = &query.order {
            ensure_column(collection, &order.column)?;
            let direction = if order.ascending { "ASC" } else { "DESC" };
            // rowid keeps insertion order stable between equal timestamps
            builder.push(format!(
                " ORDER BY {alias}.{} {direction}, {alias}.rowid {direction}",
                order.column
            ));
        }

        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit as i64);
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|row| row_to_value(collection, row)).collect())
    }

    /// Get a single row by ID.
    pub async fn fetch_row(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Value>, AppError> {
        let rows = self
            .fetch_rows(collection, &Query::new().eq("id", id).limit(1))
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Insert a row and return it as stored, relations embedded.
    pub async fn insert_row(&self, collection: Collection, record: &Value) -> Result<Value, AppError> {
        let fields = record.as_object().ok_or_else(|| {
            AppError::Remote(format!("{} insert expects a JSON object", collection))
        })?;
        let id = optional_text(fields, "id").unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let result = match collection {
            Collection::Questions => {
                sqlx::query(
                    "INSERT INTO questions (id, title, content, author_id, theme_id, created_at) VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(&id)
                .bind(required_text(collection, fields, "title")?)
                .bind(required_text(collection, fields, "content")?)
                .bind(optional_text(fields, "author_id"))
                .bind(optional_text(fields, "theme_id"))
                .bind(created_at(fields)?)
                .execute(&self.pool)
                .await
            }
            Collection::Responses => {
                sqlx::query(
                    "INSERT INTO responses (id, question_id, author_id, content, created_at) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(&id)
                .bind(required_text(collection, fields, "question_id")?)
                .bind(optional_text(fields, "author_id"))
                .bind(required_text(collection, fields, "content")?)
                .bind(created_at(fields)?)
                .execute(&self.pool)
                .await
            }
            Collection::Profiles => {
                sqlx::query("INSERT INTO profiles (id, username, email, created_at) VALUES (?, ?, ?, ?)")
                    .bind(&id)
                    .bind(required_text(collection, fields, "username")?)
                    .bind(optional_text(fields, "email"))
                    .bind(created_at(fields)?)
                    .execute(&self.pool)
                    .await
            }
            Collection::Themes => {
                sqlx::query("INSERT INTO themes (id, name, description) VALUES (?, ?, ?)")
                    .bind(&id)
                    .bind(required_text(collection, fields, "name")?)
                    .bind(optional_text(fields, "description"))
                    .execute(&self.pool)
                    .await
            }
        };
        result.map_err(|e| conflict_or_remote(e, &format!("{} {} already exists", collection, id)))?;

        self.fetch_row(collection, &id)
            .await?
            .ok_or_else(|| AppError::Remote(format!("{} {} vanished after insert", collection, id)))
    }

    /// Delete a row, returning it as it was before deletion.
    pub async fn delete_row(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Value>, AppError> {
        let Some(existing) = self.fetch_row(collection, id).await? else {
            return Ok(None);
        };

        let sql = format!("DELETE FROM {} WHERE id = ?", collection.as_str());
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Ok(Some(existing))
    }

    // ==================== USER OPERATIONS ====================

    /// Create an account. Fails with a conflict if the email is taken.
    pub async fn create_user(&self, email: &str, password_hash: &str) -> Result<UserRecord, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = timestamp(Utc::now());

        sqlx::query("INSERT INTO users (id, email, password_hash, created_at) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(email)
            .bind(password_hash)
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or_remote(e, "An account already exists for this email"))?;

        Ok(UserRecord {
            id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
        })
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, created_at FROM users WHERE email = ? COLLATE NOCASE",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    pub async fn update_password_hash(&self, user_id: &str, password_hash: &str) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    /// Store a reset token, replacing any earlier one for the same email.
    pub async fn store_reset_token(
        &self,
        email: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO password_resets (email, token, expires_at) VALUES (?, ?, ?) ON CONFLICT(email) DO UPDATE SET token = excluded.token, expires_at = excluded.expires_at",
        )
        .bind(email)
        .bind(token)
        .bind(timestamp(expires_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove and return the pending reset token for an email.
    pub async fn take_reset_token(
        &self,
        email: &str,
    ) -> Result<Option<(String, DateTime<Utc>)>, AppError> {
        let row = sqlx::query("SELECT token, expires_at FROM password_resets WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM password_resets WHERE email = ?")
            .bind(email)
            .execute(&self.pool)
            .await?;

        let token: String = row.get("token");
        let expires_at: String = row.get("expires_at");
        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| AppError::Internal(format!("Corrupt reset expiry: {}", e)))?;

        Ok(Some((token, expires_at)))
    }
}

// ==================== HELPER FUNCTIONS ====================

fn table_alias(collection: Collection) -> &'static str {
    match collection {
        Collection::Questions => "q",
        Collection::Responses => "r",
        Collection::Profiles => "p",
        Collection::Themes => "t",
    }
}

fn select_sql(collection: Collection) -> &'static str {
    match collection {
        Collection::Questions => {
            "SELECT q.id, q.title, q.content, q.author_id, q.theme_id, q.created_at, \
             p.id AS author_ref_id, p.username AS author_username, \
             t.id AS theme_ref_id, t.name AS theme_name \
             FROM questions q \
             LEFT JOIN profiles p ON p.id = q.author_id \
             LEFT JOIN themes t ON t.id = q.theme_id"
        }
        Collection::Responses => {
            "SELECT r.id, r.question_id, r.author_id, r.content, r.created_at, \
             p.id AS author_ref_id, p.username AS author_username \
             FROM responses r \
             LEFT JOIN profiles p ON p.id = r.author_id"
        }
        Collection::Profiles => "SELECT p.id, p.username, p.email FROM profiles p",
        Collection::Themes => "SELECT t.id, t.name, t.description FROM themes t",
    }
}

fn ensure_column(collection: Collection, column: &str) -> Result<(), AppError> {
    if collection.has_column(column) {
        Ok(())
    } else {
        Err(AppError::Remote(format!(
            "Unknown column {} on {}",
            column, collection
        )))
    }
}

/// Convert a database row to JSON.
///
/// Questions embed their relations as lists (to-many shape), responses as a single object.
fn row_to_value(collection: Collection, row: &SqliteRow) -> Value {
    match collection {
        Collection::Questions => {
            let author: Option<String> = row.get("author_ref_id");
            let theme: Option<String> = row.get("theme_ref_id");
            json!({
                "id": row.get::<String, _>("id"),
                "title": row.get::<String, _>("title"),
                "content": row.get::<String, _>("content"),
                "author_id": row.get::<Option<String>, _>("author_id"),
                "theme_id": row.get::<Option<String>, _>("theme_id"),
                "created_at": row.get::<String, _>("created_at"),
                "author": author.map_or_else(Vec::new, |id| vec![json!({
                    "id": id,
                    "username": row.get::<Option<String>, _>("author_username"),
                })]),
                "theme": theme.map_or_else(Vec::new, |id| vec![json!({
                    "id": id,
                    "name": row.get::<Option<String>, _>("theme_name"),
                })]),
            })
        }
        Collection::Responses => {
            let author: Option<String> = row.get("author_ref_id");
            json!({
                "id": row.get::<String, _>("id"),
                "question_id": row.get::<String, _>("question_id"),
                "author_id": row.get::<Option<String>, _>("author_id"),
                "content": row.get::<String, _>("content"),
                "created_at": row.get::<String, _>("created_at"),
                "author": author.map(|id| json!({
                    "id": id,
                    "username": row.get::<Option<String>, _>("author_username"),
                })),
            })
        }
        Collection::Profiles => json!({
            "id": row.get::<String, _>("id"),
            "username": row.get::<String, _>("username"),
            "email": row.get::<Option<String>, _>("email"),
        }),
        Collection::Themes => json!({
            "id": row.get::<String, _>("id"),
            "name": row.get::<String, _>("name"),
            "description": row.get::<Option<String>, _>("description"),
        }),
    }
}

fn user_from_row(row: &SqliteRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        created_at: row.get("created_at"),
    }
}

fn optional_text(fields: &Map<String, Value>, name: &str) -> Option<String> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required_text(
    collection: Collection,
    fields: &Map<String, Value>,
    name: &str,
) -> Result<String, AppError> {
    optional_text(fields, name)
        .ok_or_else(|| AppError::Remote(format!("{}.{} is required", collection, name)))
}

/// Use the client-supplied creation time if present, otherwise now.
fn created_at(fields: &Map<String, Value>) -> Result<String, AppError> {
    match optional_text(fields, "created_at") {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|d| timestamp(d.with_timezone(&Utc)))
            .map_err(|e| AppError::Remote(format!("Invalid created_at {:?}: {}", raw, e))),
        None => Ok(timestamp(Utc::now())),
    }
}

fn conflict_or_remote(err: sqlx::Error, conflict_message: &str) -> AppError {
    let is_unique = err
        .as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false);

    if is_unique {
        AppError::Conflict(conflict_message.to_string())
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use tempfile::TempDir;

    async fn repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .unwrap();
        (Repository::new(pool), temp_dir)
    }

    #[test]
    fn test_timestamp_orders_lexicographically() {
        let early = DateTime::parse_from_rfc3339("2024-01-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let late = DateTime::parse_from_rfc3339("2024-01-01T10:00:00.5+00:00")
            .unwrap()
            .with_timezone(&Utc);
        assert!(timestamp(early) < timestamp(late));
        assert_eq!(timestamp(early), "2024-01-01T09:00:00.000000Z");
    }

    #[tokio::test]
    async fn test_question_relations_are_embedded_as_lists() {
        let (repo, _dir) = repo().await;
        repo.insert_row(Collection::Profiles, &json!({ "id": "u1", "username": "alice" }))
            .await
            .unwrap();
        let theme = repo
            .insert_row(Collection::Themes, &json!({ "name": "Rust" }))
            .await
            .unwrap();

        let question = repo
            .insert_row(
                Collection::Questions,
                &json!({
                    "title": "Lifetimes?",
                    "content": "How do they work",
                    "author_id": "u1",
                    "theme_id": theme["id"],
                }),
            )
            .await
            .unwrap();

        assert_eq!(question["author"], json!([{ "id": "u1", "username": "alice" }]));
        assert_eq!(question["theme"][0]["name"], "Rust");
    }

    #[tokio::test]
    async fn test_response_author_is_single_object_or_null() {
        let (repo, _dir) = repo().await;
        let question = repo
            .insert_row(Collection::Questions, &json!({ "title": "t", "content": "c" }))
            .await
            .unwrap();

        let response = repo
            .insert_row(
                Collection::Responses,
                &json!({ "question_id": question["id"], "content": "hi", "author_id": "ghost" }),
            )
            .await
            .unwrap();

        assert_eq!(response["author_id"], "ghost");
        assert!(response["author"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_column_rejected() {
        let (repo, _dir) = repo().await;
        let err = repo
            .fetch_rows(Collection::Themes, &Query::new().eq("name; DROP TABLE themes", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Remote(_)));
    }

    #[tokio::test]
    async fn test_response_requires_existing_question() {
        let (repo, _dir) = repo().await;
        let err = repo
            .insert_row(
                Collection::Responses,
                &json!({ "question_id": "missing", "content": "orphan" }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Remote(_)));
    }

    #[tokio::test]
    async fn test_duplicate_user_is_conflict() {
        let (repo, _dir) = repo().await;
        repo.create_user("a@example.com", "hash").await.unwrap();
        let err = repo.create_user("a@example.com", "hash").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_reset_token_is_single_use() {
        let (repo, _dir) = repo().await;
        let expires = Utc::now();
        repo.store_reset_token("a@example.com", "first", expires)
            .await
            .unwrap();
        repo.store_reset_token("a@example.com", "second", expires)
            .await
            .unwrap();

        let (token, _) = repo.take_reset_token("a@example.com").await.unwrap().unwrap();
        assert_eq!(token, "second");
        assert!(repo.take_reset_token("a@example.com").await.unwrap().is_none());
    }
}
