//! Database module for SQLite persistence.
//!
//! SQLite backs the local gateway and the local auth provider.

mod repository;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Themes inserted on first start when seeding is enabled.
pub const DEFAULT_THEMES: &[(&str, &str)] = &[
    ("General", "Anything that fits nowhere else"),
    ("Programming", "Code, tools and languages"),
    ("Science", "Questions about how things work"),
    ("Health", "Body and mind"),
];

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run embedded migrations
    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            email TEXT,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS themes (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Author and theme stay optional: a missing profile shows as anonymous
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS questions (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            author_id TEXT,
            theme_id TEXT,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS responses (
            id TEXT PRIMARY KEY,
            question_id TEXT NOT NULL REFERENCES questions(id),
            author_id TEXT,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS password_resets (
            email TEXT PRIMARY KEY,
            token TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_questions_created_at ON questions(created_at);
        CREATE INDEX IF NOT EXISTS idx_responses_question_id ON responses(question_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_themes_name ON themes(name);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert the default themes if the themes table is empty.
pub async fn seed_themes(pool: &SqlitePool) -> Result<usize, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM themes")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Ok(0);
    }

    for (name, description) in DEFAULT_THEMES {
        sqlx::query("INSERT OR IGNORE INTO themes (id, name, description) VALUES (?, ?, ?)")
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(name)
            .bind(description)
            .execute(pool)
            .await?;
    }

    tracing::info!("Seeded {} default themes", DEFAULT_THEMES.len());
    Ok(DEFAULT_THEMES.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("forum.sqlite");

        let pool = init_database(&db_path).await.unwrap();
        run_migrations(&pool).await.unwrap();

        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_seed_themes_only_once() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("forum.sqlite"))
            .await
            .unwrap();

        assert_eq!(seed_themes(&pool).await.unwrap(), DEFAULT_THEMES.len());
        assert_eq!(seed_themes(&pool).await.unwrap(), 0);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM themes")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count as usize, DEFAULT_THEMES.len());
    }
}
