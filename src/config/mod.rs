//! Configuration module for the forum client.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::path::PathBuf;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database backing the local gateway
    pub db_path: PathBuf,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Number of change notifications buffered per subscriber
    pub change_feed_capacity: usize,
    /// Lifetime of a password reset token
    pub reset_token_ttl_minutes: i64,
    /// Insert the default themes on first start
    pub seed_themes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/forum.sqlite"),
            log_level: "info".to_string(),
            change_feed_capacity: 1024,
            reset_token_ttl_minutes: 30,
            seed_themes: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let db_path = env::var("FORUM_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let log_level = env::var("FORUM_LOG_LEVEL").unwrap_or(defaults.log_level);

        let change_feed_capacity = parse_var("FORUM_CHANGE_FEED_CAPACITY")
            .filter(|capacity| *capacity > 0)
            .unwrap_or(defaults.change_feed_capacity);

        let reset_token_ttl_minutes = parse_var("FORUM_RESET_TOKEN_TTL_MINUTES")
            .unwrap_or(defaults.reset_token_ttl_minutes);

        let seed_themes = parse_var("FORUM_SEED_THEMES").unwrap_or(defaults.seed_themes);

        Self {
            db_path,
            log_level,
            change_feed_capacity,
            reset_token_ttl_minutes,
            seed_themes,
        }
    }
}

/// Read and parse an environment variable, ignoring unparsable values.
fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        env::remove_var("FORUM_DB_PATH");
        env::remove_var("FORUM_LOG_LEVEL");
        env::remove_var("FORUM_CHANGE_FEED_CAPACITY");
        env::remove_var("FORUM_RESET_TOKEN_TTL_MINUTES");
        env::remove_var("FORUM_SEED_THEMES");

        let config = Config::from_env();

        assert_eq!(config.db_path, PathBuf::from("./data/forum.sqlite"));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.change_feed_capacity, 1024);
        assert_eq!(config.reset_token_ttl_minutes, 30);
        assert!(config.seed_themes);
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        env::set_var("FORUM_TEST_PARSE_GARBAGE", "not-a-number");
        assert_eq!(parse_var::<usize>("FORUM_TEST_PARSE_GARBAGE"), None);

        env::set_var("FORUM_TEST_PARSE_GARBAGE", " 42 ");
        assert_eq!(parse_var::<usize>("FORUM_TEST_PARSE_GARBAGE"), Some(42));
        env::remove_var("FORUM_TEST_PARSE_GARBAGE");
    }
}
