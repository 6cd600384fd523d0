use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, FromRow, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_digest: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Keyword {
    pub id: i64,
    pub user_id: i64,
    pub keyword: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Keyword {
    pub const MAX_LEN: usize = 100;

    /// Problems with a keyword text, empty when it can be saved.
    pub fn validate_text(text: &str) -> Vec<String> {
        let len = text.chars().count();
        let mut errors = Vec::new();

        if text.trim().is_empty() {
            errors.push("Keyword can't be blank".to_string());
        }
        if len == 0 {
            errors.push("Keyword is too short (minimum is 1 character)".to_string());
        } else if len > Self::MAX_LEN {
            errors.push(format!(
                "Keyword is too long (maximum is {} characters)",
                Self::MAX_LEN
            ));
        }

        errors
    }
}

pub struct Database {
    pool: SqlitePool,
}

/// Fixed-width UTC timestamps so that text comparison in SQL follows time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Every connection to `sqlite::memory:` opens its own empty database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                password_digest TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS keywords (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                keyword TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(user_id, keyword)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_keywords_user_created
            ON keywords(user_id, created_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns `None` when the email is already registered.
    pub async fn create_user(
        &self,
        email: &str,
        password_digest: &str,
    ) -> anyhow::Result<Option<User>> {
        let now = timestamp(Utc::now());
        let result = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_digest, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(email)
        .bind(password_digest)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(user) => Ok(Some(user)),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Opens a session for `user_id` and returns its token.
    pub async fn create_session(&self, user_id: i64, ttl: Duration) -> anyhow::Result<String> {
        let token = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, created_at, expires_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&token)
        .bind(user_id)
        .bind(timestamp(now))
        .bind(timestamp(now + ttl))
        .execute(&self.pool)
        .await?;

        Ok(token)
    }

    /// Looks up the owner of a live session. Expired sessions count as absent.
    pub async fn find_session_user(&self, token: &str) -> anyhow::Result<Option<User>> {
        let now = timestamp(Utc::now());
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT users.* FROM sessions
            JOIN users ON users.id = sessions.user_id
            WHERE sessions.id = ? AND sessions.expires_at > ?
            "#,
        )
        .bind(token)
        .bind(&now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Returns `true` if a live session was removed.
    pub async fn delete_session(&self, token: &str) -> anyhow::Result<bool> {
        let now = timestamp(Utc::now());
        let result = sqlx::query("DELETE FROM sessions WHERE id = ? AND expires_at > ?")
            .bind(token)
            .bind(&now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn purge_expired_sessions(&self) -> anyhow::Result<u64> {
        let now = timestamp(Utc::now());
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(&now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// A user's keywords, newest first.
    pub async fn list_keywords(&self, user_id: i64) -> anyhow::Result<Vec<Keyword>> {
        let keywords = sqlx::query_as::<_, Keyword>(
            r#"
            SELECT * FROM keywords
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(keywords)
    }

    /// A user's keyword texts in creation order, as fed to the article query.
    pub async fn keyword_texts_for_user(&self, user_id: i64) -> anyhow::Result<Vec<String>> {
        let texts: Vec<(String,)> =
            sqlx::query_as("SELECT keyword FROM keywords WHERE user_id = ? ORDER BY id")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(texts.into_iter().map(|(text,)| text).collect())
    }

    pub async fn get_keyword(&self, keyword_id: i64) -> anyhow::Result<Option<Keyword>> {
        let keyword = sqlx::query_as::<_, Keyword>("SELECT * FROM keywords WHERE id = ?")
            .bind(keyword_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(keyword)
    }

    /// Returns `None` when the user already has this keyword.
    pub async fn create_keyword(
        &self,
        user_id: i64,
        keyword: &str,
    ) -> anyhow::Result<Option<Keyword>> {
        let now = timestamp(Utc::now());
        let result = sqlx::query_as::<_, Keyword>(
            r#"
            INSERT INTO keywords (user_id, keyword, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(keyword)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(keyword) => Ok(Some(keyword)),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete_keyword(&self, keyword_id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM keywords WHERE id = ?")
            .bind(keyword_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
