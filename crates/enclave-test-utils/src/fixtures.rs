//! Database fixtures.

use chrono::Utc;
use common::UserId;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// In-memory SQLite pool with the schema applied.
///
/// A single connection that never expires, so the database lives as long as
/// the pool.
pub async fn test_pool() -> Result<SqlitePool, anyhow::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("../../migrations").run(&pool).await?;
    Ok(pool)
}

/// Insert a user and return its id.
pub async fn create_user(pool: &SqlitePool, username: &str) -> Result<UserId, anyhow::Error> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO users (username, display_name, created_at) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(username)
    .bind(username)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(UserId(id))
}

/// Insert one user per name, in order.
pub async fn create_users(
    pool: &SqlitePool,
    usernames: &[&str],
) -> Result<Vec<UserId>, anyhow::Error> {
    let mut ids = Vec::with_capacity(usernames.len());
    for username in usernames {
        ids.push(create_user(pool, username).await?);
    }
    Ok(ids)
}
