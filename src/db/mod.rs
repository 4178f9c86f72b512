pub mod catalog;
pub mod models;
pub mod prices;
pub mod repair;
pub mod writer;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::DB_BUSY_TIMEOUT_SECS;
use crate::error::Result;

/// Open (creating if needed) the SQLite file and apply migrations.
/// WAL plus a busy timeout let both jobs and the admin API write concurrently.
pub async fn connect(db_path: &str) -> Result<SqlitePool> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let opts = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(DB_BUSY_TIMEOUT_SECS))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new().connect_with(opts).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
pub(crate) mod test_support {
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    /// Migrated in-memory database. One connection, so every query sees the same data.
    pub async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migrations");
        pool
    }

    /// Insert items with explicit ids `1..=n`, named `item-{id}`.
    pub async fn seed_items(pool: &SqlitePool, n: i64) {
        for id in 1..=n {
            sqlx::query("INSERT INTO items (id, name, market_hash_name) VALUES (?, ?, ?)")
                .bind(id)
                .bind(format!("Item {id}"))
                .bind(format!("item-{id}"))
                .execute(pool)
                .await
                .expect("seed item");
        }
    }

    pub async fn seed_platform(pool: &SqlitePool, item_id: i64, name: &str, platform_item_id: &str) -> i64 {
        sqlx::query("INSERT INTO platforms (item_id, name, platform_item_id) VALUES (?, ?, ?)")
            .bind(item_id)
            .bind(name)
            .bind(platform_item_id)
            .execute(pool)
            .await
            .expect("seed platform")
            .last_insert_rowid()
    }

    pub async fn count_prices(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM prices")
            .fetch_one(pool)
            .await
            .expect("count prices")
    }
}
