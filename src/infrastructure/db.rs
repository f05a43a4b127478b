//! 数据库连接管理
//!
//! 本地 SQLite 存储：钱包表 + 元数据表。表结构在启动时建好，
//! 不依赖外部迁移工具。

use anyhow::{Context, Result};
use rand::RngCore;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;

pub type VaultPool = Pool<Sqlite>;

/// 初始化数据库连接池
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<VaultPool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .context("Invalid database URL")?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Database pool initialized: {}", database_url);

    Ok(pool)
}

/// 建表（存在则跳过）
pub async fn init_schema(pool: &VaultPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS wallets (
            id                TEXT PRIMARY KEY,
            name              TEXT NOT NULL,
            key_kind          TEXT NOT NULL,
            secret_ciphertext BLOB NOT NULL,
            fingerprint       TEXT NOT NULL UNIQUE,
            chains            TEXT NOT NULL,
            addresses         TEXT NOT NULL,
            position          INTEGER NOT NULL,
            created_at        TEXT NOT NULL,
            updated_at        TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create wallets table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vault_meta (
            key   TEXT PRIMARY KEY,
            value BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create vault_meta table")?;

    Ok(())
}

/// 读取或生成库级盐（用于口令派生主密钥）
pub async fn load_or_create_salt(pool: &VaultPool) -> Result<Vec<u8>> {
    let existing: Option<(Vec<u8>,)> =
        sqlx::query_as("SELECT value FROM vault_meta WHERE key = 'kdf_salt'")
            .fetch_optional(pool)
            .await
            .context("Failed to read kdf salt")?;

    if let Some((salt,)) = existing {
        return Ok(salt);
    }

    let mut salt = vec![0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);

    sqlx::query("INSERT INTO vault_meta (key, value) VALUES ('kdf_salt', ?)")
        .bind(&salt)
        .execute(pool)
        .await
        .context("Failed to persist kdf salt")?;

    Ok(salt)
}

/// 数据库健康检查
pub async fn health_check(pool: &VaultPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .context("Database health check failed")?;
    Ok(())
}
