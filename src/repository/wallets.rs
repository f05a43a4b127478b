//! 钱包持久化仓库
//!
//! 只负责行级读写，不碰明文密钥。密文由服务层加密后传入，
//! 删除前先用零覆盖密文列再删行。

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::wallet::{KeyKind, Wallet};
use crate::error::StorageError;
use crate::infrastructure::VaultPool;

/// 钱包表行
#[derive(Debug, Clone, FromRow)]
pub struct WalletRow {
    pub id: String,
    pub name: String,
    pub key_kind: String,
    pub secret_ciphertext: Vec<u8>,
    pub fingerprint: String,
    pub chains: String,
    pub addresses: String,
    pub position: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl WalletRow {
    /// 行 -> 领域模型（不含密文）
    pub fn into_wallet(self) -> Result<Wallet, StorageError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|_| StorageError::Corrupted(format!("bad wallet id: {}", self.id)))?;
        let key_kind = KeyKind::parse(&self.key_kind)
            .ok_or_else(|| StorageError::Corrupted(format!("bad key_kind: {}", self.key_kind)))?;
        let chains: Vec<i64> = serde_json::from_str(&self.chains)
            .map_err(|e| StorageError::Corrupted(format!("bad chains json: {e}")))?;
        let addresses: HashMap<i64, String> = serde_json::from_str(&self.addresses)
            .map_err(|e| StorageError::Corrupted(format!("bad addresses json: {e}")))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| StorageError::Corrupted(format!("bad created_at: {e}")))?
            .with_timezone(&Utc);

        Ok(Wallet {
            id,
            name: self.name,
            key_kind,
            chains,
            addresses,
            created_at,
        })
    }
}

/// 钱包仓库
pub struct WalletRepository {
    pool: VaultPool,
}

impl WalletRepository {
    pub fn new(pool: VaultPool) -> Self {
        Self { pool }
    }

    /// 插入新钱包，position 取历史最大值加一保证创建顺序稳定
    /// （行数会在删除后与存量 position 撞车，最大值不会）
    pub async fn create(
        &self,
        wallet: &Wallet,
        secret_ciphertext: &[u8],
        fingerprint: &str,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        let (position,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(position), -1) + 1 FROM wallets")
                .fetch_one(&mut *tx)
                .await?;

        let now = Utc::now().to_rfc3339();
        let chains = serde_json::to_string(&wallet.chains)
            .map_err(|e| StorageError::Corrupted(format!("serialize chains: {e}")))?;
        let addresses = serde_json::to_string(&wallet.addresses)
            .map_err(|e| StorageError::Corrupted(format!("serialize addresses: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO wallets
                (id, name, key_kind, secret_ciphertext, fingerprint,
                 chains, addresses, position, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(wallet.id.to_string())
        .bind(&wallet.name)
        .bind(wallet.key_kind.as_str())
        .bind(secret_ciphertext)
        .bind(fingerprint)
        .bind(&chains)
        .bind(&addresses)
        .bind(position)
        .bind(wallet.created_at.to_rfc3339())
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<WalletRow>, StorageError> {
        let row = sqlx::query_as::<_, WalletRow>("SELECT * FROM wallets WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// 指纹是否已入库（按内容去重）
    pub async fn fingerprint_exists(&self, fingerprint: &str) -> Result<bool, StorageError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT id FROM wallets WHERE fingerprint = ?")
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// 按创建顺序列出全部钱包行
    pub async fn list_all(&self) -> Result<Vec<WalletRow>, StorageError> {
        let rows = sqlx::query_as::<_, WalletRow>("SELECT * FROM wallets ORDER BY position ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn rename(&self, id: Uuid, name: &str) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE wallets SET name = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }

    /// 整体替换链集合与地址映射（服务层已先完成全部派生）
    pub async fn update_chains(
        &self,
        id: Uuid,
        chains: &[i64],
        addresses: &HashMap<i64, String>,
    ) -> Result<(), StorageError> {
        let chains_json = serde_json::to_string(chains)
            .map_err(|e| StorageError::Corrupted(format!("serialize chains: {e}")))?;
        let addresses_json = serde_json::to_string(addresses)
            .map_err(|e| StorageError::Corrupted(format!("serialize addresses: {e}")))?;

        let result = sqlx::query(
            "UPDATE wallets SET chains = ?, addresses = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&chains_json)
        .bind(&addresses_json)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }

    /// 删除钱包：先把密文列覆盖为零字节，再删行
    pub async fn delete(&self, id: Uuid) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT secret_ciphertext FROM wallets WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&mut *tx)
                .await?;

        let Some((ciphertext,)) = row else {
            return Err(StorageError::NotFound(id));
        };

        let zeros = vec![0u8; ciphertext.len()];
        sqlx::query("UPDATE wallets SET secret_ciphertext = ? WHERE id = ?")
            .bind(&zeros)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM wallets WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::db;

    async fn test_repo() -> WalletRepository {
        let pool = db::init_pool("sqlite::memory:", 1).await.unwrap();
        db::init_schema(&pool).await.unwrap();
        WalletRepository::new(pool)
    }

    fn sample_wallet(name: &str) -> Wallet {
        Wallet {
            id: Uuid::new_v4(),
            name: name.to_string(),
            key_kind: KeyKind::Mnemonic,
            chains: vec![1, 501],
            addresses: HashMap::from([
                (1, "0xabc".to_string()),
                (501, "So1abc".to_string()),
            ]),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_list_in_order() {
        let repo = test_repo().await;

        for i in 0..3 {
            let wallet = sample_wallet(&format!("wallet {i}"));
            repo.create(&wallet, b"ciphertext", &format!("fp-{i}"))
                .await
                .unwrap();
        }

        let rows = repo.list_all().await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].name, "wallet 0");
        assert_eq!(rows[2].name, "wallet 2");
    }

    #[tokio::test]
    async fn test_order_survives_delete_then_create() {
        let repo = test_repo().await;

        let first = sample_wallet("first");
        let second = sample_wallet("second");
        repo.create(&first, b"ct", "fp-a").await.unwrap();
        repo.create(&second, b"ct", "fp-b").await.unwrap();

        repo.delete(first.id).await.unwrap();

        let third = sample_wallet("third");
        repo.create(&third, b"ct", "fp-c").await.unwrap();

        let rows = repo.list_all().await.unwrap();
        let positions: Vec<i64> = rows.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![1, 2]);
        assert_eq!(rows[0].name, "second");
        assert_eq!(rows[1].name, "third");
    }

    #[tokio::test]
    async fn test_fingerprint_uniqueness() {
        let repo = test_repo().await;

        let wallet = sample_wallet("first");
        repo.create(&wallet, b"ct", "same-fp").await.unwrap();
        assert!(repo.fingerprint_exists("same-fp").await.unwrap());

        let dup = sample_wallet("second");
        let err = repo.create(&dup, b"ct", "same-fp").await.unwrap_err();
        assert!(matches!(err, StorageError::Db(_)));
    }

    #[tokio::test]
    async fn test_rename_missing_wallet() {
        let repo = test_repo().await;
        let err = repo.rename(Uuid::new_v4(), "ghost").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_removes_row() {
        let repo = test_repo().await;

        let wallet = sample_wallet("doomed");
        repo.create(&wallet, b"secret-ct", "fp-del").await.unwrap();

        repo.delete(wallet.id).await.unwrap();
        assert!(repo.get_by_id(wallet.id).await.unwrap().is_none());
        assert!(!repo.fingerprint_exists("fp-del").await.unwrap());
    }

    #[tokio::test]
    async fn test_row_roundtrip_to_domain() {
        let repo = test_repo().await;

        let wallet = sample_wallet("roundtrip");
        repo.create(&wallet, b"ct", "fp-rt").await.unwrap();

        let row = repo.get_by_id(wallet.id).await.unwrap().unwrap();
        let restored = row.into_wallet().unwrap();
        assert_eq!(restored.id, wallet.id);
        assert_eq!(restored.chains, wallet.chains);
        assert_eq!(restored.address_for(1), Some("0xabc"));
    }
}
