//! 钱包库服务
//!
//! 所有钱包增删改查的唯一入口。密钥材料只在本服务内部以明文出现，
//! 落盘前总是先加密；每一次成功的变更在返回前恰好发布一条
//! WalletsChanged 事件。
//!
//! 并发约束：变更操作串行化（write_lock），读操作走内存缓存，
//! 缓存按创建顺序排列。

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::domain::chain_config::ChainRegistry;
use crate::domain::derivation::derive_account;
use crate::domain::wallet::{KeyKind, Wallet, WalletChangeSet, WalletSecret};
use crate::error::{GenerationError, StorageError, ValidationError, VaultError};
use crate::infrastructure::event_bus::{VaultEvent, VaultEventBus};
use crate::infrastructure::{VaultCipher, VaultPool};
use crate::repository::WalletRepository;
use crate::service::key_material::{KeyMaterialCodec, ValidationResult};

pub struct WalletStore {
    repo: WalletRepository,
    cipher: VaultCipher,
    registry: Arc<ChainRegistry>,
    bus: Arc<VaultEventBus>,
    // 创建顺序缓存
    wallets: RwLock<Vec<Wallet>>,
    // 串行化所有变更
    write_lock: Mutex<()>,
}

impl WalletStore {
    /// 打开钱包库：加载全部记录并做完整性检查
    ///
    /// 任何已存在记录的密文缺失（空或全零）都视为存储被破坏，
    /// 返回 Corrupted，调用方必须按致命错误处理。
    pub async fn open(
        pool: VaultPool,
        cipher: VaultCipher,
        registry: Arc<ChainRegistry>,
        bus: Arc<VaultEventBus>,
    ) -> Result<Self, StorageError> {
        let repo = WalletRepository::new(pool);
        let rows = repo.list_all().await?;

        let mut wallets = Vec::with_capacity(rows.len());
        for row in rows {
            if row.secret_ciphertext.is_empty()
                || row.secret_ciphertext.iter().all(|&b| b == 0)
            {
                return Err(StorageError::Corrupted(format!(
                    "wallet {} has no secret ciphertext",
                    row.id
                )));
            }
            wallets.push(row.into_wallet()?);
        }

        tracing::info!(count = wallets.len(), "Wallet store opened");

        Ok(Self {
            repo,
            cipher,
            registry,
            bus,
            wallets: RwLock::new(wallets),
            write_lock: Mutex::new(()),
        })
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 校验与导入
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 校验导入素材
    ///
    /// 结构判定之上再查指纹：内容已入库的素材直接报 AlreadyPresent，
    /// 让界面在用户输入阶段就能拦下重复导入。
    pub async fn validate_import(&self, input: &str) -> Result<ValidationResult, VaultError> {
        let result = KeyMaterialCodec::validate(input)?;

        match result {
            ValidationResult::ValidMnemonic | ValidationResult::ValidPrivateKey => {
                let secret = KeyMaterialCodec::parse_secret(input)?;
                let fingerprint = self.cipher.fingerprint(&secret.canonical_bytes());
                if self.repo.fingerprint_exists(&fingerprint).await? {
                    return Ok(ValidationResult::AlreadyPresent);
                }
                Ok(result)
            }
            // keystore 的内容要解密后才能比对
            other => Ok(other),
        }
    }

    /// 导入钱包（素材已解析为密钥材料）
    ///
    /// 全部链的地址先派生成功才会写库：任何一条链失败，整个导入
    /// 失败且不留痕迹。
    pub async fn import_wallet(
        &self,
        name: &str,
        secret: WalletSecret,
        chains: &[i64],
    ) -> Result<Wallet, VaultError> {
        let _guard = self.write_lock.lock().await;

        if chains.is_empty() {
            return Err(StorageError::EmptyChainSet.into());
        }
        if secret.kind() == KeyKind::PrivateKey && chains.len() != 1 {
            return Err(ValidationError::PrivateKeyNeedsSingleChain.into());
        }

        let addresses = self.derive_all(&secret, chains)?;

        let fingerprint = self.cipher.fingerprint(&secret.canonical_bytes());
        if self.repo.fingerprint_exists(&fingerprint).await? {
            return Err(StorageError::AlreadyPresent.into());
        }

        let ciphertext = self
            .cipher
            .encrypt(&secret.canonical_bytes())
            .map_err(|e| StorageError::Crypto(e.to_string()))?;

        let wallet = Wallet {
            id: Uuid::new_v4(),
            name: name.to_string(),
            key_kind: secret.kind(),
            chains: chains.to_vec(),
            addresses,
            created_at: chrono::Utc::now(),
        };

        self.repo.create(&wallet, &ciphertext, &fingerprint).await?;

        self.wallets.write().await.push(wallet.clone());
        self.publish_change(WalletChangeSet::inserted(wallet.id));

        tracing::info!(wallet_id = %wallet.id, kind = ?wallet.key_kind, "Wallet imported");
        Ok(wallet)
    }

    /// 生成新助记词并直接建库
    pub async fn create_mnemonic_wallet(
        &self,
        name: &str,
        chains: &[i64],
    ) -> Result<(Wallet, Zeroizing<String>), VaultError> {
        let phrase = KeyMaterialCodec::generate_mnemonic(12)?;
        let secret = WalletSecret::Mnemonic(phrase.to_string());
        let wallet = self.import_wallet(name, secret, chains).await?;
        Ok((wallet, phrase))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 查询
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 按创建顺序列出全部钱包
    pub async fn all(&self) -> Vec<Wallet> {
        self.wallets.read().await.clone()
    }

    pub async fn get(&self, id: Uuid) -> Result<Wallet, StorageError> {
        self.wallets
            .read()
            .await
            .iter()
            .find(|w| w.id == id)
            .cloned()
            .ok_or(StorageError::NotFound(id))
    }

    /// 导出密钥材料（助记词短语或 0x 私钥）
    pub async fn export_secret(&self, id: Uuid) -> Result<Zeroizing<String>, VaultError> {
        let secret = self.load_secret(id).await?;
        Ok(secret.reveal())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 变更
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn rename(&self, id: Uuid, name: &str) -> Result<(), VaultError> {
        let _guard = self.write_lock.lock().await;

        self.repo.rename(id, name).await?;

        {
            let mut wallets = self.wallets.write().await;
            if let Some(wallet) = wallets.iter_mut().find(|w| w.id == id) {
                wallet.name = name.to_string();
            }
        }
        self.publish_change(WalletChangeSet::updated(id));
        Ok(())
    }

    /// 原子替换钱包的链集合
    ///
    /// 新集合里每条链的地址先全部派生完，再一次性落库。中途任何
    /// 失败都不会改变已存状态。
    pub async fn update_chains(&self, id: Uuid, chains: &[i64]) -> Result<Wallet, VaultError> {
        let _guard = self.write_lock.lock().await;

        if chains.is_empty() {
            return Err(StorageError::EmptyChainSet.into());
        }

        let wallet = self.get(id).await?;
        if wallet.key_kind == KeyKind::PrivateKey && chains.len() != 1 {
            return Err(ValidationError::PrivateKeyNeedsSingleChain.into());
        }

        let secret = self.load_secret(id).await?;
        let addresses = self.derive_all(&secret, chains)?;

        self.repo.update_chains(id, chains, &addresses).await?;

        let updated = {
            let mut wallets = self.wallets.write().await;
            let wallet = wallets
                .iter_mut()
                .find(|w| w.id == id)
                .ok_or(StorageError::NotFound(id))?;
            wallet.chains = chains.to_vec();
            wallet.addresses = addresses;
            wallet.clone()
        };

        self.publish_change(WalletChangeSet::updated(id));
        Ok(updated)
    }

    /// 删除钱包，密文先覆盖再删行
    pub async fn delete(&self, id: Uuid) -> Result<(), VaultError> {
        let _guard = self.write_lock.lock().await;

        self.repo.delete(id).await?;

        self.wallets.write().await.retain(|w| w.id != id);
        self.publish_change(WalletChangeSet::deleted(id));

        tracing::info!(wallet_id = %id, "Wallet deleted");
        Ok(())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 内部
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 为给定链集合逐条派生地址，全成才返回
    fn derive_all(
        &self,
        secret: &WalletSecret,
        chains: &[i64],
    ) -> Result<HashMap<i64, String>, VaultError> {
        let mut addresses = HashMap::with_capacity(chains.len());
        for &chain_id in chains {
            let config = self
                .registry
                .get_by_chain_id(chain_id)
                .ok_or_else(|| GenerationError::UnknownChain(chain_id.to_string()))?;
            let account = derive_account(secret, config)?;
            addresses.insert(chain_id, account.address);
        }
        Ok(addresses)
    }

    /// 从库里取出并解密密钥材料
    async fn load_secret(&self, id: Uuid) -> Result<WalletSecret, VaultError> {
        let row = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or(StorageError::NotFound(id))?;

        let kind = KeyKind::parse(&row.key_kind)
            .ok_or_else(|| StorageError::Corrupted(format!("bad key_kind: {}", row.key_kind)))?;

        let plaintext = Zeroizing::new(
            self.cipher
                .decrypt(&row.secret_ciphertext)
                .map_err(|e| StorageError::Crypto(e.to_string()))?,
        );

        WalletSecret::from_canonical_bytes(kind, &plaintext)
            .ok_or_else(|| StorageError::Corrupted("secret does not match key kind".into()).into())
    }

    fn publish_change(&self, changes: WalletChangeSet) {
        if let Err(e) = self.bus.publish(VaultEvent::WalletsChanged(changes)) {
            tracing::error!("Failed to publish wallet change: {e}");
        }
    }
}
