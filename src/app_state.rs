//! 应用状态组装
//!
//! 所有组件显式构造、显式注入，没有全局单例。宿主拿到
//! `VaultState` 与回调接收端后即可开始喂入站 URI。

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::domain::chain_config::ChainRegistry;
use crate::infrastructure::encryption::{EncryptionKey, VaultCipher};
use crate::infrastructure::event_bus::{AuditLogHandler, VaultEventBus};
use crate::infrastructure::db;
use crate::service::approval::SurfaceRegistry;
use crate::service::bridge_protocol::BridgeProtocol;
use crate::service::request_arbiter::RequestArbiter;
use crate::service::wallet_store::WalletStore;

pub struct VaultState {
    pub config: Config,
    pub registry: Arc<ChainRegistry>,
    pub bus: Arc<VaultEventBus>,
    pub store: Arc<WalletStore>,
    pub arbiter: Arc<RequestArbiter>,
}

impl VaultState {
    /// 组装整个应用：连库、建表、开库、起仲裁器
    ///
    /// 返回值里的接收端承载出站回调 URI，由宿主负责打开。
    pub async fn build(
        config: Config,
        surfaces: SurfaceRegistry,
    ) -> Result<(Self, mpsc::UnboundedReceiver<String>)> {
        config.validate()?;

        let pool = db::init_pool(&config.storage.database_url, config.storage.max_connections)
            .await?;
        db::init_schema(&pool).await?;

        let key = if let Some(key_str) = &config.vault.key {
            EncryptionKey::from_key_string(key_str)?
        } else if let Some(passphrase) = &config.vault.passphrase {
            let salt = db::load_or_create_salt(&pool).await?;
            EncryptionKey::from_passphrase(passphrase, &salt)?
        } else {
            anyhow::bail!("no vault key configured");
        };

        let registry = Arc::new(ChainRegistry::new());
        let bus = Arc::new(VaultEventBus::new());
        bus.subscribe(Arc::new(AuditLogHandler)).await;

        let store = Arc::new(
            WalletStore::open(pool, VaultCipher::new(key), registry.clone(), bus.clone())
                .await
                .context("Failed to open wallet store")?,
        );

        let protocol = BridgeProtocol::new(
            &config.bridge.scheme_prefix,
            &config.bridge.redirect_base,
        );
        let (arbiter, callback_rx) =
            RequestArbiter::new(protocol, store.clone(), surfaces, bus.clone());

        Ok((
            Self {
                config,
                registry,
                bus,
                store,
                arbiter,
            },
            callback_rx,
        ))
    }

    /// 有序下线：全部待决请求以取消回调收尾
    pub fn shutdown(&self) {
        self.arbiter.shutdown();
        tracing::info!("Vault state shut down");
    }
}
