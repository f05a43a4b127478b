//! 集成测试共用工具

#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

use corevault::config::{BridgeConfig, Config, LoggingConfig, StorageConfig, VaultKeyConfig};
use corevault::service::approval::{ApprovalAction, ApprovalSurface, Decision, SurfaceRegistry};
use corevault::VaultState;

pub const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

pub const TEST_ETH_ADDRESS: &str = "0x9858EfFD232B4033E47d90003D41EC34EcaEda94";

/// 内存库配置
pub fn test_config() -> Config {
    Config {
        storage: StorageConfig {
            database_url: "sqlite::memory:".into(),
            max_connections: 1,
        },
        vault: VaultKeyConfig {
            key: Some("0123456789abcdef0123456789abcdef".into()),
            passphrase: None,
        },
        bridge: BridgeConfig {
            scheme_prefix: "corevault://request?".into(),
            redirect_base: "https://corevault.app/callback".into(),
        },
        logging: LoggingConfig {
            level: "info".into(),
            format: "text".into(),
        },
    }
}

/// 组装一套内存态应用
pub async fn test_state(
    surfaces: SurfaceRegistry,
) -> (VaultState, mpsc::UnboundedReceiver<String>) {
    VaultState::build(test_config(), surfaces)
        .await
        .expect("test state build")
}

/// 构造入站请求 URI
pub fn encode_request(id: u64, payload: serde_json::Value) -> String {
    let b64 = base64::engine::general_purpose::STANDARD.encode(payload.to_string());
    let escaped = b64
        .replace('+', "%2B")
        .replace('/', "%2F")
        .replace('=', "%3D");
    format!("corevault://request?id={id}&payload={escaped}")
}

/// 需要显式放行的审批界面：每次 present 消耗一个许可
pub struct GatedSurface {
    pub gate: Arc<Semaphore>,
    pub decision: Decision,
}

impl GatedSurface {
    pub fn registry(decision: Decision) -> (SurfaceRegistry, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let surface = Arc::new(GatedSurface {
            gate: gate.clone(),
            decision,
        });
        (SurfaceRegistry::uniform(surface), gate)
    }
}

#[async_trait]
impl ApprovalSurface for GatedSurface {
    async fn present(&self, _action: ApprovalAction) -> Decision {
        match self.gate.acquire().await {
            Ok(permit) => {
                permit.forget();
                self.decision.clone()
            }
            Err(_) => Decision::Cancelled,
        }
    }
}
