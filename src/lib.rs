//! CoreVault - 本地多链钱包库
//!
//! 在单机上管理多条链的密钥材料：导入/生成钱包、按链派生地址、
//! 静态加密存储，并通过 URL-scheme 桥接外部应用的签名请求。
//! 不构造交易、不广播、不连任何链上 RPC。

pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod repository;
pub mod service;

pub use app_state::VaultState;
pub use config::Config;
pub use error::{
    DecodeError, DecryptError, GenerationError, StorageError, ValidationError, VaultError,
};

/// 常用类型一站式导入
pub mod prelude {
    pub use crate::app_state::VaultState;
    pub use crate::config::Config;
    pub use crate::domain::chain_config::{ChainConfig, ChainRegistry, CurveType};
    pub use crate::domain::wallet::{KeyKind, Wallet, WalletChangeSet, WalletSecret};
    pub use crate::error::VaultError;
    pub use crate::infrastructure::event_bus::{VaultEvent, VaultEventBus};
    pub use crate::service::approval::{ApprovalAction, ApprovalSurface, Decision, SurfaceRegistry};
    pub use crate::service::bridge_protocol::{BridgeProtocol, InboundRequest, OperationKind};
    pub use crate::service::key_material::{KeyMaterialCodec, ValidationResult};
    pub use crate::service::request_arbiter::RequestArbiter;
    pub use crate::service::wallet_store::WalletStore;
}
