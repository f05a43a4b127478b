//! 钱包领域模型
//!
//! 定义钱包记录、密钥材料与变更集。密钥材料在内存中始终以
//! Zeroize 包装持有，drop 时自动清零。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// 密钥材料类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// BIP39 助记词 (可派生多链)
    Mnemonic,
    /// 裸私钥 (绑定单链)
    PrivateKey,
}

impl KeyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyKind::Mnemonic => "mnemonic",
            KeyKind::PrivateKey => "private_key",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mnemonic" => Some(KeyKind::Mnemonic),
            "private_key" => Some(KeyKind::PrivateKey),
            _ => None,
        }
    }
}

/// 钱包密钥材料
///
/// 助记词以规范化短语保存（小写、单空格分隔），私钥保存原始
/// 32 字节。两种变体都实现 ZeroizeOnDrop。
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub enum WalletSecret {
    /// 规范化助记词短语
    Mnemonic(String),
    /// 32 字节私钥
    PrivateKey(Vec<u8>),
}

impl WalletSecret {
    pub fn kind(&self) -> KeyKind {
        match self {
            WalletSecret::Mnemonic(_) => KeyKind::Mnemonic,
            WalletSecret::PrivateKey(_) => KeyKind::PrivateKey,
        }
    }

    /// 规范化字节表示，用于加密存储与指纹计算
    pub fn canonical_bytes(&self) -> Zeroizing<Vec<u8>> {
        match self {
            WalletSecret::Mnemonic(phrase) => Zeroizing::new(phrase.as_bytes().to_vec()),
            WalletSecret::PrivateKey(bytes) => Zeroizing::new(bytes.clone()),
        }
    }

    /// 用户可读的导出形式（助记词短语或 0x 前缀十六进制）
    pub fn reveal(&self) -> Zeroizing<String> {
        match self {
            WalletSecret::Mnemonic(phrase) => Zeroizing::new(phrase.clone()),
            WalletSecret::PrivateKey(bytes) => {
                Zeroizing::new(format!("0x{}", hex::encode(bytes)))
            }
        }
    }

    /// 从规范化字节恢复（与 canonical_bytes 互逆）
    pub fn from_canonical_bytes(kind: KeyKind, bytes: &[u8]) -> Option<Self> {
        match kind {
            KeyKind::Mnemonic => {
                let phrase = String::from_utf8(bytes.to_vec()).ok()?;
                Some(WalletSecret::Mnemonic(phrase))
            }
            KeyKind::PrivateKey => {
                if bytes.len() != 32 {
                    return None;
                }
                Some(WalletSecret::PrivateKey(bytes.to_vec()))
            }
        }
    }
}

// 手写 Debug，避免密钥材料流入日志
impl std::fmt::Debug for WalletSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalletSecret::Mnemonic(_) => write!(f, "WalletSecret::Mnemonic(<redacted>)"),
            WalletSecret::PrivateKey(_) => write!(f, "WalletSecret::PrivateKey(<redacted>)"),
        }
    }
}

/// 钱包记录（不含密钥材料，密钥单独加密存储）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// 钱包唯一标识
    pub id: Uuid,
    /// 用户可见名称
    pub name: String,
    /// 密钥材料类型
    pub key_kind: KeyKind,
    /// 激活的链 (chain_id 列表)
    pub chains: Vec<i64>,
    /// 每条激活链的派生地址
    pub addresses: HashMap<i64, String>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    /// 指定链上的地址
    pub fn address_for(&self, chain_id: i64) -> Option<&str> {
        self.addresses.get(&chain_id).map(|s| s.as_str())
    }

    /// 钱包是否激活了指定链
    pub fn has_chain(&self, chain_id: i64) -> bool {
        self.chains.contains(&chain_id)
    }
}

/// 钱包集合变更集，随变更通知一起发布
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletChangeSet {
    /// 新增的钱包
    pub inserted: Vec<Uuid>,
    /// 元数据或链集合被修改的钱包
    pub updated: Vec<Uuid>,
    /// 被删除的钱包
    pub deleted: Vec<Uuid>,
}

impl WalletChangeSet {
    pub fn inserted(id: Uuid) -> Self {
        Self {
            inserted: vec![id],
            ..Default::default()
        }
    }

    pub fn updated(id: Uuid) -> Self {
        Self {
            updated: vec![id],
            ..Default::default()
        }
    }

    pub fn deleted(id: Uuid) -> Self {
        Self {
            deleted: vec![id],
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_canonical_roundtrip() {
        let secret = WalletSecret::Mnemonic("legal winner thank year wave".to_string());
        let bytes = secret.canonical_bytes();
        let restored = WalletSecret::from_canonical_bytes(KeyKind::Mnemonic, &bytes).unwrap();
        assert_eq!(*restored.reveal(), "legal winner thank year wave");

        let key = WalletSecret::PrivateKey(vec![0xab; 32]);
        let bytes = key.canonical_bytes();
        let restored = WalletSecret::from_canonical_bytes(KeyKind::PrivateKey, &bytes).unwrap();
        assert_eq!(restored.kind(), KeyKind::PrivateKey);
    }

    #[test]
    fn test_private_key_length_enforced() {
        assert!(WalletSecret::from_canonical_bytes(KeyKind::PrivateKey, &[0u8; 31]).is_none());
        assert!(WalletSecret::from_canonical_bytes(KeyKind::PrivateKey, &[0u8; 33]).is_none());
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = WalletSecret::PrivateKey(vec![0x11; 32]);
        let rendered = format!("{:?}", secret);
        assert!(!rendered.contains("11"));
        assert!(rendered.contains("redacted"));
    }

    #[test]
    fn test_reveal_private_key_hex() {
        let key = WalletSecret::PrivateKey(vec![0x01; 32]);
        assert_eq!(
            *key.reveal(),
            format!("0x{}", "01".repeat(32))
        );
    }
}
