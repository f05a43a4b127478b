//! 多链配置模块
//!
//! 定义所有支持的区块链及其加密曲线、派生路径与地址编码规则。
//! 链集合在编译期固定，注册表本身无状态、无副作用。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::wallet::KeyKind;

/// 加密曲线类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveType {
    /// secp256k1 曲线 (Ethereum 系列, Bitcoin)
    Secp256k1,
    /// ed25519 曲线 (Solana)
    Ed25519,
}

/// 地址编码格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFormat {
    /// 十六进制 0x... 带 EIP-55 校验大小写 (Ethereum 系列)
    Hex,
    /// Bech32 编码 (Bitcoin native segwit)
    Bech32,
    /// Base58 编码 (Solana)
    SolanaBase58,
}

/// HD 派生标准
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DerivationStandard {
    /// BIP44: m/44'/coin_type'/account'/change/index
    BIP44,
    /// BIP84: m/84'/coin_type'/account'/change/index (native segwit)
    BIP84,
    /// SLIP-0010: 适用于 ed25519
    SLIP0010,
}

/// 链配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// 链 ID (EIP-155 或 SLIP-44)
    pub chain_id: i64,
    /// 链名称
    pub name: String,
    /// 链符号 (ETH, BTC, SOL, etc.)
    pub symbol: String,
    /// 加密曲线类型
    pub curve_type: CurveType,
    /// 地址格式
    pub address_format: AddressFormat,
    /// HD 派生标准
    pub derivation_standard: DerivationStandard,
    /// BIP44 coin type (用于派生路径)
    pub coin_type: u32,
}

impl ChainConfig {
    /// 生成派生路径
    pub fn derivation_path(&self, account: u32, change: u32, index: u32) -> String {
        match self.derivation_standard {
            DerivationStandard::BIP44 => {
                format!(
                    "m/44'/{}'/{}'/{}/{}",
                    self.coin_type, account, change, index
                )
            }
            DerivationStandard::BIP84 => {
                format!(
                    "m/84'/{}'/{}'/{}/{}",
                    self.coin_type, account, change, index
                )
            }
            DerivationStandard::SLIP0010 => {
                // Solana/ed25519: 全硬化路径 m/44'/coin'/account'/change'
                format!("m/44'/{}'/{}'/{}'", self.coin_type, account, change)
            }
        }
    }

    /// 该链是否能从给定密钥类型派生地址
    ///
    /// 助记词走 HD 派生，两种曲线都支持；裸私钥同样可以在
    /// 任一曲线上直接计算地址（32 字节既是 secp256k1 标量也是
    /// ed25519 种子），因此这里对两种密钥类型都放行。
    pub fn supports_key_kind(&self, _kind: KeyKind) -> bool {
        true
    }
}

/// 链配置注册表
pub struct ChainRegistry {
    // Vec 保持稳定的展示顺序，HashMap 做查找索引
    configs: Vec<ChainConfig>,
    by_chain_id: HashMap<i64, usize>,
    by_symbol: HashMap<String, usize>,
}

impl ChainRegistry {
    /// 创建预配置的注册表
    pub fn new() -> Self {
        let mut registry = Self {
            configs: Vec::new(),
            by_chain_id: HashMap::new(),
            by_symbol: HashMap::new(),
        };

        registry.register_default_chains();
        registry
    }

    /// 注册默认支持的链
    fn register_default_chains(&mut self) {
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        // Secp256k1 系列 (可共享实现)
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

        // Ethereum Mainnet
        self.register(ChainConfig {
            chain_id: 1,
            name: "Ethereum".to_string(),
            symbol: "ETH".to_string(),
            curve_type: CurveType::Secp256k1,
            address_format: AddressFormat::Hex,
            derivation_standard: DerivationStandard::BIP44,
            coin_type: 60,
        });

        // BSC (Binance Smart Chain)
        self.register(ChainConfig {
            chain_id: 56,
            name: "BNB Smart Chain".to_string(),
            symbol: "BNB".to_string(),
            curve_type: CurveType::Secp256k1,
            address_format: AddressFormat::Hex,
            derivation_standard: DerivationStandard::BIP44,
            coin_type: 60, // BSC 使用与 ETH 相同的派生路径
        });

        // Polygon
        self.register(ChainConfig {
            chain_id: 137,
            name: "Polygon".to_string(),
            symbol: "MATIC".to_string(),
            curve_type: CurveType::Secp256k1,
            address_format: AddressFormat::Hex,
            derivation_standard: DerivationStandard::BIP44,
            coin_type: 60,
        });

        // Arbitrum (L2)
        self.register(ChainConfig {
            chain_id: 42161,
            name: "Arbitrum One".to_string(),
            symbol: "ARB".to_string(),
            curve_type: CurveType::Secp256k1,
            address_format: AddressFormat::Hex,
            derivation_standard: DerivationStandard::BIP44,
            coin_type: 60,
        });

        // Optimism (L2)
        self.register(ChainConfig {
            chain_id: 10,
            name: "Optimism".to_string(),
            symbol: "OP".to_string(),
            curve_type: CurveType::Secp256k1,
            address_format: AddressFormat::Hex,
            derivation_standard: DerivationStandard::BIP44,
            coin_type: 60,
        });

        // Avalanche C-Chain
        self.register(ChainConfig {
            chain_id: 43114,
            name: "Avalanche C-Chain".to_string(),
            symbol: "AVAX".to_string(),
            curve_type: CurveType::Secp256k1,
            address_format: AddressFormat::Hex,
            derivation_standard: DerivationStandard::BIP44,
            coin_type: 60,
        });

        // Bitcoin (BIP84 - native segwit)
        self.register(ChainConfig {
            chain_id: 0,
            name: "Bitcoin".to_string(),
            symbol: "BTC".to_string(),
            curve_type: CurveType::Secp256k1,
            address_format: AddressFormat::Bech32,
            derivation_standard: DerivationStandard::BIP84,
            coin_type: 0,
        });

        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        // Ed25519 系列 (独立实现)
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

        // Solana
        self.register(ChainConfig {
            chain_id: 501,
            name: "Solana".to_string(),
            symbol: "SOL".to_string(),
            curve_type: CurveType::Ed25519,
            address_format: AddressFormat::SolanaBase58,
            derivation_standard: DerivationStandard::SLIP0010,
            coin_type: 501,
        });
    }

    /// 注册链配置
    fn register(&mut self, config: ChainConfig) {
        let idx = self.configs.len();
        self.by_chain_id.insert(config.chain_id, idx);
        self.by_symbol.insert(config.symbol.to_lowercase(), idx);
        self.configs.push(config);
    }

    /// 通过 chain_id 获取配置
    pub fn get_by_chain_id(&self, chain_id: i64) -> Option<&ChainConfig> {
        self.by_chain_id.get(&chain_id).map(|&i| &self.configs[i])
    }

    /// 通过符号获取配置
    pub fn get_by_symbol(&self, symbol: &str) -> Option<&ChainConfig> {
        self.by_symbol
            .get(&symbol.to_lowercase())
            .map(|&i| &self.configs[i])
    }

    /// 按曲线类型分组获取所有链
    pub fn get_by_curve_type(&self, curve_type: CurveType) -> Vec<&ChainConfig> {
        self.configs
            .iter()
            .filter(|c| c.curve_type == curve_type)
            .collect()
    }

    /// 指定密钥类型能派生的全部链
    pub fn chains_supporting(&self, kind: KeyKind) -> Vec<&ChainConfig> {
        self.configs
            .iter()
            .filter(|c| c.supports_key_kind(kind))
            .collect()
    }

    /// 列出所有支持的链（注册顺序稳定）
    pub fn list_all(&self) -> &[ChainConfig] {
        &self.configs
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_registry() {
        let registry = ChainRegistry::new();

        // 测试通过 chain_id 查找
        let eth = registry.get_by_chain_id(1).unwrap();
        assert_eq!(eth.name, "Ethereum");
        assert_eq!(eth.curve_type, CurveType::Secp256k1);

        // 测试通过符号查找
        let sol = registry.get_by_symbol("SOL").unwrap();
        assert_eq!(sol.chain_id, 501);
        assert_eq!(sol.curve_type, CurveType::Ed25519);

        // 测试派生路径生成
        let btc = registry.get_by_symbol("BTC").unwrap();
        let path = btc.derivation_path(0, 0, 0);
        assert_eq!(path, "m/84'/0'/0'/0/0");

        let sol_path = sol.derivation_path(0, 0, 0);
        assert_eq!(sol_path, "m/44'/501'/0'/0'");
    }

    #[test]
    fn test_curve_grouping() {
        let registry = ChainRegistry::new();

        // 所有 secp256k1 链应该能共享实现
        let secp256k1_chains = registry.get_by_curve_type(CurveType::Secp256k1);
        assert!(secp256k1_chains.len() >= 4); // ETH, BSC, Polygon, BTC

        let ed25519_chains = registry.get_by_curve_type(CurveType::Ed25519);
        assert!(!ed25519_chains.is_empty()); // Solana
    }

    #[test]
    fn test_chains_supporting_key_kinds() {
        let registry = ChainRegistry::new();

        let for_mnemonic = registry.chains_supporting(KeyKind::Mnemonic);
        let for_private_key = registry.chains_supporting(KeyKind::PrivateKey);

        assert_eq!(for_mnemonic.len(), registry.list_all().len());
        assert_eq!(for_private_key.len(), registry.list_all().len());
    }

    #[test]
    fn test_registration_order_is_stable() {
        let registry = ChainRegistry::new();
        let symbols: Vec<&str> = registry.list_all().iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(symbols[0], "ETH");
        assert_eq!(*symbols.last().unwrap(), "SOL");
    }
}
