//! 地址派生策略
//!
//! 按加密曲线拆分的派生实现：secp256k1 链共享 BIP32 派生，
//! ed25519 链 (Solana) 走 SLIP-0010 全硬化派生。
//! 同一份密钥在同一条链上派生结果必须是确定性的。

use bip39::{Language, Mnemonic};
use coins_bip32::path::DerivationPath;
use hmac::{Hmac, Mac};
use sha2::Sha512;

use crate::domain::chain_config::{AddressFormat, ChainConfig, CurveType};
use crate::domain::wallet::WalletSecret;
use crate::error::GenerationError;

type HmacSha512 = Hmac<Sha512>;

/// 派生结果（不含私钥，密钥材料不离开调用方）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAccount {
    /// 链上地址，按链规则编码
    pub address: String,
    /// 公钥 (hex 编码)
    pub public_key: String,
}

/// 地址派生策略 trait
pub trait DerivationStrategy: Send + Sync {
    /// 从密钥材料派生指定链的首账户地址
    fn derive_account(
        &self,
        secret: &WalletSecret,
        chain_config: &ChainConfig,
    ) -> Result<DerivedAccount, GenerationError>;
}

/// 从助记词短语计算 BIP39 种子
fn seed_from_phrase(phrase: &str) -> Result<[u8; 64], GenerationError> {
    let mnemonic = Mnemonic::parse_in(Language::English, phrase)
        .map_err(|e| GenerationError::InvalidSecret(format!("invalid mnemonic: {e}")))?;
    Ok(mnemonic.to_seed(""))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Secp256k1 策略 (ETH 系列, Bitcoin)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Secp256k1Strategy;

impl DerivationStrategy for Secp256k1Strategy {
    fn derive_account(
        &self,
        secret: &WalletSecret,
        chain_config: &ChainConfig,
    ) -> Result<DerivedAccount, GenerationError> {
        let signing_key = match secret {
            WalletSecret::Mnemonic(phrase) => {
                let seed = seed_from_phrase(phrase)?;
                let path = chain_config.derivation_path(0, 0, 0);
                Self::derive_signing_key(&seed, &path)?
            }
            WalletSecret::PrivateKey(bytes) => {
                use k256::ecdsa::SigningKey;
                SigningKey::from_slice(bytes).map_err(|_| {
                    GenerationError::InvalidSecret("not a valid secp256k1 scalar".into())
                })?
            }
        };

        match chain_config.address_format {
            AddressFormat::Hex => Self::ethereum_account(&signing_key),
            AddressFormat::Bech32 => Self::bitcoin_account(&signing_key),
            AddressFormat::SolanaBase58 => Err(GenerationError::UnsupportedChain(
                chain_config.symbol.clone(),
            )),
        }
    }
}

impl Secp256k1Strategy {
    /// 从种子按路径派生 BIP32 扩展私钥
    fn derive_signing_key(
        seed: &[u8],
        path: &str,
    ) -> Result<k256::ecdsa::SigningKey, GenerationError> {
        use coins_bip32::prelude::*;

        let derivation_path = path
            .parse::<DerivationPath>()
            .map_err(|e| GenerationError::InvalidSecret(format!("bad derivation path: {e}")))?;

        let master_key = XPriv::root_from_seed(seed, None)
            .map_err(|e| GenerationError::InvalidSecret(format!("master key: {e}")))?;

        let derived_key = master_key
            .derive_path(&derivation_path)
            .map_err(|e| GenerationError::InvalidSecret(format!("derive path: {e}")))?;

        // XPriv 实现 AsRef<SigningKey>
        let signing_key: &k256::ecdsa::SigningKey = derived_key.as_ref();
        Ok(signing_key.clone())
    }

    /// Ethereum 系列地址：Keccak256(未压缩公钥)[12..] + EIP-55 校验大小写
    fn ethereum_account(
        signing_key: &k256::ecdsa::SigningKey,
    ) -> Result<DerivedAccount, GenerationError> {
        use sha3::{Digest, Keccak256};

        let verifying_key = signing_key.verifying_key();
        let public_key_bytes = verifying_key.to_encoded_point(false); // 未压缩格式
        let public_key_slice = &public_key_bytes.as_bytes()[1..]; // 去掉 0x04 前缀

        let hash = Keccak256::digest(public_key_slice);
        let address = to_checksum_address(&hash[12..]);

        Ok(DerivedAccount {
            address,
            public_key: hex::encode(public_key_slice),
        })
    }

    /// Bitcoin P2WPKH (native segwit, bc1q...) 地址
    fn bitcoin_account(
        signing_key: &k256::ecdsa::SigningKey,
    ) -> Result<DerivedAccount, GenerationError> {
        use bitcoin::{
            secp256k1::PublicKey as Secp256k1PublicKey, Address, Network,
            PublicKey as BitcoinPublicKey,
        };

        let verifying_key = signing_key.verifying_key();
        let public_key_bytes = verifying_key.to_encoded_point(true); // 压缩格式

        let secp_pubkey = Secp256k1PublicKey::from_slice(public_key_bytes.as_bytes())
            .map_err(|e| GenerationError::InvalidSecret(format!("public key: {e}")))?;
        let bitcoin_pubkey = BitcoinPublicKey::new(secp_pubkey);

        let address = Address::p2wpkh(&bitcoin_pubkey, Network::Bitcoin)
            .map_err(|e| GenerationError::InvalidSecret(format!("p2wpkh: {e}")))?
            .to_string();

        Ok(DerivedAccount {
            address,
            public_key: hex::encode(public_key_bytes.as_bytes()),
        })
    }
}

/// EIP-55 校验大小写编码
fn to_checksum_address(address_bytes: &[u8]) -> String {
    use sha3::{Digest, Keccak256};

    let lower = hex::encode(address_bytes);
    let hash = Keccak256::digest(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ed25519 策略 (Solana)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Ed25519Strategy;

impl DerivationStrategy for Ed25519Strategy {
    fn derive_account(
        &self,
        secret: &WalletSecret,
        chain_config: &ChainConfig,
    ) -> Result<DerivedAccount, GenerationError> {
        if chain_config.symbol != "SOL" {
            return Err(GenerationError::UnsupportedChain(
                chain_config.symbol.clone(),
            ));
        }

        let key_bytes = match secret {
            WalletSecret::Mnemonic(phrase) => {
                let seed = seed_from_phrase(phrase)?;
                // Solana 标准路径 m/44'/501'/0'/0'，全部硬化
                slip10_ed25519_derive(&seed, &[44, 501, 0, 0])?
            }
            WalletSecret::PrivateKey(bytes) => {
                let mut key = [0u8; 32];
                if bytes.len() != 32 {
                    return Err(GenerationError::InvalidSecret(
                        "ed25519 seed must be 32 bytes".into(),
                    ));
                }
                key.copy_from_slice(bytes);
                key
            }
        };

        use ed25519_dalek::SigningKey;
        let signing_key = SigningKey::from_bytes(&key_bytes);
        let public_key_bytes = signing_key.verifying_key().to_bytes();

        // Solana 地址就是公钥的 Base58 编码
        Ok(DerivedAccount {
            address: bs58::encode(&public_key_bytes).into_string(),
            public_key: hex::encode(public_key_bytes),
        })
    }
}

/// SLIP-0010 ed25519 派生
///
/// master = HMAC-SHA512("ed25519 seed", seed)；子密钥只支持硬化派生：
/// HMAC-SHA512(chain_code, 0x00 || key || (index | 0x80000000))
fn slip10_ed25519_derive(seed: &[u8], path: &[u32]) -> Result<[u8; 32], GenerationError> {
    let mut mac = HmacSha512::new_from_slice(b"ed25519 seed")
        .map_err(|e| GenerationError::InvalidSecret(format!("hmac: {e}")))?;
    mac.update(seed);
    let digest = mac.finalize().into_bytes();

    let mut key = [0u8; 32];
    let mut chain_code = [0u8; 32];
    key.copy_from_slice(&digest[..32]);
    chain_code.copy_from_slice(&digest[32..]);

    for &index in path {
        let hardened = index | 0x8000_0000;
        let mut mac = HmacSha512::new_from_slice(&chain_code)
            .map_err(|e| GenerationError::InvalidSecret(format!("hmac: {e}")))?;
        mac.update(&[0x00]);
        mac.update(&key);
        mac.update(&hardened.to_be_bytes());
        let digest = mac.finalize().into_bytes();

        key.copy_from_slice(&digest[..32]);
        chain_code.copy_from_slice(&digest[32..]);
    }

    Ok(key)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 策略工厂
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct DerivationStrategyFactory;

impl DerivationStrategyFactory {
    /// 根据曲线类型创建策略
    pub fn create_strategy(curve_type: CurveType) -> Box<dyn DerivationStrategy> {
        match curve_type {
            CurveType::Secp256k1 => Box::new(Secp256k1Strategy),
            CurveType::Ed25519 => Box::new(Ed25519Strategy),
        }
    }
}

/// 便捷入口：按链配置选择策略并派生
pub fn derive_account(
    secret: &WalletSecret,
    chain_config: &ChainConfig,
) -> Result<DerivedAccount, GenerationError> {
    let strategy = DerivationStrategyFactory::create_strategy(chain_config.curve_type);
    strategy.derive_account(secret, chain_config)
}
