//! AES-256-GCM 加密/解密模块
//! 密钥材料落盘前的静态加密，以及基于 HMAC 的内容指纹

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

/// 加密数据
///
/// # Arguments
/// * `data` - 要加密的原始数据
/// * `key` - 32字节加密密钥
///
/// # Returns
/// 返回加密后的数据（nonce + ciphertext）
pub fn encrypt_data(data: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if key.len() != 32 {
        return Err(anyhow!("Key must be 32 bytes for AES-256"));
    }

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| anyhow!("Invalid key: {}", e))?;

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, data)
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    // 将 nonce (12字节) 和 ciphertext 组合
    let mut result = nonce.to_vec();
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// 解密数据
///
/// # Arguments
/// * `encrypted` - 加密的数据（nonce + ciphertext）
/// * `key` - 32字节加密密钥
pub fn decrypt_data(encrypted: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if key.len() != 32 {
        return Err(anyhow!("Key must be 32 bytes for AES-256"));
    }

    if encrypted.len() < 12 {
        return Err(anyhow!("Encrypted data too short"));
    }

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| anyhow!("Invalid key: {}", e))?;

    // 提取 nonce（前12字节）
    let nonce = Nonce::from_slice(&encrypted[..12]);
    let ciphertext = &encrypted[12..];

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| anyhow!("Decryption failed: {}", e))?;

    Ok(plaintext)
}

/// 加密密钥（使用Zeroize保护）
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    key: [u8; 32],
}

impl EncryptionKey {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.key
    }

    /// 从环境变量密钥字符串解析，支持多格式
    pub fn from_key_string(key_str: &str) -> Result<Self> {
        if key_str.is_empty() {
            return Err(anyhow!("vault key empty"));
        }

        let bytes = if key_str.len() == 64 {
            hex::decode(key_str).map_err(|e| anyhow!("Invalid hex key: {}", e))?
        } else if key_str.len() == 32 {
            key_str.as_bytes().to_vec()
        } else if key_str.len() >= 16 {
            let mut hasher = Sha256::new();
            hasher.update(key_str.as_bytes());
            hasher.finalize().to_vec()
        } else {
            return Err(anyhow!("vault key too short (min 16)"));
        };

        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        Ok(Self::new(key))
    }

    /// 从口令派生密钥 (Argon2id，随库盐)
    pub fn from_passphrase(passphrase: &str, salt: &[u8]) -> Result<Self> {
        let mut key = [0u8; 32];
        argon2::Argon2::default()
            .hash_password_into(passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| anyhow!("Argon2 derivation failed: {}", e))?;
        Ok(Self::new(key))
    }
}

/// 库主密钥的包装，负责密钥加解密与指纹计算
pub struct VaultCipher {
    key: EncryptionKey,
}

impl VaultCipher {
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        encrypt_data(plaintext, self.key.as_slice())
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        decrypt_data(ciphertext, self.key.as_slice())
    }

    /// 密钥内容指纹，用于按内容去重
    ///
    /// HMAC-SHA256(主密钥, 规范化字节)。用带密钥的 MAC 而不是裸哈希，
    /// 避免数据库泄露时可被离线穷举的指纹。
    pub fn fingerprint(&self, canonical_bytes: &[u8]) -> String {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.key.as_slice())
            .expect("HMAC can take key of any size");
        mac.update(canonical_bytes);
        hex::encode(mac.finalize().into_bytes())
    }
}
