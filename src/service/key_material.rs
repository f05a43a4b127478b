//! 密钥素材识别与解析
//!
//! 对用户粘贴的任意文本做结构分类：助记词 / 裸私钥 / 受密码
//! 保护的 keystore JSON。分类纯结构化，不访问存储，不产生副作用，
//! 同一输入永远得到同一结果。

use bip39::{Language, Mnemonic};
use once_cell::sync::Lazy;
use rand::RngCore;
use regex::Regex;
use zeroize::Zeroizing;

use crate::domain::wallet::WalletSecret;
use crate::error::{GenerationError, ValidationError};

/// 64 位十六进制，可带 0x 前缀
static PRIVATE_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(0x)?[0-9a-fA-F]{64}$").expect("private key regex is valid")
});

/// BIP39 允许的词数
const VALID_WORD_COUNTS: [usize; 5] = [12, 15, 18, 21, 24];

/// 素材结构分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationResult {
    /// 通过校验和的 BIP39 助记词
    ValidMnemonic,
    /// 32 字节十六进制私钥
    ValidPrivateKey,
    /// keystore JSON，需要密码解锁后才能继续
    PasswordProtectedKeystore,
    /// 同样内容的密钥已经入库（仅由存储层比对后给出）
    AlreadyPresent,
}

/// 密钥素材编解码器
pub struct KeyMaterialCodec;

impl KeyMaterialCodec {
    /// 结构化分类用户输入
    ///
    /// 判定顺序：助记词 -> 私钥 -> keystore JSON。三者的文法互斥，
    /// 先后顺序只影响错误报告，不影响判定结果。
    pub fn validate(input: &str) -> Result<ValidationResult, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::InvalidData);
        }

        if Self::parse_mnemonic(trimmed).is_some() {
            return Ok(ValidationResult::ValidMnemonic);
        }

        if PRIVATE_KEY_RE.is_match(trimmed) {
            return Ok(ValidationResult::ValidPrivateKey);
        }

        if Self::looks_like_keystore(trimmed) {
            return Ok(ValidationResult::PasswordProtectedKeystore);
        }

        Err(ValidationError::InvalidData)
    }

    /// 解析为可入库的密钥材料（keystore 需先走解密流程）
    pub fn parse_secret(input: &str) -> Result<WalletSecret, ValidationError> {
        let trimmed = input.trim();

        if let Some(phrase) = Self::parse_mnemonic(trimmed) {
            return Ok(WalletSecret::Mnemonic(phrase));
        }

        if PRIVATE_KEY_RE.is_match(trimmed) {
            let hex_str = trimmed.strip_prefix("0x").unwrap_or(trimmed);
            let bytes = hex::decode(hex_str).map_err(|_| ValidationError::InvalidData)?;
            return Ok(WalletSecret::PrivateKey(bytes));
        }

        Err(ValidationError::InvalidData)
    }

    /// 校验并规范化助记词：小写、单空格连接
    fn parse_mnemonic(input: &str) -> Option<String> {
        let words: Vec<&str> = input.split_whitespace().collect();
        if !VALID_WORD_COUNTS.contains(&words.len()) {
            return None;
        }

        let normalized = words.join(" ").to_lowercase();
        Mnemonic::parse_in(Language::English, &normalized).ok()?;
        Some(normalized)
    }

    /// keystore JSON 粗判：有 crypto/Crypto 对象即认为是 keystore，
    /// 字段细节留给解密路径报告
    fn looks_like_keystore(input: &str) -> bool {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(input) else {
            return false;
        };
        let Some(object) = value.as_object() else {
            return false;
        };
        object.get("crypto").map_or(false, |v| v.is_object())
            || object.get("Crypto").map_or(false, |v| v.is_object())
    }

    /// 生成新助记词（12 或 24 词）
    pub fn generate_mnemonic(word_count: usize) -> Result<Zeroizing<String>, GenerationError> {
        let entropy_len = match word_count {
            12 => 16,
            24 => 32,
            n => {
                return Err(GenerationError::Entropy(format!(
                    "unsupported word count: {n}"
                )))
            }
        };

        let mut entropy = Zeroizing::new(vec![0u8; entropy_len]);
        rand::rngs::OsRng.fill_bytes(&mut entropy);

        let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)
            .map_err(|e| GenerationError::Entropy(e.to_string()))?;

        Ok(Zeroizing::new(mnemonic.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::wallet::KeyKind;

    const VALID_PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_valid_mnemonic() {
        let result = KeyMaterialCodec::validate(VALID_PHRASE).unwrap();
        assert_eq!(result, ValidationResult::ValidMnemonic);
    }

    #[test]
    fn test_mnemonic_normalization() {
        // 大小写混杂 + 多余空白，仍应识别并规范化
        let messy = "  Abandon ABANDON abandon abandon abandon abandon\tabandon abandon abandon abandon abandon ABOUT  ";
        let result = KeyMaterialCodec::validate(messy).unwrap();
        assert_eq!(result, ValidationResult::ValidMnemonic);

        let secret = KeyMaterialCodec::parse_secret(messy).unwrap();
        assert_eq!(*secret.reveal(), VALID_PHRASE);
    }

    #[test]
    fn test_mnemonic_bad_checksum_rejected() {
        // 词数正确但校验和错误
        let bad = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon";
        let err = KeyMaterialCodec::validate(bad).unwrap_err();
        assert_eq!(err, ValidationError::InvalidData);
    }

    #[test]
    fn test_valid_private_key() {
        let plain = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        assert_eq!(
            KeyMaterialCodec::validate(plain).unwrap(),
            ValidationResult::ValidPrivateKey
        );

        let prefixed = format!("0x{plain}");
        assert_eq!(
            KeyMaterialCodec::validate(&prefixed).unwrap(),
            ValidationResult::ValidPrivateKey
        );

        let secret = KeyMaterialCodec::parse_secret(&prefixed).unwrap();
        assert_eq!(secret.kind(), KeyKind::PrivateKey);
    }

    #[test]
    fn test_private_key_wrong_length_rejected() {
        let short = "ac0974bec39a17e36ba4a6b4d238ff94";
        assert!(KeyMaterialCodec::validate(short).is_err());

        let long = format!("{}ff", "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80");
        assert!(KeyMaterialCodec::validate(&long).is_err());
    }

    #[test]
    fn test_keystore_detection() {
        let keystore = r#"{"version":3,"crypto":{"cipher":"aes-128-ctr"}}"#;
        assert_eq!(
            KeyMaterialCodec::validate(keystore).unwrap(),
            ValidationResult::PasswordProtectedKeystore
        );

        // 大写 Crypto 变体同样接受
        let upper = r#"{"version":3,"Crypto":{"cipher":"aes-128-ctr"}}"#;
        assert_eq!(
            KeyMaterialCodec::validate(upper).unwrap(),
            ValidationResult::PasswordProtectedKeystore
        );
    }

    #[test]
    fn test_json_without_crypto_rejected() {
        let not_keystore = r#"{"hello":"world"}"#;
        assert!(KeyMaterialCodec::validate(not_keystore).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(KeyMaterialCodec::validate("").is_err());
        assert!(KeyMaterialCodec::validate("   ").is_err());
        assert!(KeyMaterialCodec::validate("hello world").is_err());
    }

    #[test]
    fn test_validation_is_idempotent() {
        for input in [VALID_PHRASE, "not valid at all"] {
            let first = KeyMaterialCodec::validate(input);
            let second = KeyMaterialCodec::validate(input);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_generate_mnemonic() {
        let phrase = KeyMaterialCodec::generate_mnemonic(12).unwrap();
        assert_eq!(phrase.split_whitespace().count(), 12);
        assert_eq!(
            KeyMaterialCodec::validate(&phrase).unwrap(),
            ValidationResult::ValidMnemonic
        );

        let long = KeyMaterialCodec::generate_mnemonic(24).unwrap();
        assert_eq!(long.split_whitespace().count(), 24);

        assert!(KeyMaterialCodec::generate_mnemonic(13).is_err());
    }
}
