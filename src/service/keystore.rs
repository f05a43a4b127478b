//! Keystore (Web3 Secret Storage v3) 解密
//!
//! 支持 scrypt 与 pbkdf2-hmac-sha256 两种 KDF，密文固定 aes-128-ctr。
//! MAC 校验失败报 WrongPassword，结构问题报 MalformedKeystore，
//! 两类错误都可恢复，绝不 panic。

use aes::cipher::{KeyIvInit, StreamCipher};
use serde::Deserialize;
use sha3::{Digest, Keccak256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::domain::wallet::WalletSecret;
use crate::error::DecryptError;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

/// scrypt 参数上限（n <= 2^24，r*p <= 1024），超出按文件损坏处理
const MAX_SCRYPT_LOG_N: u8 = 24;
const MAX_SCRYPT_RP: u32 = 1024;

#[derive(Debug, Deserialize)]
struct KeystoreFile {
    #[serde(alias = "Crypto")]
    crypto: CryptoSection,
}

#[derive(Debug, Deserialize)]
struct CryptoSection {
    cipher: String,
    ciphertext: String,
    cipherparams: CipherParams,
    kdf: String,
    kdfparams: serde_json::Value,
    mac: String,
}

#[derive(Debug, Deserialize)]
struct CipherParams {
    iv: String,
}

#[derive(Debug, Deserialize)]
struct ScryptParams {
    dklen: usize,
    n: u64,
    r: u32,
    p: u32,
    salt: String,
}

#[derive(Debug, Deserialize)]
struct Pbkdf2Params {
    dklen: usize,
    c: u32,
    prf: String,
    salt: String,
}

fn malformed(detail: impl Into<String>) -> DecryptError {
    DecryptError::MalformedKeystore(detail.into())
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, DecryptError> {
    hex::decode(value).map_err(|_| malformed(format!("{field} is not valid hex")))
}

/// 用密码解密 keystore JSON，成功返回其中的 32 字节私钥
pub fn decrypt_keystore(json: &str, password: &str) -> Result<WalletSecret, DecryptError> {
    let file: KeystoreFile =
        serde_json::from_str(json).map_err(|e| malformed(format!("bad json: {e}")))?;
    let crypto = &file.crypto;

    if crypto.cipher != "aes-128-ctr" {
        return Err(malformed(format!("unsupported cipher: {}", crypto.cipher)));
    }

    let ciphertext = decode_hex("ciphertext", &crypto.ciphertext)?;
    let iv = decode_hex("iv", &crypto.cipherparams.iv)?;
    let expected_mac = decode_hex("mac", &crypto.mac)?;

    if iv.len() != 16 {
        return Err(malformed("iv must be 16 bytes"));
    }

    let derived_key = derive_key(&crypto.kdf, &crypto.kdfparams, password)?;
    if derived_key.len() < 32 {
        return Err(malformed("derived key too short"));
    }

    // MAC = Keccak256(dk[16..32] || ciphertext)，常数时间比较
    let mut hasher = Keccak256::new();
    hasher.update(&derived_key[16..32]);
    hasher.update(&ciphertext);
    let computed_mac = hasher.finalize();

    if computed_mac.ct_eq(&expected_mac[..]).unwrap_u8() != 1 {
        return Err(DecryptError::WrongPassword);
    }

    let mut key = [0u8; 16];
    key.copy_from_slice(&derived_key[..16]);
    let mut iv_bytes = [0u8; 16];
    iv_bytes.copy_from_slice(&iv);

    let mut plaintext = Zeroizing::new(ciphertext);
    let mut cipher = Aes128Ctr::new(&key.into(), &iv_bytes.into());
    cipher.apply_keystream(&mut plaintext);

    WalletSecret::from_canonical_bytes(crate::domain::wallet::KeyKind::PrivateKey, &plaintext)
        .ok_or_else(|| malformed("plaintext is not a 32-byte private key"))
}

/// 按 kdf 字段派生密钥
fn derive_key(
    kdf: &str,
    params: &serde_json::Value,
    password: &str,
) -> Result<Zeroizing<Vec<u8>>, DecryptError> {
    match kdf {
        "scrypt" => {
            let params: ScryptParams = serde_json::from_value(params.clone())
                .map_err(|e| malformed(format!("bad scrypt params: {e}")))?;
            let salt = decode_hex("salt", &params.salt)?;

            if !params.n.is_power_of_two() || params.n < 2 {
                return Err(malformed("scrypt n must be a power of two"));
            }
            let log_n = params.n.trailing_zeros() as u8;

            // 参数来自不受信的文件，先限幅再分配（内存 128*n*r 字节）
            if log_n > MAX_SCRYPT_LOG_N {
                return Err(malformed(format!("scrypt n too large: {}", params.n)));
            }
            if params.r == 0 || params.p == 0 || params.r.saturating_mul(params.p) > MAX_SCRYPT_RP {
                return Err(malformed(format!(
                    "scrypt r/p out of range: r={} p={}",
                    params.r, params.p
                )));
            }

            let scrypt_params = scrypt::Params::new(log_n, params.r, params.p, params.dklen)
                .map_err(|e| malformed(format!("bad scrypt params: {e}")))?;

            let mut out = Zeroizing::new(vec![0u8; params.dklen]);
            scrypt::scrypt(password.as_bytes(), &salt, &scrypt_params, &mut out)
                .map_err(|e| malformed(format!("scrypt failed: {e}")))?;
            Ok(out)
        }
        "pbkdf2" => {
            let params: Pbkdf2Params = serde_json::from_value(params.clone())
                .map_err(|e| malformed(format!("bad pbkdf2 params: {e}")))?;
            if params.prf != "hmac-sha256" {
                return Err(malformed(format!("unsupported prf: {}", params.prf)));
            }
            let salt = decode_hex("salt", &params.salt)?;

            let mut out = Zeroizing::new(vec![0u8; params.dklen]);
            pbkdf2::pbkdf2_hmac::<sha2::Sha256>(password.as_bytes(), &salt, params.c, &mut out);
            Ok(out)
        }
        other => Err(malformed(format!("unsupported kdf: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 测试用 keystore 构造（与 decrypt 流程互逆）
    fn build_scrypt_keystore(private_key: &[u8; 32], password: &str) -> String {
        let salt = [0x5au8; 32];
        let iv = [0x1cu8; 16];
        let (log_n, r, p, dklen) = (10u8, 8u32, 1u32, 32usize);

        let params = scrypt::Params::new(log_n, r, p, dklen).unwrap();
        let mut dk = vec![0u8; dklen];
        scrypt::scrypt(password.as_bytes(), &salt, &params, &mut dk).unwrap();

        let mut ciphertext = private_key.to_vec();
        let mut key = [0u8; 16];
        key.copy_from_slice(&dk[..16]);
        let mut cipher = Aes128Ctr::new(&key.into(), &iv.into());
        cipher.apply_keystream(&mut ciphertext);

        let mut hasher = Keccak256::new();
        hasher.update(&dk[16..32]);
        hasher.update(&ciphertext);
        let mac = hasher.finalize();

        serde_json::json!({
            "version": 3,
            "crypto": {
                "cipher": "aes-128-ctr",
                "ciphertext": hex::encode(&ciphertext),
                "cipherparams": { "iv": hex::encode(iv) },
                "kdf": "scrypt",
                "kdfparams": {
                    "dklen": dklen,
                    "n": 1u64 << log_n,
                    "r": r,
                    "p": p,
                    "salt": hex::encode(salt)
                },
                "mac": hex::encode(mac)
            }
        })
        .to_string()
    }

    /// Ethereum wiki 公开的 pbkdf2 测试向量
    const WIKI_PBKDF2_KEYSTORE: &str = r#"{
        "crypto": {
            "cipher": "aes-128-ctr",
            "cipherparams": { "iv": "6087dab2f9fdbbfaddc31a909735c1e6" },
            "ciphertext": "5318b4d5bcd28de64ee5559e671353e16f075ecae9f99c7a79a38af5f869aa46",
            "kdf": "pbkdf2",
            "kdfparams": {
                "c": 262144,
                "dklen": 32,
                "prf": "hmac-sha256",
                "salt": "ae3cd4e7013836a3df6bd7241b12db061dbe2c6785853cce422d148a624ce0bd"
            },
            "mac": "517ead924a9d0dc3124507e3393d175ce3ff7c1e96529c6c555ce9e51205e9b2"
        },
        "id": "3198bc9c-6672-5ab3-d995-4942343ae5b6",
        "version": 3
    }"#;

    #[test]
    fn test_pbkdf2_known_vector() {
        let secret = decrypt_keystore(WIKI_PBKDF2_KEYSTORE, "testpassword").unwrap();
        assert_eq!(
            *secret.reveal(),
            "0x7a28b5ba57c53603b0b07b56bba752f7784bf506fa95edc395f5cf6c7514fe9d"
        );
    }

    #[test]
    fn test_pbkdf2_wrong_password() {
        let err = decrypt_keystore(WIKI_PBKDF2_KEYSTORE, "nottestpassword").unwrap_err();
        assert_eq!(err, DecryptError::WrongPassword);
    }

    #[test]
    fn test_scrypt_roundtrip() {
        let key = [0x42u8; 32];
        let json = build_scrypt_keystore(&key, "hunter2");

        let secret = decrypt_keystore(&json, "hunter2").unwrap();
        assert_eq!(*secret.reveal(), format!("0x{}", hex::encode(key)));

        let err = decrypt_keystore(&json, "hunter3").unwrap_err();
        assert_eq!(err, DecryptError::WrongPassword);
    }

    #[test]
    fn test_capitalized_crypto_section() {
        let key = [0x11u8; 32];
        let json = build_scrypt_keystore(&key, "pw").replace("\"crypto\"", "\"Crypto\"");
        assert!(decrypt_keystore(&json, "pw").is_ok());
    }

    #[test]
    fn test_malformed_variants() {
        // JSON 坏掉
        assert!(matches!(
            decrypt_keystore("{not json", "pw").unwrap_err(),
            DecryptError::MalformedKeystore(_)
        ));

        // 不支持的 cipher
        let key = [0u8; 32];
        let bad_cipher = build_scrypt_keystore(&key, "pw").replace("aes-128-ctr", "aes-256-cbc");
        assert!(matches!(
            decrypt_keystore(&bad_cipher, "pw").unwrap_err(),
            DecryptError::MalformedKeystore(_)
        ));

        // n 不是 2 的幂
        let bad_n = build_scrypt_keystore(&key, "pw").replace("\"n\":1024", "\"n\":1000");
        assert!(matches!(
            decrypt_keystore(&bad_n, "pw").unwrap_err(),
            DecryptError::MalformedKeystore(_)
        ));

        // n 超限，拒绝而不是先分配 128*n*r 字节
        let huge_n = build_scrypt_keystore(&key, "pw")
            .replace("\"n\":1024", &format!("\"n\":{}", 1u64 << 30));
        assert!(matches!(
            decrypt_keystore(&huge_n, "pw").unwrap_err(),
            DecryptError::MalformedKeystore(_)
        ));

        // r*p 超限
        let huge_rp = build_scrypt_keystore(&key, "pw").replace("\"p\":1", "\"p\":100000");
        assert!(matches!(
            decrypt_keystore(&huge_rp, "pw").unwrap_err(),
            DecryptError::MalformedKeystore(_)
        ));

        // 非 hex 的 mac
        let bad_mac = {
            let mut v: serde_json::Value = serde_json::from_str(WIKI_PBKDF2_KEYSTORE).unwrap();
            v["crypto"]["mac"] = serde_json::json!("zz");
            v.to_string()
        };
        assert!(matches!(
            decrypt_keystore(&bad_mac, "testpassword").unwrap_err(),
            DecryptError::MalformedKeystore(_)
        ));
    }
}
