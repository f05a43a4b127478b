//! 统一错误类型
//!
//! 所有处理不可信外部输入的路径都以值返回错误，绝不panic。
//! 唯一视为致命的类别是存储完整性破坏（已存在的记录缺少密文）。

use thiserror::Error;
use uuid::Uuid;

/// 导入素材结构校验错误（可恢复，用户修正输入后重试）
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// 既不是助记词、私钥，也不是keystore JSON
    #[error("input is not a mnemonic, private key or keystore")]
    InvalidData,
    /// 私钥钱包只能关联一条链
    #[error("a private key wallet must be associated with exactly one chain")]
    PrivateKeyNeedsSingleChain,
}

/// keystore 解密错误（可恢复，允许换密码重试）
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecryptError {
    #[error("wrong keystore password")]
    WrongPassword,
    #[error("malformed keystore: {0}")]
    MalformedKeystore(String),
}

/// 钱包存储错误
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("wallet not found: {0}")]
    NotFound(Uuid),
    /// 同一份密钥内容（按指纹比对）已经入库
    #[error("wallet with the same secret already exists")]
    AlreadyPresent,
    #[error("chain set must not be empty")]
    EmptyChainSet,
    /// 持久化不变量被破坏，调用方应视为致命错误上报
    #[error("vault storage corrupted: {0}")]
    Corrupted(String),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("secret encryption failed: {0}")]
    Crypto(String),
}

/// 入站请求解码错误：请求被丢弃，绝不向上传播为崩溃
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed bridge request: {0}")]
    MalformedRequest(String),
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
}

/// 派生/生成错误（配置与密钥类型不匹配，直接上报）
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("chain {0} cannot derive from this secret type")]
    UnsupportedChain(String),
    #[error("unknown chain: {0}")]
    UnknownChain(String),
    #[error("invalid secret material: {0}")]
    InvalidSecret(String),
    #[error("entropy generation failed: {0}")]
    Entropy(String),
}

/// 顶层错误类型
#[derive(Debug, Error)]
pub enum VaultError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Decrypt(#[from] DecryptError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl VaultError {
    /// 是否属于可恢复错误（提示用户重试即可）
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, VaultError::Storage(StorageError::Corrupted(_)))
    }
}
