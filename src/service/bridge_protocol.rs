//! 请求桥协议编解码
//!
//! 入站：`corevault://request?id=<u64>&payload=<base64(json)>`。
//! 前缀不匹配的 URI 直接忽略（Ok(None)），不是错误；前缀匹配但
//! 内容坏掉的请求报 MalformedRequest / UnknownOperation 后丢弃。
//! 出站回调只携带关联 id，形如 `<redirect_base>#id=<id>`。

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// 对端（发起请求的应用/站点）展示用元数据
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// 交易参数（透传，库不构造交易）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxParams {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub gas: Option<String>,
}

/// 已识别的操作类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    /// 选择账户与链
    SelectAccount { peer: PeerMeta },
    /// 消息签名审批
    SignMessage {
        address: String,
        message: String,
        peer: PeerMeta,
    },
    /// 交易签名审批
    SignTransaction {
        address: String,
        tx: TxParams,
        peer: PeerMeta,
    },
    /// 已知但无需审批的操作，立即回执
    Acknowledge { method: String },
}

/// 解码后的入站请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    /// 调用方给定的关联 id，对库完全不透明
    pub id: u64,
    pub operation: OperationKind,
}

/// 载荷 JSON 结构
#[derive(Debug, Deserialize)]
struct RequestPayload {
    method: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    tx: Option<TxParams>,
    #[serde(default)]
    peer: Option<PeerMeta>,
}

/// 无需审批、直接回执的方法
const ACK_METHODS: [&str; 2] = ["switch_chain", "just_show_app"];

pub struct BridgeProtocol {
    scheme_prefix: String,
    redirect_base: String,
}

impl BridgeProtocol {
    pub fn new(scheme_prefix: &str, redirect_base: &str) -> Self {
        Self {
            scheme_prefix: scheme_prefix.to_string(),
            redirect_base: redirect_base.to_string(),
        }
    }

    /// 解码入站 URI
    ///
    /// 返回 Ok(None) 表示前缀不属于本协议，调用方应当静默忽略。
    pub fn decode(&self, raw: &str) -> Result<Option<InboundRequest>, DecodeError> {
        let Some(query) = raw.strip_prefix(self.scheme_prefix.as_str()) else {
            return Ok(None);
        };

        let mut id: Option<u64> = None;
        let mut payload: Option<String> = None;

        for pair in query.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            match key {
                "id" => {
                    let parsed = value.parse::<u64>().map_err(|_| {
                        DecodeError::MalformedRequest(format!("bad id: {value}"))
                    })?;
                    id = Some(parsed);
                }
                "payload" => payload = Some(percent_decode(value)?),
                _ => {} // 未知参数忽略
            }
        }

        let id = id.ok_or_else(|| DecodeError::MalformedRequest("missing id".into()))?;
        let payload =
            payload.ok_or_else(|| DecodeError::MalformedRequest("missing payload".into()))?;

        let json = decode_base64(&payload)?;
        let payload: RequestPayload = serde_json::from_slice(&json)
            .map_err(|e| DecodeError::MalformedRequest(format!("bad payload json: {e}")))?;

        let operation = Self::classify(payload)?;
        Ok(Some(InboundRequest { id, operation }))
    }

    /// 方法名 -> 操作类型
    fn classify(payload: RequestPayload) -> Result<OperationKind, DecodeError> {
        let peer = payload.peer.unwrap_or_default();

        match payload.method.as_str() {
            "select_account" => Ok(OperationKind::SelectAccount { peer }),
            "sign_message" => {
                let address = payload.address.ok_or_else(|| {
                    DecodeError::MalformedRequest("sign_message requires address".into())
                })?;
                let message = payload.message.ok_or_else(|| {
                    DecodeError::MalformedRequest("sign_message requires message".into())
                })?;
                Ok(OperationKind::SignMessage {
                    address,
                    message,
                    peer,
                })
            }
            "sign_transaction" => {
                let address = payload.address.ok_or_else(|| {
                    DecodeError::MalformedRequest("sign_transaction requires address".into())
                })?;
                let tx = payload.tx.ok_or_else(|| {
                    DecodeError::MalformedRequest("sign_transaction requires tx".into())
                })?;
                Ok(OperationKind::SignTransaction { address, tx, peer })
            }
            m if ACK_METHODS.contains(&m) => Ok(OperationKind::Acknowledge {
                method: m.to_string(),
            }),
            other => Err(DecodeError::UnknownOperation(other.to_string())),
        }
    }

    /// 编码出站回调 URI：确定性，只携带关联 id
    pub fn encode_callback(&self, id: u64) -> String {
        format!("{}#id={}", self.redirect_base, id)
    }
}

/// 查询参数百分号解码（payload 里的 base64 可能带 %2B/%2F/%3D）
fn percent_decode(value: &str) -> Result<String, DecodeError> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex_pair = value
                    .get(i + 1..i + 3)
                    .ok_or_else(|| DecodeError::MalformedRequest("truncated escape".into()))?;
                let byte = u8::from_str_radix(hex_pair, 16).map_err(|_| {
                    DecodeError::MalformedRequest(format!("bad escape: %{hex_pair}"))
                })?;
                out.push(byte);
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8(out).map_err(|_| DecodeError::MalformedRequest("payload not utf8".into()))
}

/// 标准与 url-safe 两种 base64 字母表都接受
fn decode_base64(payload: &str) -> Result<Vec<u8>, DecodeError> {
    let standard = base64::engine::general_purpose::STANDARD;
    let url_safe = base64::engine::general_purpose::URL_SAFE_NO_PAD;

    standard
        .decode(payload)
        .or_else(|_| url_safe.decode(payload))
        .map_err(|e| DecodeError::MalformedRequest(format!("bad base64: {e}")))
}
