//! 审批界面能力接口
//!
//! 每种操作对应一个审批界面，由宿主注册实现。仲裁器只依赖
//! 这里的 trait，不关心界面如何呈现。

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::service::bridge_protocol::{PeerMeta, TxParams};

/// 提交给审批界面的动作描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalAction {
    /// 选择一个账户与链
    SelectAccount { peer: PeerMeta },
    /// 确认消息签名
    SignMessage {
        address: String,
        message: String,
        peer: PeerMeta,
    },
    /// 确认交易签名，界面可以修改参数
    SignTransaction {
        address: String,
        tx: TxParams,
        peer: PeerMeta,
    },
}

/// 审批界面给出的决定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// 用户选定了账户与链
    SelectedAccount { wallet_id: Uuid, chain_id: i64 },
    /// 批准
    Approved,
    /// 批准并带回编辑过的交易参数
    ApprovedWithEdits { tx: TxParams },
    /// 用户拒绝
    Rejected,
    /// 被取消（界面关闭、请求被取代等）
    Cancelled,
}

/// 审批界面能力 trait，宿主按操作类型各注册一个实现
#[async_trait]
pub trait ApprovalSurface: Send + Sync {
    async fn present(&self, action: ApprovalAction) -> Decision;
}

/// 操作类型 -> 审批界面 的注册表
#[derive(Clone)]
pub struct SurfaceRegistry {
    pub select_account: Arc<dyn ApprovalSurface>,
    pub sign_message: Arc<dyn ApprovalSurface>,
    pub sign_transaction: Arc<dyn ApprovalSurface>,
}

impl SurfaceRegistry {
    pub fn new(
        select_account: Arc<dyn ApprovalSurface>,
        sign_message: Arc<dyn ApprovalSurface>,
        sign_transaction: Arc<dyn ApprovalSurface>,
    ) -> Self {
        Self {
            select_account,
            sign_message,
            sign_transaction,
        }
    }

    /// 全部操作共用同一个界面（测试与简单宿主用）
    pub fn uniform(surface: Arc<dyn ApprovalSurface>) -> Self {
        Self {
            select_account: surface.clone(),
            sign_message: surface.clone(),
            sign_transaction: surface,
        }
    }
}

/// 对一切动作直接批准的界面（简单宿主/演示用）
///
/// 账户选择需要一个预先指定的默认账户，没有就取消。
pub struct AutoApproveSurface {
    pub default_account: Option<(Uuid, i64)>,
}

#[async_trait]
impl ApprovalSurface for AutoApproveSurface {
    async fn present(&self, action: ApprovalAction) -> Decision {
        match action {
            ApprovalAction::SelectAccount { .. } => match self.default_account {
                Some((wallet_id, chain_id)) => Decision::SelectedAccount { wallet_id, chain_id },
                None => Decision::Cancelled,
            },
            ApprovalAction::SignMessage { .. } => Decision::Approved,
            ApprovalAction::SignTransaction { .. } => Decision::Approved,
        }
    }
}
