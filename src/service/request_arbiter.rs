//! 入站请求仲裁器
//!
//! 每个关联 id 终其一生恰好发出一条回调。并发与重试下的唯一性
//! 由两层机制保证：
//! - 代数计数器：同 id 的新解码取代旧的（旧任务被取消、不回调）
//! - 锁内移除：回调只在 pending 表里成功移除对应代数的条目后发出
//!
//! 待决请求只存在于内存，从不持久化。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use crate::error::DecodeError;
use crate::infrastructure::event_bus::{VaultEvent, VaultEventBus};
use crate::service::approval::{ApprovalAction, Decision, SurfaceRegistry};
use crate::service::bridge_protocol::{BridgeProtocol, InboundRequest, OperationKind};
use crate::service::wallet_store::WalletStore;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 请求状态机
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 单个请求的生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// 已解码，尚未提交审批
    Decoded,
    /// 等待审批界面给出决定
    AwaitingDecision,
    /// 已回调（终态）
    Responded,
    /// 被取代或取消，未回调或以取消回调收尾（终态）
    Dropped,
}

/// 合法状态迁移表
pub fn can_transition(from: RequestState, to: RequestState) -> bool {
    use RequestState::*;
    matches!(
        (from, to),
        (Decoded, AwaitingDecision)
            | (Decoded, Responded)
            | (Decoded, Dropped)
            | (AwaitingDecision, Responded)
            | (AwaitingDecision, Dropped)
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 仲裁器
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 请求终结方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Responded,
    Cancelled,
}

impl RequestOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            RequestOutcome::Responded => "responded",
            RequestOutcome::Cancelled => "cancelled",
        }
    }
}

struct PendingEntry {
    generation: u64,
    state: RequestState,
    cancel: Option<oneshot::Sender<()>>,
    /// 请求主体钱包（签名类请求按地址解析），用于删除联动取消
    wallet_id: Option<Uuid>,
}

pub struct RequestArbiter {
    protocol: BridgeProtocol,
    store: Arc<WalletStore>,
    surfaces: SurfaceRegistry,
    bus: Arc<VaultEventBus>,
    callbacks: mpsc::UnboundedSender<String>,
    generation: AtomicU64,
    // 待决表用 std Mutex：临界区内无 await
    pending: StdMutex<HashMap<u64, PendingEntry>>,
}

impl RequestArbiter {
    /// 创建仲裁器，返回回调 URI 的接收端
    ///
    /// 同时启动钱包删除联动任务：待决请求的主体钱包被删除时，
    /// 该请求以取消收尾（仍然恰好一条回调）。
    pub fn new(
        protocol: BridgeProtocol,
        store: Arc<WalletStore>,
        surfaces: SurfaceRegistry,
        bus: Arc<VaultEventBus>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (callbacks, callback_rx) = mpsc::unbounded_channel();

        let arbiter = Arc::new(Self {
            protocol,
            store,
            surfaces,
            bus: bus.clone(),
            callbacks,
            generation: AtomicU64::new(0),
            pending: StdMutex::new(HashMap::new()),
        });

        let watcher = arbiter.clone();
        let mut events = bus.subscribe_stream();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(VaultEvent::WalletsChanged(changes)) => {
                        for wallet_id in changes.deleted {
                            watcher.cancel_where(|entry| entry.wallet_id == Some(wallet_id));
                        }
                    }
                    Ok(_) => {}
                    // 落后挤掉的事件里可能有删除，按当前钱包集合补扫
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Deletion watcher lagged, rescanning pending");
                        watcher.cancel_for_missing_subjects().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        (arbiter, callback_rx)
    }

    /// 处理一条入站 URI
    ///
    /// 返回 Ok(false) 表示前缀不属于本协议，已静默忽略。解码失败
    /// 返回错误，请求被丢弃，不影响既有待决请求。
    pub async fn handle_incoming(self: &Arc<Self>, raw: &str) -> Result<bool, DecodeError> {
        let Some(request) = self.protocol.decode(raw)? else {
            return Ok(false);
        };

        let id = request.id;
        tracing::debug!(id, "Inbound request decoded");

        // 已知但无需审批的操作：立即空回执
        if let OperationKind::Acknowledge { method } = &request.operation {
            tracing::debug!(id, method, "Acknowledging inactionable request");
            let generation = self.register(id, None, None);
            self.complete(id, generation, RequestOutcome::Responded);
            return Ok(true);
        }

        let wallet_id = self.resolve_subject(&request).await;
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let generation = self.register(id, Some(cancel_tx), wallet_id);

        let arbiter = self.clone();
        tokio::spawn(async move {
            arbiter.drive(request, generation, cancel_rx).await;
        });

        Ok(true)
    }

    /// 取消全部待决请求（逐条以取消回调收尾），用于宿主下线
    pub fn shutdown(&self) {
        self.cancel_where(|_| true);
    }

    /// 当前待决请求数（观测用）
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 内部
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 登记待决条目；同 id 已有条目则取代之（旧任务取消、不回调）
    fn register(
        &self,
        id: u64,
        cancel: Option<oneshot::Sender<()>>,
        wallet_id: Option<Uuid>,
    ) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let superseded = {
            let mut pending = self.lock_pending();
            pending.insert(
                id,
                PendingEntry {
                    generation,
                    state: RequestState::Decoded,
                    cancel,
                    wallet_id,
                },
            )
        };

        if let Some(mut old) = superseded {
            debug_assert!(can_transition(old.state, RequestState::Dropped));
            tracing::info!(id, "Request superseded by newer decode");
            if let Some(cancel) = old.cancel.take() {
                let _ = cancel.send(());
            }
        }

        generation
    }

    /// 把请求送到审批界面并等决定；被取代则无声退出
    async fn drive(
        self: Arc<Self>,
        request: InboundRequest,
        generation: u64,
        cancel_rx: oneshot::Receiver<()>,
    ) {
        let id = request.id;
        let (surface, action) = match request.operation {
            OperationKind::SelectAccount { peer } => (
                self.surfaces.select_account.clone(),
                ApprovalAction::SelectAccount { peer },
            ),
            OperationKind::SignMessage {
                address,
                message,
                peer,
            } => (
                self.surfaces.sign_message.clone(),
                ApprovalAction::SignMessage {
                    address,
                    message,
                    peer,
                },
            ),
            OperationKind::SignTransaction { address, tx, peer } => (
                self.surfaces.sign_transaction.clone(),
                ApprovalAction::SignTransaction { address, tx, peer },
            ),
            // handle_incoming 已拦截
            OperationKind::Acknowledge { .. } => return,
        };

        self.advance(id, generation, RequestState::AwaitingDecision);

        tokio::select! {
            decision = surface.present(action) => {
                let outcome = match decision {
                    Decision::Cancelled => RequestOutcome::Cancelled,
                    _ => RequestOutcome::Responded,
                };
                self.complete(id, generation, outcome);
            }
            _ = cancel_rx => {
                // 被取代或钱包删除联动已处理，这里不回调
                tracing::debug!(id, "Decision task cancelled");
            }
        }
    }

    /// 终结请求：只有成功从待决表移除对应代数的条目才发回调
    fn complete(&self, id: u64, generation: u64, outcome: RequestOutcome) -> bool {
        let removed = {
            let mut pending = self.lock_pending();
            match pending.get(&id) {
                Some(entry) if entry.generation == generation => {
                    debug_assert!(can_transition(entry.state, RequestState::Responded));
                    pending.remove(&id);
                    true
                }
                _ => false,
            }
        };

        if removed {
            let uri = self.protocol.encode_callback(id);
            if let Err(e) = self.callbacks.send(uri) {
                tracing::error!(id, "Callback sink closed: {e}");
            }
            if let Err(e) = self.bus.publish(VaultEvent::RequestResolved {
                id,
                outcome: outcome.as_str().to_string(),
            }) {
                tracing::error!(id, "Failed to publish resolution: {e}");
            }
            tracing::info!(id, outcome = outcome.as_str(), "Request resolved");
        }
        removed
    }

    /// 批量取消满足条件的待决请求，每条都以取消回调收尾
    fn cancel_where(&self, predicate: impl Fn(&PendingEntry) -> bool) {
        let drained: Vec<(u64, PendingEntry)> = {
            let mut pending = self.lock_pending();
            let ids: Vec<u64> = pending
                .iter()
                .filter(|(_, entry)| predicate(entry))
                .map(|(&id, _)| id)
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id).map(|entry| (id, entry)))
                .collect()
        };

        for (id, mut entry) in drained {
            if let Some(cancel) = entry.cancel.take() {
                let _ = cancel.send(());
            }

            let uri = self.protocol.encode_callback(id);
            let _ = self.callbacks.send(uri);
            let _ = self.bus.publish(VaultEvent::RequestResolved {
                id,
                outcome: RequestOutcome::Cancelled.as_str().to_string(),
            });
            tracing::info!(id, "Pending request cancelled");
        }
    }

    /// 主体钱包已不在当前集合的待决请求，逐条取消收尾
    async fn cancel_for_missing_subjects(&self) {
        let live: HashSet<Uuid> = self.store.all().await.iter().map(|w| w.id).collect();
        self.cancel_where(|entry| entry.wallet_id.is_some_and(|id| !live.contains(&id)));
    }

    /// 签名类请求按地址解析主体钱包
    async fn resolve_subject(&self, request: &InboundRequest) -> Option<Uuid> {
        let address = match &request.operation {
            OperationKind::SignMessage { address, .. } => address,
            OperationKind::SignTransaction { address, .. } => address,
            _ => return None,
        };

        self.store
            .all()
            .await
            .iter()
            .find(|w| {
                w.addresses
                    .values()
                    .any(|a| a.eq_ignore_ascii_case(address))
            })
            .map(|w| w.id)
    }

    /// 推进状态机（仅对仍是该代数的条目生效）
    fn advance(&self, id: u64, generation: u64, to: RequestState) {
        let mut pending = self.lock_pending();
        if let Some(entry) = pending.get_mut(&id) {
            if entry.generation == generation && can_transition(entry.state, to) {
                entry.state = to;
            }
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<u64, PendingEntry>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
