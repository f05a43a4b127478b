// 事件总线
// 钱包集合变更与请求完结的发布/订阅，观察者显式注册

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};

use crate::domain::wallet::WalletChangeSet;

// ============ 事件类型定义 ============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum VaultEvent {
    /// 钱包集合发生变化（新增/修改/删除）
    WalletsChanged(WalletChangeSet),
    /// 某个入站请求已终结（已回调或被取代/取消）
    RequestResolved { id: u64, outcome: String },
}

impl VaultEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            VaultEvent::WalletsChanged(_) => "WalletsChanged",
            VaultEvent::RequestResolved { .. } => "RequestResolved",
        }
    }
}

// ============ Event Handler Trait ============

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &VaultEvent) -> Result<()>;
    fn event_types(&self) -> Vec<&'static str>;
}

// ============ 事件总线实现 ============

/// 内存事件总线
///
/// 两条分发路径：
/// - 已注册的 `EventHandler` 由后台任务逐个调用（处理失败只记日志）
/// - `subscribe_stream` 返回 broadcast 接收端，适合测试与松耦合观察者
pub struct VaultEventBus {
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
    sender: mpsc::UnboundedSender<VaultEvent>,
    broadcast_tx: broadcast::Sender<VaultEvent>,
}

impl VaultEventBus {
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<VaultEvent>();
        let (broadcast_tx, _) = broadcast::channel(256);
        let handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>> = Arc::new(RwLock::new(Vec::new()));

        let handlers_clone = handlers.clone();

        // 后台任务：处理事件分发
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let handlers_read = handlers_clone.read().await;

                for handler in handlers_read.iter() {
                    if handler.event_types().contains(&event.event_type()) {
                        if let Err(e) = handler.handle(&event).await {
                            tracing::error!("Event handler error: {:?}, event: {:?}", e, event);
                        }
                    }
                }
            }
        });

        Self {
            handlers,
            sender,
            broadcast_tx,
        }
    }

    /// 发布事件
    pub fn publish(&self, event: VaultEvent) -> Result<()> {
        // broadcast 没有接收者时返回错误，忽略即可
        let _ = self.broadcast_tx.send(event.clone());

        self.sender
            .send(event)
            .map_err(|e| anyhow::anyhow!("Failed to send event: {}", e))?;

        Ok(())
    }

    /// 注册事件处理器
    pub async fn subscribe(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// 订阅事件流
    pub fn subscribe_stream(&self) -> broadcast::Receiver<VaultEvent> {
        self.broadcast_tx.subscribe()
    }
}

impl Default for VaultEventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============ 内置处理器 ============

/// 审计处理器：每次集合变更与请求完结写一条结构化日志
pub struct AuditLogHandler;

#[async_trait]
impl EventHandler for AuditLogHandler {
    async fn handle(&self, event: &VaultEvent) -> Result<()> {
        match event {
            VaultEvent::WalletsChanged(changes) => {
                tracing::info!(
                    inserted = changes.inserted.len(),
                    updated = changes.updated.len(),
                    deleted = changes.deleted.len(),
                    "Wallet collection changed"
                );
            }
            VaultEvent::RequestResolved { id, outcome } => {
                tracing::info!(id, %outcome, "Request resolved (audit)");
            }
        }
        Ok(())
    }

    fn event_types(&self) -> Vec<&'static str> {
        vec!["WalletsChanged", "RequestResolved"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct CountingHandler {
        seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: &VaultEvent) -> Result<()> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn event_types(&self) -> Vec<&'static str> {
            vec!["WalletsChanged"]
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_registered_handler() {
        let bus = VaultEventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));

        bus.subscribe(Arc::new(CountingHandler { seen: seen.clone() }))
            .await;

        bus.publish(VaultEvent::WalletsChanged(WalletChangeSet::inserted(
            Uuid::new_v4(),
        )))
        .unwrap();

        // 等待异步分发
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_filters_event_types() {
        let bus = VaultEventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));

        bus.subscribe(Arc::new(CountingHandler { seen: seen.clone() }))
            .await;

        bus.publish(VaultEvent::RequestResolved {
            id: 42,
            outcome: "responded".to_string(),
        })
        .unwrap();

        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_broadcast_stream() {
        let bus = VaultEventBus::new();
        let mut rx = bus.subscribe_stream();

        bus.publish(VaultEvent::RequestResolved {
            id: 7,
            outcome: "cancelled".to_string(),
        })
        .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "RequestResolved");
    }

    #[tokio::test]
    async fn test_audit_handler_accepts_both_event_types() {
        let handler = AuditLogHandler;
        assert_eq!(
            handler.event_types(),
            vec!["WalletsChanged", "RequestResolved"]
        );

        let changed = VaultEvent::WalletsChanged(WalletChangeSet::inserted(Uuid::new_v4()));
        assert!(handler.handle(&changed).await.is_ok());

        let resolved = VaultEvent::RequestResolved {
            id: 1,
            outcome: "responded".to_string(),
        };
        assert!(handler.handle(&resolved).await.is_ok());
    }

    #[test]
    fn test_event_serialization() {
        let event = VaultEvent::WalletsChanged(WalletChangeSet::deleted(Uuid::new_v4()));

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("WalletsChanged"));

        let parsed: VaultEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
