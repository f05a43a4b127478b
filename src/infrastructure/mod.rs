//! 基础设施层

pub mod db;
pub mod encryption;
pub mod event_bus;
pub mod logging;

pub use db::VaultPool;
pub use encryption::{EncryptionKey, VaultCipher};
pub use event_bus::{AuditLogHandler, EventHandler, VaultEvent, VaultEventBus};
