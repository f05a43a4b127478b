//! 服务层

pub mod approval;
pub mod bridge_protocol;
pub mod key_material;
pub mod keystore;
pub mod request_arbiter;
pub mod wallet_store;

pub use approval::{ApprovalAction, ApprovalSurface, Decision, SurfaceRegistry};
pub use bridge_protocol::{BridgeProtocol, InboundRequest, OperationKind, PeerMeta, TxParams};
pub use key_material::{KeyMaterialCodec, ValidationResult};
pub use keystore::decrypt_keystore;
pub use request_arbiter::{RequestArbiter, RequestOutcome, RequestState};
pub use wallet_store::WalletStore;
