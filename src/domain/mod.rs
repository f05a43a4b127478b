//! 领域模型层

pub mod chain_config;
pub mod derivation;
pub mod wallet;

pub use chain_config::{AddressFormat, ChainConfig, ChainRegistry, CurveType, DerivationStandard};
pub use derivation::{derive_account, DerivationStrategy, DerivationStrategyFactory, DerivedAccount};
pub use wallet::{KeyKind, Wallet, WalletChangeSet, WalletSecret};
