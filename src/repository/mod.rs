//! 持久化仓库层

pub mod wallets;

pub use wallets::{WalletRepository, WalletRow};
