//! The bridge daemon: one process observing every configured chain,
//! finalizing and sweeping verified deposits, and settling withdraws.
//!
//! A flat module tree of long-running components, each generic over
//! [`context::Context`] so it can run against a real
//! [`chain::evm::EvmClient`]/[`chain::btc::BtcClient`] pair in production or
//! an in-memory store and fake chain client in tests.

pub mod chain;
pub mod config;
pub mod context;
pub mod error;
pub mod exchange;
pub mod finalizer;
pub mod observer;
pub mod signing_aggregator;
pub mod storage;
#[cfg(feature = "testing")]
pub mod testing;
pub mod vault_depositor;
pub mod withdraw;

/// Package version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
