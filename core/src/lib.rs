//! # bridge-core
//!
//! Pure, dependency-light domain logic shared by the bridge signer: deriving
//! per-user deposit addresses, selecting and costing Bitcoin UTXOs for a
//! withdrawal, and encoding the canonical withdraw hash that the signing
//! aggregator's quorum must agree on. None of the types in this crate touch
//! a network or a database; everything here is referentially transparent.
#![deny(missing_docs)]

pub mod address;
pub mod chain;
pub mod error;
#[cfg(feature = "testing")]
pub mod testing;
pub mod utxo;
pub mod withdraw_hash;

pub use chain::ChainTag;
pub use error::Error;

/// Package version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
