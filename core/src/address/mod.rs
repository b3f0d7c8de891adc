//! Deterministic per-user deposit address derivation.
//!
//! Both variants are pure functions of a `user_id` ("salt") and a small
//! amount of chain configuration; neither touches the network or the
//! store.

pub mod btc;
pub mod evm;

pub use btc::{derive_btc_address, BtcAddressParams};
pub use evm::{derive_evm_address, EvmAddressParams};
