//! Per-chain client abstraction.
//!
//! Both chain families (EVM, BTC) implement the same narrow surface the
//! observer, finalizer, vault depositor, and withdraw coordinator drive —
//! the same shape `BlockObserver` is generic over a
//! `BitcoinInteract`/`StacksInteract` pair for rather than hard-coding a
//! single RPC client. This bridge needs two concrete implementations rather
//! than one, so the trait lives at the top of the module and `evm`/`btc`
//! each provide one.

pub mod btc;
pub mod evm;

use bridge_core::ChainTag;

use crate::error::Error;
use crate::storage::model::RawTransfer;

/// The read/write surface every chain client exposes to the rest of the
/// signer, regardless of family.
pub trait ChainClient: Send + Sync {
    /// Which chain this client talks to.
    fn chain_tag(&self) -> ChainTag;

    /// The current chain tip.
    fn latest_block(&self) -> impl std::future::Future<Output = Result<u64, Error>> + Send;

    /// Scan `from..=to` for transfers into any tracked address, returning
    /// one [`RawTransfer`] per matching transfer.
    fn scan_transfers(
        &self,
        from: u64,
        to: u64,
        tracked_addresses: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<RawTransfer>, Error>> + Send;

    /// Whether the transaction containing `tx_hash` succeeded (EVM:
    /// `status == 1`; BTC: the transaction is simply confirmed, there is
    /// no separate revert state).
    fn transaction_succeeded(
        &self,
        tx_hash: &str,
    ) -> impl std::future::Future<Output = Result<bool, Error>> + Send;

    /// Cached or freshly queried decimals for `token_address` (EVM only;
    /// BTC has none and always returns `8`).
    fn token_decimals(
        &self,
        token_address: &str,
    ) -> impl std::future::Future<Output = Result<u8, Error>> + Send;
}
