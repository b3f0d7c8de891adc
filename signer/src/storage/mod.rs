//! Storage traits and backends.
//!
//! A pair of narrow traits (`DbRead`, `DbWrite`) that every component
//! depends on through `Context::storage()`, plus swappable backends
//! (`in_memory` for tests, `postgres` for the running daemon). Methods are
//! declared with return-position `impl Future` rather than
//! `#[async_trait]`.

pub mod in_memory;
pub mod model;
pub mod postgres;

use std::future::Future;

use bridge_core::ChainTag;

use self::model::{
    ChainCursor, Token, UserAddress, UserTransfer, Utxo, UtxoOutpoint, UtxoStatus, WithdrawRequest,
    WithdrawStatus,
};
use crate::error::Error;

/// Read access to persisted bridge state.
///
/// Every method is chain-scoped by a `ChainTag` parameter rather than
/// assuming a single chain per store instance, since one signer process
/// observes every configured chain against one store.
pub trait DbRead {
    /// Fetch the active addresses tracked for `chain_tag`.
    fn get_active_addresses(
        &self,
        chain_tag: ChainTag,
    ) -> impl Future<Output = Result<Vec<UserAddress>, Error>> + Send;

    /// Look up the address assigned to `user_id` on `chain_tag`, if any.
    fn get_address(
        &self,
        chain_tag: ChainTag,
        user_id: u64,
    ) -> impl Future<Output = Result<Option<UserAddress>, Error>> + Send;

    /// The last fully-processed block for `chain_tag`, if observation has
    /// started.
    fn get_chain_cursor(
        &self,
        chain_tag: ChainTag,
    ) -> impl Future<Output = Result<Option<ChainCursor>, Error>> + Send;

    /// Transfers currently in `status` on `chain_tag`, oldest first.
    fn find_transfers_by_status(
        &self,
        chain_tag: ChainTag,
        status: model::TransferStatus,
    ) -> impl Future<Output = Result<Vec<UserTransfer>, Error>> + Send;

    /// Cached decimals for `token_address` on `chain_tag`.
    fn get_token(
        &self,
        chain_tag: ChainTag,
        token_address: &str,
    ) -> impl Future<Output = Result<Option<Token>, Error>> + Send;

    /// Unspent BTC outputs, ordered oldest-first (by the order they were
    /// inserted), as required by `select_utxos`'s oldest-first contract.
    fn find_utxos_by_status(
        &self,
        status: UtxoStatus,
    ) -> impl Future<Output = Result<Vec<Utxo>, Error>> + Send;

    /// A withdraw request by its chain-scoped nonce, if already pulled from
    /// the exchange.
    fn get_withdraw_request(
        &self,
        chain_tag: ChainTag,
        nonce: u64,
    ) -> impl Future<Output = Result<Option<WithdrawRequest>, Error>> + Send;

    /// Withdraws currently in `status` on `chain_tag`.
    fn find_withdraw_requests_by_status(
        &self,
        chain_tag: ChainTag,
        status: WithdrawStatus,
    ) -> impl Future<Output = Result<Vec<WithdrawRequest>, Error>> + Send;
}

/// Write access to persisted bridge state.
pub trait DbWrite {
    /// Insert or reactivate a derived address. Idempotent: deriving the same
    /// `(chain_tag, user_id)` twice is a no-op on the second call.
    fn write_address(&self, address: UserAddress) -> impl Future<Output = Result<(), Error>> + Send;

    /// Advance the observation cursor for `chain_tag`.
    fn write_chain_cursor(
        &self,
        cursor: ChainCursor,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Conditionally insert a freshly observed, user-matched transfer: a
    /// no-op if `(chain_tag, tx_hash, index)` already exists, so
    /// re-observing the same block after a restart neither creates
    /// duplicates nor clobbers a row a [`set_transfer_status`] call has
    /// already advanced past `PENDING`.
    ///
    /// [`set_transfer_status`]: DbWrite::set_transfer_status
    fn write_transfer(&self, transfer: UserTransfer) -> impl Future<Output = Result<(), Error>> + Send;

    /// Move a transfer to a new [`model::TransferStatus`].
    fn set_transfer_status(
        &self,
        chain_tag: ChainTag,
        tx_hash: &str,
        index: u32,
        status: model::TransferStatus,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Cache a token's decimals.
    fn write_token(&self, token: Token) -> impl Future<Output = Result<(), Error>> + Send;

    /// Conditionally record a newly observed unspent output: a no-op if its
    /// outpoint already exists, so a retried observer batch never resets a
    /// UTXO a withdraw has already assigned back to `UNSPENT`.
    fn write_utxo(&self, utxo: Utxo) -> impl Future<Output = Result<(), Error>> + Send;

    /// Mark a UTXO (by its natural key) spent.
    fn set_utxo_status(
        &self,
        outpoint: UtxoOutpoint,
        status: UtxoStatus,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Persist a withdraw pulled from the exchange. Upserts on
    /// `(chain_tag, nonce)`.
    fn write_withdraw_request(
        &self,
        request: WithdrawRequest,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Move a withdraw to a new [`WithdrawStatus`], and optionally attach a
    /// broadcast `tx_hash`.
    fn set_withdraw_status(
        &self,
        chain_tag: ChainTag,
        nonce: u64,
        status: WithdrawStatus,
        tx_hash: Option<String>,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Assign UTXOs (and the fee rate used to pick them) to a withdraw,
    /// exactly once: the same set is reused by every later pass over this
    /// withdraw.
    fn assign_withdraw_utxos(
        &self,
        chain_tag: ChainTag,
        nonce: u64,
        utxos: Vec<model::UtxoRef>,
        sat_per_byte: u64,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}
