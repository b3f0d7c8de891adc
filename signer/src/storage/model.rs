//! Persisted entity types, and their statuses.
//!
//! Mirrors the shape of `sbtc::storage::model` (see
//! `examples/other_examples/7b7f65c8_BowTiedRadone-sbtc__signer-src-storage-model.rs.rs`):
//! plain `serde`-derived structs, one per row family, with an accompanying
//! `#[cfg(feature = "testing")] Dummy` impl where a test suite benefits from
//! generating one.

use bridge_core::ChainTag;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A per-user deposit address on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAddress {
    /// The exchange's user identifier; also the derivation salt.
    pub user_id: u64,
    /// Chain-encoded address string (checksummed EVM hex, or bech32m P2TR).
    pub address: String,
    /// Which chain this address was derived for.
    pub chain_tag: ChainTag,
    /// Whether deposits to this address should be tracked. Addresses are
    /// never deleted, only deactivated.
    pub is_active: bool,
}

/// The status of a [`UserTransfer`] as it moves through the finalization
/// state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    /// Observed on-chain, not yet below the finalized-block threshold.
    Pending,
    /// Below the finalized-block threshold; assumed irreversible.
    Finalized,
    /// The block this transfer was observed in was replaced by a reorg.
    Reorg,
    /// Externally verified (receipt success + exchange credit).
    Verified,
    /// Swept into the vault (EVM) or otherwise settled.
    Successful,
    /// Rejected by policy and will never be retried.
    Rejected,
}

/// A raw, chain-observed transfer, before it is known to be addressed to a
/// tracked user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransfer {
    /// Transaction hash (EVM) or txid (BTC), hex-encoded.
    pub tx_hash: String,
    /// Block height the transfer was observed in.
    pub block_number: u64,
    /// Which chain this transfer was observed on.
    pub chain_tag: ChainTag,
    /// Recipient address, chain-encoded.
    pub to: String,
    /// Token contract address (EVM, `0x0..0` sentinel for native) or the
    /// BTC native-token sentinel (always `0x0..0`, since BTC has no tokens).
    pub token: String,
    /// Amount in the token's base units (wei / satoshis).
    pub value: u128,
    /// Log index (EVM) or vout index (BTC) disambiguating multiple
    /// transfers within one transaction.
    pub index: u32,
}

/// A [`RawTransfer`] once its destination has matched a tracked user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTransfer {
    /// The underlying chain-observed transfer.
    #[serde(flatten)]
    pub transfer: RawTransfer,
    /// Which user this transfer credits.
    pub user_id: u64,
    /// Decimals of `transfer.token`, cached at observation time.
    pub decimals: u8,
    /// Current position in the finalization/sweep state machine.
    pub status: TransferStatus,
}

/// Monotonic per-chain observation progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCursor {
    /// The chain this cursor tracks.
    pub chain_tag: ChainTag,
    /// The highest block number fully processed so far.
    pub last_observed_block: u64,
}

/// A cached ERC-20 decimals lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// The chain the token contract lives on.
    pub chain_tag: ChainTag,
    /// The ERC-20 contract address.
    pub token_address: String,
    /// Cached `decimals()` result.
    pub decimals: u8,
}

/// Status of a [`WithdrawRequest`] as it moves through
/// `WithdrawCoordinator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawStatus {
    /// Pulled from the exchange, not yet started.
    Pending,
    /// Nonces/UTXOs requested, signature/broadcast in flight.
    Processing,
    /// Broadcast and confirmed.
    Successful,
    /// Terminally rejected (hash mismatch, contract revert, policy).
    Rejected,
}

/// A withdraw pulled from the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawRequest {
    /// Per-chain, exchange-assigned monotonic nonce.
    pub nonce: u64,
    /// Which chain this withdraw settles on.
    pub chain_tag: ChainTag,
    /// The user requesting the withdraw.
    pub user_id: u64,
    /// Destination address, chain-encoded.
    pub recipient: String,
    /// ERC-20 token address, or native sentinel (EVM only; ignored for
    /// BTC, which is always native).
    pub token_address: String,
    /// Amount in the chain's base units.
    pub amount: u128,
    /// Current coordinator state.
    pub status: WithdrawStatus,
    /// Set once broadcast.
    pub tx_hash: Option<String>,
    /// BTC-only: the UTXOs assigned to fund this withdraw, set exactly
    /// once by `preprocess_btc_withdraw` and reused for every subsequent
    /// computation of this same withdraw.
    pub utxos: Option<Vec<UtxoRef>>,
    /// BTC-only: the fee rate used to compute `utxos`.
    pub sat_per_byte: Option<u64>,
}

/// A lightweight reference to a [`Utxo`] row, embedded in a
/// [`WithdrawRequest`] once UTXOs are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoRef {
    /// Identifies the spent output.
    pub outpoint: UtxoOutpoint,
    /// Value of the spent output, in satoshis.
    pub amount: u64,
    /// The depositing user's salt, carried along so the withdraw's signing
    /// pass can re-derive each input's tweaked key without a second store
    /// lookup; each input is signed with its own salt.
    pub salt: u64,
}

/// `(tx_hash, vout_index)`, the natural key of a [`Utxo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UtxoOutpoint {
    /// Txid of the transaction that created this output, hex-encoded.
    pub tx_hash: [u8; 32],
    /// Output index within that transaction.
    pub index: u32,
}

/// Status of a [`Utxo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UtxoStatus {
    /// Available for selection by a withdraw.
    Unspent,
    /// Assigned to a withdraw and consumed.
    Spend,
}

/// A Bitcoin unspent output observed paying a tracked deposit address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// Identifies the output.
    pub outpoint: UtxoOutpoint,
    /// Address (and therefore user) the output pays.
    pub salt: u64,
    /// Value, in satoshis.
    pub amount: u64,
    /// Current spend state.
    pub status: UtxoStatus,
}

#[cfg(feature = "testing")]
mod dummy {
    use super::*;
    use fake::{Dummy, Fake, Faker};
    use rand::Rng;

    impl Dummy<Faker> for RawTransfer {
        fn dummy_with_rng<R: Rng + ?Sized>(config: &Faker, rng: &mut R) -> Self {
            RawTransfer {
                tx_hash: format!("0x{}", hex::encode(config.fake_with_rng::<[u8; 32], _>(rng))),
                block_number: config.fake_with_rng(rng),
                chain_tag: ChainTag::Pol,
                to: format!("0x{}", hex::encode(config.fake_with_rng::<[u8; 20], _>(rng))),
                token: "0x0000000000000000000000000000000000000000".to_string(),
                value: rng.gen_range(1..1_000_000_000_000_000_000u128),
                index: config.fake_with_rng(rng),
            }
        }
    }

    impl Dummy<Faker> for UserTransfer {
        fn dummy_with_rng<R: Rng + ?Sized>(config: &Faker, rng: &mut R) -> Self {
            UserTransfer {
                transfer: config.fake_with_rng(rng),
                user_id: config.fake_with_rng(rng),
                decimals: 18,
                status: TransferStatus::Pending,
            }
        }
    }
}
