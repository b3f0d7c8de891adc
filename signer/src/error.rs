//! The bridge signer's error type.
//!
//! One flat `thiserror::Error` enum, in the style of `Error::BitcoinTxMissing`
//! / `Error::MissingBlock` as used throughout `block_observer.rs`. Variants
//! are grouped in doc comments by kind (Transient, Schema, Consistency,
//! Contract, Validator, Assertion), since that grouping governs which
//! variants the withdraw coordinator treats as retryable versus terminal.

use bridge_core::ChainTag;

/// Errors surfaced by any bridge signer component.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --- Transient: retry with backoff, never rejects a request. ---
    /// An RPC call to a chain node failed and may succeed on retry.
    #[error("chain rpc call to {chain_tag} failed: {message}")]
    ChainRpc {
        /// Which chain's client failed.
        chain_tag: ChainTag,
        /// The underlying transport error's display text. Kept as a string
        /// rather than the concrete error type since the EVM (`alloy`) and
        /// BTC (`bitcoincore_rpc`) clients don't share an error type.
        message: String,
    },

    /// The signing aggregator's HTTP endpoint returned a network-level
    /// failure (not a validator-level rejection).
    #[error("signing aggregator call failed: {0}")]
    SigningAggregatorRpc(#[source] reqwest::Error),

    /// The exchange's read-only HTTP endpoint returned a network-level
    /// failure.
    #[error("exchange rpc call failed: {0}")]
    ExchangeRpc(#[source] reqwest::Error),

    /// A database call failed.
    #[error("storage error: {0}")]
    Storage(#[source] sqlx::Error),

    /// Running pending migrations against the configured database failed.
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    // --- Schema: the response shape didn't match what we expected. ---
    /// A JSON payload failed to deserialize into the expected shape.
    #[error("failed to decode {context}: {source}")]
    Decode {
        /// What was being decoded, for the log line.
        context: &'static str,
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// A chain-encoded value (address, tx hash) failed to parse.
    #[error("invalid {context}: {value}")]
    InvalidFormat {
        /// What was being parsed, for the log line.
        context: &'static str,
        /// The offending raw value.
        value: String,
    },

    // --- Consistency: our own stored state doesn't add up. ---
    /// A row a caller expected to already exist was missing.
    #[error("expected {0} not found in storage")]
    NotFound(&'static str),

    /// [`bridge_core::utxo::select_utxos`] could not satisfy a withdraw.
    #[error(transparent)]
    Core(#[from] bridge_core::Error),

    /// A withdraw was assigned UTXOs whose total locally recomputes to a
    /// different amount than what storage has on file — the set must never
    /// silently change between the fee pass and the signing pass.
    #[error("withdraw {chain_tag}/{nonce} utxo set changed between fee and sign passes")]
    UtxoSetChanged {
        /// Which chain's withdraw this is.
        chain_tag: ChainTag,
        /// The withdraw's nonce.
        nonce: u64,
    },

    // --- Contract: the chain itself rejected or reverted a transaction. ---
    /// An EVM `eth_call`/`eth_sendRawTransaction` reverted.
    #[error("vault contract call reverted: {0}")]
    ContractRevert(String),

    /// A broadcast BTC transaction was rejected by the node's mempool
    /// policy.
    #[error("bitcoin transaction rejected: {0}")]
    BitcoinRejected(String),

    // --- Validator: the signing aggregator's quorum rejected the request. ---
    /// A validator in the signing quorum returned an application-level
    /// error (insufficient nonces, policy rejection, etc).
    #[error("validator rejected withdraw {chain_tag}/{nonce}: {reason}")]
    ValidatorRejected {
        /// Which chain's withdraw this is.
        chain_tag: ChainTag,
        /// The withdraw's nonce.
        nonce: u64,
        /// The aggregator's stated reason.
        reason: String,
    },

    /// The signing aggregator's independently computed hash did not match
    /// the locally computed withdraw hash.
    #[error("validator message_hash does not match the locally computed withdraw hash for {chain_tag}/{nonce}")]
    WithdrawHashMismatch {
        /// Which chain's withdraw this is.
        chain_tag: ChainTag,
        /// The withdraw's nonce.
        nonce: u64,
    },

    // --- Assertion: an invariant this process itself is responsible for. ---
    /// A chain tag was used somewhere its family doesn't apply (e.g. an EVM
    /// vault address requested for a BTC chain tag).
    #[error("chain tag {0} is not valid in this context")]
    UnsupportedChain(ChainTag),

    /// Configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A background task's channel closed unexpectedly.
    #[error("internal channel closed: {0}")]
    ChannelClosed(&'static str),
}
