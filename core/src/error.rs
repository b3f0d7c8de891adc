//! Errors produced by pure `bridge-core` functions.

/// Errors from address derivation, UTXO selection, and withdraw-hash
/// encoding. These are all deterministic/local failures — no I/O, no
/// retries — so there is only ever one way to handle them: reject the
/// input.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configured master public key bytes did not parse as a valid
    /// x-only secp256k1 point.
    #[error("invalid master public key: {0}")]
    InvalidMasterKey(#[source] secp256k1::Error),

    /// Tweaking the master key by the user's tagged hash produced a point
    /// that `secp256k1` rejected (cryptographically should not happen for a
    /// valid curve point, kept as a defensive variant).
    #[error("key tweak failed: {0}")]
    TweakFailed(#[source] secp256k1::Error),

    /// Bitcoin address encoding failed for the tweaked key and configured
    /// network.
    #[error("address encoding failed: {0}")]
    AddressEncoding(String),

    /// The candidate UTXO set could not cover `amount + fee` no matter how
    /// many of the available UTXOs were accumulated.
    #[error("not enough inputs: needed {needed} sats, have {available} sats across {utxo_count} utxos")]
    NotEnoughInputs {
        /// Satoshis required (withdraw amount + fee).
        needed: u64,
        /// Satoshis available across every supplied candidate UTXO.
        available: u64,
        /// Number of candidate UTXOs considered.
        utxo_count: usize,
    },
}
