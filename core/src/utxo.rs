//! UTXO fee estimation and the "accumulate until sufficient" selector.
//!
//! Grounded in the original's `zexporta/withdraw/btc.py::calculate_fee` /
//! `get_utxos_for_withdraw`: oldest-first accumulation, a flat
//! `30 * inputs.len()`-byte padding on top of the real transaction size to
//! overestimate signature weight, and a change output that is always
//! produced.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A candidate or already-assigned Bitcoin UTXO, as tracked by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// Value locked in this output, in satoshis.
    pub amount: u64,
    /// Rough serialized size of this input's witness once signed, in vbytes
    /// before the `30`-byte signature padding is applied — callers that
    /// don't have a real estimate can pass `0` and rely on the padding
    /// alone, matching the original, which does not vary this per UTXO.
    pub base_vsize: u64,
}

/// The outcome of [`select_utxos`]: which UTXOs were chosen, and the fee
/// (in satoshis) the caller must subtract from the change output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Indices into the candidate slice that were selected, in the order
    /// they were accumulated (oldest-first).
    pub chosen: Vec<usize>,
    /// Total satoshis across every chosen UTXO.
    pub total_in: u64,
    /// Fee, in satoshis, computed against the chosen set.
    pub fee: u64,
}

/// Estimate the transaction fee, in satoshis, for spending `num_inputs`
/// Taproot key-path inputs into two outputs (recipient + change) at
/// `sat_per_byte`.
///
/// `base_size` is the size of the un-witnessed skeleton (inputs without
/// signatures plus both outputs); the original pads this by 30 bytes per
/// input to overestimate signature size rather than compute it exactly,
/// which avoids ever under-funding a transaction.
pub fn estimate_fee(base_size: u64, num_inputs: usize, sat_per_byte: u64) -> u64 {
    let padded_size = base_size + 30 * num_inputs as u64;
    padded_size * sat_per_byte
}

/// Select UTXOs from `candidates` (ordered oldest-first, as returned by
/// `Store::find_utxos_by_status(UNSPENT)`) to cover `amount + fee`,
/// accumulating until sufficient.
///
/// `base_size_fn` computes the unsigned-transaction base size for a given
/// number of chosen inputs (two outputs assumed fixed); this is supplied by
/// the caller because it depends on the concrete transaction encoding
/// (`bitcoin::Transaction`), which this crate does not construct.
pub fn select_utxos(
    candidates: &[Utxo],
    amount: u64,
    sat_per_byte: u64,
    base_size_fn: impl Fn(usize) -> u64,
) -> Result<Selection, Error> {
    let mut chosen = Vec::new();
    let mut acc = 0u64;

    for (idx, utxo) in candidates.iter().enumerate() {
        chosen.push(idx);
        acc += utxo.amount;

        let fee = estimate_fee(base_size_fn(chosen.len()), chosen.len(), sat_per_byte);
        if acc >= amount + fee {
            return Ok(Selection { chosen, total_in: acc, fee });
        }
    }

    Err(Error::NotEnoughInputs {
        needed: amount,
        available: candidates.iter().map(|u| u.amount).sum(),
        utxo_count: candidates.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utxo(amount: u64) -> Utxo {
        Utxo { amount, base_vsize: 0 }
    }

    /// Ages-ascending [8000, 12000, 30000], amount=25000, sat_per_byte=10
    /// selects all three.
    #[test]
    fn accumulates_oldest_first_until_sufficient() {
        let candidates = [utxo(8_000), utxo(12_000), utxo(30_000)];
        let selection = select_utxos(&candidates, 25_000, 10, |n| 100 + 50 * n as u64).unwrap();
        assert_eq!(selection.chosen, vec![0, 1, 2]);
        assert_eq!(selection.total_in, 50_000);
        assert!(selection.total_in >= 25_000 + selection.fee);
    }

    #[test]
    fn insufficient_utxos_fail_with_none_marked_spend() {
        let candidates = [utxo(100), utxo(200)];
        let err = select_utxos(&candidates, 1_000_000, 10, |n| 100 + 50 * n as u64).unwrap_err();
        assert_matches::assert_matches!(err, Error::NotEnoughInputs { .. });
    }

    #[test]
    fn single_utxo_exactly_covering_amount_and_fee_is_chosen() {
        // base_size+30*1 vbytes * 1 sat/byte must be <= surplus for this to select just one.
        let candidates = [utxo(1_000), utxo(5_000)];
        let selection = select_utxos(&candidates, 900, 1, |n| 10 + 30 * n as u64).unwrap();
        assert_eq!(selection.chosen, vec![0]);
    }

    #[test]
    fn selected_total_always_covers_amount_plus_fee() {
        let candidates = [utxo(500), utxo(700), utxo(10_000)];
        let selection = select_utxos(&candidates, 1_000, 5, |n| 150 + 40 * n as u64).unwrap();
        assert!(selection.total_in >= 1_000 + selection.fee);
    }
}
