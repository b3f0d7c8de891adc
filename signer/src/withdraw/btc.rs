//! The single-signer BTC withdraw path.
//!
//! Grounded in the original's `zexporta/withdraw/btc.py::send_btc_withdraw`:
//! UTXOs are selected once and the same selection is reused for both the fee
//! computation and the eventual signing pass — the original recomputes the
//! transaction twice from a fresh query, which risks picking a different set
//! the second time; this implementation instead threads the one selection
//! through both passes. Distributed signing for BTC is out of scope: the
//! original's `# todo :: fix in distributed signing version` marks this as
//! intentionally single-signer, not a stub to complete.

use bitcoin::hashes::Hash;
use bitcoin::key::Keypair;
use bitcoin::secp256k1::{Message, Scalar, Secp256k1, SecretKey};
use bitcoin::sighash::{Prevouts, SighashCache, TapSighashType};
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use sha2::{Digest, Sha256};

use bridge_core::address::btc::{derive_btc_address, tap_tweak, BtcAddressParams};
use bridge_core::utxo::{estimate_fee, select_utxos, Utxo as CoreUtxo};

use crate::error::Error;
use crate::storage::model::{Utxo, UtxoRef};

/// Rough unsigned-transaction base size, in vbytes, for `num_inputs` P2TR
/// key-path inputs and two P2TR outputs (recipient + change). Matches the
/// order of magnitude the original uses before its `30`-byte-per-input
/// signature padding ([`bridge_core::utxo::estimate_fee`]) is applied on top.
fn base_size(num_inputs: usize) -> u64 {
    // ~10 bytes overhead + ~41 vbytes/input (outpoint + sequence, witness
    // discounted) + ~43 bytes/output * 2 outputs.
    10 + 41 * num_inputs as u64 + 43 * 2
}

/// Select UTXOs covering `amount` at `sat_per_byte`, mirroring
/// `get_utxos_for_withdraw`. Candidates must already be ordered oldest-first
/// (`Store::find_utxos_by_status`'s contract).
pub fn select_withdraw_utxos(
    candidates: &[Utxo],
    amount: u64,
    sat_per_byte: u64,
) -> Result<(Vec<UtxoRef>, u64), Error> {
    let core_candidates: Vec<CoreUtxo> =
        candidates.iter().map(|u| CoreUtxo { amount: u.amount, base_vsize: 0 }).collect();

    let selection = select_utxos(&core_candidates, amount, sat_per_byte, base_size)?;

    let chosen = selection
        .chosen
        .iter()
        .map(|&idx| UtxoRef {
            outpoint: candidates[idx].outpoint,
            amount: candidates[idx].amount,
            salt: candidates[idx].salt,
        })
        .collect();

    Ok((chosen, selection.fee))
}

/// Recompute the fee for an already-selected set of inputs, without
/// re-running selection against the full candidate set a second time.
pub fn recompute_fee(num_inputs: usize, sat_per_byte: u64) -> u64 {
    estimate_fee(base_size(num_inputs), num_inputs, sat_per_byte)
}

/// Build and sign a Taproot withdraw transaction spending `utxos`, paying
/// `amount` to `recipient` and the remainder back to the vault's own
/// change address, then return it serialized for broadcast.
///
/// Each input is signed key-path-only with the master key tweaked by that
/// input's own salt — withdraws can spend UTXOs originally paid to
/// different users' deposit addresses in the same transaction.
pub fn build_and_sign_withdraw(
    params: BtcAddressParams,
    master_secret_key: &SecretKey,
    utxos: &[(UtxoRef, u64)],
    amount: u64,
    fee: u64,
    recipient: &bitcoin::Address,
    change_address: &bitcoin::Address,
) -> Result<Transaction, Error> {
    let secp = Secp256k1::new();

    let total_in: u64 = utxos.iter().map(|(u, _)| u.amount).sum();
    let change = total_in.saturating_sub(amount + fee);

    let inputs: Vec<TxIn> = utxos
        .iter()
        .map(|(utxo_ref, _)| TxIn {
            previous_output: OutPoint {
                txid: Txid::from_byte_array(utxo_ref.outpoint.tx_hash),
                vout: utxo_ref.outpoint.index,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::new(),
        })
        .collect();

    let mut outputs = vec![TxOut {
        value: Amount::from_sat(amount),
        script_pubkey: recipient.script_pubkey(),
    }];
    if change > 0 {
        outputs.push(TxOut { value: Amount::from_sat(change), script_pubkey: change_address.script_pubkey() });
    }

    let unsigned = Transaction {
        version: bitcoin::transaction::Version(2),
        lock_time: bitcoin::absolute::LockTime::ZERO,
        input: inputs,
        output: outputs,
    };

    // Reconstruct each spent output's scriptPubkey/value from its salt and
    // amount, since the store keeps UTXOs by salt rather than by address.
    let prevouts: Vec<TxOut> = utxos
        .iter()
        .map(|(utxo_ref, salt)| {
            let address = derive_btc_address(params, *salt)?;
            Ok(TxOut { value: Amount::from_sat(utxo_ref.amount), script_pubkey: address.script_pubkey() })
        })
        .collect::<Result<_, Error>>()?;

    let mut signed = unsigned.clone();
    let prevouts_ref = Prevouts::All(&prevouts);

    for (index, (_, salt)) in utxos.iter().enumerate() {
        let digest = SighashCache::new(&unsigned)
            .taproot_key_spend_signature_hash(index, &prevouts_ref, TapSighashType::Default)
            .map_err(|e| bridge_core::Error::AddressEncoding(e.to_string()))?;

        let master_keypair = Keypair::from_secret_key(&secp, master_secret_key);
        let (master_xonly, _) = master_keypair.x_only_public_key();
        let tweak = tap_tweak(&master_xonly, *salt);
        let tweak_scalar = Scalar::from_be_bytes(tweak).map_err(bridge_core::Error::TweakFailed)?;
        let tweaked_keypair =
            master_keypair.add_xonly_tweak(&secp, &tweak_scalar).map_err(bridge_core::Error::TweakFailed)?;

        let mut aux_preimage = Vec::with_capacity(32 + 32);
        aux_preimage.extend_from_slice(digest.as_byte_array());
        aux_preimage.extend_from_slice(&tweaked_keypair.secret_bytes());
        let aux_rand: [u8; 32] = Sha256::digest(&aux_preimage).into();

        let message = Message::from_digest(digest.to_byte_array());
        let signature = secp.sign_schnorr_with_aux_rand(&message, &tweaked_keypair, &aux_rand);

        signed.input[index].witness = Witness::from_slice(&[signature.as_ref()]);
    }

    Ok(signed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::model::{UtxoOutpoint, UtxoStatus};

    fn utxo(amount: u64, index: u32) -> Utxo {
        Utxo { outpoint: UtxoOutpoint { tx_hash: [index as u8; 32], index }, salt: 1, amount, status: UtxoStatus::Unspent }
    }

    /// Ages-ascending [8000, 12000, 30000], amount=25000, sat_per_byte=10
    /// selects all three.
    #[test]
    fn selection_accumulates_oldest_first() {
        let candidates = [utxo(8_000, 0), utxo(12_000, 1), utxo(30_000, 2)];
        let (chosen, fee) = select_withdraw_utxos(&candidates, 25_000, 10).unwrap();
        assert_eq!(chosen.len(), 3);
        let total: u64 = chosen.iter().map(|c| c.amount).sum();
        assert!(total >= 25_000 + fee);
    }

    #[test]
    fn insufficient_utxos_select_nothing() {
        let candidates = [utxo(100, 0), utxo(200, 1)];
        let err = select_withdraw_utxos(&candidates, 1_000_000, 10).unwrap_err();
        assert!(matches!(err, Error::Core(bridge_core::Error::NotEnoughInputs { .. })));
    }
}
