//! The canonical EVM withdraw hash.
//!
//! `keccak256` over the EIP-712-style encoding of `token_address, amount,
//! recipient, nonce`. The signing aggregator's quorum computes this same
//! hash independently (each validator fetches the withdraw from the
//! exchange itself); [`evm_withdraw_hash`] is the local computation the
//! coordinator reconciles the validators' `message_hash` against before
//! broadcasting — the two must be bit-identical for any accepted withdraw.
//! Grounded in the original's `zexporta/utils/encoder.py::get_evm_withdraw_hash`.

use alloy_primitives::{keccak256, Address, B256, U256};

/// The fields of an EVM withdraw that the hash binds, matching the vault's
/// `withdraw(token, amount, recipient, nonce, ...)` call surface.
#[derive(Debug, Clone, Copy)]
pub struct EvmWithdrawFields {
    /// ERC-20 token address, or the native-token sentinel `0x0..0`.
    pub token_address: Address,
    /// Amount in the token's base units.
    pub amount: U256,
    /// Destination address.
    pub recipient: Address,
    /// Per-chain, exchange-assigned withdraw nonce.
    pub nonce: U256,
}

/// Compute the canonical withdraw hash for `fields`.
///
/// Pure and referentially transparent: the same fields always hash to the
/// same digest, matching what every validator in the signing quorum
/// computes independently.
pub fn evm_withdraw_hash(fields: EvmWithdrawFields) -> B256 {
    let mut preimage = Vec::with_capacity(20 + 32 + 20 + 32);
    preimage.extend_from_slice(fields.token_address.as_slice());
    preimage.extend_from_slice(&fields.amount.to_be_bytes::<32>());
    preimage.extend_from_slice(fields.recipient.as_slice());
    preimage.extend_from_slice(&fields.nonce.to_be_bytes::<32>());
    keccak256(preimage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn fields() -> EvmWithdrawFields {
        EvmWithdrawFields {
            token_address: Address::ZERO,
            amount: U256::from(1_000_000_000_000_000u64),
            recipient: Address::from_str("0x000000000000000000000000000000000000D0").unwrap(),
            nonce: U256::from(17u64),
        }
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(evm_withdraw_hash(fields()), evm_withdraw_hash(fields()));
    }

    #[test]
    fn different_nonce_changes_the_hash() {
        let mut other = fields();
        other.nonce = U256::from(18u64);
        assert_ne!(evm_withdraw_hash(fields()), evm_withdraw_hash(other));
    }

    /// A mismatched validator hash must be distinguishable from the locally
    /// computed one so the coordinator can reject the withdraw.
    #[test]
    fn mismatched_hash_is_detected_by_simple_inequality() {
        let local = evm_withdraw_hash(fields());
        let validator_claimed = B256::repeat_byte(0xde);
        assert_ne!(local, validator_claimed);
    }
}
