//! CREATE2 address derivation for per-user EVM deposit contracts.
//!
//! `addr = keccak256(0xff ++ factory ++ left_pad(salt, 32) ++ bytecode_hash)[-20:]`,
//! where `salt = user_id`. Grounded in the original's
//! `USER_DEPOSIT_FACTORY_ADDRESS` / `USER_DEPOSIT_BYTECODE_HASH` config
//! (`zexporta/config.py`) and the `factory.deploy(salt)` call it feeds
//! (`zexporta/deposit/vault_depositor.py::deploy_contract`).

use alloy_primitives::{keccak256, Address, B256};

/// Inputs to CREATE2 address derivation that are fixed per-deployment (not
/// per-user): the factory contract and the deployed bytecode's hash.
#[derive(Debug, Clone, Copy)]
pub struct EvmAddressParams {
    /// The `UserDeposit` proxy factory contract address.
    pub factory: Address,
    /// `keccak256` of the init code the factory deploys for every user.
    pub bytecode_hash: B256,
}

/// Derive the CREATE2 address for `user_id`'s per-user deposit contract.
///
/// Pure and referentially transparent: calling this twice with the same
/// inputs, on any machine, yields the same address.
pub fn derive_evm_address(params: EvmAddressParams, user_id: u64) -> Address {
    let mut salt = [0u8; 32];
    salt[24..].copy_from_slice(&user_id.to_be_bytes());

    let mut preimage = Vec::with_capacity(1 + 20 + 32 + 32);
    preimage.push(0xff);
    preimage.extend_from_slice(params.factory.as_slice());
    preimage.extend_from_slice(&salt);
    preimage.extend_from_slice(params.bytecode_hash.as_slice());

    let digest = keccak256(preimage);
    Address::from_slice(&digest[12..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn params() -> EvmAddressParams {
        EvmAddressParams {
            factory: Address::from_str("0x00000000000000000000000000000000000AAA").unwrap(),
            bytecode_hash: B256::repeat_byte(0xbb),
        }
    }

    #[test]
    fn derivation_is_pure_and_deterministic() {
        let a = derive_evm_address(params(), 42);
        let b = derive_evm_address(params(), 42);
        assert_eq!(a, b);
    }

    #[test]
    fn different_users_get_different_addresses() {
        let a = derive_evm_address(params(), 1);
        let b = derive_evm_address(params(), 2);
        assert_ne!(a, b);
    }

    #[test]
    fn different_factories_get_different_addresses() {
        let mut other = params();
        other.factory = Address::from_str("0x00000000000000000000000000000000000BBB").unwrap();
        assert_ne!(derive_evm_address(params(), 7), derive_evm_address(other, 7));
    }
}
