//! Dummy generators for model types not already covered by
//! `storage::model`'s own `#[cfg(feature = "testing")]` impls.

use fake::{Fake, Faker};
use rand::Rng;

use bridge_core::ChainTag;

use crate::storage::model::{
    UserAddress, Utxo, UtxoOutpoint, UtxoStatus, WithdrawRequest, WithdrawStatus,
};

/// A random active address for `chain_tag`.
pub fn user_address<R: Rng + ?Sized>(chain_tag: ChainTag, rng: &mut R) -> UserAddress {
    UserAddress {
        user_id: Faker.fake_with_rng(rng),
        address: format!("0x{}", hex::encode(Faker.fake_with_rng::<[u8; 20], _>(rng))),
        chain_tag,
        is_active: true,
    }
}

/// A random unspent UTXO.
pub fn utxo<R: Rng + ?Sized>(rng: &mut R) -> Utxo {
    Utxo {
        outpoint: UtxoOutpoint { tx_hash: Faker.fake_with_rng(rng), index: Faker.fake_with_rng(rng) },
        salt: Faker.fake_with_rng(rng),
        amount: rng.gen_range(1_000..1_000_000_000u64),
        status: UtxoStatus::Unspent,
    }
}

/// A random PENDING withdraw request on `chain_tag`.
pub fn withdraw_request<R: Rng + ?Sized>(chain_tag: ChainTag, nonce: u64, rng: &mut R) -> WithdrawRequest {
    WithdrawRequest {
        nonce,
        chain_tag,
        user_id: Faker.fake_with_rng(rng),
        recipient: format!("0x{}", hex::encode(Faker.fake_with_rng::<[u8; 20], _>(rng))),
        token_address: "0x0000000000000000000000000000000000000000".to_string(),
        amount: rng.gen_range(1u128..1_000_000_000_000_000_000u128),
        status: WithdrawStatus::Pending,
        tx_hash: None,
        utxos: None,
        sat_per_byte: None,
    }
}
