//! Dummy value generators for `bridge-core` types, used by both this crate's
//! and `bridge-signer`'s test suites: a plain function per type, taking an
//! explicit RNG rather than relying on global randomness, so tests stay
//! reproducible under a fixed seed.

use bitcoin::secp256k1::{Secp256k1, SecretKey, XOnlyPublicKey};
use rand::RngCore;

use crate::address::BtcAddressParams;
use crate::utxo::Utxo;

/// A dummy Taproot master key, deterministic for a given RNG state.
pub fn master_xonly_pubkey<R: RngCore + ?Sized>(rng: &mut R) -> XOnlyPublicKey {
    let secp = Secp256k1::new();
    let mut bytes = [0u8; 32];
    rng.fill_bytes(&mut bytes);
    // Clamp into the valid secret key range by retrying on the vanishingly
    // unlikely all-zero/overflow case.
    let sk = SecretKey::from_slice(&bytes).unwrap_or_else(|_| SecretKey::from_slice(&[1u8; 32]).unwrap());
    let keypair = bitcoin::secp256k1::Keypair::from_secret_key(&secp, &sk);
    XOnlyPublicKey::from_keypair(&keypair).0
}

/// A dummy set of BTC address-derivation params on testnet4.
pub fn btc_address_params<R: RngCore + ?Sized>(rng: &mut R) -> BtcAddressParams {
    BtcAddressParams { master_pubkey: master_xonly_pubkey(rng), network: bitcoin::Network::Testnet4 }
}

/// A dummy unspent UTXO with a random amount in `[min_sat, max_sat)`.
pub fn utxo<R: RngCore + ?Sized>(rng: &mut R, min_sat: u64, max_sat: u64) -> Utxo {
    let span = max_sat.saturating_sub(min_sat).max(1);
    Utxo { amount: min_sat + rng.next_u64() % span, base_vsize: 0 }
}
