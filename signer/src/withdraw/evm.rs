//! The EVM withdraw path.
//!
//! Grounded in the original's `zexporta/withdraw/sa.py::process_withdraw_sa`:
//! request one nonce from the signing aggregator, submit a sign request
//! identifying only `(chain_tag, withdraw_nonce)` (each validator
//! independently re-fetches the withdraw from the exchange rather than
//! trusting the coordinator's payload), reconcile the validators'
//! `message_hash` against the locally computed
//! [`bridge_core::withdraw_hash::evm_withdraw_hash`], then broadcast the
//! vault `withdraw(...)` call with the aggregate signature plus a locally
//! produced shield signature.

use alloy_primitives::{Address, U256};
use bitcoin::secp256k1::{Message, Secp256k1, SecretKey};

use bridge_core::withdraw_hash::{evm_withdraw_hash, EvmWithdrawFields};

use crate::chain::evm::EvmClient;
use crate::error::Error;
use crate::signing_aggregator::{SignRequest, SigningAggregatorClient};
use crate::storage::model::WithdrawRequest;

/// Produce the "shield" signature: a locally signed attestation over the
/// same withdraw hash the validator quorum signs, submitted alongside the
/// aggregate signature (glossary: "Shield signature").
pub fn shield_signature(shield_private_key: &SecretKey, hash: alloy_primitives::B256) -> Vec<u8> {
    let secp = Secp256k1::signing_only();
    let message = Message::from_digest(hash.0);
    let signature = secp.sign_ecdsa(&message, shield_private_key);
    signature.serialize_compact().to_vec()
}

/// Process one PENDING EVM withdraw through to broadcast, returning the
/// settling tx hash and whether the receipt reported success.
///
/// Fails with [`Error::WithdrawHashMismatch`] (never broadcasting) when the
/// validator's independently computed hash disagrees with ours.
pub async fn process_withdraw(
    client: &EvmClient,
    aggregator: &SigningAggregatorClient,
    shield_private_key: &SecretKey,
    request: &WithdrawRequest,
) -> Result<(String, bool), Error> {
    let token = request
        .token_address
        .parse::<Address>()
        .map_err(|_| Error::InvalidFormat { context: "withdraw token address", value: request.token_address.clone() })?;
    let recipient = request
        .recipient
        .parse::<Address>()
        .map_err(|_| Error::InvalidFormat { context: "withdraw recipient", value: request.recipient.clone() })?;
    let amount = U256::from(request.amount);
    let nonce = U256::from(request.nonce);

    let local_hash = evm_withdraw_hash(EvmWithdrawFields { token_address: token, amount, recipient, nonce });

    let nonces = aggregator.request_nonces(1).await?;
    let result = aggregator
        .request_signature(&nonces, &SignRequest { chain_tag: request.chain_tag, withdraw_nonce: request.nonce })
        .await?;

    if result.result != "SUCCESSFUL" {
        return Err(Error::ValidatorRejected {
            chain_tag: request.chain_tag,
            nonce: request.nonce,
            reason: result.result,
        });
    }

    let message_hash = result.message_hash.ok_or(Error::ValidatorRejected {
        chain_tag: request.chain_tag,
        nonce: request.nonce,
        reason: "missing message_hash".to_string(),
    })?;
    if message_hash.trim_start_matches("0x") != hex::encode(local_hash.0) {
        return Err(Error::WithdrawHashMismatch { chain_tag: request.chain_tag, nonce: request.nonce });
    }

    let signature_hex = result.signature.ok_or(Error::ValidatorRejected {
        chain_tag: request.chain_tag,
        nonce: request.nonce,
        reason: "missing signature".to_string(),
    })?;
    let signature = hex::decode(signature_hex.trim_start_matches("0x"))
        .map_err(|_| Error::InvalidFormat { context: "aggregate signature", value: signature_hex })?;
    let signature_nonce_hex = result.nonce.ok_or(Error::ValidatorRejected {
        chain_tag: request.chain_tag,
        nonce: request.nonce,
        reason: "missing signature nonce".to_string(),
    })?;
    let signature_nonce = U256::from_str_radix(signature_nonce_hex.trim_start_matches("0x"), 16)
        .map_err(|_| Error::InvalidFormat { context: "signature nonce", value: signature_nonce_hex })?;

    let shield_sig = shield_signature(shield_private_key, local_hash);

    let calldata = client.vault_withdraw_calldata(token, amount, recipient, nonce, signature, signature_nonce, shield_sig);

    let sweeper_nonce = client.sweeper_nonce().await?;
    client.send_vault_withdraw(calldata, sweeper_nonce).await
}
