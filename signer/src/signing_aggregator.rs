//! Client for the external threshold-signing aggregator.
//!
//! Grounded in the original's `zexporta/withdraw/sa.py`: `sa.request_nonces`
//! then `sa.request_signature` against a DKG party loaded from a JSON file
//! (`parse_dkg_json`). This crate treats the aggregator purely as an HTTP/
//! JSON black box — the threshold protocol itself (`pyfrost`/WSTS) is out of
//! scope here.

use std::path::Path;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use bridge_core::ChainTag;

use crate::error::Error;

/// The DKG party metadata loaded from the configured JSON file, identifying
/// which validator set this signer addresses requests to.
#[derive(Debug, Clone, Deserialize)]
pub struct DkgKey {
    /// This DKG's public key, opaque to this crate beyond forwarding it.
    pub public_key: String,
    /// The party (validator node identifiers) participating in this DKG.
    pub party: Vec<String>,
}

/// Loaded nonces for a single signing round, keyed by validator id.
pub type NonceMap = std::collections::HashMap<String, serde_json::Value>;

/// The aggregator's response to a signature request.
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureResult {
    /// `"SUCCESSFUL"` or a validator-reported rejection.
    pub result: String,
    /// The withdraw hash the validator quorum independently computed,
    /// reconciled against [`bridge_core::withdraw_hash::evm_withdraw_hash`]
    /// before this signature is ever used.
    pub message_hash: Option<String>,
    /// The aggregate Schnorr/ECDSA signature, hex-encoded.
    pub signature: Option<String>,
    /// The nonce consumed for this signature.
    pub nonce: Option<String>,
}

/// Identifies the withdraw a signature request is for; each validator
/// independently re-fetches this withdraw from the exchange rather than
/// trusting the coordinator's payload.
#[derive(Debug, Clone, Serialize)]
pub struct SignRequest {
    /// Which chain this withdraw settles on.
    pub chain_tag: ChainTag,
    /// The exchange-assigned withdraw nonce.
    pub withdraw_nonce: u64,
}

/// Loads the configured DKG and talks to the aggregator's HTTP surface.
#[derive(Clone)]
pub struct SigningAggregatorClient {
    http: Client,
    base_url: url::Url,
    dkg: DkgKey,
}

impl SigningAggregatorClient {
    /// Load the DKG metadata for `dkg_name` from `dkg_json_path` and bind a
    /// client to `base_url`.
    pub fn load(base_url: url::Url, dkg_json_path: &Path, dkg_name: &str) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(dkg_json_path).map_err(|e| Error::InvalidFormat {
            context: "dkg json path",
            value: format!("{}: {e}", dkg_json_path.display()),
        })?;
        let all: std::collections::HashMap<String, DkgKey> =
            serde_json::from_str(&raw).map_err(|source| Error::Decode { context: "dkg json", source })?;
        let dkg = all
            .get(dkg_name)
            .cloned()
            .ok_or(Error::InvalidFormat { context: "dkg name", value: dkg_name.to_string() })?;
        Ok(Self { http: Client::new(), base_url, dkg })
    }

    /// The validator party this client will request signatures from.
    pub fn party(&self) -> &[String] {
        &self.dkg.party
    }

    /// Request `count` one-time signing nonces from the party.
    pub async fn request_nonces(&self, count: u32) -> Result<NonceMap, Error> {
        let response = self
            .http
            .post(self.base_url.join("nonces").unwrap())
            .json(&serde_json::json!({ "party": self.dkg.party, "number_of_nonces": count }))
            .send()
            .await
            .map_err(Error::SigningAggregatorRpc)?;
        response
            .json::<NonceMap>()
            .await
            .map_err(Error::SigningAggregatorRpc)
    }

    /// Request a threshold signature over `request`, using previously
    /// obtained `nonces`.
    pub async fn request_signature(
        &self,
        nonces: &NonceMap,
        request: &SignRequest,
    ) -> Result<SignatureResult, Error> {
        let response = self
            .http
            .post(self.base_url.join("signature").unwrap())
            .json(&serde_json::json!({
                "dkg_public_key": self.dkg.public_key,
                "nonces": nonces,
                "data": { "method": "withdraw", "data": request },
                "party": self.dkg.party,
            }))
            .send()
            .await
            .map_err(Error::SigningAggregatorRpc)?;
        response
            .json::<SignatureResult>()
            .await
            .map_err(Error::SigningAggregatorRpc)
    }
}
