//! Read-only client for the exchange's REST API.
//!
//! Endpoint shapes grounded in the original's `zex_deposit/sa/config.py`
//! (`LATEST_USER_URL = "users/latest-id"`) and `zexporta/validator/withdraw.py`
//! (`get_zex_withdraws(chain, offset, limit)`). Retries transient failures
//! with `backoff`.

use std::time::Duration;

use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde::Deserialize;

use bridge_core::ChainTag;

use crate::error::Error;

/// A withdraw as reported by the exchange, prior to being persisted as a
/// [`crate::storage::model::WithdrawRequest`].
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeWithdraw {
    /// Per-chain, exchange-assigned monotonic nonce.
    pub nonce: u64,
    /// The requesting user.
    pub user_id: u64,
    /// Destination address, chain-encoded.
    pub recipient: String,
    /// ERC-20 token address, or native sentinel.
    pub token_address: String,
    /// Amount in the chain's base units.
    pub amount: u128,
}

/// A tracked token the exchange supports on a given chain, used to seed
/// the [`crate::storage::model::Token`] cache ahead of first observation.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeAsset {
    /// ERC-20 token address, or native sentinel.
    pub token_address: String,
    /// The token's on-chain decimals, as reported by the exchange.
    pub decimals: u8,
}

/// A read-only HTTP/JSON client for the exchange.
pub struct ExchangeClient {
    http: Client,
    base_url: url::Url,
}

impl ExchangeClient {
    /// Bind a client to the exchange's REST base URL.
    pub fn new(base_url: url::Url) -> Self {
        Self { http: Client::new(), base_url }
    }

    fn backoff() -> ExponentialBackoff {
        ExponentialBackoff { max_elapsed_time: Some(Duration::from_secs(30)), ..Default::default() }
    }

    /// The highest `user_id` the exchange has issued, used to discover
    /// newly onboarded users whose deposit addresses haven't been derived
    /// yet.
    pub async fn latest_user_id(&self) -> Result<u64, Error> {
        let url = self.base_url.join("users/latest-id").expect("valid path segment");
        retry(Self::backoff(), || async {
            let response = self.http.get(url.clone()).send().await.map_err(|e| {
                backoff::Error::transient(Error::ExchangeRpc(e))
            })?;
            #[derive(Deserialize)]
            struct Body {
                user_id: u64,
            }
            response
                .json::<Body>()
                .await
                .map(|b| b.user_id)
                .map_err(|e| backoff::Error::transient(Error::ExchangeRpc(e)))
        })
        .await
    }

    /// Withdraws requested on `chain_tag` at or after `offset`, up to
    /// `limit` rows, mirroring `get_zex_withdraws(chain, offset, limit)`.
    pub async fn withdraws(
        &self,
        chain_tag: ChainTag,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ExchangeWithdraw>, Error> {
        let url = self.base_url.join("withdraws").expect("valid path segment");
        retry(Self::backoff(), || async {
            let response = self
                .http
                .get(url.clone())
                .query(&[("chain", chain_tag.to_string()), ("offset", offset.to_string()), ("limit", limit.to_string())])
                .send()
                .await
                .map_err(|e| backoff::Error::transient(Error::ExchangeRpc(e)))?;
            response
                .json::<Vec<ExchangeWithdraw>>()
                .await
                .map_err(|e| backoff::Error::transient(Error::ExchangeRpc(e)))
        })
        .await
    }

    /// Tracked tokens on `chain_tag`.
    pub async fn assets(&self, chain_tag: ChainTag) -> Result<Vec<ExchangeAsset>, Error> {
        let url = self.base_url.join("assets").expect("valid path segment");
        retry(Self::backoff(), || async {
            let response = self
                .http
                .get(url.clone())
                .query(&[("chain", chain_tag.to_string())])
                .send()
                .await
                .map_err(|e| backoff::Error::transient(Error::ExchangeRpc(e)))?;
            response
                .json::<Vec<ExchangeAsset>>()
                .await
                .map_err(|e| backoff::Error::transient(Error::ExchangeRpc(e)))
        })
        .await
    }
}

/// Derives and persists addresses for any user id the exchange has issued
/// but this store has not yet derived an address for.
pub async fn sync_new_addresses<Ctx>(
    context: &Ctx,
    exchange: &ExchangeClient,
    chain_tag: ChainTag,
    derive: impl Fn(u64) -> Result<String, Error>,
) -> Result<u64, Error>
where
    Ctx: crate::context::Context,
{
    use crate::storage::model::UserAddress;
    use crate::storage::{DbRead, DbWrite};

    let storage = context.storage();
    let latest_user_id = exchange.latest_user_id().await?;
    let active = storage.get_active_addresses(chain_tag).await?;
    let known_max = active.iter().map(|a| a.user_id).max();

    let start = known_max.map(|m| m + 1).unwrap_or(0);
    let mut inserted = 0;
    for user_id in start..=latest_user_id {
        let address = derive(user_id)?;
        storage
            .write_address(UserAddress { user_id, address, chain_tag, is_active: true })
            .await?;
        inserted += 1;
    }
    Ok(inserted)
}
