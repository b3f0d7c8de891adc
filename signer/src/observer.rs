//! Per-chain deposit observer.
//!
//! Grounded in the original's `zexporta/deposit/observer.py::observe_deposit`
//! and `zexporta/utils/observer.py::Observer.observe`: walk forward from the
//! stored cursor to the chain tip in `batch_block_size`-sized batches,
//! matching every observed transfer against the currently active address
//! set, and advance the cursor only after a batch is fully persisted. The
//! `tokio::select!`-against-shutdown run loop follows `BlockObserver::run`.

use bitcoin::hashes::Hash;
use tokio::time::{sleep, Duration};

use bridge_core::chain::ChainFamily;
use bridge_core::ChainTag;

use crate::chain::ChainClient;
use crate::context::{Context, SignerEvent};
use crate::error::Error;
use crate::storage::model::{ChainCursor, TransferStatus, UserTransfer, Utxo, UtxoOutpoint, UtxoStatus};
use crate::storage::{DbRead, DbWrite};

/// Batches `[from, to]` into `batch_size`-sized inclusive ranges, mirroring
/// `get_block_batches`.
fn block_batches(from: u64, to: u64, batch_size: u64) -> Vec<(u64, u64)> {
    let mut batches = Vec::new();
    let mut start = from;
    while start <= to {
        let end = (start + batch_size - 1).min(to);
        batches.push((start, end));
        start = end + 1;
    }
    batches
}

/// Observes one chain's deposits into the store.
pub struct Observer<C, Ctx> {
    client: C,
    context: Ctx,
    chain_tag: ChainTag,
    batch_block_size: u64,
    delay: Duration,
}

impl<C, Ctx> Observer<C, Ctx>
where
    C: ChainClient,
    Ctx: Context,
{
    /// Build an observer for `chain_tag`, polling `client` and persisting
    /// through `context.storage()`.
    pub fn new(client: C, context: Ctx, chain_tag: ChainTag, batch_block_size: u64, delay: Duration) -> Self {
        Self { client, context, chain_tag, batch_block_size, delay }
    }

    /// Run until shutdown, advancing the stored cursor one batch at a time.
    #[tracing::instrument(skip(self), fields(chain_tag = %self.chain_tag))]
    pub async fn run(mut self) -> Result<(), Error> {
        let mut term = self.context.get_termination_handle();

        loop {
            tokio::select! {
                _ = term.wait_for_shutdown() => {
                    tracing::info!("observer received shutdown signal");
                    return Ok(());
                }
                result = self.tick() => {
                    if result? {
                        sleep(self.delay).await;
                    }
                }
            }
        }
    }

    /// Observe one step forward. Returns `true` if the tip was already
    /// caught up (the caller should sleep), matching
    /// `observe_deposit`'s "already observed, continue" branch.
    async fn tick(&mut self) -> Result<bool, Error> {
        let storage = self.context.storage();
        let latest_block = self.client.latest_block().await?;
        let cursor = storage.get_chain_cursor(self.chain_tag).await?;
        let last_observed = cursor.map(|c| c.last_observed_block);

        let from_block = match last_observed {
            Some(last) if last >= latest_block => {
                tracing::debug!(last, latest_block, "already caught up to tip");
                return Ok(true);
            }
            Some(last) => last + 1,
            None => latest_block,
        };

        for (from, to) in block_batches(from_block, latest_block, self.batch_block_size) {
            self.observe_batch(from, to).await?;
            storage
                .write_chain_cursor(ChainCursor { chain_tag: self.chain_tag, last_observed_block: to })
                .await?;
        }

        self.context.signal(SignerEvent::BlockObserved(self.chain_tag))?;
        Ok(from_block > latest_block)
    }

    async fn observe_batch(&self, from: u64, to: u64) -> Result<(), Error> {
        let storage = self.context.storage();
        let tracked = storage.get_active_addresses(self.chain_tag).await?;
        let by_address: std::collections::HashMap<&str, u64> =
            tracked.iter().map(|a| (a.address.as_str(), a.user_id)).collect();
        let tracked_addresses: Vec<String> = tracked.iter().map(|a| a.address.clone()).collect();

        let raw_transfers = self.client.scan_transfers(from, to, &tracked_addresses).await?;

        for raw in raw_transfers {
            let Some(&user_id) = by_address.get(raw.to.as_str()) else { continue };
            let decimals = match storage.get_token(self.chain_tag, &raw.token).await? {
                Some(token) => token.decimals,
                None => {
                    let decimals = self.client.token_decimals(&raw.token).await?;
                    storage
                        .write_token(crate::storage::model::Token {
                            chain_tag: self.chain_tag,
                            token_address: raw.token.clone(),
                            decimals,
                        })
                        .await?;
                    decimals
                }
            };

            if self.chain_tag.family() == ChainFamily::Btc {
                self.write_observed_utxo(&raw, user_id).await?;
            }

            storage
                .write_transfer(UserTransfer { transfer: raw, user_id, decimals, status: TransferStatus::Pending })
                .await?;
        }

        Ok(())
    }

    /// Persist the UTXO a BTC deposit transfer creates, so it becomes
    /// selectable by a later withdraw. The `tx_hash` on a BTC [`RawTransfer`]
    /// is a display-order txid string; [`UtxoOutpoint`] stores the same
    /// txid in its natural (internal) byte order, matching how
    /// `withdraw::btc` reconstructs a [`bitcoin::Txid`] from it.
    async fn write_observed_utxo(
        &self,
        raw: &crate::storage::model::RawTransfer,
        user_id: u64,
    ) -> Result<(), Error> {
        let txid: bitcoin::Txid = raw
            .tx_hash
            .parse()
            .map_err(|_| Error::InvalidFormat { context: "btc txid", value: raw.tx_hash.clone() })?;

        self.context
            .storage()
            .write_utxo(Utxo {
                outpoint: UtxoOutpoint { tx_hash: txid.to_byte_array(), index: raw.index },
                salt: user_id,
                amount: raw.value as u64,
                status: UtxoStatus::Unspent,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::model::UserAddress;
    use crate::testing::{FakeChainClient, TestContext};

    #[test]
    fn batches_split_into_inclusive_chunks_covering_the_whole_range() {
        assert_eq!(block_batches(10, 10, 5), vec![(10, 10)]);
        assert_eq!(block_batches(10, 24, 5), vec![(10, 14), (15, 19), (20, 24)]);
        assert_eq!(block_batches(10, 22, 5), vec![(10, 14), (15, 19), (20, 22)]);
    }

    fn test_settings() -> crate::config::Settings {
        config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .set_override("environment", "dev")
            .unwrap()
            .set_override("withdrawer_private_key", "0".repeat(64))
            .unwrap()
            .set_override("btc_signer_private_key", "1".repeat(64))
            .unwrap()
            .set_override("sweeper_private_key", "2".repeat(64))
            .unwrap()
            .set_override("shield_private_key", "3".repeat(64))
            .unwrap()
            .build()
            .and_then(|c| c.try_deserialize())
            .expect("test settings must parse")
    }

    #[tokio::test]
    async fn a_btc_transfer_to_a_tracked_address_persists_an_unspent_utxo() {
        let context = TestContext::new(test_settings());
        context
            .store()
            .write_address(UserAddress {
                user_id: 7,
                address: "tb1pexampleaddressfortest00000000000000000000000000000".to_string(),
                chain_tag: ChainTag::BtcTest,
                is_active: true,
            })
            .await
            .unwrap();

        let client = FakeChainClient::new(ChainTag::BtcTest);
        client.set_latest_block(5).await;
        client
            .push_transfer(crate::storage::model::RawTransfer {
                tx_hash: "11".repeat(32),
                block_number: 5,
                chain_tag: ChainTag::BtcTest,
                to: "tb1pexampleaddressfortest00000000000000000000000000000".to_string(),
                token: "0x0".to_string(),
                value: 50_000,
                index: 1,
            })
            .await;

        let mut observer = Observer::new(client, context.clone(), ChainTag::BtcTest, 10, Duration::from_secs(1));
        observer.tick().await.unwrap();

        let utxos = context.store().find_utxos_by_status(UtxoStatus::Unspent).await.unwrap();
        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos[0].amount, 50_000);
        assert_eq!(utxos[0].salt, 7);
        assert_eq!(utxos[0].outpoint.index, 1);

        let transfers = context
            .store()
            .find_transfers_by_status(ChainTag::BtcTest, TransferStatus::Pending)
            .await
            .unwrap();
        assert_eq!(transfers.len(), 1);
    }
}
