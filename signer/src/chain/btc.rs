//! The Bitcoin chain client, built on `bitcoincore-rpc`.
//!
//! Grounded in the original's `BTCAsyncClient` (`libs/src/clients/btc/client.py`):
//! `get_block_tx_hash` + per-tx `_parse_transfer` walking `vout`, a BTC
//! "successful" check that only asks whether the transaction is known at
//! all (no separate revert state, unlike EVM receipts), and
//! `get_token_decimals` hard-coded to `8`.

use std::sync::Arc;

use bitcoincore_rpc::bitcoin::{Address as RpcAddress, Txid};
use bitcoincore_rpc::{Auth, Client, RpcApi};

use bridge_core::ChainTag;

use crate::error::Error;
use crate::storage::model::RawTransfer;

/// A connected `bitcoind` RPC client. Cheap to `Clone`: the underlying
/// `jsonrpc` client is shared behind an `Arc` so the observer, finalizer, and
/// withdraw coordinator can each own a handle.
#[derive(Clone)]
pub struct BtcClient {
    chain_tag: ChainTag,
    rpc: Arc<Client>,
    network: bitcoin::Network,
}

impl BtcClient {
    /// Connect to `bitcoind`'s RPC endpoint. A network side effect, run
    /// once at `SignerContext` construction.
    pub fn connect(
        chain_tag: ChainTag,
        rpc_url: &str,
        rpc_user: String,
        rpc_password: String,
        network: bitcoin::Network,
    ) -> Result<Self, Error> {
        let rpc = Client::new(rpc_url, Auth::UserPass(rpc_user, rpc_password))
            .map_err(|e| Error::ChainRpc { chain_tag, message: e.to_string() })?;
        Ok(Self { chain_tag, rpc: Arc::new(rpc), network })
    }

    /// Which network (mainnet/testnet4/...) this client is configured for.
    pub fn network(&self) -> bitcoin::Network {
        self.network
    }

    /// The current chain tip height.
    pub fn block_count(&self) -> Result<u64, Error> {
        self.rpc
            .get_block_count()
            .map_err(|e| Error::ChainRpc { chain_tag: self.chain_tag, message: e.to_string() })
    }

    /// Scan block `height` for outputs paying any of `tracked_addresses`
    /// (bech32m-encoded), one [`RawTransfer`] per matching vout, mirroring
    /// `_parse_transfer`'s one-transfer-per-address-bearing-vout rule.
    pub fn scan_block(
        &self,
        height: u64,
        tracked_addresses: &[String],
    ) -> Result<Vec<RawTransfer>, Error> {
        let block_hash = self
            .rpc
            .get_block_hash(height)
            .map_err(|e| Error::ChainRpc { chain_tag: self.chain_tag, message: e.to_string() })?;
        let block = self
            .rpc
            .get_block(&block_hash)
            .map_err(|e| Error::ChainRpc { chain_tag: self.chain_tag, message: e.to_string() })?;

        let tracked: std::collections::HashSet<&str> = tracked_addresses.iter().map(String::as_str).collect();
        let mut transfers = Vec::new();

        for tx in &block.txdata {
            let txid = tx.compute_txid();
            for (index, vout) in tx.output.iter().enumerate() {
                let Ok(address) = RpcAddress::from_script(&vout.script_pubkey, self.network) else { continue };
                let encoded = address.to_string();
                if !tracked.contains(encoded.as_str()) {
                    continue;
                }
                transfers.push(RawTransfer {
                    tx_hash: txid.to_string(),
                    block_number: height,
                    chain_tag: self.chain_tag,
                    to: encoded,
                    token: "0x0000000000000000000000000000000000000000".to_string(),
                    value: vout.value.to_sat() as u128,
                    index: index as u32,
                });
            }
        }

        Ok(transfers)
    }

    /// Whether `txid` is known to the node at all; BTC has no separate
    /// "succeeded but reverted" state, so this is the whole check
    /// (matches `is_transaction_successful`).
    pub fn transaction_known(&self, txid_hex: &str) -> Result<bool, Error> {
        let txid: Txid = txid_hex
            .parse()
            .map_err(|_| Error::InvalidFormat { context: "bitcoin txid", value: txid_hex.to_string() })?;
        match self.rpc.get_raw_transaction_info(&txid, None) {
            Ok(_) => Ok(true),
            Err(bitcoincore_rpc::Error::JsonRpc(_)) => Ok(false),
            Err(e) => Err(Error::ChainRpc { chain_tag: self.chain_tag, message: e.to_string() }),
        }
    }

    /// Broadcast a raw signed transaction.
    pub fn send_raw_transaction(&self, raw_tx: &[u8]) -> Result<String, Error> {
        self.rpc
            .send_raw_transaction(raw_tx)
            .map(|txid| txid.to_string())
            .map_err(|e| Error::BitcoinRejected(e.to_string()))
    }

    /// An estimated fee rate, in satoshis/vbyte, for confirmation within
    /// `target_blocks`.
    pub fn estimate_sat_per_byte(&self, target_blocks: u16) -> Result<u64, Error> {
        let estimate = self
            .rpc
            .estimate_smart_fee(target_blocks, None)
            .map_err(|e| Error::ChainRpc { chain_tag: self.chain_tag, message: e.to_string() })?;
        let fee_rate_btc_per_kvb = estimate.fee_rate.map(|a| a.to_btc()).unwrap_or(0.0001);
        let sat_per_kvb = (fee_rate_btc_per_kvb * 100_000_000.0) as u64;
        Ok((sat_per_kvb / 1000).max(1))
    }
}

impl super::ChainClient for BtcClient {
    fn chain_tag(&self) -> ChainTag {
        self.chain_tag
    }

    async fn latest_block(&self) -> Result<u64, Error> {
        self.block_count()
    }

    async fn scan_transfers(
        &self,
        from: u64,
        to: u64,
        tracked_addresses: &[String],
    ) -> Result<Vec<RawTransfer>, Error> {
        let mut transfers = Vec::new();
        for height in from..=to {
            transfers.extend(self.scan_block(height, tracked_addresses)?);
        }
        Ok(transfers)
    }

    async fn transaction_succeeded(&self, tx_hash: &str) -> Result<bool, Error> {
        self.transaction_known(tx_hash)
    }

    async fn token_decimals(&self, _token_address: &str) -> Result<u8, Error> {
        Ok(8)
    }
}
