//! Test utilities for exercising the signer's components without a real
//! chain, exchange, or aggregator connection.
//!
//! Plain `fake::Dummy` impls for the model types, plus (since this bridge
//! drives its components through a narrow [`crate::chain::ChainClient`]
//! trait rather than one concrete chain type) a hand-rolled fake client for
//! the observer and finalizer to run against.

pub mod dummy;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use bridge_core::ChainTag;

use crate::chain::ChainClient;
use crate::context::{Context, SignerEvent, SignerContext, TerminationHandle};
use crate::error::Error;
use crate::storage::in_memory::Store;
use crate::storage::model::RawTransfer;

/// A scriptable, in-memory [`ChainClient`] for observer/finalizer tests.
///
/// Every method reads from state set up ahead of time through the public
/// fields' setters; nothing here makes a network call.
#[derive(Clone)]
pub struct FakeChainClient {
    chain_tag: ChainTag,
    inner: Arc<Mutex<FakeChainState>>,
}

#[derive(Default)]
struct FakeChainState {
    latest_block: u64,
    transfers: Vec<RawTransfer>,
    succeeded: HashMap<String, bool>,
    decimals: HashMap<String, u8>,
}

impl FakeChainClient {
    /// A fresh fake client for `chain_tag`, with an empty chain.
    pub fn new(chain_tag: ChainTag) -> Self {
        Self { chain_tag, inner: Arc::new(Mutex::new(FakeChainState::default())) }
    }

    /// Advance the fake chain's tip.
    pub async fn set_latest_block(&self, block: u64) {
        self.inner.lock().await.latest_block = block;
    }

    /// Queue a transfer [`scan_transfers`](ChainClient::scan_transfers) should
    /// return once its batch range covers `transfer.block_number`.
    pub async fn push_transfer(&self, transfer: RawTransfer) {
        self.inner.lock().await.transfers.push(transfer);
    }

    /// Fix the receipt outcome [`transaction_succeeded`](ChainClient::transaction_succeeded)
    /// reports for `tx_hash`.
    pub async fn set_succeeded(&self, tx_hash: &str, succeeded: bool) {
        self.inner.lock().await.succeeded.insert(tx_hash.to_string(), succeeded);
    }
}

impl ChainClient for FakeChainClient {
    fn chain_tag(&self) -> ChainTag {
        self.chain_tag
    }

    async fn latest_block(&self) -> Result<u64, Error> {
        Ok(self.inner.lock().await.latest_block)
    }

    async fn scan_transfers(
        &self,
        from: u64,
        to: u64,
        tracked_addresses: &[String],
    ) -> Result<Vec<RawTransfer>, Error> {
        let tracked: std::collections::HashSet<&str> = tracked_addresses.iter().map(String::as_str).collect();
        Ok(self
            .inner
            .lock()
            .await
            .transfers
            .iter()
            .filter(|t| t.block_number >= from && t.block_number <= to && tracked.contains(t.to.as_str()))
            .cloned()
            .collect())
    }

    async fn transaction_succeeded(&self, tx_hash: &str) -> Result<bool, Error> {
        Ok(self.inner.lock().await.succeeded.get(tx_hash).copied().unwrap_or(true))
    }

    async fn token_decimals(&self, token_address: &str) -> Result<u8, Error> {
        Ok(self.inner.lock().await.decimals.get(token_address).copied().unwrap_or(18))
    }
}

/// A [`Context`] backed by [`Store`] (in-memory) with no chain clients
/// configured, for components that only touch storage and the signal bus —
/// the observer and finalizer, which are generic over `ChainClient` and take
/// a [`FakeChainClient`] directly rather than going through
/// `Context::evm_client`/`btc_client`.
#[derive(Clone)]
pub struct TestContext {
    inner: SignerContext<Store>,
}

impl TestContext {
    /// Build a fresh test context over an empty in-memory store, using
    /// `settings` (typically [`crate::config::Settings::load`] against a
    /// scratch `config_dir`, or hand-built in the test).
    pub fn new(settings: crate::config::Settings) -> Self {
        Self { inner: SignerContext::new(settings, Store::new(), HashMap::new(), None) }
    }

    /// The underlying in-memory store, for test setup/assertions.
    pub fn store(&self) -> &Store {
        self.inner.storage()
    }
}

impl Context for TestContext {
    type Storage = Store;

    fn storage(&self) -> &Store {
        self.inner.storage()
    }

    fn config(&self) -> &crate::config::Settings {
        self.inner.config()
    }

    fn evm_client(&self, chain_tag: ChainTag) -> Result<&crate::chain::evm::EvmClient, Error> {
        self.inner.evm_client(chain_tag)
    }

    fn btc_client(&self) -> Result<&crate::chain::btc::BtcClient, Error> {
        self.inner.btc_client()
    }

    fn signal(&self, event: SignerEvent) -> Result<(), Error> {
        self.inner.signal(event)
    }

    fn get_signal_receiver(&self) -> tokio::sync::broadcast::Receiver<SignerEvent> {
        self.inner.get_signal_receiver()
    }

    fn get_termination_handle(&self) -> TerminationHandle {
        self.inner.get_termination_handle()
    }

    fn shutdown(&self) {
        self.inner.shutdown()
    }
}
