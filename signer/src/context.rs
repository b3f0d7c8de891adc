//! The `Context` trait and its concrete `SignerContext`.
//!
//! Every long-running component (`Observer`/`Finalizer`/`VaultDepositor`/
//! `WithdrawCoordinator`) takes a `C: Context` and calls
//! `context.get_termination_handle()` to race its main loop against
//! cooperative shutdown, and `context.signal(..)` to publish a
//! `SignerEvent` other components can react to — the same
//! `tokio::select! { _ = term.wait_for_shutdown() ... }` shape
//! `block_observer.rs::run` uses, publishing its own
//! `SignerEvent::BitcoinBlockObserved.into()` on completion.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use bridge_core::ChainTag;

use crate::chain::btc::BtcClient;
use crate::chain::evm::EvmClient;
use crate::config::Settings;
use crate::error::Error;

/// Events components publish onto the shared signal bus so that siblings
/// (in particular the finalizer, which reacts to new observation progress)
/// don't have to poll storage on their own cadence.
#[derive(Debug, Clone)]
pub enum SignerEvent {
    /// A chain's observer advanced its cursor.
    BlockObserved(ChainTag),
    /// A deposit transfer crossed into [`crate::storage::model::TransferStatus::Finalized`].
    TransferFinalized(ChainTag),
    /// A deposit transfer was swept into the vault / settled.
    TransferSwept(ChainTag),
    /// A withdraw reached a terminal state.
    WithdrawSettled { chain_tag: ChainTag, nonce: u64 },
}

/// A handle a component awaits to learn when the process wants it to stop.
#[derive(Debug, Clone)]
pub struct TerminationHandle(CancellationToken);

impl TerminationHandle {
    /// Resolves once [`SignerContext::shutdown`] (or a duplicate of this
    /// handle) has been triggered.
    pub async fn wait_for_shutdown(&mut self) {
        self.0.cancelled().await;
    }

    /// True if shutdown has already been triggered.
    pub fn is_shutdown(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// What every long-running bridge component depends on: storage, per-chain
/// clients, the signal bus, and cooperative shutdown. Implemented by
/// [`SignerContext`]; kept as a trait so components can be tested against
/// an in-memory storage backend without a real chain connection.
pub trait Context: Clone + Send + Sync + 'static {
    /// The storage backend type this context hands out.
    type Storage: crate::storage::DbRead + crate::storage::DbWrite + Clone + Send + Sync + 'static;

    /// The shared storage handle.
    fn storage(&self) -> &Self::Storage;

    /// Static configuration loaded at startup.
    fn config(&self) -> &Settings;

    /// The EVM client for `chain_tag`, if configured and EVM-family.
    fn evm_client(&self, chain_tag: ChainTag) -> Result<&EvmClient, Error>;

    /// The BTC client, if a BTC chain is configured.
    fn btc_client(&self) -> Result<&BtcClient, Error>;

    /// Publish an event to every current and future signal receiver.
    ///
    /// A no-op (not an error) when no receiver is currently listening,
    /// since signals are best-effort wakeups, not a durable queue.
    fn signal(&self, event: SignerEvent) -> Result<(), Error>;

    /// Subscribe to [`SignerEvent`]s published via [`Context::signal`].
    fn get_signal_receiver(&self) -> broadcast::Receiver<SignerEvent>;

    /// A handle this component should race its main loop against.
    fn get_termination_handle(&self) -> TerminationHandle;

    /// Trigger shutdown for every handle derived from this context.
    fn shutdown(&self);
}

/// The production [`Context`] implementation.
#[derive(Clone)]
pub struct SignerContext<S> {
    config: Arc<Settings>,
    storage: S,
    evm_clients: Arc<HashMap<ChainTag, EvmClient>>,
    btc_client: Option<Arc<BtcClient>>,
    signal_tx: broadcast::Sender<SignerEvent>,
    cancellation: CancellationToken,
}

impl<S> SignerContext<S>
where
    S: crate::storage::DbRead + crate::storage::DbWrite + Clone + Send + Sync + 'static,
{
    /// Build the single process-wide context. This is the one place
    /// process startup performs side effects (opening chain connections);
    /// every component downstream only ever borrows from an already-built
    /// `SignerContext`.
    pub fn new(
        config: Settings,
        storage: S,
        evm_clients: HashMap<ChainTag, EvmClient>,
        btc_client: Option<BtcClient>,
    ) -> Self {
        let (signal_tx, _) = broadcast::channel(128);
        Self {
            config: Arc::new(config),
            storage,
            evm_clients: Arc::new(evm_clients),
            btc_client: btc_client.map(Arc::new),
            signal_tx,
            cancellation: CancellationToken::new(),
        }
    }
}

impl<S> Context for SignerContext<S>
where
    S: crate::storage::DbRead + crate::storage::DbWrite + Clone + Send + Sync + 'static,
{
    type Storage = S;

    fn storage(&self) -> &S {
        &self.storage
    }

    fn config(&self) -> &Settings {
        &self.config
    }

    fn evm_client(&self, chain_tag: ChainTag) -> Result<&EvmClient, Error> {
        self.evm_clients
            .get(&chain_tag)
            .ok_or(Error::UnsupportedChain(chain_tag))
    }

    fn btc_client(&self) -> Result<&BtcClient, Error> {
        self.btc_client
            .as_deref()
            .ok_or(Error::UnsupportedChain(ChainTag::Btc))
    }

    fn signal(&self, event: SignerEvent) -> Result<(), Error> {
        // A `SendError` here just means nobody is currently subscribed;
        // that's expected whenever the finalizer hasn't started yet, so we
        // swallow it rather than propagate it as a real failure.
        let _ = self.signal_tx.send(event);
        Ok(())
    }

    fn get_signal_receiver(&self) -> broadcast::Receiver<SignerEvent> {
        self.signal_tx.subscribe()
    }

    fn get_termination_handle(&self) -> TerminationHandle {
        TerminationHandle(self.cancellation.clone())
    }

    fn shutdown(&self) {
        self.cancellation.cancel();
    }
}
