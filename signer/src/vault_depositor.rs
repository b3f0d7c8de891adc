//! Sweeps verified EVM deposits into the vault. EVM-only — BTC deposits
//! settle directly into tracked addresses and never need a second sweeping
//! step.
//!
//! Grounded in the original's `zexporta/deposit/vault_depositor.py`: per
//! batch, decide `CONTRACT_DEPLOY` vs `TOKEN_TRANSFER` per deposit based on
//! `eth_getCode`, broadcast concurrently with `futures::future::join_all`,
//! and match each receipt back to its deposit by position — not by
//! re-sorting — since a partial failure must not silently relabel a
//! surviving deposit.

use alloy_primitives::{Address, U256};

use bridge_core::address::evm::{derive_evm_address, EvmAddressParams};
use bridge_core::ChainTag;

use crate::chain::evm::EvmClient;
use crate::context::{Context, SignerEvent};
use crate::error::Error;
use crate::storage::model::{TransferStatus, UserTransfer};
use crate::storage::{DbRead, DbWrite};

/// One batch's outcome for a single deposit.
enum SweepOutcome {
    /// The proxy wasn't deployed yet; it was just now, the deposit stays
    /// VERIFIED for a later pass.
    Deployed,
    /// The proxy was already deployed and the sweep transaction landed;
    /// `true` means the receipt reported success.
    Swept { succeeded: bool },
}

/// Drives one EVM chain's vault-sweeping batches.
pub struct VaultDepositor<Ctx> {
    context: Ctx,
    chain_tag: ChainTag,
    factory: Address,
    bytecode_hash: alloy_primitives::B256,
    batch_size: usize,
    delay: tokio::time::Duration,
}

impl<Ctx> VaultDepositor<Ctx>
where
    Ctx: Context,
{
    /// Build a depositor for `chain_tag`.
    pub fn new(
        context: Ctx,
        chain_tag: ChainTag,
        factory: Address,
        bytecode_hash: alloy_primitives::B256,
        batch_size: usize,
        delay: tokio::time::Duration,
    ) -> Self {
        Self { context, chain_tag, factory, bytecode_hash, batch_size, delay }
    }

    /// Run until shutdown, sweeping one batch of VERIFIED deposits per
    /// iteration.
    #[tracing::instrument(skip(self), fields(chain_tag = %self.chain_tag))]
    pub async fn run(mut self) -> Result<(), Error> {
        let mut term = self.context.get_termination_handle();

        loop {
            tokio::select! {
                _ = term.wait_for_shutdown() => {
                    tracing::info!("vault depositor received shutdown signal");
                    return Ok(());
                }
                result = self.sweep_batch() => {
                    if result? == 0 {
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }
        }
    }

    /// Sweep up to `batch_size` VERIFIED deposits. Returns how many were
    /// considered, so the caller can sleep when there was nothing to do.
    async fn sweep_batch(&self) -> Result<usize, Error> {
        let storage = self.context.storage();
        let client = self.context.evm_client(self.chain_tag)?;

        let mut deposits =
            storage.find_transfers_by_status(self.chain_tag, TransferStatus::Verified).await?;
        deposits.truncate(self.batch_size);
        if deposits.is_empty() {
            return Ok(0);
        }

        let starting_nonce = client.sweeper_nonce().await?;

        // Broadcast concurrently; each deposit gets the next nonce in
        // sequence, read once for the whole batch.
        let sends = deposits.iter().enumerate().map(|(i, deposit)| {
            let nonce = starting_nonce + i as u64;
            self.send_one(client, deposit, nonce)
        });
        let outcomes = futures::future::join_all(sends).await;

        // Match outcomes back to deposits by position, never by re-sorting;
        // a failed item is simply left VERIFIED and retried next cycle
        // rather than aborting the rest of the batch.
        let mut any_swept = false;
        for (deposit, outcome) in deposits.iter().zip(outcomes) {
            match outcome {
                Ok(SweepOutcome::Deployed) => {
                    tracing::debug!(tx_hash = %deposit.transfer.tx_hash, "deployed user deposit proxy");
                }
                Ok(SweepOutcome::Swept { succeeded: true }) => {
                    storage
                        .set_transfer_status(
                            self.chain_tag,
                            &deposit.transfer.tx_hash,
                            deposit.transfer.index,
                            TransferStatus::Successful,
                        )
                        .await?;
                    any_swept = true;
                }
                Ok(SweepOutcome::Swept { succeeded: false }) => {
                    tracing::warn!(tx_hash = %deposit.transfer.tx_hash, "sweep transaction reverted, retrying next cycle");
                }
                Err(error) => {
                    tracing::warn!(tx_hash = %deposit.transfer.tx_hash, %error, "sweep attempt failed, retrying next cycle");
                }
            }
        }

        if any_swept {
            self.context.signal(SignerEvent::TransferSwept(self.chain_tag))?;
        }

        Ok(deposits.len())
    }

    async fn send_one(
        &self,
        client: &EvmClient,
        deposit: &UserTransfer,
        nonce: u64,
    ) -> Result<SweepOutcome, Error> {
        let user_deposit_address = derive_evm_address(
            EvmAddressParams { factory: self.factory, bytecode_hash: self.bytecode_hash },
            deposit.user_id,
        );

        if !client.has_code(user_deposit_address).await? {
            client.send_deploy(self.factory, U256::from(deposit.user_id), nonce).await?;
            return Ok(SweepOutcome::Deployed);
        }

        let token = deposit.transfer.token.parse::<Address>().map_err(|_| Error::InvalidFormat {
            context: "deposit token address",
            value: deposit.transfer.token.clone(),
        })?;
        let amount = U256::from(deposit.transfer.value);
        let (_, succeeded) = client.send_sweep(user_deposit_address, token, amount, nonce).await?;
        Ok(SweepOutcome::Swept { succeeded })
    }
}
