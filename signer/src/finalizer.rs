//! Promotes deposits through the finalization state machine.
//!
//! One task per chain, woken on a fixed interval (rather than per-block,
//! since finalization only depends on depth below tip, not new blocks
//! arriving). `PENDING → FINALIZED` once `block_number ≤ finalized_block`;
//! `PENDING → REORG` when a previously observed block's contents no longer
//! match what the chain now reports.

use tokio::time::{interval, Duration};

use bridge_core::ChainTag;

use crate::chain::ChainClient;
use crate::context::{Context, SignerEvent};
use crate::error::Error;
use crate::storage::model::TransferStatus;
use crate::storage::{DbRead, DbWrite};

/// Runs the finalization sweep for one chain.
pub struct Finalizer<C, Ctx> {
    client: C,
    context: Ctx,
    chain_tag: ChainTag,
    finalize_block_count: u64,
    sweep_interval: Duration,
}

impl<C, Ctx> Finalizer<C, Ctx>
where
    C: ChainClient,
    Ctx: Context,
{
    /// Build a finalizer for `chain_tag`.
    pub fn new(client: C, context: Ctx, chain_tag: ChainTag, finalize_block_count: u64, sweep_interval: Duration) -> Self {
        Self { client, context, chain_tag, finalize_block_count, sweep_interval }
    }

    /// Run until shutdown, sweeping once per `sweep_interval`.
    #[tracing::instrument(skip(self), fields(chain_tag = %self.chain_tag))]
    pub async fn run(mut self) -> Result<(), Error> {
        let mut term = self.context.get_termination_handle();
        let mut ticker = interval(self.sweep_interval);

        loop {
            tokio::select! {
                _ = term.wait_for_shutdown() => {
                    tracing::info!("finalizer received shutdown signal");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.sweep().await?;
                }
            }
        }
    }

    /// One finalization pass: promote eligible PENDING transfers, demote
    /// any whose block was since replaced by a reorg.
    async fn sweep(&self) -> Result<(), Error> {
        let latest = self.client.latest_block().await?;
        let finalized_block = latest.saturating_sub(self.finalize_block_count);

        let storage = self.context.storage();
        let pending = storage.find_transfers_by_status(self.chain_tag, TransferStatus::Pending).await?;

        let mut any_finalized = false;
        for transfer in pending {
            let block_number = transfer.transfer.block_number;
            if block_number > finalized_block {
                continue;
            }

            // Detect a reorg by re-checking the transaction still exists
            // with the same outcome; a vanished or newly-failed transaction
            // means the block it was recorded in was replaced.
            let still_present = self.client.transaction_succeeded(&transfer.transfer.tx_hash).await?;
            let new_status = if still_present { TransferStatus::Finalized } else { TransferStatus::Reorg };

            storage
                .set_transfer_status(
                    self.chain_tag,
                    &transfer.transfer.tx_hash,
                    transfer.transfer.index,
                    new_status,
                )
                .await?;

            any_finalized |= new_status == TransferStatus::Finalized;
        }

        if any_finalized {
            self.context.signal(SignerEvent::TransferFinalized(self.chain_tag))?;
        }

        Ok(())
    }
}
