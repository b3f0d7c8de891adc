//! Processes withdraw requests pulled from the exchange.
//!
//! One coordinator per chain. Withdraws are always processed in ascending
//! nonce order (the exchange guarantees nonce monotonicity), and a withdraw
//! is never advanced past REJECTED or SUCCESSFUL once reached.

pub mod btc;
pub mod evm;

use bitcoin::secp256k1::SecretKey;

use bridge_core::address::btc::BtcAddressParams;
use bridge_core::ChainTag;

use crate::context::{Context, SignerEvent};
use crate::error::Error;
use crate::exchange::ExchangeClient;
use crate::signing_aggregator::SigningAggregatorClient;
use crate::storage::model::{WithdrawRequest, WithdrawStatus};
use crate::storage::{DbRead, DbWrite};

/// Drives one chain's withdraw processing.
pub struct WithdrawCoordinator<Ctx> {
    context: Ctx,
    chain_tag: ChainTag,
    exchange: ExchangeClient,
    aggregator: Option<SigningAggregatorClient>,
    shield_private_key: Option<SecretKey>,
    btc_address_params: Option<BtcAddressParams>,
    btc_signer_private_key: Option<SecretKey>,
    btc_vault_address: Option<bitcoin::Address>,
    poll_interval: tokio::time::Duration,
}

impl<Ctx> WithdrawCoordinator<Ctx>
where
    Ctx: Context,
{
    /// Build an EVM-family coordinator.
    pub fn new_evm(
        context: Ctx,
        chain_tag: ChainTag,
        exchange: ExchangeClient,
        aggregator: SigningAggregatorClient,
        shield_private_key: SecretKey,
        poll_interval: tokio::time::Duration,
    ) -> Self {
        Self {
            context,
            chain_tag,
            exchange,
            aggregator: Some(aggregator),
            shield_private_key: Some(shield_private_key),
            btc_address_params: None,
            btc_signer_private_key: None,
            btc_vault_address: None,
            poll_interval,
        }
    }

    /// Build the BTC coordinator.
    pub fn new_btc(
        context: Ctx,
        chain_tag: ChainTag,
        exchange: ExchangeClient,
        btc_address_params: BtcAddressParams,
        btc_signer_private_key: SecretKey,
        btc_vault_address: bitcoin::Address,
        poll_interval: tokio::time::Duration,
    ) -> Self {
        Self {
            context,
            chain_tag,
            exchange,
            aggregator: None,
            shield_private_key: None,
            btc_address_params: Some(btc_address_params),
            btc_signer_private_key: Some(btc_signer_private_key),
            btc_vault_address: Some(btc_vault_address),
            poll_interval,
        }
    }

    /// Run until shutdown: pull new withdraws from the exchange, then
    /// process everything PENDING, in ascending nonce order.
    #[tracing::instrument(skip(self), fields(chain_tag = %self.chain_tag))]
    pub async fn run(mut self) -> Result<(), Error> {
        let mut term = self.context.get_termination_handle();

        loop {
            tokio::select! {
                _ = term.wait_for_shutdown() => {
                    tracing::info!("withdraw coordinator received shutdown signal");
                    return Ok(());
                }
                result = self.poll_once() => {
                    result?;
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    async fn poll_once(&self) -> Result<(), Error> {
        self.pull_new_withdraws().await?;

        let storage = self.context.storage();
        let mut pending = storage.find_withdraw_requests_by_status(self.chain_tag, WithdrawStatus::Pending).await?;
        pending.sort_by_key(|w| w.nonce);

        for withdraw in pending {
            if let Err(error) = self.process_one(&withdraw).await {
                tracing::warn!(nonce = withdraw.nonce, %error, "withdraw processing failed, will retry next poll");
            }
        }

        Ok(())
    }

    async fn pull_new_withdraws(&self) -> Result<(), Error> {
        let storage = self.context.storage();
        let known = storage.find_withdraw_requests_by_status(self.chain_tag, WithdrawStatus::Pending).await?;
        let max_known = known.iter().map(|w| w.nonce).max();

        let offset = max_known.map(|n| n + 1).unwrap_or(0);
        let fetched = self.exchange.withdraws(self.chain_tag, offset, 100).await?;
        for withdraw in fetched {
            if storage.get_withdraw_request(self.chain_tag, withdraw.nonce).await?.is_some() {
                continue;
            }
            storage
                .write_withdraw_request(WithdrawRequest {
                    nonce: withdraw.nonce,
                    chain_tag: self.chain_tag,
                    user_id: withdraw.user_id,
                    recipient: withdraw.recipient,
                    token_address: withdraw.token_address,
                    amount: withdraw.amount,
                    status: WithdrawStatus::Pending,
                    tx_hash: None,
                    utxos: None,
                    sat_per_byte: None,
                })
                .await?;
        }
        Ok(())
    }

    async fn process_one(&self, withdraw: &WithdrawRequest) -> Result<(), Error> {
        let storage = self.context.storage();

        let outcome = match self.chain_tag.family() {
            bridge_core::chain::ChainFamily::Evm => self.process_evm(withdraw).await,
            bridge_core::chain::ChainFamily::Btc => self.process_btc(withdraw).await,
        };

        match outcome {
            Ok((tx_hash, true)) => {
                storage
                    .set_withdraw_status(self.chain_tag, withdraw.nonce, WithdrawStatus::Successful, Some(tx_hash))
                    .await?;
                self.context.signal(SignerEvent::WithdrawSettled { chain_tag: self.chain_tag, nonce: withdraw.nonce })?;
            }
            Ok((tx_hash, false)) => {
                tracing::warn!(nonce = withdraw.nonce, tx_hash, "withdraw broadcast but receipt reported failure");
            }
            Err(Error::WithdrawHashMismatch { .. } | Error::ValidatorRejected { .. } | Error::BitcoinRejected(_)) => {
                storage
                    .set_withdraw_status(self.chain_tag, withdraw.nonce, WithdrawStatus::Rejected, None)
                    .await?;
                self.context.signal(SignerEvent::WithdrawSettled { chain_tag: self.chain_tag, nonce: withdraw.nonce })?;
            }
            Err(error) => return Err(error),
        }

        Ok(())
    }

    async fn process_evm(&self, withdraw: &WithdrawRequest) -> Result<(String, bool), Error> {
        let client = self.context.evm_client(self.chain_tag)?;
        let aggregator = self.aggregator.as_ref().ok_or(Error::UnsupportedChain(self.chain_tag))?;
        let shield_private_key = self.shield_private_key.as_ref().ok_or(Error::UnsupportedChain(self.chain_tag))?;
        self::evm::process_withdraw(client, aggregator, shield_private_key, withdraw).await
    }

    async fn process_btc(&self, withdraw: &WithdrawRequest) -> Result<(String, bool), Error> {
        let storage = self.context.storage();
        let client = self.context.btc_client()?;
        let params = self.btc_address_params.ok_or(Error::UnsupportedChain(self.chain_tag))?;
        let signer_key = self.btc_signer_private_key.ok_or(Error::UnsupportedChain(self.chain_tag))?;
        let vault_address =
            self.btc_vault_address.clone().ok_or(Error::UnsupportedChain(self.chain_tag))?;

        // A withdraw already PROCESSING with UTXOs assigned and a crash
        // between signing and broadcast is an inconsistent state this
        // coordinator cannot safely resolve automatically: surface it as an
        // assertion failure, not silently reassign a fresh set.
        if withdraw.status == WithdrawStatus::Processing && withdraw.utxos.is_some() {
            return Err(Error::UtxoSetChanged { chain_tag: self.chain_tag, nonce: withdraw.nonce });
        }

        let (utxo_refs, sat_per_byte) = match (&withdraw.utxos, withdraw.sat_per_byte) {
            (Some(utxos), Some(rate)) => (utxos.clone(), rate),
            _ => {
                let sat_per_byte = client.estimate_sat_per_byte(6)?;
                let candidates = storage.find_utxos_by_status(crate::storage::model::UtxoStatus::Unspent).await?;
                let (chosen, _fee) = self::btc::select_withdraw_utxos(&candidates, withdraw.amount as u64, sat_per_byte)?;

                for utxo_ref in &chosen {
                    storage
                        .set_utxo_status(utxo_ref.outpoint, crate::storage::model::UtxoStatus::Spend)
                        .await?;
                }
                storage
                    .assign_withdraw_utxos(self.chain_tag, withdraw.nonce, chosen.clone(), sat_per_byte)
                    .await?;
                storage
                    .set_withdraw_status(self.chain_tag, withdraw.nonce, WithdrawStatus::Processing, None)
                    .await?;
                (chosen, sat_per_byte)
            }
        };

        let utxos_with_salt: Vec<(crate::storage::model::UtxoRef, u64)> =
            utxo_refs.iter().map(|r| (*r, r.salt)).collect();
        let fee = self::btc::recompute_fee(utxo_refs.len(), sat_per_byte);

        let recipient = withdraw.recipient.parse::<bitcoin::Address<bitcoin::address::NetworkUnchecked>>()
            .map_err(|_| Error::InvalidFormat { context: "btc withdraw recipient", value: withdraw.recipient.clone() })?
            .assume_checked();
        let signed = self::btc::build_and_sign_withdraw(
            params,
            &signer_key,
            &utxos_with_salt,
            withdraw.amount as u64,
            fee,
            &recipient,
            &vault_address,
        )?;

        let raw = bitcoin::consensus::encode::serialize(&signed);
        let tx_hash = client.send_raw_transaction(&raw)?;
        Ok((tx_hash, true))
    }
}
