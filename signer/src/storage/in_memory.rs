//! An in-process store backed by `Mutex`-guarded maps, used by the test
//! suite and by `bridge-signer`'s `testing` fakes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bridge_core::ChainTag;

use super::model::{
    ChainCursor, Token, TransferStatus, UserAddress, UserTransfer, Utxo, UtxoOutpoint, UtxoStatus,
    WithdrawRequest, WithdrawStatus,
};
use super::{DbRead, DbWrite};
use crate::error::Error;

/// An in-memory `DbRead + DbWrite` implementation. Cheap to `Clone`: every
/// clone shares the same underlying maps, matching how a single
/// `Context` hands its storage handle to every concurrently running
/// component.
#[derive(Default, Clone)]
pub struct Store(Arc<Mutex<Inner>>);

#[derive(Default)]
struct Inner {
    addresses: HashMap<(ChainTag, u64), UserAddress>,
    cursors: HashMap<ChainTag, ChainCursor>,
    transfers: HashMap<(ChainTag, String, u32), UserTransfer>,
    transfer_order: Vec<(ChainTag, String, u32)>,
    tokens: HashMap<(ChainTag, String), Token>,
    utxos: HashMap<UtxoOutpoint, Utxo>,
    utxo_order: Vec<UtxoOutpoint>,
    withdraws: HashMap<(ChainTag, u64), WithdrawRequest>,
}

impl Store {
    /// A fresh, empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DbRead for Store {
    async fn get_active_addresses(&self, chain_tag: ChainTag) -> Result<Vec<UserAddress>, Error> {
        let inner = self.0.lock().unwrap();
        Ok(inner
            .addresses
            .values()
            .filter(|a| a.chain_tag == chain_tag && a.is_active)
            .cloned()
            .collect())
    }

    async fn get_address(
        &self,
        chain_tag: ChainTag,
        user_id: u64,
    ) -> Result<Option<UserAddress>, Error> {
        let inner = self.0.lock().unwrap();
        Ok(inner.addresses.get(&(chain_tag, user_id)).cloned())
    }

    async fn get_chain_cursor(&self, chain_tag: ChainTag) -> Result<Option<ChainCursor>, Error> {
        let inner = self.0.lock().unwrap();
        Ok(inner.cursors.get(&chain_tag).copied())
    }

    async fn find_transfers_by_status(
        &self,
        chain_tag: ChainTag,
        status: TransferStatus,
    ) -> Result<Vec<UserTransfer>, Error> {
        let inner = self.0.lock().unwrap();
        Ok(inner
            .transfer_order
            .iter()
            .filter_map(|key| inner.transfers.get(key))
            .filter(|t| t.transfer.chain_tag == chain_tag && t.status == status)
            .cloned()
            .collect())
    }

    async fn get_token(
        &self,
        chain_tag: ChainTag,
        token_address: &str,
    ) -> Result<Option<Token>, Error> {
        let inner = self.0.lock().unwrap();
        Ok(inner
            .tokens
            .get(&(chain_tag, token_address.to_lowercase()))
            .cloned())
    }

    async fn find_utxos_by_status(&self, status: UtxoStatus) -> Result<Vec<Utxo>, Error> {
        let inner = self.0.lock().unwrap();
        Ok(inner
            .utxo_order
            .iter()
            .filter_map(|key| inner.utxos.get(key))
            .filter(|u| u.status == status)
            .copied()
            .collect())
    }

    async fn get_withdraw_request(
        &self,
        chain_tag: ChainTag,
        nonce: u64,
    ) -> Result<Option<WithdrawRequest>, Error> {
        let inner = self.0.lock().unwrap();
        Ok(inner.withdraws.get(&(chain_tag, nonce)).cloned())
    }

    async fn find_withdraw_requests_by_status(
        &self,
        chain_tag: ChainTag,
        status: WithdrawStatus,
    ) -> Result<Vec<WithdrawRequest>, Error> {
        let inner = self.0.lock().unwrap();
        Ok(inner
            .withdraws
            .values()
            .filter(|w| w.chain_tag == chain_tag && w.status == status)
            .cloned()
            .collect())
    }
}

impl DbWrite for Store {
    async fn write_address(&self, address: UserAddress) -> Result<(), Error> {
        let mut inner = self.0.lock().unwrap();
        inner
            .addresses
            .insert((address.chain_tag, address.user_id), address);
        Ok(())
    }

    async fn write_chain_cursor(&self, cursor: ChainCursor) -> Result<(), Error> {
        let mut inner = self.0.lock().unwrap();
        inner.cursors.insert(cursor.chain_tag, cursor);
        Ok(())
    }

    async fn write_transfer(&self, transfer: UserTransfer) -> Result<(), Error> {
        let mut inner = self.0.lock().unwrap();
        let key = (
            transfer.transfer.chain_tag,
            transfer.transfer.tx_hash.clone(),
            transfer.transfer.index,
        );
        if inner.transfers.contains_key(&key) {
            return Ok(());
        }
        inner.transfer_order.push(key.clone());
        inner.transfers.insert(key, transfer);
        Ok(())
    }

    async fn set_transfer_status(
        &self,
        chain_tag: ChainTag,
        tx_hash: &str,
        index: u32,
        status: TransferStatus,
    ) -> Result<(), Error> {
        let mut inner = self.0.lock().unwrap();
        let key = (chain_tag, tx_hash.to_string(), index);
        match inner.transfers.get_mut(&key) {
            Some(t) => {
                t.status = status;
                Ok(())
            }
            None => Err(Error::NotFound("transfer")),
        }
    }

    async fn write_token(&self, token: Token) -> Result<(), Error> {
        let mut inner = self.0.lock().unwrap();
        inner
            .tokens
            .insert((token.chain_tag, token.token_address.to_lowercase()), token);
        Ok(())
    }

    async fn write_utxo(&self, utxo: Utxo) -> Result<(), Error> {
        let mut inner = self.0.lock().unwrap();
        if inner.utxos.contains_key(&utxo.outpoint) {
            return Ok(());
        }
        inner.utxo_order.push(utxo.outpoint);
        inner.utxos.insert(utxo.outpoint, utxo);
        Ok(())
    }

    async fn set_utxo_status(
        &self,
        outpoint: UtxoOutpoint,
        status: UtxoStatus,
    ) -> Result<(), Error> {
        let mut inner = self.0.lock().unwrap();
        match inner.utxos.get_mut(&outpoint) {
            Some(u) => {
                u.status = status;
                Ok(())
            }
            None => Err(Error::NotFound("utxo")),
        }
    }

    async fn write_withdraw_request(&self, request: WithdrawRequest) -> Result<(), Error> {
        let mut inner = self.0.lock().unwrap();
        inner
            .withdraws
            .insert((request.chain_tag, request.nonce), request);
        Ok(())
    }

    async fn set_withdraw_status(
        &self,
        chain_tag: ChainTag,
        nonce: u64,
        status: WithdrawStatus,
        tx_hash: Option<String>,
    ) -> Result<(), Error> {
        let mut inner = self.0.lock().unwrap();
        match inner.withdraws.get_mut(&(chain_tag, nonce)) {
            Some(w) => {
                w.status = status;
                if tx_hash.is_some() {
                    w.tx_hash = tx_hash;
                }
                Ok(())
            }
            None => Err(Error::NotFound("withdraw_request")),
        }
    }

    async fn assign_withdraw_utxos(
        &self,
        chain_tag: ChainTag,
        nonce: u64,
        utxos: Vec<super::model::UtxoRef>,
        sat_per_byte: u64,
    ) -> Result<(), Error> {
        let mut inner = self.0.lock().unwrap();
        match inner.withdraws.get_mut(&(chain_tag, nonce)) {
            Some(w) if w.utxos.is_none() => {
                w.utxos = Some(utxos);
                w.sat_per_byte = Some(sat_per_byte);
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(Error::NotFound("withdraw_request")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::ChainTag;

    fn address(user_id: u64) -> UserAddress {
        UserAddress {
            user_id,
            address: format!("0x{user_id:040x}"),
            chain_tag: ChainTag::Pol,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn writing_and_reading_an_address_round_trips() {
        let store = Store::new();
        store.write_address(address(7)).await.unwrap();
        let got = store.get_address(ChainTag::Pol, 7).await.unwrap();
        assert_eq!(got, Some(address(7)));
    }

    #[tokio::test]
    async fn deactivated_addresses_are_excluded_from_active_listing() {
        let store = Store::new();
        let mut inactive = address(1);
        inactive.is_active = false;
        store.write_address(inactive).await.unwrap();
        store.write_address(address(2)).await.unwrap();
        let active = store.get_active_addresses(ChainTag::Pol).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].user_id, 2);
    }

    #[tokio::test]
    async fn utxos_are_returned_in_insertion_order() {
        let store = Store::new();
        for (i, amount) in [8_000u64, 12_000, 30_000].into_iter().enumerate() {
            store
                .write_utxo(Utxo {
                    outpoint: UtxoOutpoint { tx_hash: [i as u8; 32], index: 0 },
                    salt: 1,
                    amount,
                    status: UtxoStatus::Unspent,
                })
                .await
                .unwrap();
        }
        let utxos = store.find_utxos_by_status(UtxoStatus::Unspent).await.unwrap();
        assert_eq!(utxos.iter().map(|u| u.amount).collect::<Vec<_>>(), vec![8_000, 12_000, 30_000]);
    }

    #[tokio::test]
    async fn assigning_utxos_to_a_withdraw_is_idempotent() {
        let store = Store::new();
        store
            .write_withdraw_request(WithdrawRequest {
                nonce: 1,
                chain_tag: ChainTag::Btc,
                user_id: 5,
                recipient: "bc1p...".to_string(),
                token_address: "0x0".to_string(),
                amount: 10_000,
                status: WithdrawStatus::Pending,
                tx_hash: None,
                utxos: None,
                sat_per_byte: None,
            })
            .await
            .unwrap();

        let first = vec![super::super::model::UtxoRef {
            outpoint: UtxoOutpoint { tx_hash: [0; 32], index: 0 },
            amount: 20_000,
            salt: 5,
        }];
        store
            .assign_withdraw_utxos(ChainTag::Btc, 1, first.clone(), 10)
            .await
            .unwrap();

        let second = vec![super::super::model::UtxoRef {
            outpoint: UtxoOutpoint { tx_hash: [1; 32], index: 0 },
            amount: 99_999,
            salt: 5,
        }];
        store
            .assign_withdraw_utxos(ChainTag::Btc, 1, second, 10)
            .await
            .unwrap();

        let got = store.get_withdraw_request(ChainTag::Btc, 1).await.unwrap().unwrap();
        assert_eq!(got.utxos, Some(first));
    }

    fn transfer(status: TransferStatus) -> UserTransfer {
        UserTransfer {
            transfer: super::super::model::RawTransfer {
                tx_hash: "abc".to_string(),
                block_number: 100,
                chain_tag: ChainTag::Pol,
                to: "0x1".to_string(),
                token: "0x0".to_string(),
                value: 1_000,
                index: 0,
            },
            user_id: 1,
            decimals: 18,
            status,
        }
    }

    #[tokio::test]
    async fn re_writing_an_already_finalized_transfer_does_not_regress_its_status() {
        let store = Store::new();
        store.write_transfer(transfer(TransferStatus::Finalized)).await.unwrap();

        // A retried observer batch re-scanning the same block range writes
        // the same transfer again, as freshly observed (PENDING).
        store.write_transfer(transfer(TransferStatus::Pending)).await.unwrap();

        let finalized = store.find_transfers_by_status(ChainTag::Pol, TransferStatus::Finalized).await.unwrap();
        assert_eq!(finalized.len(), 1);
        let pending = store.find_transfers_by_status(ChainTag::Pol, TransferStatus::Pending).await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn re_writing_an_already_spent_utxo_does_not_revert_it_to_unspent() {
        let store = Store::new();
        let outpoint = UtxoOutpoint { tx_hash: [9; 32], index: 0 };
        store
            .write_utxo(Utxo { outpoint, salt: 1, amount: 5_000, status: UtxoStatus::Unspent })
            .await
            .unwrap();
        store.set_utxo_status(outpoint, UtxoStatus::Spend).await.unwrap();

        // A retried observer batch re-observes the same deposit.
        store
            .write_utxo(Utxo { outpoint, salt: 1, amount: 5_000, status: UtxoStatus::Unspent })
            .await
            .unwrap();

        let unspent = store.find_utxos_by_status(UtxoStatus::Unspent).await.unwrap();
        assert!(unspent.is_empty());
    }
}
