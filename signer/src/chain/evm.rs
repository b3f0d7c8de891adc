//! The EVM chain client, built on `alloy`.
//!
//! The teacher has no EVM dependency (it only bridges BTC↔Stacks), so this
//! module's crate choice is grounded instead in the pack's
//! `other_examples/107090de_x402-rs-x402-rs__src-chain-evm.rs.rs`: a
//! `ProviderBuilder`-constructed `RootProvider` plus `sol!`-generated
//! contract bindings is the idiomatic modern way to talk to an EVM chain
//! from Rust. Sweep/withdraw calldata shape follows the original's
//! `zexporta/withdraw/evm.py::send_evm_withdraw`
//! (`withdraw(token, amount, recipient, nonce, signature, signature_nonce,
//! shieldSig)`) and `zexporta/deposit/vault_depositor.py` (per-deposit
//! `transfer(token, amount)` calls issued from each `UserDeposit` proxy).

use std::str::FromStr;

use alloy_consensus::Transaction as _;
use alloy_network::EthereumWallet;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types_eth::{BlockId, BlockNumberOrTag, BlockTransactionsKind, Filter};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::sol;
use alloy_transport_http::Http;
use url::Url;

use bridge_core::ChainTag;

use crate::error::Error;
use crate::storage::model::RawTransfer;

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IERC20 {
        function decimals() external view returns (uint8);
        function balanceOf(address owner) external view returns (uint256);
        event Transfer(address indexed from, address indexed to, uint256 value);
    }
}

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IUserDeposit {
        function transferNativeToken(uint256 amount) external;
        function transferERC20(address token, uint256 amount) external;
    }
}

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IUserDepositFactory {
        function deploy(uint256 salt) external;
    }
}

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IVault {
        function withdraw(
            address token,
            uint256 amount,
            address recipient,
            uint256 nonce,
            bytes calldata signature,
            uint256 signatureNonce,
            bytes calldata shieldSig
        ) external;
    }
}

/// A connected EVM chain client. Cheap to `Clone`: `RootProvider`/`DynProvider`
/// share their underlying transport behind an `Arc`, so the observer,
/// finalizer, vault depositor, and withdraw coordinator can each own a handle.
#[derive(Clone)]
pub struct EvmClient {
    chain_tag: ChainTag,
    provider: RootProvider<Http<reqwest::Client>>,
    /// A wallet-backed provider for the sweeper account, present only on
    /// clients built via [`EvmClient::with_sweeper`]. The vault depositor and
    /// withdraw coordinator need this; the observer and finalizer never do.
    sweeper: Option<DynProvider>,
    sweeper_address: Option<Address>,
    vault_address: Address,
    chain_id: u64,
}

impl EvmClient {
    /// Connect to `rpc_url`. This is a network side effect, performed once
    /// at `SignerContext` construction, never re-run per request.
    pub fn connect(chain_tag: ChainTag, rpc_url: Url, vault_address: Address, chain_id: u64) -> Self {
        let provider = ProviderBuilder::new().on_http(rpc_url);
        Self { chain_tag, provider, sweeper: None, sweeper_address: None, vault_address, chain_id }
    }

    /// Attach a sweeper/withdraw-broadcasting signer, keyed from a raw
    /// secp256k1 private key. Only the vault depositor and withdraw
    /// coordinator need this half of the client.
    pub fn with_sweeper(mut self, rpc_url: Url, private_key_hex: &str) -> Result<Self, Error> {
        let signer = private_key_hex
            .parse::<PrivateKeySigner>()
            .map_err(|_| Error::InvalidFormat { context: "evm sweeper private key", value: "<redacted>".to_string() })?
            .with_chain_id(Some(self.chain_id));
        self.sweeper_address = Some(signer.address());
        let wallet = EthereumWallet::from(signer);
        let provider = ProviderBuilder::new().wallet(wallet).on_http(rpc_url).erased();
        self.sweeper = Some(provider);
        Ok(self)
    }

    fn sweeper_provider(&self) -> Result<&DynProvider, Error> {
        self.sweeper
            .as_ref()
            .ok_or(Error::UnsupportedChain(self.chain_tag))
    }

    /// The chain ID this client was configured with, used when constructing
    /// transactions and EIP-712-flavored signatures.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// The vault contract address transfers sweep into and withdraws pay
    /// out of.
    pub fn vault_address(&self) -> Address {
        self.vault_address
    }

    /// Fetch the current block height below which reorgs are considered
    /// impossible, per the chain's configured `finalize_block_count` — the
    /// caller (the finalizer) supplies that offset; this only reports tip.
    pub async fn block_number(&self) -> Result<u64, Error> {
        self.provider
            .get_block_number()
            .await
            .map_err(|source| Error::ChainRpc { chain_tag: self.chain_tag, message: source.to_string() })
    }

    /// Scan `[from, to]` inclusive for `Transfer` events landing on any of
    /// `tracked_addresses` (lowercased hex, `0x`-prefixed), one
    /// [`RawTransfer`] per matching log.
    pub async fn scan_transfer_logs(
        &self,
        from: u64,
        to: u64,
        tracked_addresses: &[String],
    ) -> Result<Vec<RawTransfer>, Error> {
        let filter = Filter::new()
            .event_signature(IERC20::Transfer::SIGNATURE_HASH)
            .from_block(BlockNumberOrTag::Number(from))
            .to_block(BlockNumberOrTag::Number(to));

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|source| Error::ChainRpc { chain_tag: self.chain_tag, message: source.to_string() })?;

        let tracked: std::collections::HashSet<&str> = tracked_addresses.iter().map(String::as_str).collect();
        let mut transfers = Vec::new();

        for (index, log) in logs.iter().enumerate() {
            let Ok(decoded) = log.log_decode::<IERC20::Transfer>() else { continue };
            let to_addr = format!("{:#x}", decoded.inner.data.to);
            if !tracked.contains(to_addr.as_str()) {
                continue;
            }
            transfers.push(RawTransfer {
                tx_hash: log
                    .transaction_hash
                    .map(|h| format!("{h:#x}"))
                    .unwrap_or_default(),
                block_number: log.block_number.unwrap_or(0),
                chain_tag: self.chain_tag,
                to: to_addr,
                token: format!("{:#x}", log.address()),
                value: decoded.inner.data.value.to::<u128>(),
                index: index as u32,
            });
        }

        Ok(transfers)
    }

    /// Scan `[from, to]` inclusive for plain native-value transfers (no
    /// ERC-20 logs) landing on any of `tracked_addresses`: every block
    /// transaction whose `to` is tracked and `value > 0`, with the token
    /// field set to the native sentinel address. Native transfers emit no
    /// log, so `scan_transfer_logs` alone never observes them.
    pub async fn scan_native_transfers(
        &self,
        from: u64,
        to: u64,
        tracked_addresses: &[String],
    ) -> Result<Vec<RawTransfer>, Error> {
        let tracked: std::collections::HashSet<&str> = tracked_addresses.iter().map(String::as_str).collect();
        let native_token = format!("{:#x}", Address::ZERO);
        let mut transfers = Vec::new();

        for block_number in from..=to {
            let block = self
                .provider
                .get_block(BlockId::Number(BlockNumberOrTag::Number(block_number)), BlockTransactionsKind::Full)
                .await
                .map_err(|source| Error::ChainRpc { chain_tag: self.chain_tag, message: source.to_string() })?;
            let Some(block) = block else { continue };

            for tx in block.transactions.as_transactions().unwrap_or_default() {
                let Some(to_addr) = tx.to() else { continue };
                let value = tx.value();
                if value.is_zero() {
                    continue;
                }
                let to_hex = format!("{to_addr:#x}");
                if !tracked.contains(to_hex.as_str()) {
                    continue;
                }
                // A disjoint index range from the log-based scan above: a
                // plain value transfer and an ERC-20 `Transfer` log can
                // share a `tx_hash` (e.g. a contract call that both carries
                // value and emits a log), but never this index.
                transfers.push(RawTransfer {
                    tx_hash: format!("{:#x}", tx.tx_hash()),
                    block_number,
                    chain_tag: self.chain_tag,
                    to: to_hex,
                    token: native_token.clone(),
                    value: value.to::<u128>(),
                    index: u32::MAX,
                });
            }
        }

        Ok(transfers)
    }

    /// Whether the transaction's receipt reports success, per the
    /// original's `get_accepted_transfers` check of `receipt["status"]`.
    pub async fn transaction_succeeded(&self, tx_hash: &str) -> Result<bool, Error> {
        let hash = B256::from_str(tx_hash)
            .map_err(|_| Error::InvalidFormat { context: "evm tx hash", value: tx_hash.to_string() })?;
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|source| Error::ChainRpc { chain_tag: self.chain_tag, message: source.to_string() })?;
        Ok(receipt.map(|r| r.status()).unwrap_or(false))
    }

    /// Query and cache-free-read a token's `decimals()`.
    pub async fn token_decimals(&self, token_address: &str) -> Result<u8, Error> {
        let address = Address::from_str(token_address)
            .map_err(|_| Error::InvalidFormat { context: "evm token address", value: token_address.to_string() })?;
        if address.is_zero() {
            // The native-token sentinel has no ERC-20 contract to call.
            return Ok(18);
        }
        let contract = IERC20::new(address, &self.provider);
        let decimals = contract
            .decimals()
            .call()
            .await
            .map_err(|e| Error::ContractRevert(e.to_string()))?;
        Ok(decimals._0)
    }

    /// Build the `(token, amount, recipient, nonce)` calldata encoding used
    /// both locally to derive the withdraw hash and to submit the
    /// eventually signed withdraw.
    pub fn vault_withdraw_calldata(
        &self,
        token: Address,
        amount: U256,
        recipient: Address,
        nonce: U256,
        signature: Vec<u8>,
        signature_nonce: U256,
        shield_sig: Vec<u8>,
    ) -> Vec<u8> {
        IVault::withdrawCall {
            token,
            amount,
            recipient,
            nonce,
            signature: signature.into(),
            signatureNonce: signature_nonce,
            shieldSig: shield_sig.into(),
        }
        .abi_encode()
    }

    /// Whether `address` has deployed contract code, used to pick between
    /// `CONTRACT_DEPLOY` and `TOKEN_TRANSFER`.
    pub async fn has_code(&self, address: Address) -> Result<bool, Error> {
        let code = self
            .provider
            .get_code_at(address)
            .await
            .map_err(|source| Error::ChainRpc { chain_tag: self.chain_tag, message: source.to_string() })?;
        Ok(!code.is_empty())
    }

    /// The sweeper account's next usable nonce, read once per batch and
    /// incremented locally per built transaction.
    pub async fn sweeper_nonce(&self) -> Result<u64, Error> {
        let provider = self.sweeper_provider()?;
        let address = self.sweeper_address.ok_or(Error::UnsupportedChain(self.chain_tag))?;
        provider
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(|source| Error::ChainRpc { chain_tag: self.chain_tag, message: source.to_string() })
    }

    /// Deploy the per-user `UserDeposit` proxy at its CREATE2-predictable
    /// address via `factory.deploy(salt)`.
    pub async fn send_deploy(&self, factory: Address, salt: U256, nonce: u64) -> Result<String, Error> {
        let provider = self.sweeper_provider()?;
        let contract = IUserDepositFactory::new(factory, provider);
        let receipt = contract
            .deploy(salt)
            .nonce(nonce)
            .send()
            .await
            .map_err(|e| Error::ContractRevert(e.to_string()))?
            .get_receipt()
            .await
            .map_err(|source| Error::ChainRpc { chain_tag: self.chain_tag, message: source.to_string() })?;
        Ok(format!("{:#x}", receipt.transaction_hash))
    }

    /// Sweep a user deposit contract's held balance into the vault: native
    /// value if `token` is the zero sentinel, else the given ERC-20.
    pub async fn send_sweep(
        &self,
        user_deposit: Address,
        token: Address,
        amount: U256,
        nonce: u64,
    ) -> Result<(String, bool), Error> {
        let provider = self.sweeper_provider()?;
        let contract = IUserDeposit::new(user_deposit, provider);
        let pending = if token.is_zero() {
            contract.transferNativeToken(amount).nonce(nonce).send().await
        } else {
            contract.transferERC20(token, amount).nonce(nonce).send().await
        }
        .map_err(|e| Error::ContractRevert(e.to_string()))?;

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|source| Error::ChainRpc { chain_tag: self.chain_tag, message: source.to_string() })?;
        Ok((format!("{:#x}", receipt.transaction_hash), receipt.status()))
    }

    /// Broadcast a signed vault `withdraw(...)` call and wait for its
    /// receipt.
    pub async fn send_vault_withdraw(&self, calldata: Vec<u8>, nonce: u64) -> Result<(String, bool), Error> {
        use alloy_rpc_types_eth::TransactionRequest;
        use alloy_network::TransactionBuilder;

        let provider = self.sweeper_provider()?;
        let request = TransactionRequest::default()
            .with_to(self.vault_address)
            .with_input(Bytes::from(calldata))
            .with_nonce(nonce);
        let pending = provider
            .send_transaction(request)
            .await
            .map_err(|e| Error::ContractRevert(e.to_string()))?;
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|source| Error::ChainRpc { chain_tag: self.chain_tag, message: source.to_string() })?;
        Ok((format!("{:#x}", receipt.transaction_hash), receipt.status()))
    }
}

impl super::ChainClient for EvmClient {
    fn chain_tag(&self) -> ChainTag {
        self.chain_tag
    }

    async fn latest_block(&self) -> Result<u64, Error> {
        self.block_number().await
    }

    async fn scan_transfers(
        &self,
        from: u64,
        to: u64,
        tracked_addresses: &[String],
    ) -> Result<Vec<RawTransfer>, Error> {
        let mut transfers = self.scan_transfer_logs(from, to, tracked_addresses).await?;
        transfers.extend(self.scan_native_transfers(from, to, tracked_addresses).await?);
        Ok(transfers)
    }

    async fn transaction_succeeded(&self, tx_hash: &str) -> Result<bool, Error> {
        EvmClient::transaction_succeeded(self, tx_hash).await
    }

    async fn token_decimals(&self, token_address: &str) -> Result<u8, Error> {
        EvmClient::token_decimals(self, token_address).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vault_withdraw_calldata_is_deterministic() {
        let client = EvmClient::connect(
            ChainTag::Pol,
            Url::parse("http://localhost:8545").unwrap(),
            Address::ZERO,
            137,
        );
        let a = client.vault_withdraw_calldata(
            Address::ZERO,
            U256::from(1u64),
            Address::ZERO,
            U256::from(1u64),
            vec![1, 2, 3],
            U256::from(9u64),
            vec![],
        );
        let b = client.vault_withdraw_calldata(
            Address::ZERO,
            U256::from(1u64),
            Address::ZERO,
            U256::from(1u64),
            vec![1, 2, 3],
            U256::from(9u64),
            vec![],
        );
        assert_eq!(a, b);
    }
}
