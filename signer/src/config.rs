//! Layered configuration, loaded with the `config` crate: an embedded
//! `config/default.toml`, an optional `config/{prod,dev}.toml` selected by
//! `BRIDGE_ENVIRONMENT`, and finally environment-variable overrides prefixed
//! `BRIDGE_`, adapted from the original's `zexporta/config.py` (per-chain
//! `CHAINS_CONFIG`, `ZEX_BASE_URL`, `USER_DEPOSIT_FACTORY_ADDRESS`,
//! `DKG_JSON_PATH`/`DKG_NAME`, `WITHDRAWER_PRIVATE_KEY`,
//! `SA_SHIELD_PRIVATE_KEY`).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use bridge_core::ChainTag;

use crate::error::Error;

/// Which deployment environment this process is running as. Selects the
/// default chain set, matching the original's `PROD`/`DEV` split between
/// mainnets and testnets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    /// Mainnet chains: POL, OPT, BSC, BTC mainnet.
    Prod,
    /// Testnet chains: HOL, SEP, BST, BTC testnet4.
    Dev,
}

/// Per-EVM-chain settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EvmChainConfig {
    /// JSON-RPC HTTP endpoint.
    pub rpc_url: url::Url,
    /// Chain ID, used to build legacy/EIP-1559 transactions correctly.
    pub chain_id: u64,
    /// Blocks of depth below the tip considered irreversible.
    pub finalize_block_count: u64,
    /// Whether this chain uses a Clique/PoA-style extra-data header that
    /// some `eth_getBlockByNumber` responses need relaxed decoding for.
    #[serde(default)]
    pub poa: bool,
    /// Seconds to sleep between observation polls once caught up to tip.
    pub delay_seconds: u64,
    /// Max blocks per observation batch.
    pub batch_block_size: u64,
    /// The deployed vault contract address transfers sweep into and
    /// withdraws pay out from.
    pub vault_address: alloy_primitives::Address,
}

/// Bitcoin chain settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BtcChainConfig {
    /// `bitcoind` RPC endpoint.
    pub rpc_url: url::Url,
    /// RPC basic-auth username.
    pub rpc_user: String,
    /// RPC basic-auth password.
    pub rpc_password: String,
    /// Confirmations below the tip considered irreversible.
    pub finalize_block_count: u64,
    /// Seconds to sleep between observation polls once caught up to tip.
    pub delay_seconds: u64,
    /// Max blocks per observation batch.
    pub batch_block_size: u64,
    /// `mainnet`, `testnet`, `testnet4`, `signet`, or `regtest`.
    pub network: bitcoin::Network,
    /// The address withdraw change outputs pay back to, analogous to the
    /// EVM vault: never a per-user deposit address.
    pub vault_address: bitcoin::Address<bitcoin::address::NetworkUnchecked>,
}

/// Top-level signer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// `prod` or `dev`; governs which chain set is active.
    pub environment: Environment,
    /// The exchange's read-only REST base URL.
    pub exchange_base_url: url::Url,
    /// CREATE2 factory address every EVM deposit address derives from.
    pub user_deposit_factory_address: alloy_primitives::Address,
    /// `keccak256` of the deployed `UserDeposit` proxy's init code.
    pub user_deposit_bytecode_hash: alloy_primitives::B256,
    /// The Taproot master public key every BTC deposit address tweaks.
    pub btc_master_pubkey: bitcoin::secp256k1::XOnlyPublicKey,
    /// Configured EVM chains, keyed by tag.
    pub evm_chains: HashMap<ChainTag, EvmChainConfig>,
    /// The single configured BTC chain, if any.
    pub btc_chain: Option<BtcChainConfig>,
    /// The signing aggregator's HTTP base URL.
    pub signing_aggregator_url: url::Url,
    /// Name of the DKG this signer participates in, used to scope
    /// aggregator requests to the right quorum.
    pub dkg_name: String,
    /// Path to the JSON file describing every known DKG's public key and
    /// party, loaded once at startup rather than queried over the network.
    pub dkg_json_path: std::path::PathBuf,
    /// Hex-encoded secp256k1 private key authenticating this signer's
    /// withdraw requests to the aggregator.
    pub withdrawer_private_key: String,
    /// Hex-encoded secp256k1 private key of the EVM sweeper/broadcaster
    /// account used by the vault depositor and the withdraw coordinator to
    /// send transactions.
    pub sweeper_private_key: String,
    /// Hex-encoded "shield" signature key: an auxiliary signature the
    /// withdraw coordinator produces locally and submits alongside the
    /// aggregate threshold signature.
    pub shield_private_key: String,
    /// Hex-encoded secp256k1 private key used to sign BTC withdraws
    /// directly: the BTC path has no quorum, so signing is single-signer.
    pub btc_signer_private_key: String,
    /// Postgres connection string.
    pub database_url: String,
}

impl Settings {
    /// Load configuration from the embedded defaults, an environment-named
    /// overlay under `config_dir`, and finally `BRIDGE_`-prefixed
    /// environment variables, in that order of increasing precedence.
    pub fn load(config_dir: &Path) -> Result<Self, Error> {
        let environment = std::env::var("BRIDGE_ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(
                config::File::from(config_dir.join(format!("{environment}.toml"))).required(false),
            )
            .add_source(
                config::Environment::with_prefix("BRIDGE")
                    .separator("__")
                    .try_parsing(true),
            );

        builder = builder.set_override("environment", environment)?;

        Ok(builder.build()?.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_alone_parse_into_valid_settings() {
        let settings: Result<Settings, config::ConfigError> = config::Config::builder()
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
            .and_then(|c| c.try_deserialize());
        assert!(settings.is_ok(), "{settings:?}");
    }
}
