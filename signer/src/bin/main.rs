//! Process entry point: load configuration, connect every configured chain
//! client, and run one [`Observer`]/[`Finalizer`] pair per chain plus a
//! per-family [`VaultDepositor`] (EVM) or [`WithdrawCoordinator`] task, all
//! racing a shared shutdown signal.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::time::{sleep, Duration};

use bridge_core::ChainTag;
use bridge_signer::chain::btc::BtcClient;
use bridge_signer::chain::evm::EvmClient;
use bridge_signer::config::{BtcChainConfig, EvmChainConfig, Settings};
use bridge_signer::context::{Context, SignerContext};
use bridge_signer::error::Error;
use bridge_signer::exchange::{sync_new_addresses, ExchangeClient};
use bridge_signer::finalizer::Finalizer;
use bridge_signer::observer::Observer;
use bridge_signer::signing_aggregator::SigningAggregatorClient;
use bridge_signer::storage::postgres::Store;
use bridge_signer::vault_depositor::VaultDepositor;
use bridge_signer::withdraw::WithdrawCoordinator;

/// The bridge signer daemon.
#[derive(Parser, Debug)]
struct Cli {
    /// Directory holding `{environment}.toml`, overlaid on the embedded
    /// defaults.
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    PrometheusBuilder::new()
        .install()
        .expect("failed to install prometheus exporter");

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config_dir)?;

    let storage = Store::connect(&settings.database_url).await?;

    let evm_clients = connect_evm_clients(&settings)?;
    let btc_client = connect_btc_client(&settings)?;

    let context = SignerContext::new(settings, storage, evm_clients, btc_client);

    let mut tasks = Vec::new();
    spawn_evm_chains(&context, &mut tasks);
    spawn_btc_chain(&context, &mut tasks);

    shutdown_on_signal(context.clone());

    for task in tasks {
        if let Err(error) = task.await.expect("component task panicked") {
            tracing::error!(%error, "component exited with an error");
        }
    }

    Ok(())
}

fn connect_evm_clients(settings: &Settings) -> Result<HashMap<ChainTag, EvmClient>, Error> {
    let mut clients = HashMap::new();
    for (&chain_tag, chain_config) in &settings.evm_chains {
        let EvmChainConfig { rpc_url, chain_id, vault_address, .. } = chain_config.clone();
        let client = EvmClient::connect(chain_tag, rpc_url.clone(), vault_address, chain_id)
            .with_sweeper(rpc_url, &settings.sweeper_private_key)?;
        clients.insert(chain_tag, client);
    }
    Ok(clients)
}

fn connect_btc_client(settings: &Settings) -> Result<Option<BtcClient>, Error> {
    let Some(BtcChainConfig { rpc_url, rpc_user, rpc_password, network, .. }) = settings.btc_chain.clone() else {
        return Ok(None);
    };
    let chain_tag = if network == bitcoin::Network::Bitcoin { ChainTag::Btc } else { ChainTag::BtcTest };
    Ok(Some(BtcClient::connect(chain_tag, rpc_url.as_str(), rpc_user, rpc_password, network)?))
}

type JoinHandle = tokio::task::JoinHandle<Result<(), Error>>;

fn spawn_evm_chains(context: &SignerContext<Store>, tasks: &mut Vec<JoinHandle>) {
    let settings = context.config();
    let Ok(aggregator) = SigningAggregatorClient::load(
        settings.signing_aggregator_url.clone(),
        &settings.dkg_json_path,
        &settings.dkg_name,
    ) else {
        tracing::error!("failed to load signing aggregator DKG, skipping all EVM chains");
        return;
    };
    let Ok(shield_private_key) = parse_private_key(&settings.shield_private_key) else {
        tracing::error!("invalid shield private key, skipping all EVM chains");
        return;
    };

    for (&chain_tag, chain_config) in settings.evm_chains.clone().iter() {
        let client = context.evm_client(chain_tag).expect("just connected").clone();
        let exchange = ExchangeClient::new(settings.exchange_base_url.clone());

        tasks.push(tokio::spawn(
            Observer::new(
                client.clone(),
                context.clone(),
                chain_tag,
                chain_config.batch_block_size,
                Duration::from_secs(chain_config.delay_seconds),
            )
            .run(),
        ));
        tasks.push(tokio::spawn(
            Finalizer::new(
                client,
                context.clone(),
                chain_tag,
                chain_config.finalize_block_count,
                Duration::from_secs(chain_config.delay_seconds),
            )
            .run(),
        ));
        tasks.push(tokio::spawn(
            VaultDepositor::new(
                context.clone(),
                chain_tag,
                settings.user_deposit_factory_address,
                settings.user_deposit_bytecode_hash,
                25,
                Duration::from_secs(chain_config.delay_seconds),
            )
            .run(),
        ));
        tasks.push(tokio::spawn(
            WithdrawCoordinator::new_evm(
                context.clone(),
                chain_tag,
                exchange,
                aggregator.clone(),
                shield_private_key,
                Duration::from_secs(chain_config.delay_seconds),
            )
            .run(),
        ));

        let sync_exchange = ExchangeClient::new(settings.exchange_base_url.clone());
        let address_params = bridge_core::address::evm::EvmAddressParams {
            factory: settings.user_deposit_factory_address,
            bytecode_hash: settings.user_deposit_bytecode_hash,
        };
        tasks.push(tokio::spawn(spawn_address_sync(
            context.clone(),
            sync_exchange,
            chain_tag,
            Duration::from_secs(chain_config.delay_seconds),
            move |user_id| Ok(bridge_core::address::evm::derive_evm_address(address_params, user_id).to_string()),
        )));
    }
}

/// Periodically derive and persist addresses for any user the exchange has
/// onboarded since the last sync.
async fn spawn_address_sync<Ctx>(
    context: Ctx,
    exchange: ExchangeClient,
    chain_tag: ChainTag,
    delay: Duration,
    derive: impl Fn(u64) -> Result<String, Error>,
) -> Result<(), Error>
where
    Ctx: Context,
{
    let mut term = context.get_termination_handle();
    loop {
        tokio::select! {
            _ = term.wait_for_shutdown() => {
                tracing::info!(%chain_tag, "address sync received shutdown signal");
                return Ok(());
            }
            result = sync_new_addresses(&context, &exchange, chain_tag, &derive) => {
                match result {
                    Ok(inserted) if inserted > 0 => tracing::info!(%chain_tag, inserted, "synced new exchange addresses"),
                    Ok(_) => {}
                    Err(error) => tracing::error!(%chain_tag, %error, "address sync failed"),
                }
                sleep(delay).await;
            }
        }
    }
}

fn spawn_btc_chain(context: &SignerContext<Store>, tasks: &mut Vec<JoinHandle>) {
    let settings = context.config();
    let Some(btc_config) = settings.btc_chain.clone() else { return };
    let Ok(btc_client) = context.btc_client() else { return };
    let chain_tag = btc_client.chain_tag();
    let params = bridge_core::address::btc::BtcAddressParams {
        master_pubkey: settings.btc_master_pubkey,
        network: btc_config.network,
    };

    let Ok(signer_private_key) = parse_private_key(&settings.btc_signer_private_key) else {
        tracing::error!("invalid btc signer private key, skipping the BTC chain");
        return;
    };
    let vault_address = btc_config.vault_address.clone().assume_checked();

    let exchange = ExchangeClient::new(settings.exchange_base_url.clone());

    tasks.push(tokio::spawn(
        Observer::new(
            btc_client.clone(),
            context.clone(),
            chain_tag,
            btc_config.batch_block_size,
            Duration::from_secs(btc_config.delay_seconds),
        )
        .run(),
    ));
    tasks.push(tokio::spawn(
        Finalizer::new(
            btc_client.clone(),
            context.clone(),
            chain_tag,
            btc_config.finalize_block_count,
            Duration::from_secs(btc_config.delay_seconds),
        )
        .run(),
    ));
    tasks.push(tokio::spawn(
        WithdrawCoordinator::new_btc(
            context.clone(),
            chain_tag,
            exchange,
            params,
            signer_private_key,
            vault_address,
            Duration::from_secs(btc_config.delay_seconds),
        )
        .run(),
    ));

    let sync_exchange = ExchangeClient::new(settings.exchange_base_url.clone());
    tasks.push(tokio::spawn(spawn_address_sync(
        context.clone(),
        sync_exchange,
        chain_tag,
        Duration::from_secs(btc_config.delay_seconds),
        move |user_id| {
            bridge_core::address::btc::derive_btc_address(params, user_id).map(|a| a.to_string())
        },
    )));
}

fn parse_private_key(hex_key: &str) -> Result<bitcoin::secp256k1::SecretKey, Error> {
    bitcoin::secp256k1::SecretKey::from_slice(
        &hex::decode(hex_key).map_err(|_| Error::InvalidFormat { context: "private key", value: "<redacted>".to_string() })?,
    )
    .map_err(|_| Error::InvalidFormat { context: "private key", value: "<redacted>".to_string() })
}

fn shutdown_on_signal(context: SignerContext<Store>) {
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received shutdown signal, stopping every component");
        context.shutdown();
    });
}
