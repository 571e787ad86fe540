//! Quote probe - fetch a single router quote from the command line.
//!
//! Reads the same configuration the DApp core uses, asks the router for the
//! expected output of 1 native unit, and prints the result. Useful for
//! checking RPC endpoints and the configured path without a wallet.

use std::sync::Arc;

use alloy_primitives::U256;
use dexlink::{AppConfig, Direction, NetworkRegistry, RouterClient, RouterQuery, RpcClient};
use eyre::{eyre, Result};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .compact()
        .init();

    let config = AppConfig::from_env().map_err(|e| eyre!("configuration error: {}", e))?;
    let registry = NetworkRegistry::with_defaults();

    let chain_id = config.primary_chain_id();
    let profile = registry
        .profile_for(chain_id)
        .ok_or_else(|| eyre!("chain {} is not in the network registry", chain_id))?;
    info!(
        "Quoting on {} via router {}",
        profile.display_name, config.router_address
    );

    let urls = config
        .rpc_overrides
        .get(&chain_id)
        .cloned()
        .unwrap_or_else(|| profile.rpc_urls.clone());
    let rpc = Arc::new(
        RpcClient::new(chain_id, &profile.display_name, urls)
            .map_err(|e| eyre!("RPC setup failed: {}", e))?,
    );
    let router = RouterClient::new(rpc, config.router_address);

    let one_native = U256::from(10u64).pow(U256::from(18));
    let amounts = router
        .amounts_out(one_native, config.path_for(Direction::Buy))
        .await
        .map_err(|e| eyre!("quote failed: {}", e))?;

    let out = amounts.last().copied().unwrap_or_default();
    info!(
        "1 {} -> {} {} (raw {})",
        profile.native_currency.symbol,
        dexlink::types::wei_to_native(out),
        config.token.symbol,
        out
    );

    Ok(())
}
