//! Balance polling for the connected address.
//!
//! Native and token balances are refreshed every poll interval and
//! immediately on any session change. Polling halts the moment the session
//! disconnects; a chain switch resets the balances before the first
//! re-read because token and native identities are chain-specific. Read
//! failures keep the last-known values (stale beats blank).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::connection::ConnectionManager;
use crate::errors::{WalletError, WalletResult};
use crate::networks::NetworkRegistry;
use crate::router::balanceOfCall;
use crate::rpc::RpcClient;
use crate::types::{Balances, SessionState};

/// Chain-state reads the tracker depends on.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn native_balance(&self, chain_id: u64, owner: Address) -> WalletResult<U256>;
    async fn token_balance(
        &self,
        chain_id: u64,
        token: Address,
        owner: Address,
    ) -> WalletResult<U256>;
}

/// Live implementation over per-chain RPC clients, built lazily from config
/// overrides or the registry profile.
pub struct RpcBalanceSource {
    config: Arc<AppConfig>,
    registry: Arc<NetworkRegistry>,
    clients: Mutex<HashMap<u64, Arc<RpcClient>>>,
}

impl RpcBalanceSource {
    pub fn new(config: Arc<AppConfig>, registry: Arc<NetworkRegistry>) -> Self {
        Self {
            config,
            registry,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn client_for(&self, chain_id: u64) -> WalletResult<Arc<RpcClient>> {
        let mut clients = self.clients.lock().expect("clients lock poisoned");
        if let Some(client) = clients.get(&chain_id) {
            return Ok(client.clone());
        }

        let client = if let Some(urls) = self.config.rpc_overrides.get(&chain_id) {
            RpcClient::new(
                chain_id,
                self.registry.display_name(chain_id),
                urls.clone(),
            )?
        } else {
            let profile = self
                .registry
                .profile_for(chain_id)
                .ok_or_else(|| WalletError::unsupported_chain(chain_id))?;
            RpcClient::for_profile(profile)?
        };

        let client = Arc::new(client);
        clients.insert(chain_id, client.clone());
        Ok(client)
    }
}

#[async_trait]
impl BalanceSource for RpcBalanceSource {
    async fn native_balance(&self, chain_id: u64, owner: Address) -> WalletResult<U256> {
        self.client_for(chain_id)?.get_balance(owner).await
    }

    async fn token_balance(
        &self,
        chain_id: u64,
        token: Address,
        owner: Address,
    ) -> WalletResult<U256> {
        let client = self.client_for(chain_id)?;
        let calldata = balanceOfCall { account: owner }.abi_encode();
        let ret = client.eth_call(token, &calldata).await?;
        let decoded = balanceOfCall::abi_decode_returns(&ret, true)
            .map_err(|e| WalletError::rpc_invalid_response(format!("balanceOf: {}", e)))?;
        Ok(decoded._0)
    }
}

/// Background poller publishing [`Balances`] snapshots.
pub struct BalanceTracker {
    balances_rx: watch::Receiver<Balances>,
    task: JoinHandle<()>,
}

impl BalanceTracker {
    /// Spawn the poll loop against the given session.
    pub fn spawn(
        config: Arc<AppConfig>,
        connection: &ConnectionManager,
        source: Arc<dyn BalanceSource>,
    ) -> Self {
        let (balances_tx, balances_rx) = watch::channel(Balances::default());
        let session_rx = connection.subscribe();
        let task = tokio::spawn(poll_loop(config, source, session_rx, balances_tx));
        Self { balances_rx, task }
    }

    pub fn subscribe(&self) -> watch::Receiver<Balances> {
        self.balances_rx.clone()
    }

    pub fn balances(&self) -> Balances {
        *self.balances_rx.borrow()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for BalanceTracker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn poll_loop(
    config: Arc<AppConfig>,
    source: Arc<dyn BalanceSource>,
    mut session_rx: watch::Receiver<SessionState>,
    balances_tx: watch::Sender<Balances>,
) {
    let mut last_identity: Option<(Address, u64)> = None;

    loop {
        let session = session_rx.borrow_and_update().clone();
        let SessionState::Connected {
            address, chain_id, ..
        } = session
        else {
            last_identity = None;
            balances_tx.send_replace(Balances::default());
            if session_rx.changed().await.is_err() {
                return;
            }
            continue;
        };

        // New address or chain: the old numbers describe something else.
        if last_identity != Some((address, chain_id)) {
            balances_tx.send_replace(Balances::default());
            last_identity = Some((address, chain_id));
        }

        refresh(&config, source.as_ref(), &balances_tx, address, chain_id).await;

        let mut ticker = tokio::time::interval(config.balance_poll_interval);
        ticker.tick().await; // first tick resolves immediately

        loop {
            tokio::select! {
                changed = session_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    break; // re-evaluate the session snapshot
                }
                _ = ticker.tick() => {
                    refresh(&config, source.as_ref(), &balances_tx, address, chain_id).await;
                }
            }
        }
    }
}

async fn refresh(
    config: &AppConfig,
    source: &dyn BalanceSource,
    balances_tx: &watch::Sender<Balances>,
    address: Address,
    chain_id: u64,
) {
    let mut next = *balances_tx.borrow();

    match source.native_balance(chain_id, address).await {
        Ok(native) => next.native = native,
        Err(e) => warn!("native balance read failed, keeping last value: {}", e),
    }

    // The token contract only exists on its expected chains.
    if config.is_expected_chain(chain_id) {
        match source
            .token_balance(chain_id, config.token_address, address)
            .await
        {
            Ok(token) => next.token = token,
            Err(e) => warn!("token balance read failed, keeping last value: {}", e),
        }
    } else {
        next.token = U256::ZERO;
    }

    debug!(
        "balances for {} on {}: native={} token={}",
        address, chain_id, next.native, next.token
    );
    balances_tx.send_replace(next);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderEvent, WalletProvider};
    use crate::test_support::{test_config, MockBalanceSource, MockWalletProvider};
    use crate::types::WalletKind;
    use std::time::Duration;

    async fn connected_stack() -> (
        Arc<ConnectionManager>,
        Arc<MockWalletProvider>,
        Arc<MockBalanceSource>,
        BalanceTracker,
    ) {
        let config = Arc::new(test_config());
        let registry = Arc::new(NetworkRegistry::with_defaults());
        let provider = Arc::new(MockWalletProvider::new(56));
        let connection = ConnectionManager::new(
            config.clone(),
            registry,
            vec![(
                WalletKind::Injected,
                provider.clone() as Arc<dyn WalletProvider>,
            )],
        );
        let source = Arc::new(MockBalanceSource::new(U256::from(7), U256::from(42)));
        let tracker = BalanceTracker::spawn(
            config,
            &connection,
            source.clone() as Arc<dyn BalanceSource>,
        );
        connection.connect(WalletKind::Injected).await.unwrap();
        (connection, provider, source, tracker)
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_refresh_on_connect_then_cadence() {
        let (_connection, _provider, source, tracker) = connected_stack().await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.native_reads(), 1);
        assert_eq!(tracker.balances().native, U256::from(7));
        assert_eq!(tracker.balances().token, U256::from(42));

        // Two more polls over the next minute at the 30s cadence
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(source.native_reads(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_halts_polling_within_a_tick() {
        let (connection, _provider, source, tracker) = connected_stack().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let reads_before = source.native_reads();

        connection.disconnect();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tracker.balances(), Balances::default());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(source.native_reads(), reads_before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chain_change_resets_and_rereads() {
        let (_connection, provider, source, tracker) = connected_stack().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tracker.balances().token, U256::from(42));

        // Switch to a chain outside the expected set
        provider.set_chain(1);
        provider.emit(ProviderEvent::ChainChanged(1));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Token identity is chain-specific; balance cleared, native re-read
        assert_eq!(tracker.balances().token, U256::ZERO);
        assert_eq!(tracker.balances().native, U256::from(7));
        assert!(source.native_reads() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_failure_keeps_last_known() {
        let (_connection, _provider, source, tracker) = connected_stack().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tracker.balances().native, U256::from(7));

        source.fail_reads(true);
        tokio::time::sleep(Duration::from_secs(31)).await;

        // Stale-but-available beats blanking
        assert_eq!(tracker.balances().native, U256::from(7));
        assert_eq!(tracker.balances().token, U256::from(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_aborts_polling() {
        let (_connection, _provider, source, tracker) = connected_stack().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let reads = source.native_reads();

        tracker.stop();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(source.native_reads(), reads);
    }
}
