//! Wallet session lifecycle.
//!
//! `ConnectionManager` owns the provider handles and is the only component
//! that touches them. It publishes [`SessionState`] snapshots on a watch
//! channel; address and chain id are always republished together so readers
//! never pair a stale address with a new chain.
//!
//! State machine: `Disconnected -> Connecting -> Connected{on_expected_network}`.
//! An empty account list or a provider disconnect event drops any state back
//! to `Disconnected`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use alloy_primitives::{Address, Bytes, B256, U256};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::errors::{WalletError, WalletResult};
use crate::networks::NetworkRegistry;
use crate::provider::{ProviderError, ProviderEvent, TxRequest, WalletProvider};
use crate::types::{SessionState, WalletKind};

struct ActiveConnection {
    kind: WalletKind,
    provider: Arc<dyn WalletProvider>,
    pump: JoinHandle<()>,
}

pub struct ConnectionManager {
    config: Arc<AppConfig>,
    registry: Arc<NetworkRegistry>,
    /// Provider handles available to this tab, by kind.
    providers: HashMap<WalletKind, Arc<dyn WalletProvider>>,
    session_tx: watch::Sender<SessionState>,
    active: Mutex<Option<ActiveConnection>>,
    /// Serializes connect/resume attempts.
    connect_guard: tokio::sync::Mutex<()>,
}

impl ConnectionManager {
    pub fn new(
        config: Arc<AppConfig>,
        registry: Arc<NetworkRegistry>,
        providers: Vec<(WalletKind, Arc<dyn WalletProvider>)>,
    ) -> Arc<Self> {
        let (session_tx, _) = watch::channel(SessionState::Disconnected);
        Arc::new(Self {
            config,
            registry,
            providers: providers.into_iter().collect(),
            session_tx,
            active: Mutex::new(None),
            connect_guard: tokio::sync::Mutex::new(()),
        })
    }

    /// Current session snapshot.
    pub fn session(&self) -> SessionState {
        self.session_tx.borrow().clone()
    }

    /// Subscribe to session snapshots.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.session_tx.subscribe()
    }

    /// Connect through the provider of the given kind, prompting the user
    /// for account access.
    pub async fn connect(self: &Arc<Self>, kind: WalletKind) -> WalletResult<SessionState> {
        let _guard = self.connect_guard.lock().await;

        if self.session().is_connected() {
            return Ok(self.session());
        }

        let provider = self
            .providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| {
                WalletError::provider_unavailable(format!(
                    "no {} wallet provider reachable",
                    kind.as_str()
                ))
            })?;

        self.session_tx.send_replace(SessionState::Connecting);

        let accounts = match provider.request_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                self.session_tx.send_replace(SessionState::Disconnected);
                return Err(map_connect_error(e));
            }
        };
        let Some(address) = accounts.first().copied() else {
            self.session_tx.send_replace(SessionState::Disconnected);
            return Err(WalletError::user_rejected("no accounts authorized"));
        };

        let chain_id = match provider.chain_id().await {
            Ok(id) => id,
            Err(e) => {
                self.session_tx.send_replace(SessionState::Disconnected);
                return Err(map_connect_error(e));
            }
        };

        self.adopt_session(kind, provider, address, chain_id);
        info!(
            "Wallet connected: {} on chain {} ({})",
            address,
            chain_id,
            self.registry.display_name(chain_id)
        );
        Ok(self.session())
    }

    /// Adopt an already-authorized session without prompting (the page-load
    /// probe). Absence of an authorized account is not an error.
    pub async fn resume(self: &Arc<Self>) -> WalletResult<Option<SessionState>> {
        let _guard = self.connect_guard.lock().await;

        if self.session().is_connected() {
            return Ok(Some(self.session()));
        }

        for (kind, provider) in self.providers.clone() {
            let accounts = match provider.accounts().await {
                Ok(accounts) => accounts,
                Err(e) => {
                    debug!("silent account probe failed on {}: {}", kind.as_str(), e);
                    continue;
                }
            };
            let Some(address) = accounts.first().copied() else {
                continue;
            };
            let chain_id = match provider.chain_id().await {
                Ok(id) => id,
                Err(e) => {
                    debug!("chain probe failed on {}: {}", kind.as_str(), e);
                    continue;
                }
            };
            self.adopt_session(kind, provider, address, chain_id);
            info!("Resumed existing wallet session: {}", address);
            return Ok(Some(self.session()));
        }
        Ok(None)
    }

    /// Publish a connected snapshot and start the event pump for it.
    fn adopt_session(
        self: &Arc<Self>,
        kind: WalletKind,
        provider: Arc<dyn WalletProvider>,
        address: Address,
        chain_id: u64,
    ) {
        // Tear down a previous pump if one is still around.
        self.teardown_active();

        let events = provider.subscribe();
        let pump = tokio::spawn(event_pump(Arc::downgrade(self), events));

        *self.active.lock().expect("active lock poisoned") = Some(ActiveConnection {
            kind,
            provider,
            pump,
        });

        self.session_tx.send_replace(SessionState::Connected {
            address,
            chain_id,
            wallet_kind: kind,
            on_expected_network: self.config.is_expected_chain(chain_id),
        });
    }

    /// Ask the wallet to change chains. When the wallet does not know the
    /// chain (code 4902) we follow up with exactly one add-chain request
    /// built from the registry profile. On any failure the session stays on
    /// its prior chain.
    pub async fn switch_network(&self, target_chain_id: u64) -> WalletResult<()> {
        let provider = self.active_provider().ok_or_else(|| {
            WalletError::network_switch_failed("cannot switch network while disconnected")
        })?;

        match provider.switch_chain(target_chain_id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_unrecognized_chain() => {
                let profile = self.registry.profile_for(target_chain_id).ok_or_else(|| {
                    WalletError::network_switch_failed(format!(
                        "chain {} not in the network registry",
                        target_chain_id
                    ))
                })?;
                info!(
                    "Wallet does not know chain {}, requesting add-chain for {}",
                    target_chain_id, profile.display_name
                );
                provider.add_chain(profile).await.map_err(|add_err| {
                    WalletError::with_source(
                        crate::errors::ErrorCode::NetworkSwitchFailed,
                        format!("add-chain failed for {}", target_chain_id),
                        add_err,
                    )
                })
            }
            Err(e) => Err(WalletError::with_source(
                crate::errors::ErrorCode::NetworkSwitchFailed,
                format!("switch-chain failed for {}", target_chain_id),
                e,
            )),
        }
    }

    /// Register the configured token's display metadata with the wallet.
    pub async fn register_token_asset(&self) -> WalletResult<bool> {
        let provider = self
            .active_provider()
            .ok_or_else(|| WalletError::provider_unavailable("not connected"))?;

        provider
            .watch_asset(
                self.config.token_address,
                &self.config.token.symbol,
                self.config.token.decimals,
                self.config.token.logo_url.as_deref(),
            )
            .await
            .map_err(|e| {
                if e.is_user_rejection() {
                    WalletError::user_rejected("watch-asset request rejected")
                } else {
                    WalletError::provider_unavailable(e.to_string())
                }
            })
    }

    /// Submit a transaction through the connected wallet. This is the only
    /// path to the provider's signing capability.
    pub async fn send_transaction(
        &self,
        to: Address,
        value: U256,
        data: Vec<u8>,
    ) -> WalletResult<B256> {
        let (provider, from) = {
            let session = self.session();
            let Some(from) = session.address() else {
                return Err(WalletError::provider_unavailable("not connected"));
            };
            let Some(provider) = self.active_provider() else {
                return Err(WalletError::provider_unavailable("not connected"));
            };
            (provider, from)
        };

        let tx = TxRequest {
            from,
            to,
            value,
            data: Bytes::from(data),
        };
        provider.send_transaction(&tx).await.map_err(|e| {
            if e.is_user_rejection() {
                WalletError::user_rejected("transaction rejected in wallet")
            } else {
                WalletError::with_source(
                    crate::errors::ErrorCode::TransactionFailed,
                    "provider refused transaction",
                    e,
                )
            }
        })
    }

    /// Clear the session unconditionally. Idempotent; symmetric teardown of
    /// the provider subscription.
    pub fn disconnect(&self) {
        self.teardown_active();
        if self.session_tx.send_replace(SessionState::Disconnected) != SessionState::Disconnected {
            info!("Wallet disconnected");
        }
    }

    fn teardown_active(&self) {
        let active = self.active.lock().expect("active lock poisoned").take();
        if let Some(active) = active {
            active.provider.unsubscribe();
            active.pump.abort();
        }
    }

    fn active_provider(&self) -> Option<Arc<dyn WalletProvider>> {
        self.active
            .lock()
            .expect("active lock poisoned")
            .as_ref()
            .map(|a| a.provider.clone())
    }

    fn active_kind(&self) -> Option<WalletKind> {
        self.active
            .lock()
            .expect("active lock poisoned")
            .as_ref()
            .map(|a| a.kind)
    }

    /// React to a provider notification. Chain changes trigger a full
    /// re-evaluation (accounts + chain re-read) since token and balance
    /// identities are chain-specific.
    async fn handle_provider_event(self: &Arc<Self>, event: ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(accounts) => match accounts.first().copied() {
                None => {
                    info!("Provider revoked account access");
                    self.disconnect();
                }
                Some(_) => self.reevaluate_session().await,
            },
            ProviderEvent::ChainChanged(chain_id) => {
                debug!("Provider reports chain change to {}", chain_id);
                self.reevaluate_session().await;
            }
            ProviderEvent::Disconnected => {
                info!("Provider reported disconnect");
                self.disconnect();
            }
        }
    }

    /// Re-read accounts and chain from the provider and republish one
    /// coherent snapshot.
    async fn reevaluate_session(self: &Arc<Self>) {
        let (Some(provider), Some(kind)) = (self.active_provider(), self.active_kind()) else {
            return;
        };

        let accounts = match provider.accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!("session re-evaluation failed reading accounts: {}", e);
                self.disconnect();
                return;
            }
        };
        let Some(address) = accounts.first().copied() else {
            self.disconnect();
            return;
        };
        let chain_id = match provider.chain_id().await {
            Ok(id) => id,
            Err(e) => {
                warn!("session re-evaluation failed reading chain: {}", e);
                self.disconnect();
                return;
            }
        };

        self.session_tx.send_replace(SessionState::Connected {
            address,
            chain_id,
            wallet_kind: kind,
            on_expected_network: self.config.is_expected_chain(chain_id),
        });
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let active = self.active.lock().expect("active lock poisoned").take();
        if let Some(active) = active {
            active.provider.unsubscribe();
            active.pump.abort();
        }
    }
}

async fn event_pump(
    manager: Weak<ConnectionManager>,
    mut events: tokio::sync::mpsc::UnboundedReceiver<ProviderEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(manager) = manager.upgrade() else {
            return;
        };
        manager.handle_provider_event(event).await;
    }
}

fn map_connect_error(e: ProviderError) -> WalletError {
    if e.is_user_rejection() {
        WalletError::user_rejected("user rejected the connection request")
    } else {
        WalletError::with_source(
            crate::errors::ErrorCode::ProviderUnavailable,
            "wallet provider request failed",
            e,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_config, MockWalletProvider};
    use std::time::Duration;

    fn manager_with(
        provider: Arc<MockWalletProvider>,
    ) -> (Arc<ConnectionManager>, Arc<AppConfig>) {
        let config = Arc::new(test_config());
        let registry = Arc::new(NetworkRegistry::with_defaults());
        let manager = ConnectionManager::new(
            config.clone(),
            registry,
            vec![(WalletKind::Injected, provider as Arc<dyn WalletProvider>)],
        );
        (manager, config)
    }

    #[tokio::test]
    async fn test_connect_no_provider_fails_unavailable() {
        let config = Arc::new(test_config());
        let registry = Arc::new(NetworkRegistry::with_defaults());
        let manager = ConnectionManager::new(config, registry, vec![]);

        let err = manager.connect(WalletKind::Injected).await.unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::ProviderUnavailable);
        assert_eq!(manager.session(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_user_rejection() {
        let provider = Arc::new(MockWalletProvider::new(56));
        provider.reject_account_requests();
        let (manager, _) = manager_with(provider);

        let err = manager.connect(WalletKind::Injected).await.unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::UserRejected);
        assert_eq!(manager.session(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_evaluates_network_membership() {
        let provider = Arc::new(MockWalletProvider::new(56));
        let (manager, _) = manager_with(provider.clone());

        let session = manager.connect(WalletKind::Injected).await.unwrap();
        assert!(session.is_connected());
        assert!(session.on_expected_network());
        assert!(provider.is_subscribed());

        // Unexpected chain still connects, flagged wrong-network
        manager.disconnect();
        provider.set_chain(1);
        let session = manager.connect(WalletKind::Injected).await.unwrap();
        assert!(session.is_connected());
        assert!(!session.on_expected_network());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_and_unsubscribes() {
        let provider = Arc::new(MockWalletProvider::new(56));
        let (manager, _) = manager_with(provider.clone());

        manager.connect(WalletKind::Injected).await.unwrap();
        assert!(provider.is_subscribed());

        manager.disconnect();
        assert!(!provider.is_subscribed());
        assert_eq!(manager.session(), SessionState::Disconnected);

        // Second disconnect is a no-op
        manager.disconnect();
        assert_eq!(manager.session(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_empty_accounts_event_disconnects() {
        let provider = Arc::new(MockWalletProvider::new(56));
        let (manager, _) = manager_with(provider.clone());
        manager.connect(WalletKind::Injected).await.unwrap();

        provider.emit(ProviderEvent::AccountsChanged(vec![]));
        // Let the pump run
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(manager.session(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_chain_change_reevaluates_whole_session() {
        let provider = Arc::new(MockWalletProvider::new(56));
        let (manager, _) = manager_with(provider.clone());
        manager.connect(WalletKind::Injected).await.unwrap();
        assert!(manager.session().on_expected_network());

        provider.set_chain(1);
        provider.emit(ProviderEvent::ChainChanged(1));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let session = manager.session();
        assert_eq!(session.chain_id(), Some(1));
        assert!(!session.on_expected_network());
        // Address republished together with the chain
        assert!(session.address().is_some());
    }

    #[tokio::test]
    async fn test_switch_to_unknown_chain_adds_once() {
        let provider = Arc::new(MockWalletProvider::new(56));
        let (manager, _) = manager_with(provider.clone());
        manager.connect(WalletKind::Injected).await.unwrap();

        // 97 is in the registry but not yet known to the wallet
        manager.switch_network(97).await.unwrap();
        assert_eq!(provider.switch_chain_calls(), 1);
        assert_eq!(provider.add_chain_calls(), 1);
        assert_eq!(provider.added_chains(), vec![97]);
    }

    #[tokio::test]
    async fn test_switch_to_unregistered_chain_fails() {
        let provider = Arc::new(MockWalletProvider::new(56));
        let (manager, _) = manager_with(provider.clone());
        manager.connect(WalletKind::Injected).await.unwrap();

        let err = manager.switch_network(4242).await.unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::NetworkSwitchFailed);
        // Session untouched
        assert_eq!(manager.session().chain_id(), Some(56));
    }

    #[tokio::test]
    async fn test_resume_without_authorization_stays_disconnected() {
        let provider = Arc::new(MockWalletProvider::new(56));
        provider.clear_accounts();
        let (manager, _) = manager_with(provider.clone());

        let resumed = manager.resume().await.unwrap();
        assert!(resumed.is_none());
        assert_eq!(manager.session(), SessionState::Disconnected);
        assert_eq!(provider.request_account_prompts(), 0);
    }

    #[tokio::test]
    async fn test_resume_adopts_authorized_session() {
        let provider = Arc::new(MockWalletProvider::new(56));
        let (manager, _) = manager_with(provider.clone());

        let resumed = manager.resume().await.unwrap().expect("session");
        assert!(resumed.is_connected());
        assert_eq!(provider.request_account_prompts(), 0);
    }

    #[tokio::test]
    async fn test_register_token_asset_needs_connection() {
        let provider = Arc::new(MockWalletProvider::new(56));
        let (manager, _) = manager_with(provider);

        let err = manager.register_token_asset().await.unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::ProviderUnavailable);

        manager.connect(WalletKind::Injected).await.unwrap();
        assert!(manager.register_token_asset().await.unwrap());
    }
}
