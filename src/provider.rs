//! Wallet provider boundary.
//!
//! The provider is an externally owned handle (browser-injected object or an
//! SDK bridge) that holds the keys and shows the prompts. This module defines
//! the call surface the client consumes and the notifications it reacts to.
//! [`crate::connection::ConnectionManager`] exclusively owns the handle; no
//! other component touches it.

use std::fmt;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::networks::NetworkProfile;

/// Provider-level error code for a rejected prompt (EIP-1193).
pub const CODE_USER_REJECTED: i64 = 4001;
/// Provider-level error code for a chain the wallet does not know (EIP-3085).
pub const CODE_UNRECOGNIZED_CHAIN: i64 = 4902;

/// Error returned by the wallet provider, carrying its numeric code.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub code: i64,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn user_rejected() -> Self {
        Self::new(CODE_USER_REJECTED, "User rejected the request")
    }

    pub fn unrecognized_chain(chain_id: u64) -> Self {
        Self::new(
            CODE_UNRECOGNIZED_CHAIN,
            format!("Unrecognized chain ID 0x{:x}", chain_id),
        )
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code == CODE_USER_REJECTED
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.code == CODE_UNRECOGNIZED_CHAIN
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for ProviderError {}

/// Notifications pushed by the provider while a session is live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// Authorized account list changed; empty means access was revoked.
    AccountsChanged(Vec<Address>),
    /// Active chain changed. Forces a full session re-evaluation.
    ChainChanged(u64),
    /// Provider dropped the connection entirely.
    Disconnected,
}

/// Transaction request forwarded to the provider for signing + submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// Call surface of a wallet provider. Implementations wrap a concrete
/// transport (injected object, SDK socket); tests use the mock in
/// [`crate::test_support`].
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Prompt the user for account access (`eth_requestAccounts`).
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError>;

    /// Already-authorized accounts, no prompt (`eth_accounts`).
    async fn accounts(&self) -> Result<Vec<Address>, ProviderError>;

    /// Active chain id (`eth_chainId`).
    async fn chain_id(&self) -> Result<u64, ProviderError>;

    /// Ask the wallet to switch chains. Fails with code 4902 when the wallet
    /// does not know the chain.
    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError>;

    /// Register a chain with the wallet (`wallet_addEthereumChain`).
    async fn add_chain(&self, profile: &NetworkProfile) -> Result<(), ProviderError>;

    /// Register the token's display metadata (`wallet_watchAsset`).
    /// Returns whether the user accepted.
    async fn watch_asset(
        &self,
        token: Address,
        symbol: &str,
        decimals: u8,
        image: Option<&str>,
    ) -> Result<bool, ProviderError>;

    /// Sign and submit a transaction; resolves to the transaction hash.
    async fn send_transaction(&self, tx: &TxRequest) -> Result<B256, ProviderError>;

    /// Start event delivery. Single-subscriber: the returned receiver is
    /// owned by the caller, which must call [`unsubscribe`](Self::unsubscribe)
    /// when tearing down.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderEvent>;

    /// Stop event delivery. Symmetric with [`subscribe`](Self::subscribe).
    fn unsubscribe(&self);
}
