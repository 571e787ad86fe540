//! Deterministic fakes for the provider and chain boundaries.
//! Shared by the per-module unit tests and the integration suite.

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::{AppConfig, TokenMetadata};
use crate::errors::{WalletError, WalletResult};
use crate::networks::NetworkProfile;
use crate::provider::{ProviderError, ProviderEvent, TxRequest, WalletProvider};
use crate::router::RouterQuery;

/// Config fixture matching the built-in deployment defaults.
pub fn test_config() -> AppConfig {
    AppConfig::new(
        Address::from_str("0xf5c470025e99f97a4CA6416c77a685db929e929b").unwrap(),
        TokenMetadata {
            symbol: "USDOX".to_string(),
            decimals: 18,
            logo_url: None,
        },
        Address::from_str("0x10ED43C718714eb63d5aA57B78B54704E256024E").unwrap(),
        Address::from_str("0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c").unwrap(),
        vec![56, 97],
    )
}

/// Scripted wallet provider. One authorized account on a settable chain;
/// prompts and chain switches can be told to fail.
pub struct MockWalletProvider {
    accounts: Mutex<Vec<Address>>,
    chain: AtomicU64,
    known_chains: Mutex<Vec<u64>>,
    added_chains: Mutex<Vec<u64>>,
    reject_accounts: AtomicBool,
    reject_transactions: AtomicBool,
    request_prompts: AtomicUsize,
    switch_calls: AtomicUsize,
    add_calls: AtomicUsize,
    sent: Mutex<Vec<TxRequest>>,
    sent_hashes: Mutex<Vec<B256>>,
    next_hash: AtomicU64,
    events: Mutex<Option<mpsc::UnboundedSender<ProviderEvent>>>,
}

impl MockWalletProvider {
    pub fn new(chain_id: u64) -> Self {
        Self {
            accounts: Mutex::new(vec![Address::from_str(
                "0x4969DB5E17a1eE30b3AabC1b5e65aE5D92D0dDC4",
            )
            .unwrap()]),
            chain: AtomicU64::new(chain_id),
            known_chains: Mutex::new(vec![chain_id]),
            added_chains: Mutex::new(Vec::new()),
            reject_accounts: AtomicBool::new(false),
            reject_transactions: AtomicBool::new(false),
            request_prompts: AtomicUsize::new(0),
            switch_calls: AtomicUsize::new(0),
            add_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            sent_hashes: Mutex::new(Vec::new()),
            next_hash: AtomicU64::new(1),
            events: Mutex::new(None),
        }
    }

    pub fn set_chain(&self, chain_id: u64) {
        self.chain.store(chain_id, Ordering::SeqCst);
        let mut known = self.known_chains.lock().unwrap();
        if !known.contains(&chain_id) {
            known.push(chain_id);
        }
    }

    pub fn clear_accounts(&self) {
        self.accounts.lock().unwrap().clear();
    }

    pub fn reject_account_requests(&self) {
        self.reject_accounts.store(true, Ordering::SeqCst);
    }

    pub fn reject_transactions(&self) {
        self.reject_transactions.store(true, Ordering::SeqCst);
    }

    /// Push a provider notification to the subscriber, if any.
    pub fn emit(&self, event: ProviderEvent) {
        if let Some(tx) = self.events.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.events.lock().unwrap().is_some()
    }

    pub fn request_account_prompts(&self) -> usize {
        self.request_prompts.load(Ordering::SeqCst)
    }

    pub fn switch_chain_calls(&self) -> usize {
        self.switch_calls.load(Ordering::SeqCst)
    }

    pub fn add_chain_calls(&self) -> usize {
        self.add_calls.load(Ordering::SeqCst)
    }

    pub fn added_chains(&self) -> Vec<u64> {
        self.added_chains.lock().unwrap().clone()
    }

    pub fn sent_transactions(&self) -> Vec<TxRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_hashes(&self) -> Vec<B256> {
        self.sent_hashes.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletProvider for MockWalletProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.request_prompts.fetch_add(1, Ordering::SeqCst);
        if self.reject_accounts.load(Ordering::SeqCst) {
            return Err(ProviderError::user_rejected());
        }
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        Ok(self.chain.load(Ordering::SeqCst))
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError> {
        self.switch_calls.fetch_add(1, Ordering::SeqCst);
        if !self.known_chains.lock().unwrap().contains(&chain_id) {
            return Err(ProviderError::unrecognized_chain(chain_id));
        }
        self.chain.store(chain_id, Ordering::SeqCst);
        self.emit(ProviderEvent::ChainChanged(chain_id));
        Ok(())
    }

    async fn add_chain(&self, profile: &NetworkProfile) -> Result<(), ProviderError> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        self.added_chains.lock().unwrap().push(profile.chain_id);
        self.known_chains.lock().unwrap().push(profile.chain_id);
        // Wallets switch to a chain right after adding it
        self.chain.store(profile.chain_id, Ordering::SeqCst);
        self.emit(ProviderEvent::ChainChanged(profile.chain_id));
        Ok(())
    }

    async fn watch_asset(
        &self,
        _token: Address,
        _symbol: &str,
        _decimals: u8,
        _image: Option<&str>,
    ) -> Result<bool, ProviderError> {
        Ok(true)
    }

    async fn send_transaction(&self, tx: &TxRequest) -> Result<B256, ProviderError> {
        if self.reject_transactions.load(Ordering::SeqCst) {
            return Err(ProviderError::user_rejected());
        }
        let n = self.next_hash.fetch_add(1, Ordering::SeqCst);
        let hash = B256::from(U256::from(n).to_be_bytes());
        self.sent.lock().unwrap().push(tx.clone());
        self.sent_hashes.lock().unwrap().push(hash);
        Ok(hash)
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.events.lock().unwrap() = Some(tx);
        rx
    }

    fn unsubscribe(&self) {
        *self.events.lock().unwrap() = None;
    }
}

/// Scripted router. Prices with a fixed numerator/denominator rate,
/// optionally delaying or failing queries; receipts confirm immediately
/// unless told to revert.
pub struct MockRouter {
    rate_numer: AtomicU64,
    rate_denom: AtomicU64,
    fail_next: AtomicBool,
    delays: Mutex<VecDeque<Duration>>,
    query_count: AtomicUsize,
    last_query: Mutex<Option<(U256, Vec<Address>)>>,
    allowance: Mutex<U256>,
    revert_next_receipt: AtomicBool,
    receipt_polls: Mutex<Vec<B256>>,
}

impl MockRouter {
    pub fn new() -> Self {
        Self {
            rate_numer: AtomicU64::new(1),
            rate_denom: AtomicU64::new(1),
            fail_next: AtomicBool::new(false),
            delays: Mutex::new(VecDeque::new()),
            query_count: AtomicUsize::new(0),
            last_query: Mutex::new(None),
            allowance: Mutex::new(U256::ZERO),
            revert_next_receipt: AtomicBool::new(false),
            receipt_polls: Mutex::new(Vec::new()),
        }
    }

    /// Output = input * numer / denom.
    pub fn set_rate(&self, numer: u64, denom: u64) {
        self.rate_numer.store(numer, Ordering::SeqCst);
        self.rate_denom.store(denom, Ordering::SeqCst);
    }

    /// Fail the next quote query with a transport error.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Queue a response delay; each queued delay applies to one query in
    /// FIFO order, later queries answer immediately.
    pub fn push_delay(&self, delay: Duration) {
        self.delays.lock().unwrap().push_back(delay);
    }

    pub fn set_allowance(&self, amount: U256) {
        *self.allowance.lock().unwrap() = amount;
    }

    /// The next polled receipt reports a revert.
    pub fn revert_next_receipt(&self) {
        self.revert_next_receipt.store(true, Ordering::SeqCst);
    }

    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<(U256, Vec<Address>)> {
        self.last_query.lock().unwrap().clone()
    }

    pub fn receipt_polls_for(&self, hash: B256) -> usize {
        self.receipt_polls
            .lock()
            .unwrap()
            .iter()
            .filter(|h| **h == hash)
            .count()
    }
}

impl Default for MockRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RouterQuery for MockRouter {
    async fn amounts_out(&self, amount_in: U256, path: &[Address]) -> WalletResult<Vec<U256>> {
        let delay = self.delays.lock().unwrap().pop_front();
        self.query_count.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().unwrap() = Some((amount_in, path.to_vec()));

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(WalletError::rpc_unreachable("mock router offline"));
        }

        let numer = U256::from(self.rate_numer.load(Ordering::SeqCst));
        let denom = U256::from(self.rate_denom.load(Ordering::SeqCst));
        let out = amount_in.saturating_mul(numer) / denom;
        Ok(vec![amount_in, out])
    }

    async fn allowance(&self, _token: Address, _owner: Address) -> WalletResult<U256> {
        Ok(*self.allowance.lock().unwrap())
    }

    async fn receipt_status(&self, hash: B256) -> WalletResult<Option<bool>> {
        self.receipt_polls.lock().unwrap().push(hash);
        if self.revert_next_receipt.swap(false, Ordering::SeqCst) {
            return Ok(Some(false));
        }
        Ok(Some(true))
    }
}

/// Fixed-value balance source with failure injection and read counters.
pub struct MockBalanceSource {
    native: Mutex<U256>,
    token: Mutex<U256>,
    fail: AtomicBool,
    native_reads: AtomicUsize,
    token_reads: AtomicUsize,
}

impl MockBalanceSource {
    pub fn new(native: U256, token: U256) -> Self {
        Self {
            native: Mutex::new(native),
            token: Mutex::new(token),
            fail: AtomicBool::new(false),
            native_reads: AtomicUsize::new(0),
            token_reads: AtomicUsize::new(0),
        }
    }

    pub fn set_native(&self, amount: U256) {
        *self.native.lock().unwrap() = amount;
    }

    pub fn set_token(&self, amount: U256) {
        *self.token.lock().unwrap() = amount;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn native_reads(&self) -> usize {
        self.native_reads.load(Ordering::SeqCst)
    }

    pub fn token_reads(&self) -> usize {
        self.token_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl crate::balance::BalanceSource for MockBalanceSource {
    async fn native_balance(&self, _chain_id: u64, _owner: Address) -> WalletResult<U256> {
        self.native_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(WalletError::rpc_unreachable("mock RPC offline"));
        }
        Ok(*self.native.lock().unwrap())
    }

    async fn token_balance(
        &self,
        _chain_id: u64,
        _token: Address,
        _owner: Address,
    ) -> WalletResult<U256> {
        self.token_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(WalletError::rpc_unreachable("mock RPC offline"));
        }
        Ok(*self.token.lock().unwrap())
    }
}
