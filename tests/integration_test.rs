//! Integration tests over the public API, driving the whole stack
//! (connection, quoting, swap execution, balance tracking) against the
//! deterministic provider and router fakes.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::U256;
use dexlink::test_support::{test_config, MockBalanceSource, MockRouter, MockWalletProvider};
use dexlink::{
    BalanceSource, BalanceTracker, ConnectionManager, Direction, ErrorCode, NetworkRegistry,
    ProviderEvent, QuoteEngine, SessionState, SwapExecutor, SwapRequest, TxKind, TxStatus,
    WalletKind, WalletProvider,
};

struct Stack {
    provider: Arc<MockWalletProvider>,
    router: Arc<MockRouter>,
    connection: Arc<ConnectionManager>,
    quotes: Arc<QuoteEngine>,
    executor: SwapExecutor,
    balances: BalanceTracker,
    source: Arc<MockBalanceSource>,
}

fn eth(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18))
}

fn build_stack() -> Stack {
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

    let router = Arc::new(MockRouter::new());
    let quotes = QuoteEngine::new(config.clone(), router.clone());
    let executor = SwapExecutor::new(
        config.clone(),
        connection.clone(),
        quotes.clone(),
        router.clone(),
    );

    let source = Arc::new(MockBalanceSource::new(eth(10), U256::ZERO));
    let balances = BalanceTracker::spawn(
        config,
        &connection,
        source.clone() as Arc<dyn BalanceSource>,
    );

    Stack {
        provider,
        router,
        connection,
        quotes,
        executor,
        balances,
        source,
    }
}

#[tokio::test(start_paused = true)]
async fn test_buy_flow_end_to_end() {
    let stack = build_stack();
    // Router prices 1 native -> 300 tokens
    stack.router.set_rate(300, 1);

    stack.connection.connect(WalletKind::Injected).await.unwrap();
    assert!(stack.connection.session().on_expected_network());

    stack.quotes.request(Direction::Buy, eth(1));
    tokio::time::sleep(Duration::from_millis(700)).await;

    let state = stack.quotes.state();
    let quote = state.quote.clone().expect("quote should be live");
    assert_eq!(quote.output_amount, eth(300));
    // out/in ratio is above 1, so the heuristic clips to zero
    assert_eq!(quote.price_impact_percent, 0.0);

    let request = SwapRequest::new(Direction::Buy, eth(1), 0.5).unwrap();
    let record = stack.executor.execute(&request).await.unwrap();
    assert_eq!(record.kind, TxKind::Swap);
    assert_eq!(record.status, TxStatus::Confirmed);

    // minOutput = 300 * 0.995 = 298.5, encoded as the swap's first argument
    let sent = stack.provider.sent_transactions();
    assert_eq!(sent.len(), 1, "buy needs no approval");
    let encoded_min = U256::from_be_slice(&sent[0].data[4..36]);
    assert_eq!(encoded_min, U256::from(298_500_000_000_000_000_000u128));

    // Balance tracker keeps running on its cadence after the swap
    stack.source.set_native(eth(9));
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(stack.balances.balances().native, eth(9));
}

#[tokio::test(start_paused = true)]
async fn test_sell_flow_approves_then_swaps() {
    let stack = build_stack();
    stack.router.set_rate(1, 300);
    stack.router.set_allowance(U256::ZERO);
    stack.connection.connect(WalletKind::Injected).await.unwrap();

    stack.quotes.request(Direction::Sell, eth(50));
    tokio::time::sleep(Duration::from_millis(700)).await;

    let request = SwapRequest::new(Direction::Sell, eth(50), 1.0).unwrap();
    let record = stack.executor.execute(&request).await.unwrap();
    assert_eq!(record.status, TxStatus::Confirmed);

    // Strictly sequential: approval to the token first, then the swap to
    // the router, with the approval confirmed in between.
    let sent = stack.provider.sent_transactions();
    assert_eq!(sent.len(), 2);
    let log = stack.executor.transactions();
    assert_eq!(log[0].kind, TxKind::Approve);
    assert_eq!(log[0].status, TxStatus::Confirmed);
    assert_eq!(log[1].kind, TxKind::Swap);
    assert_eq!(log[1].status, TxStatus::Confirmed);
}

#[tokio::test(start_paused = true)]
async fn test_debounced_quoting_sends_last_amount_only() {
    let stack = build_stack();
    stack.router.set_rate(300, 1);
    stack.connection.connect(WalletKind::Injected).await.unwrap();

    stack.quotes.request(Direction::Buy, eth(1));
    tokio::time::sleep(Duration::from_millis(200)).await;
    stack.quotes.request(Direction::Buy, eth(2));
    tokio::time::sleep(Duration::from_millis(700)).await;

    assert_eq!(stack.router.query_count(), 1, "window collapses to one query");
    let (amount_in, path) = stack.router.last_query().unwrap();
    assert_eq!(amount_in, eth(2));
    assert_eq!(path.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_quote_epoch_guard_blocks_mid_flight_execution() {
    let stack = build_stack();
    stack.router.set_rate(300, 1);
    stack.connection.connect(WalletKind::Injected).await.unwrap();

    stack.quotes.request(Direction::Buy, eth(1));
    tokio::time::sleep(Duration::from_millis(700)).await;
    // Amount changed after the quote landed
    stack.quotes.request(Direction::Buy, eth(3));

    let request = SwapRequest::new(Direction::Buy, eth(1), 0.5).unwrap();
    let err = stack.executor.execute(&request).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::QuoteStale);
    assert!(stack.provider.sent_transactions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connect_without_provider_fails() {
    let config = Arc::new(test_config());
    let registry = Arc::new(NetworkRegistry::with_defaults());
    let connection = ConnectionManager::new(config, registry, vec![]);

    let err = connection.connect(WalletKind::Injected).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ProviderUnavailable);
    assert_eq!(connection.session(), SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_switch_to_unknown_chain_issues_single_add_chain() {
    let stack = build_stack();
    stack.connection.connect(WalletKind::Injected).await.unwrap();

    stack.connection.switch_network(97).await.unwrap();
    assert_eq!(stack.provider.switch_chain_calls(), 1);
    assert_eq!(stack.provider.add_chain_calls(), 1);
    assert_eq!(stack.provider.added_chains(), vec![97]);

    // The wallet's chain-changed notification re-evaluates the session
    tokio::time::sleep(Duration::from_millis(50)).await;
    let session = stack.connection.session();
    assert_eq!(session.chain_id(), Some(97));
    assert!(session.on_expected_network());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_stops_balance_polling() {
    let stack = build_stack();
    stack.connection.connect(WalletKind::Injected).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(stack.source.native_reads() >= 1);

    stack.connection.disconnect();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let reads_at_disconnect = stack.source.native_reads();

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(
        stack.source.native_reads(),
        reads_at_disconnect,
        "no balance reads after disconnect"
    );
}

#[tokio::test(start_paused = true)]
async fn test_account_revocation_tears_down_session() {
    let stack = build_stack();
    stack.connection.connect(WalletKind::Injected).await.unwrap();
    assert!(stack.provider.is_subscribed());

    stack.provider.emit(ProviderEvent::AccountsChanged(vec![]));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(stack.connection.session(), SessionState::Disconnected);
    assert!(!stack.provider.is_subscribed(), "subscription torn down");
}

#[tokio::test(start_paused = true)]
async fn test_failed_swap_leaves_session_intact() {
    let stack = build_stack();
    stack.router.set_rate(300, 1);
    stack.connection.connect(WalletKind::Injected).await.unwrap();
    let session_before = stack.connection.session();

    stack.quotes.request(Direction::Buy, eth(1));
    tokio::time::sleep(Duration::from_millis(700)).await;
    stack.router.revert_next_receipt();

    let request = SwapRequest::new(Direction::Buy, eth(1), 0.1).unwrap();
    let err = stack.executor.execute(&request).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::SlippageExceeded);

    // The session is untouched; only the transaction log shows the failure
    assert_eq!(stack.connection.session(), session_before);
    let log = stack.executor.transactions();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].status, TxStatus::Failed);
}
