//! Quote engine: debounced, epoch-cancelled pricing.
//!
//! Every accepted request bumps a monotonic epoch. The debounce sleeper and
//! the router response both check the epoch before acting, so regardless of
//! network completion order only the latest request can publish a quote.
//! Quoting is advisory: failures degrade to an absent quote with an error
//! code on the published state, never a panic into the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy_primitives::U256;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::router::RouterQuery;
use crate::types::{Direction, Quote, QuoteState};

pub struct QuoteEngine {
    config: Arc<AppConfig>,
    router: Arc<dyn RouterQuery>,
    /// Monotonic request counter. A response is applied only while its
    /// originating value still equals this.
    epoch: AtomicU64,
    state_tx: watch::Sender<QuoteState>,
}

impl QuoteEngine {
    pub fn new(config: Arc<AppConfig>, router: Arc<dyn RouterQuery>) -> Arc<Self> {
        let (state_tx, _) = watch::channel(QuoteState::default());
        Arc::new(Self {
            config,
            router,
            epoch: AtomicU64::new(0),
            state_tx,
        })
    }

    /// Subscribe to quote state snapshots.
    pub fn subscribe(&self) -> watch::Receiver<QuoteState> {
        self.state_tx.subscribe()
    }

    /// Latest published state.
    pub fn state(&self) -> QuoteState {
        self.state_tx.borrow().clone()
    }

    pub fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Accept a quote request. Returns the epoch assigned to it. The quote
    /// (or its absence) arrives on the subscribed state channel after the
    /// debounce window; requests superseded within the window never reach
    /// the router.
    pub fn request(self: &Arc<Self>, direction: Direction, input_amount: U256) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        // Empty input clears the quote immediately; not an error.
        if input_amount.is_zero() {
            self.state_tx.send_replace(QuoteState {
                epoch,
                quote: None,
                error: None,
            });
            return epoch;
        }

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(engine.config.quote_debounce).await;
            if engine.current_epoch() != epoch {
                // Superseded inside the debounce window; nothing was sent.
                return;
            }

            let path = engine.config.path_for(direction).to_vec();
            let result = engine.router.amounts_out(input_amount, &path).await;

            if engine.current_epoch() != epoch {
                debug!("dropping quote response for stale epoch {}", epoch);
                return;
            }

            match result {
                Ok(amounts) => match amounts.last().copied() {
                    Some(output_amount) if amounts.len() >= 2 => {
                        let quote = Quote {
                            direction,
                            input_amount,
                            output_amount,
                            price_impact_percent: price_impact_percent(
                                input_amount,
                                output_amount,
                            ),
                            epoch,
                        };
                        engine.state_tx.send_replace(QuoteState {
                            epoch,
                            quote: Some(quote),
                            error: None,
                        });
                    }
                    _ => {
                        warn!("router returned short amounts array");
                        engine.publish_unavailable(epoch);
                    }
                },
                Err(e) => {
                    warn!("quote query failed: {}", e);
                    engine.publish_unavailable(epoch);
                }
            }
        });

        epoch
    }

    fn publish_unavailable(&self, epoch: u64) {
        self.state_tx.send_replace(QuoteState {
            epoch,
            quote: None,
            error: Some(crate::errors::ErrorCode::QuoteUnavailable),
        });
    }
}

/// Approximate price impact: `max(0, 100 - 100*out/in)` over raw units.
/// A simplified proxy, not a spot-price comparison; unit-inconsistent when
/// input and output decimals differ.
fn price_impact_percent(amount_in: U256, amount_out: U256) -> f64 {
    if amount_in.is_zero() {
        return 0.0;
    }
    let ratio = amount_out.saturating_mul(U256::from(100)) / amount_in;
    let ratio: u64 = ratio.min(U256::from(100)).try_into().unwrap_or(100);
    (100 - ratio) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_config, MockRouter};
    use std::time::Duration;

    fn eth(n: u64) -> U256 {
        U256::from(n) * U256::from(10u64).pow(U256::from(18))
    }

    fn engine_with(router: Arc<MockRouter>) -> Arc<QuoteEngine> {
        QuoteEngine::new(Arc::new(test_config()), router)
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_collapses_to_last_request() {
        let router = Arc::new(MockRouter::new());
        router.set_rate(300, 1);
        let engine = engine_with(router.clone());

        engine.request(Direction::Buy, eth(1));
        tokio::time::sleep(Duration::from_millis(100)).await;
        engine.request(Direction::Buy, eth(2));

        // Let the debounce window and query settle
        tokio::time::sleep(Duration::from_millis(700)).await;

        assert_eq!(router.query_count(), 1);
        let (amount_in, _) = router.last_query().expect("one query");
        assert_eq!(amount_in, eth(2));

        let state = engine.state();
        let quote = state.quote.expect("quote");
        assert_eq!(quote.input_amount, eth(2));
        assert_eq!(quote.output_amount, eth(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_response_is_discarded() {
        let router = Arc::new(MockRouter::new());
        router.set_rate(300, 1);
        // First query answers slowly, second quickly: completions arrive
        // out of order.
        router.push_delay(Duration::from_secs(10));
        router.push_delay(Duration::from_millis(10));
        let engine = engine_with(router.clone());

        engine.request(Direction::Buy, eth(1));
        // Past the debounce window so the first query is in flight
        tokio::time::sleep(Duration::from_millis(600)).await;
        let epoch2 = engine.request(Direction::Buy, eth(5));

        // Second response lands
        tokio::time::sleep(Duration::from_millis(600)).await;
        let state = engine.state();
        assert_eq!(state.epoch, epoch2);
        assert_eq!(state.quote.as_ref().unwrap().input_amount, eth(5));

        // First response lands much later and must not overwrite
        tokio::time::sleep(Duration::from_secs(15)).await;
        let state = engine.state();
        assert_eq!(state.epoch, epoch2);
        assert_eq!(state.quote.as_ref().unwrap().input_amount, eth(5));
        assert_eq!(router.query_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_input_clears_quote_without_query() {
        let router = Arc::new(MockRouter::new());
        router.set_rate(300, 1);
        let engine = engine_with(router.clone());

        engine.request(Direction::Buy, eth(1));
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(engine.state().quote.is_some());

        engine.request(Direction::Buy, U256::ZERO);
        let state = engine.state();
        assert!(state.quote.is_none());
        assert!(state.error.is_none());
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(router.query_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_router_failure_degrades_to_absent_quote() {
        let router = Arc::new(MockRouter::new());
        router.fail_next();
        let engine = engine_with(router.clone());

        engine.request(Direction::Sell, eth(1));
        tokio::time::sleep(Duration::from_millis(700)).await;

        let state = engine.state();
        assert!(state.quote.is_none());
        assert_eq!(state.error, Some(crate::errors::ErrorCode::QuoteUnavailable));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quote_epoch_matches_engine_epoch() {
        let router = Arc::new(MockRouter::new());
        router.set_rate(2, 1);
        let engine = engine_with(router.clone());

        let epoch = engine.request(Direction::Buy, eth(3));
        tokio::time::sleep(Duration::from_millis(700)).await;

        let state = engine.state();
        assert_eq!(state.epoch, epoch);
        assert_eq!(state.quote.unwrap().epoch, engine.current_epoch());
    }

    #[test]
    fn test_price_impact_heuristic() {
        // 1 in -> 300 out: ratio clips to 100, impact 0
        assert_eq!(price_impact_percent(eth(1), eth(300)), 0.0);
        // 100 in -> 97 out: 3% impact
        assert_eq!(price_impact_percent(eth(100), eth(97)), 3.0);
        // zero input guards the division
        assert_eq!(price_impact_percent(U256::ZERO, eth(1)), 0.0);
    }
}
