//! Swap execution: allowance check, approval, submission, confirmation.
//!
//! One attempt walks `Idle -> Quoting -> Ready -> (Approving) -> Submitting
//! -> Pending -> Confirmed | Failed`, published on a watch channel for the
//! presentation layer. Approval and swap are strictly sequential; the swap
//! is never submitted until the approval's effect is committed on-chain.
//! A failed attempt leaves the wallet session untouched; only the
//! transaction log reflects the outcome.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy_primitives::{Address, B256, U256};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::connection::ConnectionManager;
use crate::errors::{ErrorCode, WalletError, WalletResult};
use crate::quote::QuoteEngine;
use crate::router::{
    approve_calldata, swap_native_for_tokens_calldata, swap_tokens_for_native_calldata,
    swap_tokens_for_tokens_calldata, RouterQuery,
};
use crate::types::{
    min_output, Direction, Quote, SwapRequest, TransactionRecord, TxKind, TxStatus,
};

/// How often to poll for a receipt while a transaction is pending.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Extra slack past the on-chain deadline before giving up on a receipt.
const CONFIRMATION_SLACK: Duration = Duration::from_secs(60);

/// Terminal receipt outcome for a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfirmOutcome {
    Confirmed,
    Reverted,
    TimedOut,
}

/// Phase of the current swap attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SwapPhase {
    Idle,
    Quoting,
    Ready,
    Approving,
    Submitting,
    Pending,
    Confirmed,
    Failed,
}

pub struct SwapExecutor {
    config: Arc<AppConfig>,
    connection: Arc<ConnectionManager>,
    quotes: Arc<QuoteEngine>,
    router: Arc<dyn RouterQuery>,
    phase_tx: watch::Sender<SwapPhase>,
    /// Session-scoped transaction log, newest last. Never persisted.
    records: Mutex<Vec<TransactionRecord>>,
}

impl SwapExecutor {
    pub fn new(
        config: Arc<AppConfig>,
        connection: Arc<ConnectionManager>,
        quotes: Arc<QuoteEngine>,
        router: Arc<dyn RouterQuery>,
    ) -> Self {
        let (phase_tx, _) = watch::channel(SwapPhase::Idle);
        Self {
            config,
            connection,
            quotes,
            router,
            phase_tx,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SwapPhase> {
        self.phase_tx.subscribe()
    }

    pub fn phase(&self) -> SwapPhase {
        *self.phase_tx.borrow()
    }

    /// Transactions submitted during this session, newest last.
    pub fn transactions(&self) -> Vec<TransactionRecord> {
        self.records.lock().expect("records lock poisoned").clone()
    }

    /// Execute a swap against the latest valid quote.
    pub async fn execute(&self, request: &SwapRequest) -> WalletResult<TransactionRecord> {
        match self.run_attempt(request).await {
            Ok(record) => {
                self.phase_tx.send_replace(SwapPhase::Confirmed);
                Ok(record)
            }
            Err(e) => {
                self.phase_tx.send_replace(SwapPhase::Failed);
                Err(e)
            }
        }
    }

    async fn run_attempt(&self, request: &SwapRequest) -> WalletResult<TransactionRecord> {
        self.phase_tx.send_replace(SwapPhase::Quoting);
        let quote = self.live_quote(request)?;

        self.phase_tx.send_replace(SwapPhase::Ready);
        let amount_out_min = min_output(quote.output_amount, request.slippage_bps());

        let session = self.connection.session();
        let Some(recipient) = session.address() else {
            return Err(WalletError::provider_unavailable(
                "cannot swap while disconnected",
            ));
        };

        let path = self.config.path_for(request.direction).to_vec();
        let spends_token = !self.native_entry(request.direction, &path);

        // Spending the token requires router allowance before the swap.
        // Strict prerequisite: await the approval's confirmation first.
        if spends_token {
            self.ensure_allowance(path[0], recipient, request.input_amount)
                .await?;
        }

        // Deadline is relative to submission, never quote time.
        let deadline = U256::from(unix_now() + self.config.deadline_window.as_secs());

        self.phase_tx.send_replace(SwapPhase::Submitting);
        let (value, calldata) = self.build_swap(request, amount_out_min, &path, recipient, deadline);
        let hash = self
            .connection
            .send_transaction(self.config.router_address, value, calldata)
            .await
            .map_err(|e| match e.code {
                ErrorCode::UserRejected => e,
                _ => WalletError::new(ErrorCode::TransactionFailed, e.to_string()),
            })?;

        let action = match request.direction {
            Direction::Buy => format!("Bought {}", self.config.token.symbol),
            Direction::Sell => format!("Sold {}", self.config.token.symbol),
        };
        self.push_record(TransactionRecord::pending(hash, TxKind::Swap, action));
        info!("swap submitted: 0x{}", hex::encode(hash));

        self.phase_tx.send_replace(SwapPhase::Pending);
        match self.await_confirmation(hash, deadline).await {
            ConfirmOutcome::Confirmed => {
                self.set_record_status(hash, TxStatus::Confirmed);
                Ok(self.record_for(hash).expect("record just pushed"))
            }
            ConfirmOutcome::Reverted => {
                self.set_record_status(hash, TxStatus::Failed);
                // A reverted swap is almost always the output floor
                Err(WalletError::slippage_exceeded(format!(
                    "swap 0x{} reverted (minimum output not met)",
                    hex::encode(hash)
                )))
            }
            ConfirmOutcome::TimedOut => {
                self.set_record_status(hash, TxStatus::Failed);
                Err(WalletError::transaction_failed(format!(
                    "swap 0x{} not confirmed before deadline",
                    hex::encode(hash)
                )))
            }
        }
    }

    /// The current quote, validated against the engine's epoch and this
    /// request's parameters.
    fn live_quote(&self, request: &SwapRequest) -> WalletResult<Quote> {
        let state = self.quotes.state();
        let Some(quote) = state.quote else {
            return Err(WalletError::quote_stale("no quote available"));
        };
        if quote.epoch != self.quotes.current_epoch() {
            return Err(WalletError::quote_stale(format!(
                "quote epoch {} superseded by {}",
                quote.epoch,
                self.quotes.current_epoch()
            )));
        }
        if quote.direction != request.direction || quote.input_amount != request.input_amount {
            return Err(WalletError::quote_stale(
                "quote does not match the requested swap",
            ));
        }
        Ok(quote)
    }

    /// Whether this swap enters the router on the native side (payable call).
    fn native_entry(&self, direction: Direction, path: &[Address]) -> bool {
        direction == Direction::Buy && path.first() == Some(&self.config.wrapped_native)
    }

    /// Whether this swap exits on the native side.
    fn native_exit(&self, direction: Direction, path: &[Address]) -> bool {
        direction == Direction::Sell && path.last() == Some(&self.config.wrapped_native)
    }

    /// Check the router's allowance over `token` and, when short, submit an
    /// approval and await its confirmation.
    async fn ensure_allowance(
        &self,
        token: Address,
        owner: Address,
        amount: U256,
    ) -> WalletResult<()> {
        let allowance = self
            .router
            .allowance(token, owner)
            .await
            .map_err(|e| WalletError::new(ErrorCode::ApprovalFailed, e.to_string()))?;
        if allowance >= amount {
            return Ok(());
        }

        self.phase_tx.send_replace(SwapPhase::Approving);
        info!(
            "allowance {} below swap amount {}, requesting approval",
            allowance, amount
        );

        let calldata = approve_calldata(self.config.router_address, amount);
        let hash = self
            .connection
            .send_transaction(token, U256::ZERO, calldata)
            .await
            .map_err(|e| match e.code {
                ErrorCode::UserRejected => e,
                _ => WalletError::new(ErrorCode::ApprovalFailed, e.to_string()),
            })?;

        self.push_record(TransactionRecord::pending(
            hash,
            TxKind::Approve,
            format!("Approved {}", self.config.token.symbol),
        ));

        let deadline = U256::from(unix_now() + self.config.deadline_window.as_secs());
        match self.await_confirmation(hash, deadline).await {
            ConfirmOutcome::Confirmed => {
                self.set_record_status(hash, TxStatus::Confirmed);
                Ok(())
            }
            outcome => {
                self.set_record_status(hash, TxStatus::Failed);
                Err(WalletError::approval_failed(format!(
                    "approval 0x{} {}",
                    hex::encode(hash),
                    match outcome {
                        ConfirmOutcome::Reverted => "reverted",
                        _ => "not confirmed before deadline",
                    }
                )))
            }
        }
    }

    fn build_swap(
        &self,
        request: &SwapRequest,
        amount_out_min: U256,
        path: &[Address],
        recipient: Address,
        deadline: U256,
    ) -> (U256, Vec<u8>) {
        if self.native_entry(request.direction, path) {
            (
                request.input_amount,
                swap_native_for_tokens_calldata(amount_out_min, path, recipient, deadline),
            )
        } else if self.native_exit(request.direction, path) {
            (
                U256::ZERO,
                swap_tokens_for_native_calldata(
                    request.input_amount,
                    amount_out_min,
                    path,
                    recipient,
                    deadline,
                ),
            )
        } else {
            (
                U256::ZERO,
                swap_tokens_for_tokens_calldata(
                    request.input_amount,
                    amount_out_min,
                    path,
                    recipient,
                    deadline,
                ),
            )
        }
    }

    /// Poll for the receipt until it lands or the on-chain deadline (plus
    /// slack) has passed. The deadline parameter is the sole timeout; read
    /// failures just keep polling.
    async fn await_confirmation(&self, hash: B256, deadline: U256) -> ConfirmOutcome {
        let deadline_secs: u64 = deadline.try_into().unwrap_or(u64::MAX);
        let give_up_at = deadline_secs.saturating_add(CONFIRMATION_SLACK.as_secs());
        loop {
            match self.router.receipt_status(hash).await {
                Ok(Some(true)) => return ConfirmOutcome::Confirmed,
                Ok(Some(false)) => return ConfirmOutcome::Reverted,
                Ok(None) => {}
                Err(e) => {
                    warn!("receipt poll failed, will retry: {}", e);
                }
            }
            if unix_now() > give_up_at {
                return ConfirmOutcome::TimedOut;
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }

    fn push_record(&self, record: TransactionRecord) {
        self.records
            .lock()
            .expect("records lock poisoned")
            .push(record);
    }

    fn set_record_status(&self, hash: B256, status: TxStatus) {
        let mut records = self.records.lock().expect("records lock poisoned");
        if let Some(record) = records.iter_mut().rev().find(|r| r.hash == hash) {
            record.status = status;
        }
    }

    fn record_for(&self, hash: B256) -> Option<TransactionRecord> {
        self.records
            .lock()
            .expect("records lock poisoned")
            .iter()
            .rev()
            .find(|r| r.hash == hash)
            .cloned()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
