//! Core data structures for the swap client.
//! Everything the presentation layer renders is defined here.

use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::{ErrorCode, WalletError, WalletResult};

/// Basis points per whole unit (100%).
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Swap direction relative to the configured token.
/// `Buy` spends the native asset for the token, `Sell` the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        }
    }
}

/// How the wallet provider handle was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WalletKind {
    /// Browser-injected provider object.
    Injected,
    /// Out-of-process provider reached through an SDK bridge.
    SdkBridge,
}

impl WalletKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletKind::Injected => "injected",
            WalletKind::SdkBridge => "sdk-bridge",
        }
    }
}

/// Published snapshot of the wallet session. Address and chain id are always
/// written together; readers never observe a stale address on a new chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected {
        address: Address,
        chain_id: u64,
        wallet_kind: WalletKind,
        on_expected_network: bool,
    },
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected { .. })
    }

    pub fn address(&self) -> Option<Address> {
        match self {
            SessionState::Connected { address, .. } => Some(*address),
            _ => None,
        }
    }

    pub fn chain_id(&self) -> Option<u64> {
        match self {
            SessionState::Connected { chain_id, .. } => Some(*chain_id),
            _ => None,
        }
    }

    pub fn on_expected_network(&self) -> bool {
        matches!(
            self,
            SessionState::Connected {
                on_expected_network: true,
                ..
            }
        )
    }
}

/// A priced swap preview issued by the quote engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub direction: Direction,
    /// Input amount in the input asset's smallest unit.
    pub input_amount: U256,
    /// Expected output in the output asset's smallest unit.
    pub output_amount: U256,
    /// Approximate impact as `max(0, 100 - 100*out/in)` over raw units.
    /// Not a spot-price comparison; treat as a rough indicator only.
    pub price_impact_percent: f64,
    /// Engine epoch at issue time. Actionable only while it matches the
    /// engine's current epoch.
    pub epoch: u64,
}

/// Last-value quote state published to subscribers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QuoteState {
    /// Epoch of the request this state answers.
    pub epoch: u64,
    /// The quote, or absent when input was empty or the query failed.
    pub quote: Option<Quote>,
    /// Set when the router query failed; quoting degrades, never throws.
    pub error: Option<ErrorCode>,
}

/// A validated swap order. Construction enforces the amount and slippage
/// bounds so the executor can assume them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SwapRequest {
    pub direction: Direction,
    pub input_amount: U256,
    pub slippage_tolerance_percent: f64,
}

impl SwapRequest {
    pub fn new(
        direction: Direction,
        input_amount: U256,
        slippage_tolerance_percent: f64,
    ) -> WalletResult<Self> {
        if input_amount.is_zero() {
            return Err(WalletError::config_invalid("input_amount must be > 0"));
        }
        if !(slippage_tolerance_percent > 0.0 && slippage_tolerance_percent <= 100.0) {
            return Err(WalletError::config_invalid(format!(
                "slippage_tolerance_percent out of (0, 100]: {}",
                slippage_tolerance_percent
            )));
        }
        Ok(Self {
            direction,
            input_amount,
            slippage_tolerance_percent,
        })
    }

    /// Slippage tolerance in basis points (0.5% -> 50 bps).
    pub fn slippage_bps(&self) -> u64 {
        (self.slippage_tolerance_percent * 100.0).round() as u64
    }
}

/// Minimum acceptable output: `output * (1 - slippage)` in integer math.
/// Exact for the UI presets (0.1%, 0.5%, 1%).
pub fn min_output(output_amount: U256, slippage_bps: u64) -> U256 {
    let keep = BPS_DENOMINATOR.saturating_sub(slippage_bps);
    output_amount.saturating_mul(U256::from(keep)) / U256::from(BPS_DENOMINATOR)
}

/// What a submitted transaction was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TxKind {
    Approve,
    Swap,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Approve => "approve",
            TxKind::Swap => "swap",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

/// Session-scoped record of a submitted transaction. Created at submission,
/// updated on confirmation or failure, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionRecord {
    pub hash: B256,
    pub kind: TxKind,
    pub status: TxStatus,
    /// Display string for the activity feed, e.g. "Bought USDOX".
    pub human_action: String,
    pub submitted_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn pending(hash: B256, kind: TxKind, human_action: impl Into<String>) -> Self {
        Self {
            hash,
            kind,
            status: TxStatus::Pending,
            human_action: human_action.into(),
            submitted_at: Utc::now(),
        }
    }
}

/// Last-known balances for the connected address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Balances {
    /// Native asset balance in wei.
    pub native: U256,
    /// Token balance in the token's smallest unit.
    pub token: U256,
}

/// Convert a wei amount to a display float of the native asset.
#[inline]
pub fn wei_to_native(wei: U256) -> f64 {
    let wei_u128: u128 = wei.try_into().unwrap_or(u128::MAX);
    wei_u128 as f64 / 1e18
}
