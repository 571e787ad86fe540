//! Dexlink Library
//!
//! Client-side core for a token-swap DApp:
//! - Wallet session management across injected and SDK-bridge providers
//! - Chain switching with registry-backed add-chain fallback
//! - Debounced, epoch-cancelled price quoting against a V2 router
//! - Slippage-bounded swap execution with allowance handling
//! - Balance polling for the connected address
//!
//! Presentation layers subscribe to the watch channels each component
//! publishes; nothing here renders anything.

pub mod balance;
pub mod config;
pub mod connection;
pub mod errors;
pub mod networks;
pub mod provider;
pub mod quote;
pub mod router;
pub mod rpc;
pub mod swap;
pub mod test_support;
pub mod types;

pub use balance::{BalanceSource, BalanceTracker, RpcBalanceSource};
pub use config::{AppConfig, TokenMetadata};
pub use connection::ConnectionManager;
pub use errors::{ErrorCode, WalletError, WalletResult};
pub use networks::{NetworkProfile, NetworkRegistry};
pub use provider::{ProviderError, ProviderEvent, TxRequest, WalletProvider};
pub use quote::QuoteEngine;
pub use router::{RouterClient, RouterQuery};
pub use rpc::RpcClient;
pub use swap::{SwapExecutor, SwapPhase};
pub use types::{
    Balances, Direction, Quote, QuoteState, SessionState, SwapRequest, TransactionRecord, TxKind,
    TxStatus, WalletKind,
};
