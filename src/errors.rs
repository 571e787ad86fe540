//! Centralized error handling.
//!
//! Every failure that crosses a module boundary carries a unique
//! [`ErrorCode`] so log lines can be correlated without parsing free-form
//! messages. Codes follow the pattern CATEGORY_SPECIFIC:
//! - wallet/session errors (connect, switch, disconnect)
//! - swap lifecycle errors (quote, approval, submission)
//! - RPC transport errors
//! - configuration errors

use std::fmt;

/// Library-wide error type. All fallible public operations return this.
#[derive(Debug)]
pub struct WalletError {
    /// Unique code for logging and UI dispatch.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Optional underlying error.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl WalletError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Error code as a static string (for logging).
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for WalletError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Unique error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ErrorCode {
    // ============================================
    // Wallet / session errors
    // ============================================
    /// No compatible wallet provider is reachable
    ProviderUnavailable,
    /// User rejected the request in the wallet prompt
    UserRejected,
    /// Switch-chain (or the add-chain fallback) failed
    NetworkSwitchFailed,

    // ============================================
    // Swap lifecycle errors
    // ============================================
    /// Router quote query failed
    QuoteUnavailable,
    /// Quote is absent or its epoch no longer matches
    QuoteStale,
    /// Allowance read or approval transaction failed
    ApprovalFailed,
    /// Swap reverted on-chain (minimum output not met)
    SlippageExceeded,
    /// Generic transaction revert or confirmation timeout
    TransactionFailed,

    // ============================================
    // RPC transport errors
    // ============================================
    /// All RPC endpoints unreachable
    RpcUnreachable,
    /// RPC request timed out
    RpcTimeout,
    /// RPC rate limited (HTTP 429)
    RpcRateLimited,
    /// Malformed RPC response
    RpcInvalidResponse,

    // ============================================
    // Configuration errors
    // ============================================
    /// Invalid configuration value
    ConfigInvalid,
    /// Chain id not present in the network registry
    ChainUnsupported,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            Self::UserRejected => "USER_REJECTED",
            Self::NetworkSwitchFailed => "NETWORK_SWITCH_FAILED",

            Self::QuoteUnavailable => "QUOTE_UNAVAILABLE",
            Self::QuoteStale => "QUOTE_STALE",
            Self::ApprovalFailed => "APPROVAL_FAILED",
            Self::SlippageExceeded => "SLIPPAGE_EXCEEDED",
            Self::TransactionFailed => "TRANSACTION_FAILED",

            Self::RpcUnreachable => "RPC_UNREACHABLE",
            Self::RpcTimeout => "RPC_TIMEOUT",
            Self::RpcRateLimited => "RPC_RATE_LIMITED",
            Self::RpcInvalidResponse => "RPC_INVALID_RESPONSE",

            Self::ConfigInvalid => "CFG_INVALID_VALUE",
            Self::ChainUnsupported => "CFG_UNSUPPORTED_CHAIN",
        }
    }

    /// Transport-level errors are worth retrying; user decisions and
    /// on-chain outcomes are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RpcUnreachable | Self::RpcTimeout | Self::RpcRateLimited | Self::QuoteUnavailable
        )
    }
}

// ============================================
// Convenience constructors
// ============================================

impl WalletError {
    pub fn provider_unavailable(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProviderUnavailable, msg)
    }

    pub fn user_rejected(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::UserRejected, msg)
    }

    pub fn network_switch_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkSwitchFailed, msg)
    }

    pub fn quote_unavailable(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::QuoteUnavailable, msg)
    }

    pub fn quote_stale(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::QuoteStale, msg)
    }

    pub fn approval_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApprovalFailed, msg)
    }

    pub fn slippage_exceeded(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SlippageExceeded, msg)
    }

    pub fn transaction_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransactionFailed, msg)
    }

    pub fn rpc_unreachable(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcUnreachable, msg)
    }

    pub fn rpc_invalid_response(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcInvalidResponse, msg)
    }

    pub fn config_invalid(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigInvalid, msg)
    }

    pub fn unsupported_chain(chain_id: u64) -> Self {
        Self::new(
            ErrorCode::ChainUnsupported,
            format!("Unsupported chain_id: {}", chain_id),
        )
    }
}

/// Library Result type.
pub type WalletResult<T> = Result<T, WalletError>;

// ============================================
// Conversion from common error types
// ============================================

impl From<reqwest::Error> for WalletError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorCode::RpcTimeout, "Request timeout")
        } else if err.is_connect() {
            Self::new(ErrorCode::RpcUnreachable, "Connection failed")
        } else {
            Self::with_source(ErrorCode::RpcUnreachable, "HTTP request failed", err)
        }
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::RpcInvalidResponse, "JSON parse error", err)
    }
}
