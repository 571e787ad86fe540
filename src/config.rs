//! Static configuration, assembled once at startup and passed by reference.
//! Environment variables are read only inside [`AppConfig::from_env`]; no
//! other module touches the environment.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;

use crate::errors::{WalletError, WalletResult};
use crate::types::Direction;

/// Default quote debounce window.
pub const DEFAULT_QUOTE_DEBOUNCE_MS: u64 = 500;
/// Default balance poll cadence.
pub const DEFAULT_BALANCE_POLL_SECS: u64 = 30;
/// Default swap deadline window (20 minutes, evaluated at submission).
pub const DEFAULT_DEADLINE_SECS: u64 = 20 * 60;
/// Default slippage tolerance preset.
pub const DEFAULT_SLIPPAGE_PERCENT: f64 = 0.5;

// Deployment defaults: the token's home chain (BSC) and its V2 router.
const DEFAULT_TOKEN_ADDRESS: &str = "0xf5c470025e99f97a4CA6416c77a685db929e929b";
const DEFAULT_ROUTER_ADDRESS: &str = "0x10ED43C718714eb63d5aA57B78B54704E256024E";
const DEFAULT_WRAPPED_NATIVE: &str = "0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c";
const DEFAULT_EXPECTED_CHAINS: [u64; 2] = [56, 97];

/// Display metadata for the traded token (used by watch-asset).
#[derive(Debug, Clone)]
pub struct TokenMetadata {
    pub symbol: String,
    pub decimals: u8,
    pub logo_url: Option<String>,
}

/// Validated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// The traded token's contract address.
    pub token_address: Address,
    pub token: TokenMetadata,
    /// Chains the DApp considers "expected"; first entry is the primary.
    pub expected_chain_ids: Vec<u64>,
    /// V2-style router handling both quoting and swaps.
    pub router_address: Address,
    /// Wrapped native asset, entry/exit hop for native-side swaps.
    pub wrapped_native: Address,
    /// Swap path per direction. Defaults pair the token with the wrapped
    /// native; overrides allow multi-hop or token-to-token routes.
    pub buy_path: Vec<Address>,
    pub sell_path: Vec<Address>,
    /// Per-chain RPC URL overrides, consulted before the registry profile.
    pub rpc_overrides: HashMap<u64, Vec<String>>,
    pub quote_debounce: Duration,
    pub balance_poll_interval: Duration,
    pub default_slippage_percent: f64,
    pub deadline_window: Duration,
}

impl AppConfig {
    /// Configuration with defaults for everything but the contract surface.
    pub fn new(
        token_address: Address,
        token: TokenMetadata,
        router_address: Address,
        wrapped_native: Address,
        expected_chain_ids: Vec<u64>,
    ) -> Self {
        Self {
            token_address,
            token,
            expected_chain_ids,
            router_address,
            wrapped_native,
            buy_path: vec![wrapped_native, token_address],
            sell_path: vec![token_address, wrapped_native],
            rpc_overrides: HashMap::new(),
            quote_debounce: Duration::from_millis(DEFAULT_QUOTE_DEBOUNCE_MS),
            balance_poll_interval: Duration::from_secs(DEFAULT_BALANCE_POLL_SECS),
            default_slippage_percent: DEFAULT_SLIPPAGE_PERCENT,
            deadline_window: Duration::from_secs(DEFAULT_DEADLINE_SECS),
        }
    }

    /// Build from environment variables, falling back to the deployment
    /// defaults. Validates before returning.
    pub fn from_env() -> WalletResult<Self> {
        let token_address = env_address("TOKEN_ADDRESS", DEFAULT_TOKEN_ADDRESS)?;
        let router_address = env_address("ROUTER_ADDRESS", DEFAULT_ROUTER_ADDRESS)?;
        let wrapped_native = env_address("WRAPPED_NATIVE_ADDRESS", DEFAULT_WRAPPED_NATIVE)?;

        let token = TokenMetadata {
            symbol: std::env::var("TOKEN_SYMBOL").unwrap_or_else(|_| "USDOX".to_string()),
            decimals: 18,
            logo_url: std::env::var("TOKEN_LOGO_URL").ok(),
        };

        let expected_chain_ids = match std::env::var("EXPECTED_CHAIN_IDS") {
            Ok(raw) => raw
                .split(',')
                .map(|part| {
                    part.trim().parse::<u64>().map_err(|_| {
                        WalletError::config_invalid(format!("bad chain id: {:?}", part))
                    })
                })
                .collect::<WalletResult<Vec<u64>>>()?,
            Err(_) => DEFAULT_EXPECTED_CHAINS.to_vec(),
        };

        let mut config = Self::new(
            token_address,
            token,
            router_address,
            wrapped_native,
            expected_chain_ids,
        );

        if let Ok(url) = std::env::var("CHAIN_RPC_URL") {
            config
                .rpc_overrides
                .insert(config.primary_chain_id(), vec![url]);
        }

        config.validate()?;
        Ok(config)
    }

    /// The chain the DApp primarily targets.
    pub fn primary_chain_id(&self) -> u64 {
        self.expected_chain_ids.first().copied().unwrap_or_default()
    }

    pub fn is_expected_chain(&self, chain_id: u64) -> bool {
        self.expected_chain_ids.contains(&chain_id)
    }

    /// Ordered token path for a swap direction.
    pub fn path_for(&self, direction: Direction) -> &[Address] {
        match direction {
            Direction::Buy => &self.buy_path,
            Direction::Sell => &self.sell_path,
        }
    }

    pub fn validate(&self) -> WalletResult<()> {
        if self.token_address.is_zero() {
            return Err(WalletError::config_invalid("token_address is zero"));
        }
        if self.router_address.is_zero() {
            return Err(WalletError::config_invalid("router_address is zero"));
        }
        if self.wrapped_native.is_zero() {
            return Err(WalletError::config_invalid("wrapped_native is zero"));
        }
        if self.expected_chain_ids.is_empty() {
            return Err(WalletError::config_invalid("expected_chain_ids is empty"));
        }
        if self.buy_path.len() < 2 || self.sell_path.len() < 2 {
            return Err(WalletError::config_invalid("swap paths need >= 2 hops"));
        }
        if self.buy_path.last() != Some(&self.token_address) {
            return Err(WalletError::config_invalid("buy_path must end at the token"));
        }
        if self.sell_path.first() != Some(&self.token_address) {
            return Err(WalletError::config_invalid(
                "sell_path must start at the token",
            ));
        }
        if !(self.default_slippage_percent > 0.0 && self.default_slippage_percent <= 100.0) {
            return Err(WalletError::config_invalid(format!(
                "default_slippage_percent out of (0, 100]: {}",
                self.default_slippage_percent
            )));
        }
        if self.quote_debounce.is_zero() || self.balance_poll_interval.is_zero() {
            return Err(WalletError::config_invalid(
                "debounce and poll intervals must be non-zero",
            ));
        }
        if self.deadline_window.is_zero() {
            return Err(WalletError::config_invalid(
                "deadline_window must be non-zero",
            ));
        }
        Ok(())
    }
}

fn env_address(name: &str, default: &str) -> WalletResult<Address> {
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    Address::from_str(raw.trim())
        .map_err(|_| WalletError::config_invalid(format!("{} is not an address: {:?}", name, raw)))
}
