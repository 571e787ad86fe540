//! Network registry: the static catalog of supported chains.
//! Loaded once at startup; read-only afterwards.

use std::collections::HashMap;

use alloy_primitives::B256;
use serde::Serialize;

/// Native currency display metadata for a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Immutable profile of a supported chain. Also the payload shape for the
/// provider's add-chain request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkProfile {
    pub chain_id: u64,
    pub display_name: String,
    pub native_currency: NativeCurrency,
    /// Ordered RPC endpoints, first preferred.
    pub rpc_urls: Vec<String>,
    pub explorer_base_url: String,
}

impl NetworkProfile {
    fn new(
        chain_id: u64,
        display_name: &str,
        currency: (&str, &str, u8),
        rpc_urls: &[&str],
        explorer_base_url: &str,
    ) -> Self {
        Self {
            chain_id,
            display_name: display_name.to_string(),
            native_currency: NativeCurrency {
                name: currency.0.to_string(),
                symbol: currency.1.to_string(),
                decimals: currency.2,
            },
            rpc_urls: rpc_urls.iter().map(|u| u.to_string()).collect(),
            explorer_base_url: explorer_base_url.to_string(),
        }
    }
}

/// Pure lookup table over [`NetworkProfile`]s.
pub struct NetworkRegistry {
    profiles: HashMap<u64, NetworkProfile>,
}

impl NetworkRegistry {
    /// Registry with the built-in catalog.
    pub fn with_defaults() -> Self {
        let mut profiles = HashMap::new();
        for profile in builtin_profiles() {
            profiles.insert(profile.chain_id, profile);
        }
        Self { profiles }
    }

    /// Registry with the built-in catalog plus caller-supplied profiles.
    /// Supplied profiles win on chain id collision.
    pub fn with_profiles(extra: impl IntoIterator<Item = NetworkProfile>) -> Self {
        let mut registry = Self::with_defaults();
        for profile in extra {
            registry.profiles.insert(profile.chain_id, profile);
        }
        registry
    }

    pub fn profile_for(&self, chain_id: u64) -> Option<&NetworkProfile> {
        self.profiles.get(&chain_id)
    }

    pub fn display_name(&self, chain_id: u64) -> &str {
        self.profile_for(chain_id)
            .map(|p| p.display_name.as_str())
            .unwrap_or("Unknown Network")
    }

    /// Explorer link for a transaction hash, if the chain is known.
    pub fn explorer_tx_url(&self, chain_id: u64, tx_hash: B256) -> Option<String> {
        self.profile_for(chain_id).map(|p| {
            format!(
                "{}/tx/0x{}",
                p.explorer_base_url.trim_end_matches('/'),
                hex::encode(tx_hash)
            )
        })
    }
}

fn builtin_profiles() -> Vec<NetworkProfile> {
    vec![
        NetworkProfile::new(
            1,
            "Ethereum Mainnet",
            ("Ether", "ETH", 18),
            &["https://eth.llamarpc.com"],
            "https://etherscan.io",
        ),
        NetworkProfile::new(
            56,
            "BNB Smart Chain",
            ("BNB", "BNB", 18),
            &[
                "https://bsc-dataseed.binance.org",
                "https://bsc-dataseed1.binance.org",
            ],
            "https://bscscan.com",
        ),
        NetworkProfile::new(
            97,
            "BNB Smart Chain Testnet",
            ("tBNB", "tBNB", 18),
            &["https://data-seed-prebsc-1-s1.binance.org:8545"],
            "https://testnet.bscscan.com",
        ),
        NetworkProfile::new(
            10,
            "Optimism",
            ("Ether", "ETH", 18),
            &["https://mainnet.optimism.io"],
            "https://optimistic.etherscan.io",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    #[test]
    fn test_builtin_lookup() {
        let registry = NetworkRegistry::with_defaults();
        let bsc = registry.profile_for(56).expect("BSC profile");
        assert_eq!(bsc.display_name, "BNB Smart Chain");
        assert_eq!(bsc.native_currency.symbol, "BNB");
        assert_eq!(bsc.native_currency.decimals, 18);
        assert!(!bsc.rpc_urls.is_empty());
    }

    #[test]
    fn test_unknown_chain_is_absent() {
        let registry = NetworkRegistry::with_defaults();
        assert!(registry.profile_for(999).is_none());
        assert_eq!(registry.display_name(999), "Unknown Network");
    }

    #[test]
    fn test_explorer_tx_url() {
        let registry = NetworkRegistry::with_defaults();
        let hash = B256::from(U256::from(0xabcdu64).to_be_bytes());
        let url = registry.explorer_tx_url(56, hash).expect("url");
        assert!(url.starts_with("https://bscscan.com/tx/0x"));
        assert!(url.ends_with("abcd"));
        assert!(registry.explorer_tx_url(999, hash).is_none());
    }

    #[test]
    fn test_extra_profile_overrides_builtin() {
        let custom = NetworkProfile::new(
            56,
            "BSC (private RPC)",
            ("BNB", "BNB", 18),
            &["http://localhost:8545"],
            "https://bscscan.com",
        );
        let registry = NetworkRegistry::with_profiles([custom]);
        assert_eq!(registry.display_name(56), "BSC (private RPC)");
    }
}
