//! Chain RPC client.
//!
//! Read-only JSON-RPC access to a chain, built from a network profile's
//! ordered URL list: the first endpoint is preferred, the rest are
//! fallbacks. Each endpoint gets exponential-backoff retries with HTTP 429
//! detection. API keys embedded in URLs are masked before logging.

use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::{ErrorCode, WalletError, WalletResult};
use crate::networks::NetworkProfile;

const USER_AGENT_STRING: &str = concat!("dexlink/", env!("CARGO_PKG_VERSION"));

/// Timeout for a single RPC request.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Maximum retry attempts per endpoint.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const BASE_RETRY_DELAY_MS: u64 = 100;

/// JSON-RPC client for one chain.
#[derive(Clone)]
pub struct RpcClient {
    /// Ordered endpoints, first preferred.
    urls: Vec<String>,
    client: reqwest::Client,
    chain_id: u64,
    /// Display name for logging.
    network_name: String,
}

impl RpcClient {
    /// Build a client from a registry profile.
    pub fn for_profile(profile: &NetworkProfile) -> WalletResult<Self> {
        Self::new(
            profile.chain_id,
            &profile.display_name,
            profile.rpc_urls.clone(),
        )
    }

    /// Build a client from an explicit URL list (config overrides).
    pub fn new(chain_id: u64, network_name: &str, urls: Vec<String>) -> WalletResult<Self> {
        if urls.is_empty() {
            return Err(WalletError::rpc_unreachable(format!(
                "no RPC endpoints configured for chain {}",
                chain_id
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                WalletError::with_source(ErrorCode::RpcUnreachable, "Failed to build HTTP client", e)
            })?;

        Ok(Self {
            urls,
            client,
            chain_id,
            network_name: network_name.to_string(),
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Execute a JSON-RPC call, walking the endpoint list until one answers.
    pub async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> WalletResult<T> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let mut last_error = None;
        for (idx, url) in self.urls.iter().enumerate() {
            if idx > 0 {
                debug!(
                    "Trying fallback RPC {} for {}",
                    masked_url(url),
                    self.network_name
                );
            }
            match self.call_with_retry(url, &payload).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!(
                        "RPC {} failed on {}: {}",
                        masked_url(url),
                        self.network_name,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            WalletError::rpc_unreachable(format!("All RPC endpoints failed for {}", self.network_name))
        }))
    }

    /// Retry one endpoint with exponential backoff: 100ms, 200ms, 400ms...
    async fn call_with_retry<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> WalletResult<T> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_RETRY_DELAY_MS * (2_u64.pow(attempt - 1));
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self.execute_call::<T>(url, payload).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if e.code == ErrorCode::RpcRateLimited {
                        warn!(
                            "Rate limited, backing off (attempt {}/{})",
                            attempt + 1,
                            MAX_RETRIES
                        );
                    }
                    if !e.code.is_retryable() {
                        return Err(e);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            WalletError::rpc_unreachable(format!("Unknown error after {} retries", MAX_RETRIES))
        }))
    }

    async fn execute_call<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> WalletResult<T> {
        let response = self.client.post(url).json(payload).send().await?;

        let status = response.status();
        if status == 429 {
            return Err(WalletError::new(
                ErrorCode::RpcRateLimited,
                "Rate limited (HTTP 429)",
            ));
        }
        if !status.is_success() {
            return Err(WalletError::rpc_unreachable(format!(
                "HTTP error: {}",
                status
            )));
        }

        let json: RpcResponse<T> = response.json().await.map_err(|e| {
            WalletError::with_source(ErrorCode::RpcInvalidResponse, "Failed to parse response", e)
        })?;

        if let Some(error) = json.error {
            return Err(WalletError::new(
                ErrorCode::RpcInvalidResponse,
                format!("RPC error: {} (code: {})", error.message, error.code),
            ));
        }

        json.result
            .ok_or_else(|| WalletError::rpc_invalid_response("No result in response"))
    }

    /// `eth_call` against a contract; returns the raw return data.
    pub async fn eth_call(&self, to: Address, data: &[u8]) -> WalletResult<Vec<u8>> {
        let params = serde_json::json!([
            {
                "to": format!("{:?}", to),
                "data": format!("0x{}", hex::encode(data)),
            },
            "latest"
        ]);

        let raw: String = self.call("eth_call", params).await?;
        decode_hex_bytes(&raw)
    }

    /// Native balance of an address (`eth_getBalance`).
    pub async fn get_balance(&self, address: Address) -> WalletResult<U256> {
        let params = serde_json::json!([format!("{:?}", address), "latest"]);
        let raw: String = self.call("eth_getBalance", params).await?;
        decode_hex_quantity(&raw)
    }

    /// Receipt status of a transaction, or `None` while still pending.
    /// `Some(true)` means success, `Some(false)` means revert.
    pub async fn receipt_status(&self, hash: B256) -> WalletResult<Option<bool>> {
        let params = serde_json::json!([format!("{:?}", hash)]);
        let receipt: Option<RawReceipt> = self.call("eth_getTransactionReceipt", params).await?;
        match receipt {
            None => Ok(None),
            Some(r) => {
                let status = decode_hex_quantity(&r.status)?;
                Ok(Some(status == U256::from(1)))
            }
        }
    }
}

/// JSON-RPC response envelope.
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RawReceipt {
    status: String,
}

/// Decode a 0x-prefixed hex quantity into a U256.
pub(crate) fn decode_hex_quantity(raw: &str) -> WalletResult<U256> {
    let trimmed = raw.trim_start_matches("0x");
    U256::from_str_radix(trimmed, 16)
        .map_err(|_| WalletError::rpc_invalid_response(format!("bad hex quantity: {:?}", raw)))
}

/// Decode 0x-prefixed hex data into raw bytes.
pub(crate) fn decode_hex_bytes(raw: &str) -> WalletResult<Vec<u8>> {
    let trimmed = raw.trim_start_matches("0x");
    hex::decode(trimmed)
        .map_err(|_| WalletError::rpc_invalid_response(format!("bad hex data: {:?}", raw)))
}

/// Mask any `/v2/<key>`-style API key segment for safe logging.
fn masked_url(url: &str) -> String {
    if let Some((base, _key)) = url.split_once("/v2/") {
        return format!("{}/v2/***", base);
    }
    url.to_string()
}
