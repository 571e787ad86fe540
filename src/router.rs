//! Router and token contract surface.
//!
//! Read calls (`getAmountsOut`, `allowance`, `balanceOf`) go through the
//! chain RPC client. Write calls are only *encoded* here; submission happens
//! through the wallet provider, which owns signing.

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use std::sync::Arc;

use crate::errors::{WalletError, WalletResult};
use crate::rpc::RpcClient;

// V2 router and ERC20 interfaces
sol! {
    function getAmountsOut(
        uint256 amountIn,
        address[] calldata path
    ) external view returns (uint256[] memory amounts);

    function swapExactETHForTokens(
        uint256 amountOutMin,
        address[] calldata path,
        address to,
        uint256 deadline
    ) external payable returns (uint256[] memory amounts);

    function swapExactTokensForETH(
        uint256 amountIn,
        uint256 amountOutMin,
        address[] calldata path,
        address to,
        uint256 deadline
    ) external returns (uint256[] memory amounts);

    function swapExactTokensForTokens(
        uint256 amountIn,
        uint256 amountOutMin,
        address[] calldata path,
        address to,
        uint256 deadline
    ) external returns (uint256[] memory amounts);

    function balanceOf(address account) external view returns (uint256);
    function allowance(address owner, address spender) external view returns (uint256);
    function approve(address spender, uint256 amount) external returns (bool);
}

/// Read capability the quote engine, swap executor and balance tracker
/// depend on. Kept narrow so tests can stand in a deterministic router.
#[async_trait]
pub trait RouterQuery: Send + Sync {
    /// Expected output amounts along `path` for `amount_in`.
    async fn amounts_out(&self, amount_in: U256, path: &[Address]) -> WalletResult<Vec<U256>>;

    /// Router allowance granted by `owner` over `token`.
    async fn allowance(&self, token: Address, owner: Address) -> WalletResult<U256>;

    /// Receipt status: `None` pending, `Some(true)` success, `Some(false)` revert.
    async fn receipt_status(&self, hash: B256) -> WalletResult<Option<bool>>;
}

/// Live implementation over the chain RPC.
pub struct RouterClient {
    rpc: Arc<RpcClient>,
    router: Address,
}

impl RouterClient {
    pub fn new(rpc: Arc<RpcClient>, router: Address) -> Self {
        Self { rpc, router }
    }

    pub fn router_address(&self) -> Address {
        self.router
    }
}

#[async_trait]
impl RouterQuery for RouterClient {
    async fn amounts_out(&self, amount_in: U256, path: &[Address]) -> WalletResult<Vec<U256>> {
        let calldata = getAmountsOutCall {
            amountIn: amount_in,
            path: path.to_vec(),
        }
        .abi_encode();

        let ret = self.rpc.eth_call(self.router, &calldata).await?;
        let decoded = getAmountsOutCall::abi_decode_returns(&ret, true)
            .map_err(|e| WalletError::rpc_invalid_response(format!("getAmountsOut: {}", e)))?;
        Ok(decoded.amounts)
    }

    async fn allowance(&self, token: Address, owner: Address) -> WalletResult<U256> {
        let calldata = allowanceCall {
            owner,
            spender: self.router,
        }
        .abi_encode();

        let ret = self.rpc.eth_call(token, &calldata).await?;
        let decoded = allowanceCall::abi_decode_returns(&ret, true)
            .map_err(|e| WalletError::rpc_invalid_response(format!("allowance: {}", e)))?;
        Ok(decoded._0)
    }

    async fn receipt_status(&self, hash: B256) -> WalletResult<Option<bool>> {
        self.rpc.receipt_status(hash).await
    }
}

// ============================================
// Calldata builders for the write surface
// ============================================

pub fn approve_calldata(spender: Address, amount: U256) -> Vec<u8> {
    approveCall { spender, amount }.abi_encode()
}

pub fn swap_native_for_tokens_calldata(
    amount_out_min: U256,
    path: &[Address],
    to: Address,
    deadline: U256,
) -> Vec<u8> {
    swapExactETHForTokensCall {
        amountOutMin: amount_out_min,
        path: path.to_vec(),
        to,
        deadline,
    }
    .abi_encode()
}

pub fn swap_tokens_for_native_calldata(
    amount_in: U256,
    amount_out_min: U256,
    path: &[Address],
    to: Address,
    deadline: U256,
) -> Vec<u8> {
    swapExactTokensForETHCall {
        amountIn: amount_in,
        amountOutMin: amount_out_min,
        path: path.to_vec(),
        to,
        deadline,
    }
    .abi_encode()
}

pub fn swap_tokens_for_tokens_calldata(
    amount_in: U256,
    amount_out_min: U256,
    path: &[Address],
    to: Address,
    deadline: U256,
) -> Vec<u8> {
    swapExactTokensForTokensCall {
        amountIn: amount_in,
        amountOutMin: amount_out_min,
        path: path.to_vec(),
        to,
        deadline,
    }
    .abi_encode()
}
