//! Funding the deployer from a node-managed account.

use alloy_core::primitives::{Address, U256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{Confirmer, NodeSigner, Signer, TransactionRequest, rpc::RpcClient};

/// Funding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingConfig {
    /// Whether to top up an empty deployer account.
    pub enabled: bool,
    /// Amount sent, in ether.
    pub amount_eth: f64,
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            amount_eth: 1000.0,
        }
    }
}

/// Balance of `address` at the latest block.
pub async fn balance_of(rpc: &RpcClient, address: Address) -> Result<U256> {
    rpc.request("eth_getBalance", vec![json!(address), json!("latest")])
        .await
        .with_context(|| format!("Failed to fetch balance of {address}"))
}

/// If `recipient` holds no ether, send it `amount_wei` from the node's first account.
///
/// Returns whether a transfer was made.
pub async fn fund_if_empty(
    rpc: &RpcClient,
    confirmer: &dyn Confirmer,
    recipient: Address,
    amount_wei: U256,
) -> Result<bool> {
    let balance = balance_of(rpc, recipient).await?;
    if !balance.is_zero() {
        tracing::debug!(address = %recipient, balance = %balance, "Deployer already funded");
        return Ok(false);
    }

    let faucet = NodeSigner::from_node_account(rpc.clone(), 0)
        .await
        .context("No node account available to fund the deployer")?;

    tracing::info!(
        from = %faucet.address(),
        to = %recipient,
        amount_wei = %amount_wei,
        "Funding deployer account..."
    );

    let pending = faucet
        .send_transaction(TransactionRequest::transfer(recipient, amount_wei))
        .await?;
    confirmer
        .watch(pending)
        .await
        .context("Funding transaction failed")?;

    Ok(true)
}

/// Convert ETH amount (f64) to wei.
///
/// Rounds to gwei precision (9 decimal places) to avoid floating-point noise,
/// then scales to wei.
pub fn eth_to_wei(eth: f64) -> U256 {
    let gwei = (eth * 1e9).round() as u128;
    U256::from(gwei) * U256::from(1_000_000_000u64)
}
