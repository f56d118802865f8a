//! Signer backed by an account unlocked on the node.

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::{Context, Result};
use futures::future::BoxFuture;

use super::{PendingTransaction, Signer, TransactionRequest, eth_call};
use crate::rpc::RpcClient;

/// Sends transactions with `eth_sendTransaction`, letting the node sign them.
#[derive(Debug, Clone)]
pub struct NodeSigner {
    rpc: RpcClient,
    address: Address,
}

impl NodeSigner {
    pub fn new(rpc: RpcClient, address: Address) -> Self {
        Self { rpc, address }
    }

    /// Use the `index`-th account reported by `eth_accounts`.
    pub async fn from_node_account(rpc: RpcClient, index: usize) -> Result<Self> {
        let accounts: Vec<Address> = rpc
            .request("eth_accounts", vec![])
            .await
            .context("Failed to list node accounts")?;

        let address = *accounts.get(index).with_context(|| {
            format!(
                "Node account {} not available ({} account(s) unlocked)",
                index,
                accounts.len()
            )
        })?;

        tracing::debug!(address = %address, index, "Using node-managed account");
        Ok(Self::new(rpc, address))
    }
}

impl Signer for NodeSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn send_transaction(
        &self,
        request: TransactionRequest,
    ) -> BoxFuture<'_, Result<PendingTransaction>> {
        Box::pin(async move {
            let hash: B256 = self
                .rpc
                .request("eth_sendTransaction", vec![request.to_json(self.address)])
                .await
                .context("Failed to send transaction")?;

            tracing::debug!(tx_hash = %hash, from = %self.address, "Transaction submitted");
            Ok(PendingTransaction { hash })
        })
    }

    fn call(&self, request: TransactionRequest) -> BoxFuture<'_, Result<Bytes>> {
        Box::pin(async move { eth_call(&self.rpc, self.address, &request).await })
    }
}
