//! Transaction confirmation.

use std::{fmt, time::Duration};

use alloy_core::primitives::{Address, B256};
use anyhow::Result;
use backon::{ConstantBuilder, Retryable};
use futures::future::BoxFuture;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;

use crate::{DeployError, PendingTransaction, rpc::RpcClient, rpc::deserialize_u64_from_hex};

/// The fields of a transaction receipt the deployer relies on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    pub block_number: u64,
    /// Set for contract-creation transactions.
    #[serde(default)]
    pub contract_address: Option<Address>,
    /// `true` when the transaction executed successfully.
    #[serde(deserialize_with = "deserialize_status")]
    pub status: bool,
}

fn deserialize_status<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_u64_from_hex(deserializer)? == 1)
}

/// Blocks until a submitted transaction is final (or fails).
pub trait Confirmer: Send + Sync + fmt::Debug {
    /// Wait for `pending` to be mined. Reverted or dropped transactions are errors.
    fn watch(&self, pending: PendingTransaction) -> BoxFuture<'_, Result<TransactionReceipt>>;
}

/// Polling parameters for [`ReceiptWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Delay between `eth_getTransactionReceipt` polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Number of polls before the transaction is considered dropped.
    pub max_polls: usize,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            max_polls: 240,
        }
    }
}

/// Polls `eth_getTransactionReceipt` until the receipt shows up.
#[derive(Debug, Clone)]
pub struct ReceiptWatcher {
    rpc: RpcClient,
    config: ConfirmationConfig,
}

impl ReceiptWatcher {
    pub fn new(rpc: RpcClient, config: ConfirmationConfig) -> Self {
        Self { rpc, config }
    }

    async fn fetch(&self, hash: B256) -> Result<TransactionReceipt> {
        let receipt: Option<TransactionReceipt> = self
            .rpc
            .request("eth_getTransactionReceipt", vec![json!(hash)])
            .await?;
        receipt.ok_or_else(|| DeployError::ConfirmationTimeout(hash).into())
    }

    async fn wait(&self, pending: PendingTransaction) -> Result<TransactionReceipt> {
        let hash = pending.hash;

        let receipt = (|| self.fetch(hash))
            .retry(
                ConstantBuilder::default()
                    .with_delay(Duration::from_millis(self.config.poll_interval_ms))
                    .with_max_times(self.config.max_polls),
            )
            .notify(|err, after| {
                tracing::trace!(tx_hash = %hash, error = %err, ?after, "Receipt not available yet");
            })
            .await?;

        if !receipt.status {
            return Err(DeployError::TransactionReverted(hash).into());
        }

        tracing::debug!(
            tx_hash = %hash,
            block = receipt.block_number,
            "Transaction confirmed"
        );
        Ok(receipt)
    }
}

impl Confirmer for ReceiptWatcher {
    fn watch(&self, pending: PendingTransaction) -> BoxFuture<'_, Result<TransactionReceipt>> {
        Box::pin(self.wait(pending))
    }
}
