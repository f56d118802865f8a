//! Transaction submission.
//!
//! A [`Signer`] owns an address and knows how to get a transaction onto the chain. Two
//! implementations are provided:
//! - [`NodeSigner`] delegates signing to an account unlocked on the node
//!   (`eth_sendTransaction`), as dev nodes expose.
//! - [`WalletSigner`] signs locally with a private key and submits the raw transaction.

mod node;
mod wallet;

pub use node::NodeSigner;
pub use wallet::WalletSigner;

use std::fmt;

use alloy_core::primitives::{Address, B256, Bytes, TxKind, U256};
use anyhow::Result;
use futures::future::BoxFuture;
use serde_json::{Value, json};

use crate::rpc::RpcClient;

/// A transaction to submit. `to == None` creates a contract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionRequest {
    pub to: Option<Address>,
    pub data: Bytes,
    pub value: U256,
    /// Gas limit; estimated by the signer when unset.
    pub gas: Option<u64>,
}

impl TransactionRequest {
    /// A contract-creation transaction carrying `data` as init code.
    pub fn create(data: Bytes) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    /// A call to `to` with `data`.
    pub fn call(to: Address, data: Bytes) -> Self {
        Self {
            to: Some(to),
            data,
            ..Default::default()
        }
    }

    /// A plain value transfer.
    pub fn transfer(to: Address, value: U256) -> Self {
        Self {
            to: Some(to),
            value,
            ..Default::default()
        }
    }

    pub fn is_create(&self) -> bool {
        self.to.is_none()
    }

    pub fn kind(&self) -> TxKind {
        match self.to {
            Some(to) => TxKind::Call(to),
            None => TxKind::Create,
        }
    }

    /// JSON-RPC transaction object as sent by `from`.
    pub fn to_json(&self, from: Address) -> Value {
        let mut tx = json!({
            "from": from,
            "data": self.data,
            "value": self.value,
        });
        if let Some(to) = self.to {
            tx["to"] = json!(to);
        }
        if let Some(gas) = self.gas {
            tx["gas"] = json!(format!("0x{gas:x}"));
        }
        tx
    }
}

/// A submitted, not yet confirmed, transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingTransaction {
    pub hash: B256,
}

/// An account able to submit transactions and perform read-only calls.
pub trait Signer: Send + Sync + fmt::Debug {
    /// The account address transactions are sent from.
    fn address(&self) -> Address;

    /// Submit a transaction, returning as soon as the node accepted it.
    fn send_transaction(&self, request: TransactionRequest)
    -> BoxFuture<'_, Result<PendingTransaction>>;

    /// Execute a read-only call against the latest block.
    fn call(&self, request: TransactionRequest) -> BoxFuture<'_, Result<Bytes>>;
}

/// `eth_call` on behalf of `from`.
pub(crate) async fn eth_call(
    rpc: &RpcClient,
    from: Address,
    request: &TransactionRequest,
) -> Result<Bytes> {
    rpc.request("eth_call", vec![request.to_json(from), json!("latest")])
        .await
}
