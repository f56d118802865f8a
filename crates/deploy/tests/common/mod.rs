//! In-memory chain used by the engine tests.
//!
//! `MockChain` is both the signer and the confirmer: every transaction is "mined"
//! immediately, creations get `Address::create(deployer, nonce)`.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use alloy_core::{
    json_abi::JsonAbi,
    primitives::{Address, B256, Bytes, keccak256},
};
use anyhow::Result;
use futures::future::BoxFuture;
use templar_deploy::{
    BuildArtifact, Confirmer, DeployError, PendingTransaction, Signer, TransactionReceipt,
    TransactionRequest,
};

pub const DEPLOYER: Address = Address::new([0xde; 20]);

/// A transaction the mock accepted.
#[derive(Debug, Clone)]
pub struct SentTransaction {
    pub hash: B256,
    pub to: Option<Address>,
    pub data: Bytes,
}

#[derive(Debug, Default)]
struct ChainState {
    nonce: u64,
    creations: usize,
    sent: Vec<SentTransaction>,
    receipts: HashMap<B256, TransactionReceipt>,
    revert_creations: HashSet<usize>,
    call_output: Option<Bytes>,
}

#[derive(Debug, Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the `index`-th contract creation (0-based) revert.
    pub fn revert_creation(&self, index: usize) {
        self.state.lock().unwrap().revert_creations.insert(index);
    }

    /// Answer every `eth_call` with `output` instead of a zero word.
    pub fn set_call_output(&self, output: impl Into<Bytes>) {
        self.state.lock().unwrap().call_output = Some(output.into());
    }

    pub fn sent(&self) -> Vec<SentTransaction> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn creations(&self) -> Vec<SentTransaction> {
        self.sent().into_iter().filter(|tx| tx.to.is_none()).collect()
    }

    pub fn calls(&self) -> Vec<SentTransaction> {
        self.sent().into_iter().filter(|tx| tx.to.is_some()).collect()
    }
}

impl Signer for MockChain {
    fn address(&self) -> Address {
        DEPLOYER
    }

    fn send_transaction(
        &self,
        request: TransactionRequest,
    ) -> BoxFuture<'_, Result<PendingTransaction>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();

            let nonce = state.nonce;
            state.nonce += 1;
            let hash = keccak256(nonce.to_be_bytes());

            let (contract_address, status) = if request.is_create() {
                let index = state.creations;
                state.creations += 1;
                (
                    Some(DEPLOYER.create(nonce)),
                    !state.revert_creations.contains(&index),
                )
            } else {
                (None, true)
            };

            state.receipts.insert(
                hash,
                TransactionReceipt {
                    transaction_hash: hash,
                    block_number: nonce + 1,
                    contract_address,
                    status,
                },
            );
            state.sent.push(SentTransaction {
                hash,
                to: request.to,
                data: request.data,
            });

            Ok(PendingTransaction { hash })
        })
    }

    fn call(&self, _request: TransactionRequest) -> BoxFuture<'_, Result<Bytes>> {
        Box::pin(async move {
            // A single zero word unless configured.
            let output = self.state.lock().unwrap().call_output.clone();
            Ok(output.unwrap_or_else(|| Bytes::from(vec![0u8; 32])))
        })
    }
}

impl Confirmer for MockChain {
    fn watch(&self, pending: PendingTransaction) -> BoxFuture<'_, Result<TransactionReceipt>> {
        Box::pin(async move {
            let receipt = self
                .state
                .lock()
                .unwrap()
                .receipts
                .get(&pending.hash)
                .cloned()
                .ok_or(DeployError::ConfirmationTimeout(pending.hash))?;

            if !receipt.status {
                return Err(DeployError::TransactionReverted(pending.hash).into());
            }
            Ok(receipt)
        })
    }
}

fn abi(json: &str) -> JsonAbi {
    serde_json::from_str(json).unwrap()
}

/// No constructor, no functions.
pub fn plain() -> Arc<BuildArtifact> {
    Arc::new(BuildArtifact::new(JsonAbi::default(), vec![0x60, 0x0a]))
}

/// `constructor(address dependency)` and `setOwner(address)`.
pub fn dependent() -> Arc<BuildArtifact> {
    Arc::new(BuildArtifact::new(
        abi(r#"[
            {"type": "constructor", "inputs": [{"name": "dependency", "type": "address"}], "stateMutability": "nonpayable"},
            {"type": "function", "name": "setOwner", "inputs": [{"name": "owner", "type": "address"}], "outputs": [], "stateMutability": "nonpayable"}
        ]"#),
        vec![0x60, 0x0b],
    ))
}

/// An upgradeable implementation: `initialize(uint256)` and `value()`.
pub fn implementation() -> Arc<BuildArtifact> {
    Arc::new(BuildArtifact::new(
        abi(r#"[
            {"type": "function", "name": "initialize", "inputs": [{"name": "value", "type": "uint256"}], "outputs": [], "stateMutability": "nonpayable"},
            {"type": "function", "name": "value", "inputs": [], "outputs": [{"name": "", "type": "uint256"}], "stateMutability": "view"}
        ]"#),
        vec![0x60, 0x0c],
    ))
}

/// `constructor(address implementation, bytes data)`.
pub fn proxy() -> Arc<BuildArtifact> {
    Arc::new(BuildArtifact::new(
        abi(r#"[
            {"type": "constructor", "inputs": [{"name": "implementation", "type": "address"}, {"name": "data", "type": "bytes"}], "stateMutability": "payable"}
        ]"#),
        vec![0x60, 0x0d],
    ))
}
