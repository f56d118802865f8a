//! Signer backed by a local private key.

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_core::primitives::{Address, B256, Bytes, U64, U128};
use alloy_eips::eip2718::Encodable2718;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde_json::json;

use super::{PendingTransaction, Signer, TransactionRequest, eth_call};
use crate::rpc::RpcClient;

/// Signs legacy (EIP-155) transactions locally and submits them raw.
///
/// Nonce, gas price and gas limit are fetched from the node for every transaction, so
/// the signer must be the only sender for its account while a batch runs.
#[derive(Debug, Clone)]
pub struct WalletSigner {
    rpc: RpcClient,
    wallet: PrivateKeySigner,
    chain_id: u64,
}

impl WalletSigner {
    pub fn new(rpc: RpcClient, wallet: PrivateKeySigner, chain_id: u64) -> Self {
        Self {
            rpc,
            wallet,
            chain_id,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn build_transaction(&self, request: TransactionRequest) -> Result<TxLegacy> {
        let from = self.wallet.address();

        let nonce: U64 = self
            .rpc
            .request("eth_getTransactionCount", vec![json!(from), json!("pending")])
            .await
            .context("Failed to fetch nonce")?;

        let gas_price: U128 = self
            .rpc
            .request("eth_gasPrice", vec![])
            .await
            .context("Failed to fetch gas price")?;

        let gas_limit = match request.gas {
            Some(gas) => gas,
            None => {
                let estimate: U64 = self
                    .rpc
                    .request("eth_estimateGas", vec![request.to_json(from)])
                    .await
                    .context("Failed to estimate gas")?;
                estimate.to::<u64>()
            }
        };

        Ok(TxLegacy {
            chain_id: Some(self.chain_id),
            nonce: nonce.to::<u64>(),
            gas_price: gas_price.to::<u128>(),
            gas_limit,
            to: request.kind(),
            value: request.value,
            input: request.data,
        })
    }

    /// Sign `tx` and return its EIP-2718 encoding.
    pub fn sign(&self, tx: TxLegacy) -> Result<Bytes> {
        let signature = self
            .wallet
            .sign_hash_sync(&tx.signature_hash())
            .context("Failed to sign transaction")?;
        let envelope = TxEnvelope::from(tx.into_signed(signature));
        Ok(envelope.encoded_2718().into())
    }
}

impl Signer for WalletSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    fn send_transaction(
        &self,
        request: TransactionRequest,
    ) -> BoxFuture<'_, Result<PendingTransaction>> {
        Box::pin(async move {
            let tx = self.build_transaction(request).await?;
            let nonce = tx.nonce;
            let raw = self.sign(tx)?;

            let hash: B256 = self
                .rpc
                .request("eth_sendRawTransaction", vec![json!(raw)])
                .await
                .context("Failed to send raw transaction")?;

            tracing::debug!(tx_hash = %hash, from = %self.address(), nonce, "Transaction submitted");
            Ok(PendingTransaction { hash })
        })
    }

    fn call(&self, request: TransactionRequest) -> BoxFuture<'_, Result<Bytes>> {
        Box::pin(async move { eth_call(&self.rpc, self.wallet.address(), &request).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::{TxKind, U256};
    use std::str::FromStr;
    use url::Url;

    // First dev account of the well-known `test test ... junk` mnemonic.
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn signer() -> WalletSigner {
        let rpc = RpcClient::new(Url::parse("http://127.0.0.1:8545").unwrap()).unwrap();
        WalletSigner::new(rpc, PrivateKeySigner::from_str(DEV_KEY).unwrap(), 1337)
    }

    #[test]
    fn test_address_from_key() {
        assert_eq!(
            signer().address(),
            Address::from_str("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").unwrap()
        );
    }

    #[test]
    fn test_sign_legacy_transaction() {
        let signer = signer();
        let tx = TxLegacy {
            chain_id: Some(signer.chain_id()),
            nonce: 0,
            gas_price: 1_000_000_000,
            gas_limit: 21_000,
            to: TxKind::Call(Address::repeat_byte(0x01)),
            value: U256::from(1),
            input: Bytes::new(),
        };

        let first = signer.sign(tx.clone()).unwrap();
        let second = signer.sign(tx).unwrap();

        // RFC 6979 signatures are deterministic, legacy txs are a bare RLP list.
        assert_eq!(first, second);
        assert!(first[0] >= 0xc0);
    }
}
