//! Contract handles: an address, the ABI used to talk to it and the signer that sends.

use std::{fmt, sync::Arc};

use alloy_core::{
    dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt},
    json_abi::{Function, JsonAbi},
    primitives::{Address, Bytes},
};
use anyhow::{Context, Result};

use crate::{
    Confirmer, DeployError, PendingTransaction, Signer, TransactionRequest,
    confirm::TransactionReceipt,
};

/// A deployed contract bound to a signer.
///
/// The ABI does not have to be the contract's own: a proxy handle carries the
/// implementation ABI at the proxy address.
#[derive(Clone)]
pub struct Contract {
    address: Address,
    abi: Arc<JsonAbi>,
    signer: Arc<dyn Signer>,
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contract")
            .field("address", &self.address)
            .field("functions", &self.abi.functions.len())
            .field("signer", &self.signer.address())
            .finish()
    }
}

impl Contract {
    pub fn new(address: Address, abi: Arc<JsonAbi>, signer: Arc<dyn Signer>) -> Self {
        Self {
            address,
            abi,
            signer,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn abi(&self) -> &Arc<JsonAbi> {
        &self.abi
    }

    pub fn signer(&self) -> &Arc<dyn Signer> {
        &self.signer
    }

    /// Same address and signer, different interface.
    pub fn with_abi(&self, abi: Arc<JsonAbi>) -> Self {
        Self {
            address: self.address,
            abi,
            signer: self.signer.clone(),
        }
    }

    /// Find the overload of `method` taking `arity` arguments.
    ///
    /// `method` may also be a full signature such as `initialize(address,uint256)`.
    pub fn function(&self, method: &str, arity: usize) -> Result<&Function> {
        let found = if method.contains('(') {
            self.abi
                .functions()
                .find(|function| function.signature() == method)
        } else {
            self.abi
                .function(method)
                .and_then(|overloads| overloads.iter().find(|f| f.inputs.len() == arity))
        };

        found.ok_or_else(|| {
            DeployError::UnknownMethod {
                contract: self.address.to_string(),
                method: method.to_string(),
                arity,
            }
            .into()
        })
    }

    /// Selector-prefixed calldata for `method(args)`.
    pub fn encode_call(&self, method: &str, args: &[DynSolValue]) -> Result<Bytes> {
        let function = self.function(method, args.len())?;
        let data = function
            .abi_encode_input(args)
            .with_context(|| format!("Failed to encode arguments of {}", function.signature()))?;
        Ok(data.into())
    }

    /// Read-only call, returning the decoded outputs.
    pub async fn call(&self, method: &str, args: &[DynSolValue]) -> Result<Vec<DynSolValue>> {
        let function = self.function(method, args.len())?;
        let data = self.encode_call(method, args)?;

        let output = self
            .signer
            .call(TransactionRequest::call(self.address, data))
            .await
            .with_context(|| format!("eth_call {} on {} failed", method, self.address))?;

        function
            .abi_decode_output(&output)
            .with_context(|| format!("Failed to decode output of {}", function.signature()))
    }

    /// Submit `method(args)` as a transaction.
    pub async fn send(&self, method: &str, args: &[DynSolValue]) -> Result<PendingTransaction> {
        let data = self.encode_call(method, args)?;

        tracing::debug!(contract = %self.address, method, "Sending transaction");

        self.signer
            .send_transaction(TransactionRequest::call(self.address, data))
            .await
            .with_context(|| format!("Failed to send {} to {}", method, self.address))
    }

    /// Submit `method(args)` and wait for it to be mined.
    pub async fn execute(
        &self,
        method: &str,
        args: &[DynSolValue],
        confirmer: &dyn Confirmer,
    ) -> Result<TransactionReceipt> {
        let pending = self.send(method, args).await?;
        confirmer
            .watch(pending)
            .await
            .with_context(|| format!("{} on {} failed", method, self.address))
    }
}
