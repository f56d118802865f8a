//! The deployment loop.
//!
//! Templates run strictly in registry order. A template with a persisted record is
//! restored (no transaction, no hooks); any other template is resolved, submitted,
//! confirmed and wired before the next one starts. The growing [`Results`] are what
//! later templates resolve their references against.

use std::{collections::HashMap, sync::Arc};

use alloy_core::{
    dyn_abi::DynSolValue,
    json_abi::JsonAbi,
    primitives::{Address, B256},
};
use anyhow::{Context, Result};
use derive_more::Deref;

use crate::{
    BuildArtifact, Confirmer, Contract, DeployError, Registry, Signer, Template,
    TransactionRequest,
    proxy,
    state::{ContractRecords, DeployedContractRecord, PersistMode, StateStore},
    template::{HookContext, resolve_args},
};

/// A deployed (or restored) template.
#[derive(Debug, Clone)]
pub struct DeploymentResult {
    pub name: String,
    pub address: Address,
    /// The handle callers use. For proxies it carries the implementation ABI.
    pub contract: Contract,
    /// The contract's own ABI, as persisted.
    pub abi: Arc<JsonAbi>,
    /// Empty for restored results.
    pub constructor_args: Vec<DynSolValue>,
    pub artifact: Arc<BuildArtifact>,
    /// `None` when restored from state.
    pub transaction_hash: Option<B256>,
}

impl DeploymentResult {
    pub fn is_resumed(&self) -> bool {
        self.transaction_hash.is_none()
    }

    /// The record persisted for this result.
    pub fn record(&self) -> DeployedContractRecord {
        DeployedContractRecord::new(&self.name, self.address, (*self.abi).clone())
    }
}

/// Results in resolution order, indexed by name.
#[derive(Debug, Clone, Default, Deref)]
pub struct Results {
    #[deref]
    entries: Vec<DeploymentResult>,
    index: HashMap<String, usize>,
}

impl Results {
    /// The result named `name`, or [`DeployError::UnknownReference`].
    pub fn get(&self, name: &str) -> Result<&DeploymentResult> {
        self.find(name)
            .ok_or_else(|| DeployError::UnknownReference(name.to_string()).into())
    }

    pub fn find(&self, name: &str) -> Option<&DeploymentResult> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// The handle of `name`.
    pub fn contract(&self, name: &str) -> Result<Contract> {
        Ok(self.get(name)?.contract.clone())
    }

    pub fn address(&self, name: &str) -> Result<Address> {
        Ok(self.get(name)?.address)
    }

    /// Append `result`. Names are unique, a second insert replaces the first.
    pub fn insert(&mut self, result: DeploymentResult) {
        match self.index.get(&result.name) {
            Some(&i) => self.entries[i] = result,
            None => {
                self.index.insert(result.name.clone(), self.entries.len());
                self.entries.push(result);
            }
        }
    }

    /// Names in resolution order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|r| r.name.as_str())
    }
}

impl<'a> IntoIterator for &'a Results {
    type Item = &'a DeploymentResult;
    type IntoIter = std::slice::Iter<'a, DeploymentResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// What a batch produced.
#[derive(Debug, Clone, Default)]
pub struct DeploymentOutcome {
    /// Every template's result, restored ones included.
    pub results: Results,
    /// Records of the contracts deployed by this batch only.
    pub created: ContractRecords,
}

type Checkpoint<'a> = dyn FnMut(&ContractRecords) -> Result<()> + Send + 'a;

/// Runs registries against a chain.
#[derive(Debug, Clone)]
pub struct DeploymentEngine {
    signer: Arc<dyn Signer>,
    confirmer: Arc<dyn Confirmer>,
}

impl DeploymentEngine {
    pub fn new(signer: Arc<dyn Signer>, confirmer: Arc<dyn Confirmer>) -> Self {
        Self { signer, confirmer }
    }

    pub fn signer(&self) -> &Arc<dyn Signer> {
        &self.signer
    }

    pub fn confirmer(&self) -> &Arc<dyn Confirmer> {
        &self.confirmer
    }

    /// Deploy every template of `registry` that has no record in `existing`.
    pub async fn deploy(
        &self,
        registry: &Registry,
        existing: &ContractRecords,
    ) -> Result<DeploymentOutcome> {
        self.run(registry, existing, &mut |_| Ok(())).await
    }

    /// Like [`Self::deploy`], loading records from `store` and saving them back
    /// according to `mode`.
    pub async fn deploy_persisted(
        &self,
        registry: &Registry,
        store: &mut dyn StateStore,
        mode: PersistMode,
    ) -> Result<DeploymentOutcome> {
        let existing = store.load().context("Failed to load deployment state")?;

        let outcome = match mode {
            PersistMode::PerTemplate => {
                let mut checkpoint = |records: &ContractRecords| store.save(records);
                self.run(registry, &existing, &mut checkpoint).await?
            }
            PersistMode::PerBatch => {
                let outcome = self.run(registry, &existing, &mut |_| Ok(())).await?;
                let mut records = existing;
                records.extend(outcome.created.iter().cloned());
                store
                    .save(&records)
                    .context("Failed to save deployment state")?;
                outcome
            }
        };

        Ok(outcome)
    }

    async fn run(
        &self,
        registry: &Registry,
        existing: &ContractRecords,
        checkpoint: &mut Checkpoint<'_>,
    ) -> Result<DeploymentOutcome> {
        let mut outcome = DeploymentOutcome::default();
        // Records unknown to this registry are carried over untouched.
        let mut persisted = existing.clone();

        tracing::info!(
            templates = registry.len(),
            recorded = existing.len(),
            deployer = %self.signer.address(),
            "Starting deployment batch"
        );

        for template in registry {
            let step = match existing.get(&template.name) {
                Some(record) => self.restore(template, record, &outcome.results),
                None => self.deploy_template(template, &outcome.results).await,
            };

            let result = match step {
                Ok(result) => result,
                Err(err) => {
                    let completed: Vec<&str> = outcome.created.iter().map(|r| r.name.as_str()).collect();
                    tracing::error!(
                        template = %template.name,
                        ?completed,
                        error = %err,
                        "Deployment batch aborted"
                    );
                    return Err(err);
                }
            };

            if !result.is_resumed() {
                let record = result.record();
                persisted.insert(record.clone());
                outcome.created.insert(record);
                checkpoint(&persisted)
                    .with_context(|| format!("Failed to persist state after {}", template.name))?;
            }
            outcome.results.insert(result);
        }

        tracing::info!(
            deployed = outcome.created.len(),
            resumed = outcome.results.len() - outcome.created.len(),
            "Deployment batch finished"
        );

        Ok(outcome)
    }

    /// Rebuild a result from its record. Proxy wiring still applies.
    fn restore(
        &self,
        template: &Template,
        record: &DeployedContractRecord,
        results: &Results,
    ) -> Result<DeploymentResult> {
        let abi = Arc::new(record.abi.clone());
        let mut result = DeploymentResult {
            name: template.name.clone(),
            address: record.address,
            contract: Contract::new(record.address, abi.clone(), self.signer.clone()),
            abi,
            constructor_args: Vec::new(),
            artifact: template.artifact.clone(),
            transaction_hash: None,
        };

        if let Some(implementation) = &template.proxy_for {
            proxy::wire(&mut result, implementation, results)?;
        }

        tracing::info!(
            template = %template.name,
            address = %record.address,
            "Contract already deployed, skipping"
        );
        Ok(result)
    }

    async fn deploy_template(
        &self,
        template: &Template,
        results: &Results,
    ) -> Result<DeploymentResult> {
        let deployer = self.signer.address();

        let params = template.artifact.constructor_params();
        let mut args = match &template.pre_deploy {
            // The hook may still fill in arguments; `deploy_data` checks the final count.
            Some(_) if template.args.len() <= params.len() => template
                .args
                .iter()
                .zip(params)
                .map(|(source, param)| source.resolve(param, results, deployer))
                .collect::<Result<Vec<_>>>(),
            _ => resolve_args(&template.args, params, results, deployer),
        }
        .with_context(|| format!("Failed to resolve arguments of {}", template.name))?;

        if let Some(hook) = &template.pre_deploy {
            hook(&mut args, results)
                .with_context(|| format!("Pre-deploy hook of {} failed", template.name))?;
        }

        let data = template
            .artifact
            .deploy_data(&args)
            .with_context(|| format!("Failed to encode constructor of {}", template.name))?;

        tracing::info!(template = %template.name, "Deploying contract...");

        let pending = self
            .signer
            .send_transaction(TransactionRequest::create(data))
            .await
            .with_context(|| format!("Failed to submit deployment of {}", template.name))?;

        let receipt = self
            .confirmer
            .watch(pending)
            .await
            .with_context(|| format!("Deployment of {} was not confirmed", template.name))?;

        let address = receipt
            .contract_address
            .ok_or(DeployError::MissingContractAddress(receipt.transaction_hash))?;

        tracing::info!(
            template = %template.name,
            address = %address,
            tx_hash = %receipt.transaction_hash,
            block = receipt.block_number,
            "Contract deployed"
        );

        let abi = Arc::new(template.artifact.abi.clone());
        let mut result = DeploymentResult {
            name: template.name.clone(),
            address,
            contract: Contract::new(address, abi.clone(), self.signer.clone()),
            abi,
            constructor_args: args,
            artifact: template.artifact.clone(),
            transaction_hash: Some(receipt.transaction_hash),
        };

        if let Some(implementation) = &template.proxy_for {
            proxy::wire(&mut result, implementation, results)?;
        }

        let ctx = HookContext {
            results,
            confirmer: self.confirmer.as_ref(),
        };
        for wiring in &template.post_deploy {
            wiring
                .apply(&mut result, ctx)
                .await
                .with_context(|| format!("Post-deploy step of {} failed", template.name))?;
        }

        Ok(result)
    }
}
