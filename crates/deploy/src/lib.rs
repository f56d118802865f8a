//! templar-deploy - Resumable, dependency-ordered contract deployment.
//!
//! This crate compiles a set of Solidity sources, deploys an ordered registry of
//! templates (threading earlier addresses into later constructors and initializers),
//! wires proxies to their implementations and persists what was deployed so that
//! the next run only deploys what is missing.

mod account;
pub use account::Account;

mod artifact;
pub use artifact::{BuildArtifact, BuildOutput};

mod compiler;
pub use compiler::{Compiler, SolcConfig};

mod confirm;
pub use confirm::{ConfirmationConfig, Confirmer, ReceiptWatcher, TransactionReceipt};

mod contract;
pub use contract::Contract;

pub mod dao;

mod deployer;
pub use deployer::{CONFIG_FILENAME, Deployer, SignerKind, default_work_dir};

mod engine;
pub use engine::{DeploymentEngine, DeploymentOutcome, DeploymentResult, Results};

mod error;
pub use error::DeployError;

pub mod faucet;
pub use faucet::FundingConfig;

pub mod proxy;

mod registry;
pub use registry::Registry;

pub mod rpc;

mod signer;
pub use signer::{NodeSigner, PendingTransaction, Signer, TransactionRequest, WalletSigner};

mod state;
pub use state::{
    AccountRecord, ContractRecords, DeployedContractRecord, DeploymentFile, JsonStateStore,
    MemoryStateStore, PersistMode, STATE_FILENAME, StateStore,
};

mod template;
pub use template::{
    ArgSource, CallSpec, HookContext, PostDeployHook, PreDeployHook, Template, TemplateSpec,
    Wiring, resolve_args,
};
