//! Error conditions surfaced by the deployment pipeline.
//!
//! Everything propagates as [`anyhow::Error`]; the variants below are the ones callers
//! may want to match on (via `downcast_ref`).

use alloy_core::primitives::B256;

/// Typed deployment failures.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Two templates in the same registry share a name.
    #[error("duplicate template name `{0}`")]
    DuplicateName(String),

    /// A template carries no bytecode to deploy.
    #[error("template `{0}` has no bytecode")]
    MissingArtifact(String),

    /// A typed reference points at a template declared later in the registry.
    #[error("template `{template}` references `{reference}`, which is declared after it")]
    ForwardReference { template: String, reference: String },

    /// A lookup for a name that has not been resolved (yet).
    #[error("no deployed contract named `{0}`")]
    UnknownReference(String),

    /// A `path:Name` artifact identifier that is not in the build output.
    #[error("no build artifact `{0}`")]
    UnknownArtifact(String),

    /// No function with the given name and arity in a contract ABI.
    #[error("no function `{method}` taking {arity} argument(s) in ABI of {contract}")]
    UnknownMethod {
        contract: String,
        method: String,
        arity: usize,
    },

    /// The number of supplied arguments does not match the ABI.
    #[error("expected {expected} argument(s), got {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    /// The compiler reported errors.
    #[error("compilation failed:\n{0}")]
    Compilation(String),

    /// A transaction was mined but reverted.
    #[error("transaction {0} reverted")]
    TransactionReverted(B256),

    /// A transaction receipt never showed up.
    #[error("transaction {0} was not confirmed in time")]
    ConfirmationTimeout(B256),

    /// A contract-creation receipt without a contract address.
    #[error("receipt of transaction {0} has no contract address")]
    MissingContractAddress(B256),

    /// Another process holds the state directory lock.
    #[error("state directory {0} is locked by another run")]
    StateLocked(String),
}
