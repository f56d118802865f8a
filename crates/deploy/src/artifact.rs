//! Build artifacts (ABI + bytecode) and the compiler output that contains them.

use std::{collections::BTreeMap, sync::Arc};

use alloy_core::{
    dyn_abi::{DynSolValue, JsonAbiExt},
    json_abi::{JsonAbi, Param},
    primitives::Bytes,
};
use anyhow::{Context, Result};
use serde::Deserialize;

use crate::DeployError;

/// A compiled contract: its interface and creation bytecode.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildArtifact {
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

impl BuildArtifact {
    pub fn new(abi: JsonAbi, bytecode: impl Into<Bytes>) -> Self {
        Self {
            abi,
            bytecode: bytecode.into(),
        }
    }

    /// The constructor parameters, empty when the contract declares no constructor.
    pub fn constructor_params(&self) -> &[Param] {
        self.abi
            .constructor()
            .map(|c| c.inputs.as_slice())
            .unwrap_or_default()
    }

    /// Creation payload: bytecode followed by the ABI-encoded constructor arguments.
    pub fn deploy_data(&self, args: &[DynSolValue]) -> Result<Bytes> {
        let encoded = match self.abi.constructor() {
            Some(constructor) => {
                if constructor.inputs.len() != args.len() {
                    return Err(DeployError::ArgumentCount {
                        expected: constructor.inputs.len(),
                        actual: args.len(),
                    }
                    .into());
                }
                constructor
                    .abi_encode_input(args)
                    .context("Failed to encode constructor arguments")?
            }
            None if args.is_empty() => Vec::new(),
            None => {
                return Err(DeployError::ArgumentCount {
                    expected: 0,
                    actual: args.len(),
                }
                .into());
            }
        };

        let mut data = Vec::with_capacity(self.bytecode.len() + encoded.len());
        data.extend_from_slice(&self.bytecode);
        data.extend_from_slice(&encoded);
        Ok(data.into())
    }
}

/// Compiler output: `source path -> contract name -> artifact`.
#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    contracts: BTreeMap<String, BTreeMap<String, Arc<BuildArtifact>>>,
}

impl BuildOutput {
    /// Add an artifact under `path` / `name`.
    pub fn insert(&mut self, path: impl Into<String>, name: impl Into<String>, artifact: BuildArtifact) {
        self.contracts
            .entry(path.into())
            .or_default()
            .insert(name.into(), Arc::new(artifact));
    }

    /// Look up the artifact of contract `name` compiled from `path`.
    pub fn get(&self, path: &str, name: &str) -> Result<Arc<BuildArtifact>> {
        self.contracts
            .get(path)
            .and_then(|contracts| contracts.get(name))
            .cloned()
            .ok_or_else(|| DeployError::UnknownArtifact(format!("{path}:{name}")).into())
    }

    /// Look up an artifact by its `path:Name` identifier.
    pub fn resolve(&self, id: &str) -> Result<Arc<BuildArtifact>> {
        let (path, name) = id
            .rsplit_once(':')
            .ok_or_else(|| DeployError::UnknownArtifact(id.to_string()))?;
        self.get(path, name)
    }

    /// Iterate over `(path, name, artifact)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &Arc<BuildArtifact>)> {
        self.contracts.iter().flat_map(|(path, contracts)| {
            contracts
                .iter()
                .map(move |(name, artifact)| (path.as_str(), name.as_str(), artifact))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.values().all(BTreeMap::is_empty)
    }

    /// Parse the output of `solc --standard-json`.
    ///
    /// Diagnostics with severity `error` fail the whole build; warnings are logged.
    pub fn from_standard_json(output: &str) -> Result<Self> {
        let output: SolcOutput =
            serde_json::from_str(output).context("Failed to parse solc standard-json output")?;

        let mut errors = Vec::new();
        for diagnostic in &output.errors {
            let message = diagnostic
                .formatted_message
                .as_deref()
                .unwrap_or(&diagnostic.message);
            if diagnostic.severity == "error" {
                errors.push(message.trim().to_string());
            } else {
                tracing::warn!(severity = %diagnostic.severity, "{}", message.trim());
            }
        }
        if !errors.is_empty() {
            return Err(DeployError::Compilation(errors.join("\n")).into());
        }

        let mut build = Self::default();
        for (path, contracts) in output.contracts {
            for (name, contract) in contracts {
                let bytecode = hex::decode(contract.evm.bytecode.object.trim_start_matches("0x"))
                    .with_context(|| format!("Invalid bytecode for {path}:{name}"))?;
                build.insert(path.clone(), name, BuildArtifact::new(contract.abi, bytecode));
            }
        }

        Ok(build)
    }
}

/// Subset of the solc standard-json output we consume.
#[derive(Debug, Deserialize)]
struct SolcOutput {
    #[serde(default)]
    errors: Vec<SolcDiagnostic>,
    #[serde(default)]
    contracts: BTreeMap<String, BTreeMap<String, SolcContract>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolcDiagnostic {
    severity: String,
    message: String,
    #[serde(default)]
    formatted_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SolcContract {
    abi: JsonAbi,
    evm: SolcEvm,
}

#[derive(Debug, Deserialize)]
struct SolcEvm {
    bytecode: SolcBytecode,
}

#[derive(Debug, Deserialize)]
struct SolcBytecode {
    object: String,
}
