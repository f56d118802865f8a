use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::Arc};
use url::Url;

use crate::{
    Account, Compiler, ConfirmationConfig, ContractRecords, DeploymentEngine, DeploymentOutcome,
    FundingConfig, JsonStateStore, NodeSigner, PersistMode, ReceiptWatcher, Registry, Signer,
    SolcConfig, StateStore, TemplateSpec, WalletSigner, dao,
    faucet::{eth_to_wei, fund_if_empty},
    rpc::RpcClient,
};

/// The default name for the templar configuration file.
pub const CONFIG_FILENAME: &str = "Templar.toml";

/// How transactions get signed.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SignerKind {
    /// A local key persisted in the state file, funded from the node if empty.
    #[default]
    Wallet,
    /// The node's first unlocked account.
    Node,
}

/// Top-level deployment run.
///
/// This struct contains everything needed to bring a contract system up on a node
/// and can be serialized to/from TOML format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployer {
    /// JSON-RPC endpoint of the node.
    pub rpc_url: Url,
    /// Directory holding the state file, ABIs and configuration.
    pub work_dir: PathBuf,
    /// Which account sends the transactions.
    pub signer: SignerKind,
    /// When deployment records are written.
    pub persist: PersistMode,
    /// How long to wait for the node to answer, in seconds.
    pub node_timeout_secs: u64,
    /// Run the governance bootstrap of the DAO preset after deploying.
    pub bootstrap_dao: bool,

    /// Solidity compiler configuration.
    pub compiler: SolcConfig,
    /// Receipt polling configuration.
    pub confirmations: ConfirmationConfig,
    /// Deployer account funding.
    pub funding: FundingConfig,

    /// Source files to compile, relative to the compiler base path.
    pub sources: Vec<String>,
    /// Templates to deploy, in dependency order.
    pub contracts: Vec<TemplateSpec>,
}

impl Default for Deployer {
    fn default() -> Self {
        Self {
            rpc_url: Url::parse("http://127.0.0.1:8545").expect("static URL is valid"),
            work_dir: default_work_dir(),
            signer: SignerKind::default(),
            persist: PersistMode::default(),
            node_timeout_secs: 60,
            bootstrap_dao: true,
            compiler: SolcConfig::default(),
            confirmations: ConfirmationConfig::default(),
            funding: FundingConfig::default(),
            sources: dao::sources(),
            contracts: dao::templates(dao::DEFAULT_VOTING_PERIOD),
        }
    }
}

/// `<data dir>/templar`, or `./templar-data` when the platform has none.
pub fn default_work_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("templar"))
        .unwrap_or_else(|| PathBuf::from("templar-data"))
}

impl Deployer {
    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &PathBuf) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize deployer config to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file.
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file or directory not found: {}",
                path.display()
            ));
        }

        let config_path = if path.is_dir() {
            path.join(CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        };

        let content = std::fs::read_to_string(config_path)
            .context(format!("Failed to read config from {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;
        tracing::info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Save the configuration to the default location (`Templar.toml` in the work dir).
    pub fn save_config(&self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.work_dir)
            .context(format!("Failed to create {}", self.work_dir.display()))?;
        let config_path = self.work_dir.join(CONFIG_FILENAME);
        self.save_to_file(&config_path)?;
        Ok(config_path)
    }

    /// Fail early on source files the compiler will not find.
    fn check_sources(&self) -> Result<()> {
        if self.sources.is_empty() {
            anyhow::bail!("No source files configured");
        }

        for source in &self.sources {
            let found = std::iter::once(self.compiler.source_path(source))
                .chain(self.compiler.include_paths.iter().map(|include| {
                    self.compiler.base_path.join(include).join(source)
                }))
                .any(|path| path.exists());
            if !found {
                anyhow::bail!(
                    "Source file {} not found under {}",
                    source,
                    self.compiler.base_path.display()
                );
            }
        }
        Ok(())
    }

    /// Resolve the signer, creating and funding the local account if needed.
    async fn signer(
        &self,
        rpc: &RpcClient,
        store: &mut JsonStateStore,
        confirmer: &ReceiptWatcher,
        chain_id: u64,
    ) -> Result<Arc<dyn Signer>> {
        match self.signer {
            SignerKind::Node => Ok(Arc::new(NodeSigner::from_node_account(rpc.clone(), 0).await?)),
            SignerKind::Wallet => {
                let account = Account::load_or_create(store.account());
                store
                    .set_account(account.record())
                    .context("Failed to persist deployer account")?;

                if self.funding.enabled {
                    fund_if_empty(
                        rpc,
                        confirmer,
                        account.address(),
                        eth_to_wei(self.funding.amount_eth),
                    )
                    .await?;
                }

                Ok(Arc::new(WalletSigner::new(
                    rpc.clone(),
                    account.signer().clone(),
                    chain_id,
                )))
            }
        }
    }

    /// Compile, deploy what is missing and persist the result.
    ///
    /// With `redeploy`, records of earlier runs are discarded first.
    pub async fn deploy(self, redeploy: bool) -> Result<DeploymentOutcome> {
        tracing::info!(
            rpc_url = %self.rpc_url,
            work_dir = %self.work_dir.display(),
            "Starting deployment process..."
        );

        self.check_sources()?;

        let mut store = JsonStateStore::open(&self.work_dir)?;
        if redeploy {
            tracing::warn!("Discarding existing deployment records");
            store.save(&ContractRecords::default())?;
        }

        let rpc = RpcClient::new(self.rpc_url.clone())?;
        let chain_id = rpc
            .wait_for_node(self.node_timeout_secs)
            .await
            .with_context(|| format!("Node at {} is not reachable", self.rpc_url))?;
        tracing::info!(chain_id, "Connected to node");

        let confirmer = Arc::new(ReceiptWatcher::new(rpc.clone(), self.confirmations));
        let signer = self
            .signer(&rpc, &mut store, &confirmer, chain_id)
            .await?;
        tracing::info!(address = %signer.address(), kind = %self.signer, "Deployer account ready");

        let build = self.compiler.compile(&self.sources).await?;
        let registry = Registry::from_manifest(&self.contracts, &build)?;

        let engine = DeploymentEngine::new(signer, confirmer);
        let outcome = engine
            .deploy_persisted(&registry, &mut store, self.persist)
            .await?;

        if self.bootstrap_dao {
            if outcome.results.find(dao::GOVERNOR_PROXY).is_some() {
                tracing::info!(deployer = %engine.signer().address(), "Bootstrapping governance...");
                dao::bootstrap(&outcome.results, engine.confirmer().as_ref()).await?;
            } else {
                tracing::warn!("Governance bootstrap enabled but the DAO templates are not deployed, skipping");
            }
        }

        tracing::info!(
            state = %store.state_path().display(),
            "✓ Deployment complete!"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_config_round_trip() {
        let dir = TempDir::new("templar-config").unwrap();
        let deployer = Deployer {
            work_dir: dir.path().to_path_buf(),
            signer: SignerKind::Node,
            persist: PersistMode::PerBatch,
            ..Default::default()
        };

        let path = deployer.save_config().unwrap();
        assert_eq!(path, dir.path().join(CONFIG_FILENAME));

        let loaded = Deployer::load_from_file(&dir.path().to_path_buf()).unwrap();
        assert_eq!(loaded, deployer);
    }

    #[test]
    fn test_load_missing_config() {
        assert!(Deployer::load_from_file(&PathBuf::from("/nonexistent/Templar.toml")).is_err());
    }

    #[test]
    fn test_default_deploys_dao_preset() {
        let deployer = Deployer::default();
        assert_eq!(deployer.contracts.len(), 6);
        assert_eq!(deployer.signer, SignerKind::Wallet);
        assert_eq!(deployer.persist, PersistMode::PerTemplate);
    }

    #[test]
    fn test_missing_sources_rejected() {
        let dir = TempDir::new("templar-sources").unwrap();
        let deployer = Deployer {
            compiler: SolcConfig {
                base_path: dir.path().to_path_buf(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(deployer.check_sources().is_err());

        for source in &deployer.sources {
            let path = dir.path().join(source);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "// SPDX-License-Identifier: MIT").unwrap();
        }
        assert!(deployer.check_sources().is_ok());
    }

    #[test]
    fn test_signer_kind_parse() {
        assert_eq!("node".parse::<SignerKind>().unwrap(), SignerKind::Node);
        assert!("ledger".parse::<SignerKind>().is_err());
    }
}
