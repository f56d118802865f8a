use std::path::PathBuf;

use clap::Parser;
use templar_deploy::{PersistMode, SignerKind};
use tracing::level_filters::LevelFilter;
use url::Url;

#[derive(Parser)]
#[command(name = "templar")]
#[command(
    author,
    version,
    about = "Deploy an ordered set of upgradeable contracts, resuming from earlier runs"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "TEMPLAR_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a Templar.toml configuration file (or the directory containing it).
    ///
    /// If not provided, `<work-dir>/Templar.toml` is used when it exists.
    #[arg(long, alias = "conf", env = "TEMPLAR_CONFIG")]
    pub config: Option<PathBuf>,

    /// The JSON-RPC endpoint of the node to deploy to.
    #[arg(long, alias = "rpc", env = "TEMPLAR_RPC_URL")]
    pub rpc_url: Option<Url>,

    /// Directory holding the deployment state and ABIs.
    #[arg(long, alias = "workdir", env = "TEMPLAR_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Which account signs the transactions (`wallet` or `node`).
    #[arg(long, env = "TEMPLAR_SIGNER")]
    pub signer: Option<SignerKind>,

    /// When deployment records are written (`per-template` or `per-batch`).
    #[arg(long, env = "TEMPLAR_PERSIST")]
    pub persist: Option<PersistMode>,

    /// Path to the solc binary.
    #[arg(long, env = "TEMPLAR_SOLC")]
    pub solc: Option<PathBuf>,

    /// Do not send ether to an empty deployer account.
    #[arg(long, env = "TEMPLAR_NO_FUNDING")]
    pub no_funding: bool,

    /// Skip the governance bootstrap after deploying.
    #[arg(long, env = "TEMPLAR_NO_BOOTSTRAP")]
    pub no_bootstrap: bool,

    /// Redeploy all contracts.
    /// If not provided, contracts recorded by an earlier run are not redeployed.
    #[arg(long, env = "TEMPLAR_REDEPLOY", default_value_t = false)]
    pub redeploy: bool,
}
