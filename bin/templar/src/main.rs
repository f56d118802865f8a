//! templar deploys a templated, dependency-ordered set of contracts and resumes
//! from the records of earlier runs.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use cli::Cli;
use templar_deploy::{CONFIG_FILENAME, Deployer, DeploymentOutcome, default_work_dir};

/// Layer the configuration: defaults, then the TOML file, then `TEMPLAR_*` variables,
/// then command line flags.
fn load_config(cli: &Cli) -> Result<Deployer> {
    let config_path = match &cli.config {
        Some(path) if !path.exists() => {
            anyhow::bail!("Configuration file or directory not found: {}", path.display())
        }
        Some(path) if path.is_dir() => path.join(CONFIG_FILENAME),
        Some(path) => path.clone(),
        None => cli
            .work_dir
            .clone()
            .unwrap_or_else(default_work_dir)
            .join(CONFIG_FILENAME),
    };

    if config_path.exists() {
        tracing::info!(config_path = %config_path.display(), "Loading configuration file...");
    }

    let mut deployer: Deployer = Figment::from(Serialized::defaults(Deployer::default()))
        .merge(Toml::file(&config_path))
        .merge(Env::prefixed("TEMPLAR_").split("__"))
        .extract()
        .context("Invalid configuration")?;

    if let Some(rpc_url) = &cli.rpc_url {
        deployer.rpc_url = rpc_url.clone();
    }
    if let Some(work_dir) = &cli.work_dir {
        deployer.work_dir = work_dir.clone();
    }
    if let Some(signer) = cli.signer {
        deployer.signer = signer;
    }
    if let Some(persist) = cli.persist {
        deployer.persist = persist;
    }
    if let Some(solc) = &cli.solc {
        deployer.compiler.solc = solc.clone();
    }
    if cli.no_funding {
        deployer.funding.enabled = false;
    }
    if cli.no_bootstrap {
        deployer.bootstrap_dao = false;
    }

    Ok(deployer)
}

fn summary(outcome: &DeploymentOutcome) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Contract", "Address", "Status", "Transaction"]);

    for result in &outcome.results {
        let (status, tx) = match result.transaction_hash {
            Some(hash) => ("deployed", hash.to_string()),
            None => ("resumed", String::from("-")),
        };
        table.add_row(vec![
            result.name.clone(),
            result.address.to_string(),
            status.to_string(),
            tx,
        ]);
    }
    table
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let deployer = load_config(&cli)?;

    tracing::info!(
        rpc_url = %deployer.rpc_url,
        work_dir = %deployer.work_dir.display(),
        signer = %deployer.signer,
        persist = %deployer.persist,
        contracts = deployer.contracts.len(),
        "Configuration resolved"
    );

    // Save the configuration to Templar.toml before deploying
    deployer.save_config()?;

    let outcome = deployer.deploy(cli.redeploy).await?;

    println!("{}", summary(&outcome));

    Ok(())
}
