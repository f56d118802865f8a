//! Preset: an upgradeable governance system (token, timelock, governor) behind
//! ERC1967 proxies, and its one-time access-control bootstrap.

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{U256, keccak256},
};
use anyhow::{Context, Result};

use crate::{ArgSource, Confirmer, Results, TemplateSpec};

pub const TOKEN: &str = "DaoToken";
pub const TOKEN_PROXY: &str = "DaoTokenProxy";
pub const TIMELOCK: &str = "DaoTimelockController";
pub const TIMELOCK_PROXY: &str = "DaoTimelockControllerProxy";
pub const GOVERNOR: &str = "DaoGovernor";
pub const GOVERNOR_PROXY: &str = "DaoGovernorProxy";

/// Source of the ERC1967 proxy every implementation sits behind.
pub const PROXY_SOURCE: &str = "node_modules/@openzeppelin/contracts/proxy/ERC1967/ERC1967Proxy.sol";

/// Tokens minted to the deployer on bootstrap.
pub const INITIAL_SUPPLY: u64 = 100;
/// Voting period, in blocks, passed to the governor initializer.
pub const DEFAULT_VOTING_PERIOD: u64 = 5;

/// Source files the preset compiles.
pub fn sources() -> Vec<String> {
    vec![
        "DaoToken.sol".to_string(),
        "DaoTimelockController.sol".to_string(),
        "DaoGovernor.sol".to_string(),
        PROXY_SOURCE.to_string(),
    ]
}

fn implementation(name: &str) -> TemplateSpec {
    TemplateSpec::new(name, format!("{name}.sol:{name}"))
}

/// An ERC1967 proxy in front of `implementation`, initialized with `initializer`.
fn proxy(name: &str, implementation: &str, initializer: Vec<ArgSource>) -> TemplateSpec {
    let mut spec = TemplateSpec::new(name, format!("{PROXY_SOURCE}:ERC1967Proxy"));
    spec.args = vec![
        ArgSource::address_of(implementation),
        ArgSource::calldata(implementation, "initialize", initializer),
    ];
    spec.proxy_for = Some(implementation.to_string());
    spec
}

/// The six templates of the preset, in dependency order.
pub fn templates(voting_period: u64) -> Vec<TemplateSpec> {
    vec![
        implementation(TOKEN),
        proxy(TOKEN_PROXY, TOKEN, vec![]),
        implementation(TIMELOCK),
        proxy(
            TIMELOCK_PROXY,
            TIMELOCK,
            vec![
                ArgSource::literal("1"),
                ArgSource::literal("[]"),
                ArgSource::literal("[]"),
            ],
        ),
        implementation(GOVERNOR),
        proxy(
            GOVERNOR_PROXY,
            GOVERNOR,
            vec![
                ArgSource::address_of(TOKEN_PROXY),
                ArgSource::address_of(TIMELOCK_PROXY),
                ArgSource::literal("1"),
                ArgSource::literal(voting_period.to_string()),
                ArgSource::literal("0"),
            ],
        ),
    ]
}

fn role(name: &str) -> DynSolValue {
    DynSolValue::FixedBytes(keccak256(name), 32)
}

/// Mint the initial supply and hand control to the timelock.
///
/// Does nothing when the deployer already holds tokens. Returns whether the
/// bootstrap ran.
pub async fn bootstrap(results: &Results, confirmer: &dyn Confirmer) -> Result<bool> {
    let token = results.contract(TOKEN_PROXY)?;
    let timelock = results.contract(TIMELOCK_PROXY)?;
    let governor = results.contract(GOVERNOR_PROXY)?;

    let deployer = DynSolValue::Address(token.signer().address());

    let balance = token
        .call("balanceOf", &[deployer.clone()])
        .await
        .context("Failed to read deployer token balance")?;
    let balance = balance
        .first()
        .and_then(DynSolValue::as_uint)
        .map(|(value, _)| value)
        .unwrap_or_default();
    if !balance.is_zero() {
        tracing::info!(balance = %balance, "Governance already bootstrapped");
        return Ok(false);
    }

    let timelock_address = DynSolValue::Address(timelock.address());
    let governor_address = DynSolValue::Address(governor.address());

    let steps = [
        (
            "Minting initial tokens",
            &token,
            "mint",
            vec![deployer.clone(), DynSolValue::Uint(U256::from(INITIAL_SUPPLY), 256)],
        ),
        (
            "Delegating voting power to deployer",
            &token,
            "delegate",
            vec![deployer.clone()],
        ),
        (
            "Making the timelock owner of the token",
            &token,
            "transferOwnership",
            vec![timelock_address.clone()],
        ),
        (
            "Making the timelock owner of the governor",
            &governor,
            "transferOwnership",
            vec![timelock_address],
        ),
        (
            "Granting proposer role to governor",
            &timelock,
            "grantRole",
            vec![role("PROPOSER_ROLE"), governor_address.clone()],
        ),
        (
            "Granting executor role to governor",
            &timelock,
            "grantRole",
            vec![role("EXECUTOR_ROLE"), governor_address],
        ),
        (
            "Revoking timelock admin role from deployer",
            &timelock,
            "revokeRole",
            vec![role("TIMELOCK_ADMIN_ROLE"), deployer],
        ),
    ];

    for (description, contract, method, args) in steps {
        tracing::info!(contract = %contract.address(), method, "{}...", description);
        contract.execute(method, &args, confirmer).await?;
    }

    tracing::info!("Governance bootstrap complete");
    Ok(true)
}
