//! Proxy wiring.
//!
//! A proxy is reached at its own address but speaks its implementation's interface.

use anyhow::{Context, Result};

use crate::{Contract, DeploymentResult, Results};

/// A handle at `proxy`'s address using the ABI of `implementation`.
pub fn handle(proxy: &DeploymentResult, implementation: &DeploymentResult) -> Contract {
    proxy
        .contract
        .with_abi(implementation.contract.abi().clone())
}

/// Replace `proxy`'s handle with one speaking the interface of the result named
/// `implementation`.
pub fn wire(proxy: &mut DeploymentResult, implementation: &str, results: &Results) -> Result<()> {
    let target = results
        .get(implementation)
        .with_context(|| format!("Proxy {} needs implementation {}", proxy.name, implementation))?;

    proxy.contract = handle(proxy, target);

    tracing::debug!(
        proxy = %proxy.name,
        address = %proxy.address,
        implementation = %target.name,
        "Proxy wired to implementation interface"
    );
    Ok(())
}
