//! Engine tests against an in-memory chain.
//!
//! Run with: cargo test --test engine_test

mod common;

use std::sync::Arc;

use alloy_core::{
    dyn_abi::{DynSolValue, JsonAbiExt},
    primitives::{Address, U256},
};
use anyhow::Result;
use common::{DEPLOYER, MockChain};
use tempdir::TempDir;
use templar_deploy::{
    ArgSource, ContractRecords, DeployError, DeploymentEngine, DeploymentOutcome,
    JsonStateStore, MemoryStateStore, PersistMode, Registry, StateStore, Template,
};

/// Initialize tracing for tests (idempotent).
fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}

fn engine(chain: &Arc<MockChain>) -> DeploymentEngine {
    DeploymentEngine::new(chain.clone(), chain.clone())
}

/// `A`, then `B(A.address)`.
fn dependent_pair() -> Registry {
    Registry::new(vec![
        Template::new("A", common::plain()),
        Template::new("B", common::dependent()).arg(ArgSource::address_of("A")),
    ])
    .unwrap()
}

/// `Box` behind a proxy initialized with `initialize(7)`.
fn proxied_box() -> Registry {
    Registry::new(vec![
        Template::new("Box", common::implementation()),
        Template::new("BoxProxy", common::proxy())
            .arg(ArgSource::address_of("Box"))
            .arg(ArgSource::calldata("Box", "initialize", [ArgSource::literal("7")]))
            .proxy_for("Box"),
    ])
    .unwrap()
}

fn deploy_error(err: &anyhow::Error) -> &DeployError {
    err.downcast_ref::<DeployError>()
        .unwrap_or_else(|| panic!("not a deployment error: {err:?}"))
}

#[tokio::test]
async fn test_dependent_constructor_receives_address() -> Result<()> {
    init_test_tracing();

    let chain = MockChain::new();
    let outcome = engine(&chain)
        .deploy(&dependent_pair(), &ContractRecords::default())
        .await?;

    let a = outcome.results.address("A")?;
    let b = outcome.results.address("B")?;
    assert_ne!(a, b);

    let creations = chain.creations();
    assert_eq!(creations.len(), 2);

    // B's init code is its bytecode followed by A's address as the single argument.
    let expected = common::dependent().deploy_data(&[DynSolValue::Address(a)])?;
    assert_eq!(creations[1].data, expected);

    assert_eq!(outcome.created.len(), 2);
    assert_eq!(outcome.created.get("A").unwrap().address, a);
    assert_eq!(outcome.created.get("B").unwrap().address, b);
    assert_eq!(outcome.results.get("B")?.constructor_args, vec![DynSolValue::Address(a)]);
    Ok(())
}

#[tokio::test]
async fn test_second_run_is_idempotent() -> Result<()> {
    let first = engine(&MockChain::new())
        .deploy(&dependent_pair(), &ContractRecords::default())
        .await?;

    let chain = MockChain::new();
    let second = engine(&chain)
        .deploy(&dependent_pair(), &first.created)
        .await?;

    assert!(chain.sent().is_empty());
    assert!(second.created.is_empty());
    for name in ["A", "B"] {
        assert_eq!(second.results.address(name)?, first.results.address(name)?);
        assert!(second.results.get(name)?.is_resumed());
    }
    Ok(())
}

#[tokio::test]
async fn test_resume_deploys_only_missing_templates() -> Result<()> {
    let first = engine(&MockChain::new())
        .deploy(&dependent_pair(), &ContractRecords::default())
        .await?;
    let a = first.results.address("A")?;

    let partial: ContractRecords = first.created.iter().filter(|r| r.name == "A").cloned().collect();

    let chain = MockChain::new();
    let outcome = engine(&chain).deploy(&dependent_pair(), &partial).await?;

    let creations = chain.creations();
    assert_eq!(creations.len(), 1);
    assert_eq!(
        creations[0].data,
        common::dependent().deploy_data(&[DynSolValue::Address(a)])?
    );
    assert_eq!(outcome.results.address("A")?, a);
    assert_eq!(
        outcome.created.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        vec!["B"]
    );
    Ok(())
}

#[tokio::test]
async fn test_hook_reading_later_result_fails() {
    let registry = Registry::new(vec![
        Template::new("T0", common::plain()).pre_deploy(|_args, results| {
            results.get("T1")?;
            Ok(())
        }),
        Template::new("T1", common::plain()),
    ])
    .unwrap();

    let chain = MockChain::new();
    let err = engine(&chain)
        .deploy(&registry, &ContractRecords::default())
        .await
        .unwrap_err();

    assert!(matches!(deploy_error(&err), DeployError::UnknownReference(name) if name == "T1"));
    assert!(chain.sent().is_empty());
}

#[test]
fn test_typed_forward_reference_rejected_at_registration() {
    let err = Registry::new(vec![
        Template::new("B", common::dependent()).arg(ArgSource::address_of("A")),
        Template::new("A", common::plain()),
    ])
    .unwrap_err();

    assert!(matches!(
        deploy_error(&err),
        DeployError::ForwardReference { template, reference } if template == "B" && reference == "A"
    ));
}

#[tokio::test]
async fn test_pre_deploy_hook_rewrites_arguments() -> Result<()> {
    let replacement = Address::repeat_byte(0x77);
    let registry = Registry::new(vec![
        Template::new("A", common::plain()),
        Template::new("B", common::dependent())
            .arg(ArgSource::address_of("A"))
            .pre_deploy(move |args, _results| {
                args[0] = DynSolValue::Address(replacement);
                Ok(())
            }),
    ])?;

    let chain = MockChain::new();
    engine(&chain).deploy(&registry, &ContractRecords::default()).await?;

    assert_eq!(
        chain.creations()[1].data,
        common::dependent().deploy_data(&[DynSolValue::Address(replacement)])?
    );
    Ok(())
}

#[tokio::test]
async fn test_pre_deploy_hook_supplies_all_arguments() -> Result<()> {
    init_test_tracing();

    let registry = Registry::new(vec![
        Template::new("A", common::plain()),
        Template::new("B", common::dependent()).pre_deploy(|args, results| {
            *args = vec![DynSolValue::Address(results.address("A")?)];
            Ok(())
        }),
    ])?;

    let chain = MockChain::new();
    let outcome = engine(&chain).deploy(&registry, &ContractRecords::default()).await?;

    let a = outcome.results.address("A")?;
    assert_eq!(
        chain.creations()[1].data,
        common::dependent().deploy_data(&[DynSolValue::Address(a)])?
    );
    assert_eq!(outcome.results.get("B")?.constructor_args, vec![DynSolValue::Address(a)]);
    Ok(())
}

#[tokio::test]
async fn test_argument_count_checked_after_pre_deploy_hook() {
    let registry = Registry::new(vec![
        Template::new("A", common::plain()),
        Template::new("B", common::dependent()).pre_deploy(|_args, _results| Ok(())),
    ])
    .unwrap();

    let chain = MockChain::new();
    let err = engine(&chain)
        .deploy(&registry, &ContractRecords::default())
        .await
        .unwrap_err();

    assert!(matches!(
        deploy_error(&err),
        DeployError::ArgumentCount { expected: 1, actual: 0 }
    ));
    assert_eq!(chain.creations().len(), 1);
}

#[tokio::test]
async fn test_proxy_handle_targets_proxy_address() -> Result<()> {
    let chain = MockChain::new();
    let outcome = engine(&chain)
        .deploy(&proxied_box(), &ContractRecords::default())
        .await?;

    let implementation = outcome.results.get("Box")?;
    let proxy = outcome.results.get("BoxProxy")?;
    assert_eq!(proxy.contract.address(), proxy.address);
    assert_ne!(proxy.address, implementation.address);

    // The proxy constructor carried the initializer calldata.
    let initialize = implementation.contract.function("initialize", 1)?;
    let calldata = initialize.abi_encode_input(&[DynSolValue::Uint(U256::from(7), 256)])?;
    let expected = common::proxy().deploy_data(&[
        DynSolValue::Address(implementation.address),
        DynSolValue::Bytes(calldata),
    ])?;
    assert_eq!(chain.creations()[1].data, expected);

    // Implementation methods are encoded and sent to the proxy.
    proxy
        .contract
        .send("initialize", &[DynSolValue::Uint(U256::from(8), 256)])
        .await?;
    let calls = chain.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].to, Some(proxy.address));
    assert_eq!(&calls[0].data[..4], initialize.selector().as_slice());

    // The persisted ABI is the proxy's own.
    assert!(outcome.created.get("BoxProxy").unwrap().abi.function("initialize").is_none());
    Ok(())
}

#[tokio::test]
async fn test_resumed_proxy_keeps_implementation_interface() -> Result<()> {
    let first = engine(&MockChain::new())
        .deploy(&proxied_box(), &ContractRecords::default())
        .await?;

    let chain = MockChain::new();
    let outcome = engine(&chain).deploy(&proxied_box(), &first.created).await?;

    let proxy = outcome.results.get("BoxProxy")?;
    assert!(chain.sent().is_empty());
    assert_eq!(proxy.contract.address(), first.results.address("BoxProxy")?);
    assert!(proxy.contract.function("initialize", 1).is_ok());
    Ok(())
}

#[tokio::test]
async fn test_post_deploy_call_and_custom_hook() -> Result<()> {
    let registry = Registry::new(vec![
        Template::new("A", common::plain()),
        Template::new("B", common::dependent())
            .arg(ArgSource::address_of("A"))
            .call("setOwner", [ArgSource::Deployer])
            .post_deploy(|result, ctx| {
                Box::pin(async move {
                    // Talk to B through A's (empty) interface from now on.
                    let a = ctx.results.get("A")?;
                    result.contract = result.contract.with_abi(a.abi.clone());
                    Ok::<_, anyhow::Error>(())
                })
            }),
    ])?;

    let chain = MockChain::new();
    let outcome = engine(&chain).deploy(&registry, &ContractRecords::default()).await?;
    let b = outcome.results.get("B")?;

    let calls = chain.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].to, Some(b.address));
    assert_eq!(
        calls[0].data.to_vec(),
        common::dependent()
            .abi
            .function("setOwner")
            .unwrap()[0]
            .abi_encode_input(&[DynSolValue::Address(DEPLOYER)])?
    );

    assert!(b.contract.function("setOwner", 1).is_err());
    assert!(b.abi.function("setOwner").is_some());
    Ok(())
}

#[tokio::test]
async fn test_post_deploy_failure_aborts_batch() {
    let registry = Registry::new(vec![
        Template::new("A", common::plain()),
        Template::new("B", common::dependent())
            .arg(ArgSource::address_of("A"))
            .call("renounceOwnership", []),
        Template::new("C", common::plain()),
    ])
    .unwrap();

    let chain = MockChain::new();
    let mut store = MemoryStateStore::default();
    let err = engine(&chain)
        .deploy_persisted(&registry, &mut store, PersistMode::PerTemplate)
        .await
        .unwrap_err();

    assert!(matches!(deploy_error(&err), DeployError::UnknownMethod { method, .. } if method == "renounceOwnership"));
    assert_eq!(chain.creations().len(), 2);
    assert!(store.records().contains("A"));
    assert!(!store.records().contains("B"));
}

#[tokio::test]
async fn test_failure_keeps_earlier_records_per_template() {
    let registry = Registry::new(vec![
        Template::new("A", common::plain()),
        Template::new("B", common::dependent()).arg(ArgSource::address_of("A")),
        Template::new("C", common::plain()),
    ])
    .unwrap();

    let chain = MockChain::new();
    chain.revert_creation(1);

    let mut store = MemoryStateStore::default();
    let err = engine(&chain)
        .deploy_persisted(&registry, &mut store, PersistMode::PerTemplate)
        .await
        .unwrap_err();

    assert!(matches!(deploy_error(&err), DeployError::TransactionReverted(_)));
    assert_eq!(store.saves(), 1);
    assert_eq!(store.records().len(), 1);
    assert!(store.records().contains("A"));
    assert_eq!(chain.creations().len(), 2);
}

#[tokio::test]
async fn test_per_batch_saves_once() -> Result<()> {
    let chain = MockChain::new();
    let mut store = MemoryStateStore::default();
    engine(&chain)
        .deploy_persisted(&dependent_pair(), &mut store, PersistMode::PerBatch)
        .await?;
    assert_eq!(store.saves(), 1);
    assert_eq!(store.records().len(), 2);

    let failing = MockChain::new();
    failing.revert_creation(1);
    let mut store = MemoryStateStore::default();
    assert!(
        engine(&failing)
            .deploy_persisted(&dependent_pair(), &mut store, PersistMode::PerBatch)
            .await
            .is_err()
    );
    assert_eq!(store.saves(), 0);
    Ok(())
}

#[tokio::test]
async fn test_unrelated_records_survive() -> Result<()> {
    let mut existing = engine(&MockChain::new())
        .deploy(&proxied_box(), &ContractRecords::default())
        .await?
        .created;
    let legacy = existing.get("Box").unwrap().clone();
    existing = ContractRecords::default();
    existing.insert(templar_deploy::DeployedContractRecord::new(
        "Legacy",
        legacy.address,
        legacy.abi,
    ));

    let mut store = MemoryStateStore::new(existing);
    engine(&MockChain::new())
        .deploy_persisted(&dependent_pair(), &mut store, PersistMode::PerTemplate)
        .await?;

    assert_eq!(store.records().len(), 3);
    assert!(store.records().contains("Legacy"));
    Ok(())
}

#[tokio::test]
async fn test_json_store_resume_across_runs() -> Result<()> {
    let dir = TempDir::new("templar-engine")?;

    let first: DeploymentOutcome = {
        let mut store = JsonStateStore::open(dir.path())?;
        engine(&MockChain::new())
            .deploy_persisted(&proxied_box(), &mut store, PersistMode::PerTemplate)
            .await?
    };

    let proxy_address = first.results.address("BoxProxy")?;
    assert!(dir.path().join("abis").join(proxy_address.to_string()).exists());

    let mut store = JsonStateStore::open(dir.path())?;
    assert_eq!(store.load()?, first.created);

    let chain = MockChain::new();
    let second = engine(&chain)
        .deploy_persisted(&proxied_box(), &mut store, PersistMode::PerTemplate)
        .await?;

    assert!(chain.sent().is_empty());
    assert_eq!(second.results.address("BoxProxy")?, proxy_address);
    Ok(())
}
