//! Deployment templates: what to deploy, with which arguments, and what to do afterwards.

use std::{fmt, sync::Arc};

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue, Specifier},
    json_abi::Param,
    primitives::Address,
};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::{BuildArtifact, BuildOutput, Confirmer, DeployError, DeploymentResult, Results};

/// Where a constructor or call argument comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgSource {
    /// A string coerced against the parameter type (`"42"`, `"0xabc..."`, `"[1,2]"`).
    Literal(String),
    /// The address of an earlier template.
    AddressOf(String),
    /// The address of the deploying account.
    Deployer,
    /// ABI-encoded call of `method(args)` against an earlier template's interface.
    Calldata {
        target: String,
        method: String,
        #[serde(default)]
        args: Vec<ArgSource>,
    },
    /// An already typed value.
    #[serde(skip)]
    Value(DynSolValue),
}

impl ArgSource {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    pub fn address_of(name: impl Into<String>) -> Self {
        Self::AddressOf(name.into())
    }

    pub fn calldata(
        target: impl Into<String>,
        method: impl Into<String>,
        args: impl IntoIterator<Item = ArgSource>,
    ) -> Self {
        Self::Calldata {
            target: target.into(),
            method: method.into(),
            args: args.into_iter().collect(),
        }
    }

    /// Template names this argument depends on.
    pub fn references(&self) -> Vec<&str> {
        match self {
            Self::AddressOf(name) => vec![name.as_str()],
            Self::Calldata { target, args, .. } => std::iter::once(target.as_str())
                .chain(args.iter().flat_map(ArgSource::references))
                .collect(),
            Self::Literal(_) | Self::Deployer | Self::Value(_) => Vec::new(),
        }
    }

    /// Produce the value for a parameter of type `param`.
    pub fn resolve(&self, param: &Param, results: &Results, deployer: Address) -> Result<DynSolValue> {
        match self {
            Self::Literal(raw) => {
                let ty: DynSolType = param
                    .resolve()
                    .with_context(|| format!("Unsupported parameter type {}", param.ty))?;
                ty.coerce_str(raw)
                    .with_context(|| format!("Cannot parse `{}` as {}", raw, param.ty))
            }
            Self::AddressOf(name) => Ok(DynSolValue::Address(results.get(name)?.address)),
            Self::Deployer => Ok(DynSolValue::Address(deployer)),
            Self::Calldata {
                target,
                method,
                args,
            } => {
                let contract = &results.get(target)?.contract;
                let function = contract.function(method, args.len())?;
                let values = resolve_args(args, &function.inputs, results, deployer)?;
                let data = contract.encode_call(method, &values)?;
                Ok(DynSolValue::Bytes(data.to_vec()))
            }
            Self::Value(value) => Ok(value.clone()),
        }
    }
}

impl From<DynSolValue> for ArgSource {
    fn from(value: DynSolValue) -> Self {
        Self::Value(value)
    }
}

impl From<Address> for ArgSource {
    fn from(address: Address) -> Self {
        Self::Value(DynSolValue::Address(address))
    }
}

/// Resolve `sources` against the parameter list they are meant for.
pub fn resolve_args(
    sources: &[ArgSource],
    params: &[Param],
    results: &Results,
    deployer: Address,
) -> Result<Vec<DynSolValue>> {
    if sources.len() != params.len() {
        return Err(DeployError::ArgumentCount {
            expected: params.len(),
            actual: sources.len(),
        }
        .into());
    }

    sources
        .iter()
        .zip(params)
        .map(|(source, param)| source.resolve(param, results, deployer))
        .collect()
}

/// Hook run right before submission. May rewrite the resolved constructor arguments.
pub type PreDeployHook = Arc<dyn Fn(&mut Vec<DynSolValue>, &Results) -> Result<()> + Send + Sync>;

/// Hook run after confirmation. May replace the handle or send more transactions.
pub type PostDeployHook = Arc<
    dyn for<'a> Fn(&'a mut DeploymentResult, HookContext<'a>) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync,
>;

/// What a post-deploy hook can see besides its own result.
#[derive(Clone, Copy)]
pub struct HookContext<'a> {
    /// Everything resolved before this template.
    pub results: &'a Results,
    pub confirmer: &'a dyn Confirmer,
}

/// An action run after a template's contract is confirmed.
#[derive(Clone)]
pub enum Wiring {
    /// Call `method(args)` on `target` (the template itself when `None`) and wait for it.
    Call {
        target: Option<String>,
        method: String,
        args: Vec<ArgSource>,
    },
    Custom(PostDeployHook),
}

impl fmt::Debug for Wiring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call {
                target,
                method,
                args,
            } => f
                .debug_struct("Call")
                .field("target", target)
                .field("method", method)
                .field("args", args)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Wiring {
    pub fn custom<F>(hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut DeploymentResult, HookContext<'a>) -> BoxFuture<'a, Result<()>>
            + Send
            + Sync
            + 'static,
    {
        Self::Custom(Arc::new(hook))
    }

    pub fn references(&self) -> Vec<&str> {
        match self {
            Self::Call { target, args, .. } => target
                .as_deref()
                .into_iter()
                .chain(args.iter().flat_map(ArgSource::references))
                .collect(),
            Self::Custom(_) => Vec::new(),
        }
    }

    pub(crate) async fn apply(
        &self,
        result: &mut DeploymentResult,
        ctx: HookContext<'_>,
    ) -> Result<()> {
        match self {
            Self::Call {
                target,
                method,
                args,
            } => {
                let contract = match target {
                    Some(target) => ctx.results.contract(target)?,
                    None => result.contract.clone(),
                };
                let deployer = contract.signer().address();
                let function = contract.function(method, args.len())?;
                let values = resolve_args(args, &function.inputs, ctx.results, deployer)?;

                let receipt = contract.execute(method, &values, ctx.confirmer).await?;
                tracing::info!(
                    template = %result.name,
                    contract = %contract.address(),
                    method = %method,
                    tx_hash = %receipt.transaction_hash,
                    "Post-deploy call confirmed"
                );
                Ok(())
            }
            Self::Custom(hook) => hook(result, ctx).await,
        }
    }
}

/// One entry of a [`crate::Registry`].
#[derive(Clone)]
pub struct Template {
    pub name: String,
    pub artifact: Arc<BuildArtifact>,
    pub args: Vec<ArgSource>,
    /// Name of the implementation this template proxies.
    pub proxy_for: Option<String>,
    pub pre_deploy: Option<PreDeployHook>,
    pub post_deploy: Vec<Wiring>,
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("proxy_for", &self.proxy_for)
            .field("pre_deploy", &self.pre_deploy.is_some())
            .field("post_deploy", &self.post_deploy)
            .finish()
    }
}

impl Template {
    pub fn new(name: impl Into<String>, artifact: Arc<BuildArtifact>) -> Self {
        Self {
            name: name.into(),
            artifact,
            args: Vec::new(),
            proxy_for: None,
            pre_deploy: None,
            post_deploy: Vec::new(),
        }
    }

    pub fn arg(mut self, source: impl Into<ArgSource>) -> Self {
        self.args.push(source.into());
        self
    }

    pub fn args(mut self, sources: impl IntoIterator<Item = ArgSource>) -> Self {
        self.args.extend(sources);
        self
    }

    pub fn proxy_for(mut self, implementation: impl Into<String>) -> Self {
        self.proxy_for = Some(implementation.into());
        self
    }

    pub fn pre_deploy<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Vec<DynSolValue>, &Results) -> Result<()> + Send + Sync + 'static,
    {
        self.pre_deploy = Some(Arc::new(hook));
        self
    }

    /// Call `method(args)` on the freshly deployed contract.
    pub fn call(self, method: impl Into<String>, args: impl IntoIterator<Item = ArgSource>) -> Self {
        self.wire(Wiring::Call {
            target: None,
            method: method.into(),
            args: args.into_iter().collect(),
        })
    }

    /// Call `method(args)` on an earlier template.
    pub fn call_on(
        self,
        target: impl Into<String>,
        method: impl Into<String>,
        args: impl IntoIterator<Item = ArgSource>,
    ) -> Self {
        self.wire(Wiring::Call {
            target: Some(target.into()),
            method: method.into(),
            args: args.into_iter().collect(),
        })
    }

    pub fn post_deploy<F>(self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut DeploymentResult, HookContext<'a>) -> BoxFuture<'a, Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.wire(Wiring::custom(hook))
    }

    pub fn wire(mut self, wiring: Wiring) -> Self {
        self.post_deploy.push(wiring);
        self
    }

    /// Every name this template refers to through typed sources.
    pub fn references(&self) -> Vec<&str> {
        self.args
            .iter()
            .flat_map(ArgSource::references)
            .chain(self.proxy_for.as_deref())
            .chain(self.post_deploy.iter().flat_map(Wiring::references))
            .collect()
    }
}

/// Declarative template, as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub name: String,
    /// Artifact identifier, `path:ContractName`.
    pub artifact: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_for: Option<String>,
    /// Calls to make once the contract is confirmed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<CallSpec>,
}

/// A post-deploy call in a [`TemplateSpec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgSource>,
}

impl TemplateSpec {
    pub fn new(name: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artifact: artifact.into(),
            args: Vec::new(),
            proxy_for: None,
            after: Vec::new(),
        }
    }

    /// Source file of the artifact.
    pub fn source(&self) -> &str {
        self.artifact
            .rsplit_once(':')
            .map_or(self.artifact.as_str(), |(path, _)| path)
    }

    /// Resolve the artifact in `build` and turn this into a [`Template`].
    pub fn to_template(&self, build: &BuildOutput) -> Result<Template> {
        let artifact = build
            .resolve(&self.artifact)
            .with_context(|| format!("Template `{}`", self.name))?;

        let mut template = Template::new(&self.name, artifact).args(self.args.iter().cloned());
        template.proxy_for = self.proxy_for.clone();
        for call in &self.after {
            template = template.wire(Wiring::Call {
                target: call.target.clone(),
                method: call.method.clone(),
                args: call.args.clone(),
            });
        }
        Ok(template)
    }
}
