//! Solidity compilation through `solc --standard-json`.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::{io::AsyncWriteExt, process::Command};

use crate::BuildOutput;

/// Something that turns a set of source files into build artifacts.
pub trait Compiler: Send + Sync {
    fn compile<'a>(&'a self, sources: &'a [String]) -> BoxFuture<'a, Result<BuildOutput>>;
}

/// Configuration for the solc compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolcConfig {
    /// Path to the `solc` binary.
    pub solc: PathBuf,
    /// Directory source paths are relative to.
    pub base_path: PathBuf,
    /// Extra import roots (e.g. `node_modules`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_paths: Vec<PathBuf>,
    /// Whether to enable the optimizer.
    #[serde(default)]
    pub optimize: bool,
}

impl Default for SolcConfig {
    fn default() -> Self {
        Self {
            solc: PathBuf::from("solc"),
            base_path: PathBuf::from("."),
            include_paths: vec![PathBuf::from("node_modules")],
            optimize: false,
        }
    }
}

impl SolcConfig {
    /// Build the standard-json input selecting ABI and creation bytecode for every contract.
    pub fn standard_json_input(&self, sources: &[String]) -> Value {
        let sources: serde_json::Map<String, Value> = sources
            .iter()
            .map(|path| (path.clone(), json!({ "urls": [path] })))
            .collect();

        json!({
            "language": "Solidity",
            "sources": sources,
            "settings": {
                "optimizer": { "enabled": self.optimize },
                "outputSelection": {
                    "*": { "*": ["abi", "evm.bytecode.object"] }
                }
            }
        })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.solc);
        cmd.arg("--standard-json");
        cmd.arg("--base-path").arg(&self.base_path);
        for include in &self.include_paths {
            cmd.arg("--include-path").arg(self.base_path.join(include));
        }
        cmd.arg("--allow-paths").arg(&self.base_path);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    async fn run(&self, sources: &[String]) -> Result<BuildOutput> {
        tracing::info!(solc = %self.solc.display(), sources = ?sources, "Compiling contracts...");

        let input = serde_json::to_vec(&self.standard_json_input(sources))
            .context("Failed to serialize solc input")?;

        let mut child = self
            .command()
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.solc.display()))?;

        let mut stdin = child.stdin.take().context("solc stdin not captured")?;
        stdin
            .write_all(&input)
            .await
            .context("Failed to write solc input")?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for solc")?;

        if !output.status.success() {
            anyhow::bail!(
                "solc exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let stdout = String::from_utf8(output.stdout).context("solc output is not UTF-8")?;
        let build = BuildOutput::from_standard_json(&stdout)?;

        tracing::info!(contracts = build.iter().count(), "Compilation finished");
        Ok(build)
    }

    /// Resolve `path` against the base path, for existence checks.
    pub fn source_path(&self, path: &str) -> PathBuf {
        Path::new(&self.base_path).join(path)
    }
}

impl Compiler for SolcConfig {
    fn compile<'a>(&'a self, sources: &'a [String]) -> BoxFuture<'a, Result<BuildOutput>> {
        Box::pin(self.run(sources))
    }
}
