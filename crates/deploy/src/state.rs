//! Persisted deployment state.
//!
//! The JSON store keeps everything in a single `deployments.json` inside the work
//! directory:
//!
//! ```json
//! {
//!   "account": { "address": "0x..", "privateKey": "0x..", "mnemonic": "..", "index": 0 },
//!   "contracts": { "DaoToken": { "address": "0x..", "abi": "[{...}]" } }
//! }
//! ```
//!
//! and mirrors every ABI to `abis/<address>`. The presence of a contract record is
//! what makes a later run skip its template.

use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
};

use alloy_core::{json_abi::JsonAbi, primitives::Address};
use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::DeployError;

/// The default name of the state file inside the work directory.
pub const STATE_FILENAME: &str = "deployments.json";
const ABIS_DIR: &str = "abis";
const LOCK_FILENAME: &str = ".templar.lock";

/// A contract deployed by an earlier run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployedContractRecord {
    /// Template name, restored from the map key.
    #[serde(skip)]
    pub name: String,
    pub address: Address,
    /// Stored as a JSON-encoded string.
    #[serde(with = "abi_json")]
    pub abi: JsonAbi,
}

impl DeployedContractRecord {
    pub fn new(name: impl Into<String>, address: Address, abi: JsonAbi) -> Self {
        Self {
            name: name.into(),
            address,
            abi,
        }
    }
}

/// Contract records keyed by template name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, DeployedContractRecord>",
    into = "BTreeMap<String, DeployedContractRecord>"
)]
pub struct ContractRecords(BTreeMap<String, DeployedContractRecord>);

impl From<BTreeMap<String, DeployedContractRecord>> for ContractRecords {
    fn from(mut records: BTreeMap<String, DeployedContractRecord>) -> Self {
        for (name, record) in records.iter_mut() {
            record.name = name.clone();
        }
        Self(records)
    }
}

impl From<ContractRecords> for BTreeMap<String, DeployedContractRecord> {
    fn from(records: ContractRecords) -> Self {
        records.0
    }
}

impl FromIterator<DeployedContractRecord> for ContractRecords {
    fn from_iter<I: IntoIterator<Item = DeployedContractRecord>>(iter: I) -> Self {
        let mut records = Self::default();
        records.extend(iter);
        records
    }
}

impl Extend<DeployedContractRecord> for ContractRecords {
    fn extend<I: IntoIterator<Item = DeployedContractRecord>>(&mut self, iter: I) {
        for record in iter {
            self.insert(record);
        }
    }
}

impl ContractRecords {
    pub fn get(&self, name: &str) -> Option<&DeployedContractRecord> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Insert or replace the record for `record.name`.
    pub fn insert(&mut self, record: DeployedContractRecord) {
        self.0.insert(record.name.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeployedContractRecord> {
        self.0.values()
    }
}

/// The deploying account as persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

/// On-disk layout of `deployments.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentFile {
    #[serde(default)]
    pub account: AccountRecord,
    #[serde(default)]
    pub contracts: ContractRecords,
}

/// When the engine hands records to the store.
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
pub enum PersistMode {
    /// After every template that completes.
    #[default]
    PerTemplate,
    /// Once, after the whole batch succeeded.
    PerBatch,
}

/// Where contract records live between runs.
pub trait StateStore: Send {
    /// Records of earlier runs. Missing or unreadable state yields no records.
    fn load(&mut self) -> Result<ContractRecords>;

    /// Replace the persisted records with `records`.
    fn save(&mut self, records: &ContractRecords) -> Result<()>;
}

/// `deployments.json` + `abis/` in a work directory, locked for the store's lifetime.
#[derive(Debug)]
pub struct JsonStateStore {
    dir: PathBuf,
    file: DeploymentFile,
    _lock: File,
}

impl JsonStateStore {
    /// Open the store in `dir`, creating the directory if needed.
    ///
    /// Fails with [`DeployError::StateLocked`] if another store holds the directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(dir.join(ABIS_DIR))
            .with_context(|| format!("Failed to create state directory {}", dir.display()))?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(LOCK_FILENAME))
            .with_context(|| format!("Failed to open lock file in {}", dir.display()))?;
        lock.try_lock_exclusive()
            .map_err(|_| DeployError::StateLocked(dir.display().to_string()))?;

        let file = Self::read(&dir.join(STATE_FILENAME))?;

        tracing::debug!(
            dir = %dir.display(),
            contracts = file.contracts.len(),
            "State store opened"
        );

        Ok(Self {
            dir,
            file,
            _lock: lock,
        })
    }

    fn read(path: &Path) -> Result<DeploymentFile> {
        if !path.exists() {
            return Ok(DeploymentFile::default());
        }

        let content =
            fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

        match serde_json::from_slice(&content) {
            Ok(file) => Ok(file),
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "State file is not valid, starting from empty state"
                );
                Ok(DeploymentFile::default())
            }
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILENAME)
    }

    pub fn abi_path(&self, address: Address) -> PathBuf {
        self.dir.join(ABIS_DIR).join(address.to_string())
    }

    pub fn account(&self) -> &AccountRecord {
        &self.file.account
    }

    /// Update the account and write the state file.
    pub fn set_account(&mut self, account: AccountRecord) -> Result<()> {
        self.file.account = account;
        self.write()
    }

    /// Write the state file atomically (temp file + rename).
    fn write(&self) -> Result<()> {
        let path = self.state_path();
        let tmp = path.with_extension("json.tmp");

        let content = serde_json::to_string_pretty(&self.file)
            .context("Failed to serialize deployment state")?;
        fs::write(&tmp, content).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to move {} into place", path.display()))?;
        Ok(())
    }

    fn write_abis(&self, records: &ContractRecords) -> Result<()> {
        for record in records.iter() {
            let path = self.abi_path(record.address);
            let abi = serde_json::to_string_pretty(&record.abi)
                .with_context(|| format!("Failed to serialize ABI of {}", record.name))?;
            fs::write(&path, abi).with_context(|| format!("Failed to write {}", path.display()))?;
        }
        Ok(())
    }
}

impl StateStore for JsonStateStore {
    fn load(&mut self) -> Result<ContractRecords> {
        Ok(self.file.contracts.clone())
    }

    fn save(&mut self, records: &ContractRecords) -> Result<()> {
        self.write_abis(records)?;
        self.file.contracts = records.clone();
        self.write()?;

        tracing::debug!(
            path = %self.state_path().display(),
            contracts = records.len(),
            "Deployment state saved"
        );
        Ok(())
    }
}

/// Keeps records in memory. Counts saves.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    records: ContractRecords,
    saves: usize,
}

impl MemoryStateStore {
    pub fn new(records: ContractRecords) -> Self {
        Self { records, saves: 0 }
    }

    pub fn records(&self) -> &ContractRecords {
        &self.records
    }

    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl StateStore for MemoryStateStore {
    fn load(&mut self) -> Result<ContractRecords> {
        Ok(self.records.clone())
    }

    fn save(&mut self, records: &ContractRecords) -> Result<()> {
        self.records = records.clone();
        self.saves += 1;
        Ok(())
    }
}

/// The ABI is embedded as a JSON string. Plain arrays are accepted on read.
mod abi_json {
    use alloy_core::json_abi::JsonAbi;
    use serde::{Deserialize, Deserializer, Serializer, de, ser};

    pub(super) fn serialize<S: Serializer>(abi: &JsonAbi, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = serde_json::to_string(abi).map_err(ser::Error::custom)?;
        serializer.serialize_str(&encoded)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<JsonAbi, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Encoded(String),
            Inline(JsonAbi),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Encoded(encoded) => serde_json::from_str(&encoded).map_err(de::Error::custom),
            Raw::Inline(abi) => Ok(abi),
        }
    }
}
