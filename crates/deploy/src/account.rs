//! The deploying account.

use alloy_core::primitives::Address;
use alloy_signer_local::{MnemonicBuilder, PrivateKeySigner, coins_bip39::English};
use anyhow::{Context, Result};

use crate::state::AccountRecord;

/// A local key, optionally derived from a mnemonic.
#[derive(Debug, Clone)]
pub struct Account {
    signer: PrivateKeySigner,
    mnemonic: Option<String>,
    index: Option<u32>,
}

impl Account {
    /// Restore an account from a persisted record.
    ///
    /// A mnemonic (with index, default 0, on `m/44'/60'/0'/0/{index}`) takes precedence
    /// over a private key.
    pub fn from_record(record: &AccountRecord) -> Result<Self> {
        if let Some(phrase) = &record.mnemonic {
            let index = record.index.unwrap_or_default();
            let signer = MnemonicBuilder::<English>::default()
                .phrase(phrase.as_str())
                .index(index)
                .context("Invalid derivation index")?
                .build()
                .context("Failed to derive key from mnemonic")?;
            return Ok(Self {
                signer,
                mnemonic: Some(phrase.clone()),
                index: Some(index),
            });
        }

        let key = record
            .private_key
            .as_deref()
            .context("Account record has neither mnemonic nor private key")?;
        let signer: PrivateKeySigner = key.parse().context("Invalid private key")?;

        Ok(Self {
            signer,
            mnemonic: None,
            index: None,
        })
    }

    /// A fresh random key.
    pub fn random() -> Self {
        Self {
            signer: PrivateKeySigner::random(),
            mnemonic: None,
            index: None,
        }
    }

    /// Restore the account in `record`, or create a new one if it is absent or unusable.
    pub fn load_or_create(record: &AccountRecord) -> Self {
        if record == &AccountRecord::default() {
            let account = Self::random();
            tracing::info!(address = %account.address(), "Created new deployer account");
            return account;
        }

        match Self::from_record(record) {
            Ok(account) => {
                if let Some(expected) = record.address.filter(|a| *a != account.address()) {
                    tracing::warn!(
                        stored = %expected,
                        derived = %account.address(),
                        "Stored account address does not match its key, using the key"
                    );
                }
                account
            }
            Err(err) => {
                let account = Self::random();
                tracing::warn!(
                    error = %err,
                    address = %account.address(),
                    "Stored account is unusable, created a new one"
                );
                account
            }
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    /// The record to persist. Mnemonic accounts keep their phrase and index.
    pub fn record(&self) -> AccountRecord {
        AccountRecord {
            address: Some(self.address()),
            private_key: Some(format!("0x{}", hex::encode(self.signer.to_bytes()))),
            mnemonic: self.mnemonic.clone(),
            index: self.index,
        }
    }
}
