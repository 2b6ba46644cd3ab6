// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Substitution settings and their storage port.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::host::UniverseKind;

/// Housekeeping attributes that are never captured or replayed.
pub const DEFAULT_DENY_LIST: &[&str] = &[
    "hide_flags",
    "script",
    "host",
    "prefab_source",
    "prefab_instance",
    "prefab_asset",
    "instance_id",
];

/// Settings for one [`crate::Substitutor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubstitutionConfig {
    /// Owner objects scanned for inbound references.
    pub universe: UniverseKind,
    /// Attribute names skipped by state capture.
    pub deny_list: Vec<String>,
    /// Also redirect references to blockers onto their restored identity.
    pub rewire_blocker_references: bool,
}

impl Default for SubstitutionConfig {
    fn default() -> Self {
        Self {
            universe: UniverseKind::default(),
            deny_list: DEFAULT_DENY_LIST.iter().map(|s| (*s).to_owned()).collect(),
            rewire_blocker_references: true,
        }
    }
}

/// Where [`SubstitutionConfig`] documents live. Implemented by the embedding
/// tool (a settings file, a project database); the engine never does I/O.
pub trait ConfigStore {
    /// Bytes stored under `key`.
    ///
    /// # Errors
    /// Returns [`ConfigError::NotFound`] when nothing is stored under `key`,
    /// or any store-specific failure.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Replaces whatever is stored under `key`.
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] or [`ConfigError::Other`] when the store
    /// cannot write.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Failure loading or saving a [`SubstitutionConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Nothing stored under the key.
    #[error("config not found")]
    NotFound,
    /// The store's backing medium failed.
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),
    /// The stored document is not valid config JSON.
    #[error("config document: {0}")]
    Serde(#[from] serde_json::Error),
    /// Store-specific failure.
    #[error("config store: {0}")]
    Other(String),
}

impl SubstitutionConfig {
    /// Parses a JSON document; absent fields take their defaults.
    ///
    /// # Errors
    /// Returns [`ConfigError::Serde`] for malformed JSON or unknown enum
    /// values.
    pub fn from_json(data: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Loads the config stored under `key`, or the defaults when it is
    /// missing or empty.
    ///
    /// # Errors
    /// Propagates store failures other than [`ConfigError::NotFound`], and
    /// [`ConfigError::Serde`] for a malformed document.
    pub fn load<S: ConfigStore + ?Sized>(store: &S, key: &str) -> Result<Self, ConfigError> {
        match store.load_raw(key) {
            Ok(bytes) if bytes.is_empty() => Ok(Self::default()),
            Ok(bytes) => Self::from_json(&bytes),
            Err(ConfigError::NotFound) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Persists the config under `key` as pretty JSON.
    ///
    /// # Errors
    /// Propagates the store's write failure.
    pub fn save<S: ConfigStore + ?Sized>(&self, store: &S, key: &str) -> Result<(), ConfigError> {
        let data = serde_json::to_vec_pretty(self)?;
        store.save_raw(key, &data)
    }
}
