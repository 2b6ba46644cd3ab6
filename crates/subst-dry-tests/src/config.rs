// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Config store fake: substitution settings kept in memory.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use subst_core::{ConfigError, ConfigStore};

/// [`ConfigStore`] backed by a shared in-memory map.
///
/// Clones share one map, so a test can give a clone to the code under test
/// and inspect the original. Every `load_raw`/`save_raw` attempt is counted,
/// including the ones made to fail with [`Self::set_fail_on_load`] or
/// [`Self::set_fail_on_save`].
///
/// # Example
///
/// ```
/// use subst_dry_tests::InMemoryConfigStore;
/// use subst_core::SubstitutionConfig;
///
/// let store = InMemoryConfigStore::new();
/// SubstitutionConfig::default().save(&store, "substitution").unwrap();
/// assert_eq!(store.save_count(), 1);
/// assert!(store.contains_key("substitution"));
/// ```
#[derive(Clone, Default)]
pub struct InMemoryConfigStore {
    state: Arc<Mutex<StoreState>>,
}

#[derive(Default)]
struct StoreState {
    blobs: BTreeMap<String, Vec<u8>>,
    loads: usize,
    saves: usize,
    refuse_loads: bool,
    refuse_saves: bool,
}

impl InMemoryConfigStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `data` under `key`, as if saved earlier.
    pub fn with_entry(key: &str, data: &[u8]) -> Self {
        let store = Self::new();
        store.state().blobs.insert(key.to_owned(), data.to_vec());
        store
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes every later `load_raw` fail with [`ConfigError::Other`].
    pub fn set_fail_on_load(&self, fail: bool) {
        self.state().refuse_loads = fail;
    }

    /// Makes every later `save_raw` fail with [`ConfigError::Other`].
    pub fn set_fail_on_save(&self, fail: bool) {
        self.state().refuse_saves = fail;
    }

    /// `load_raw` attempts so far.
    pub fn load_count(&self) -> usize {
        self.state().loads
    }

    /// `save_raw` attempts so far.
    pub fn save_count(&self) -> usize {
        self.state().saves
    }

    /// Whether a blob is stored under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.state().blobs.contains_key(key)
    }

    /// Raw bytes stored under `key`.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.state().blobs.get(key).cloned()
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        let mut state = self.state();
        state.loads += 1;
        if state.refuse_loads {
            return Err(ConfigError::Other(format!("load of {key} refused")));
        }
        state.blobs.get(key).cloned().ok_or(ConfigError::NotFound)
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        let mut state = self.state();
        state.saves += 1;
        if state.refuse_saves {
            return Err(ConfigError::Other(format!("save of {key} refused")));
        }
        state.blobs.insert(key.to_owned(), data.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use subst_core::{SubstitutionConfig, UniverseKind};

    #[test]
    fn saved_config_is_pretty_json() {
        let store = InMemoryConfigStore::new();
        let cfg = SubstitutionConfig {
            universe: UniverseKind::ActiveContext,
            ..SubstitutionConfig::default()
        };
        cfg.save(&store, "subst").unwrap();
        let text = String::from_utf8(store.raw("subst").unwrap()).unwrap();
        assert!(text.contains("\"active_context\""));
        assert!(text.contains('\n'));
        assert_eq!(SubstitutionConfig::load(&store, "subst").unwrap(), cfg);
        assert_eq!((store.save_count(), store.load_count()), (1, 1));
    }

    #[test]
    fn missing_key_is_not_found() {
        let store = InMemoryConfigStore::new();
        assert!(matches!(store.load_raw("missing"), Err(ConfigError::NotFound)));
    }

    #[test]
    fn refused_calls_are_counted_and_store_nothing() {
        let store = InMemoryConfigStore::new();
        store.set_fail_on_save(true);
        store.set_fail_on_load(true);
        assert!(matches!(store.save_raw("k", b"v"), Err(ConfigError::Other(_))));
        assert!(matches!(store.load_raw("k"), Err(ConfigError::Other(_))));
        assert_eq!((store.save_count(), store.load_count()), (1, 1));
        assert!(!store.contains_key("k"));
    }

    #[test]
    fn clones_share_one_map() {
        let original = InMemoryConfigStore::with_entry("seed", b"{}");
        let handle = original.clone();
        handle.save_raw("shared", b"x").unwrap();
        assert_eq!(original.raw("shared").unwrap(), b"x");
        assert_eq!(original.raw("seed").unwrap(), b"{}");
        assert_eq!(original.save_count(), 1);
    }
}
