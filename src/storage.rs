//! Persistent key-value state.
//!
//! The store itself only knows strings (`StateStore`). `StoredState` is the
//! typed view the rest of the crate works with; conversion happens here and
//! nowhere else.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Result, KanifyError};

pub const KEY_API_KEY: &str = "apiKey";
pub const KEY_VOCAB: &str = "vocab";
pub const KEY_FORMAT_VERSION: &str = "formatVer";
pub const KEY_REFRESH_TIME: &str = "refreshTime";
pub const KEY_VOCAB_HASH: &str = "vocabHash";
pub const KEY_AUTO_RUN: &str = "autoRun";
pub const KEY_MUST_REFRESH: &str = "mustRefresh";

/// String-keyed durable storage shared by the whole process
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

/// Store kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock()
            .map_err(|_| KanifyError::Storage("state lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock()
            .map_err(|_| KanifyError::Storage("state lock poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock()
            .map_err(|_| KanifyError::Storage("state lock poisoned".to_string()))?;
        values.remove(key);
        Ok(())
    }
}

/// Store persisted as one JSON object on disk.
///
/// The whole file is rewritten on every change (temp file + rename).
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    KanifyError::Storage(format!("Failed to parse {}: {}", path.display(), e))
                })?
            }
        } else {
            BTreeMap::new()
        };

        debug!("Opened state file {} ({} keys)", path.display(), values.len());
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(values)?;
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl StateStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock()
            .map_err(|_| KanifyError::Storage("state lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock()
            .map_err(|_| KanifyError::Storage("state lock poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock()
            .map_err(|_| KanifyError::Storage("state lock poisoned".to_string()))?;
        if values.remove(key).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }
}

/// Refresh bookkeeping kept next to the vocabulary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshState {
    pub format_version: Option<u32>,
    /// Wall-clock minute of the last successful refresh
    pub last_refresh_minute: Option<i64>,
    pub vocab_hash: Option<u64>,
    /// One-shot request to refresh on the next run
    pub force_refresh: bool,
}

/// Typed snapshot of everything in the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredState {
    pub api_key: Option<String>,
    /// Serialized vocabulary, kept raw until someone needs the map
    pub vocab: Option<String>,
    pub refresh: RefreshState,
    pub auto_run: bool,
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparsable value for '{}': {:?}", key, raw);
            None
        }
    }
}

fn parse_flag(raw: Option<String>) -> bool {
    matches!(raw.as_deref().map(str::trim), Some("1") | Some("true"))
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

impl StoredState {
    pub fn load(store: &dyn StateStore) -> Result<Self> {
        let api_key = store.get(KEY_API_KEY)?.filter(|k| !k.is_empty());
        let vocab = store.get(KEY_VOCAB)?;

        let refresh = RefreshState {
            format_version: parse_number(KEY_FORMAT_VERSION, store.get(KEY_FORMAT_VERSION)?),
            last_refresh_minute: parse_number(KEY_REFRESH_TIME, store.get(KEY_REFRESH_TIME)?),
            vocab_hash: parse_number(KEY_VOCAB_HASH, store.get(KEY_VOCAB_HASH)?),
            force_refresh: parse_flag(store.get(KEY_MUST_REFRESH)?),
        };

        Ok(Self {
            api_key,
            vocab,
            refresh,
            auto_run: parse_flag(store.get(KEY_AUTO_RUN)?),
        })
    }

    /// True when a non-blank vocabulary string is stored
    pub fn has_vocab(&self) -> bool {
        self.vocab.as_deref().is_some_and(|v| !v.trim().is_empty())
    }

    pub fn save_api_key(store: &dyn StateStore, api_key: &str) -> Result<()> {
        store.set(KEY_API_KEY, api_key)
    }

    pub fn save_auto_run(store: &dyn StateStore, enabled: bool) -> Result<()> {
        store.set(KEY_AUTO_RUN, flag(enabled))
    }

    pub fn save_force_refresh(store: &dyn StateStore, force: bool) -> Result<()> {
        store.set(KEY_MUST_REFRESH, flag(force))
    }

    /// Persist the result of a successful refresh
    pub fn save_refresh(
        store: &dyn StateStore,
        vocab_json: &str,
        refresh: &RefreshState,
    ) -> Result<()> {
        store.set(KEY_VOCAB, vocab_json)?;
        if let Some(minute) = refresh.last_refresh_minute {
            store.set(KEY_REFRESH_TIME, &minute.to_string())?;
        }
        if let Some(version) = refresh.format_version {
            store.set(KEY_FORMAT_VERSION, &version.to_string())?;
        }
        if let Some(hash) = refresh.vocab_hash {
            store.set(KEY_VOCAB_HASH, &hash.to_string())?;
        }
        Ok(())
    }

    /// Blank the stored vocabulary so the next run has to download it again
    pub fn clear_vocab(store: &dyn StateStore) -> Result<()> {
        store.set(KEY_VOCAB, "")
    }

    /// Forget the vocabulary and all refresh bookkeeping
    pub fn clear_all_vocab_data(store: &dyn StateStore) -> Result<()> {
        for key in [KEY_VOCAB, KEY_FORMAT_VERSION, KEY_REFRESH_TIME, KEY_VOCAB_HASH, KEY_MUST_REFRESH] {
            store.remove(key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_store_loads_defaults() {
        let store = MemoryStore::new();
        let state = StoredState::load(&store).unwrap();
        assert_eq!(state, StoredState::default());
        assert!(!state.has_vocab());
    }

    #[test]
    fn test_typed_round_trip() {
        let store = MemoryStore::new();
        StoredState::save_api_key(&store, "0123456789abcdef0123456789abcdef").unwrap();
        StoredState::save_auto_run(&store, true).unwrap();
        StoredState::save_force_refresh(&store, true).unwrap();
        StoredState::save_refresh(&store, r#"{"fire":"火"}"#, &RefreshState {
            format_version: Some(2),
            last_refresh_minute: Some(29_000_000),
            vocab_hash: Some(u64::MAX),
            force_refresh: false,
        }).unwrap();

        let state = StoredState::load(&store).unwrap();
        assert_eq!(state.api_key.as_deref(), Some("0123456789abcdef0123456789abcdef"));
        assert!(state.auto_run);
        assert!(state.has_vocab());
        assert_eq!(state.refresh.format_version, Some(2));
        assert_eq!(state.refresh.last_refresh_minute, Some(29_000_000));
        assert_eq!(state.refresh.vocab_hash, Some(u64::MAX));
        assert!(state.refresh.force_refresh);
    }

    #[test]
    fn test_garbage_numbers_are_treated_as_absent() {
        let store = MemoryStore::new();
        store.set(KEY_FORMAT_VERSION, "two").unwrap();
        store.set(KEY_REFRESH_TIME, "").unwrap();
        let state = StoredState::load(&store).unwrap();
        assert_eq!(state.refresh.format_version, None);
        assert_eq!(state.refresh.last_refresh_minute, None);
    }

    #[test]
    fn test_clear_vocab_leaves_blank_value() {
        let store = MemoryStore::new();
        store.set(KEY_VOCAB, r#"{"fire":"火"}"#).unwrap();
        StoredState::clear_vocab(&store).unwrap();
        assert_eq!(store.get(KEY_VOCAB).unwrap().as_deref(), Some(""));
        assert!(!StoredState::load(&store).unwrap().has_vocab());
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.path(), path.as_path());
        store.set(KEY_AUTO_RUN, "1").unwrap();
        store.set(KEY_VOCAB, r#"{"fire":"火"}"#).unwrap();
        store.remove(KEY_VOCAB).unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get(KEY_AUTO_RUN).unwrap().as_deref(), Some("1"));
        assert_eq!(reopened.get(KEY_VOCAB).unwrap(), None);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(FileStore::open(&path), Err(KanifyError::Storage(_))));
    }
}
