//! Persistent key-value state: the session identifier and a few flags.
//!
//! The session identifier is created the first time it is asked for and then
//! kept for as long as the underlying store survives. It is never rotated
//! automatically.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::{Error, Result};

/// Key holding the stable session identifier.
pub const SESSION_ID_KEY: &str = "legal_session_id";
/// Key holding whether the premium model has been unlocked.
pub const PREMIUM_UNLOCKED_KEY: &str = "premium_unlocked";
/// Key holding whether the privacy/cookie notice was accepted.
pub const CONSENT_ACCEPTED_KEY: &str = "cookie_consent";
/// Key holding whether the user passed the access gate.
pub const AUTHENTICATED_KEY: &str = "authenticated";

/// A string-to-string persistent store.
pub trait KeyValueStore: Send {
    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// A store that lives only as long as the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, String>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }
}

/// A store persisted as a JSON object in a single file.
///
/// Every write rewrites the file through a temporary sibling and a rename.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FileStore {
    /// Open the store at `path`, creating it lazily on first write.
    ///
    /// A file that cannot be parsed is logged and treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(values) => values,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable state file");
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                return Err(Error::io(
                    format!("could not read {}: {err}", path.display()),
                    err,
                ));
            }
        };
        Ok(Self { path, values })
    }

    /// The file backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&self.values)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.values.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

/// Typed access to the persisted session state.
pub struct SessionStorage {
    store: Box<dyn KeyValueStore>,
}

impl SessionStorage {
    /// Wrap a key-value store.
    pub fn new(store: impl KeyValueStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    /// Session storage that is not persisted.
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    /// Returns the stable session identifier, creating and persisting it on first use.
    pub fn session_id(&mut self) -> Result<String> {
        if let Some(id) = self.store.get(SESSION_ID_KEY).filter(|id| !id.trim().is_empty()) {
            return Ok(id);
        }
        let id = Uuid::new_v4().to_string();
        self.store.set(SESSION_ID_KEY, &id)?;
        tracing::debug!(session_id = %id, "created session identifier");
        Ok(id)
    }

    fn flag(&self, key: &str) -> bool {
        self.store
            .get(key)
            .map(|value| value.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    fn set_flag(&mut self, key: &str, value: bool) -> Result<()> {
        if value {
            self.store.set(key, "true")
        } else {
            self.store.remove(key)
        }
    }

    /// Returns true if the premium model was unlocked.
    pub fn premium_unlocked(&self) -> bool {
        self.flag(PREMIUM_UNLOCKED_KEY)
    }

    /// Records whether the premium model is unlocked.
    pub fn set_premium_unlocked(&mut self, value: bool) -> Result<()> {
        self.set_flag(PREMIUM_UNLOCKED_KEY, value)
    }

    /// Returns true if the privacy notice was accepted.
    pub fn consent_accepted(&self) -> bool {
        self.flag(CONSENT_ACCEPTED_KEY)
    }

    /// Records whether the privacy notice was accepted.
    pub fn set_consent_accepted(&mut self, value: bool) -> Result<()> {
        self.set_flag(CONSENT_ACCEPTED_KEY, value)
    }

    /// Returns true if the user passed the access gate.
    pub fn authenticated(&self) -> bool {
        self.flag(AUTHENTICATED_KEY)
    }

    /// Records whether the user passed the access gate.
    pub fn set_authenticated(&mut self, value: bool) -> Result<()> {
        self.set_flag(AUTHENTICATED_KEY, value)
    }
}

impl std::fmt::Debug for SessionStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStorage").finish_non_exhaustive()
    }
}
