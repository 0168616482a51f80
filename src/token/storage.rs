use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::errors::Error;

pub(crate) const ACCESS_TOKEN_KEY: &str = "access_token";
pub(crate) const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub(crate) const TOKEN_TYPE_KEY: &str = "token_type";
pub(crate) const EXPIRES_KEY: &str = "expires";
pub(crate) const REFRESH_EXPIRES_KEY: &str = "refresh_expires";

pub(crate) const ALL_KEYS: [&str; 5] = [
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    TOKEN_TYPE_KEY,
    EXPIRES_KEY,
    REFRESH_EXPIRES_KEY,
];

/// String key-value surface the token store persists through.
pub trait TokenStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, Error>;
    fn set(&self, key: &str, value: &str) -> Result<(), Error>;
    fn remove(&self, key: &str) -> Result<(), Error>;

    /// Applies several writes as one mutation; `None` removes the key.
    fn set_many(&self, entries: &[(&str, Option<String>)]) -> Result<(), Error> {
        entries.iter().try_for_each(|(key, value)| match value {
            Some(value) => self.set(key, value),
            None => self.remove(key),
        })
    }
}

fn apply(values: &mut BTreeMap<String, String>, entries: &[(&str, Option<String>)]) {
    for (key, value) in entries {
        match value {
            Some(value) => values.insert(key.to_string(), value.clone()),
            None => values.remove(*key),
        };
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl TokenStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        self.values().remove(key);
        Ok(())
    }

    fn set_many(&self, entries: &[(&str, Option<String>)]) -> Result<(), Error> {
        apply(&mut self.values(), entries);
        Ok(())
    }
}

/// Persists all keys as one JSON object on disk, rewritten on every mutation.
///
/// Each write goes to a sibling temp file that is then renamed over the target,
/// so readers see either the old document or the new one.
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, Error> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> Result<(), Error> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let staging = self.staging_path();
        std::fs::write(&staging, serde_json::to_vec_pretty(values)?)?;
        std::fs::rename(&staging, &self.path)?;
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn update<F>(&self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let _lock = self
            .lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut values = self.read_all()?;
        f(&mut values);
        self.write_all(&values)
    }
}

impl TokenStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let _lock = self
            .lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        self.update(|values| {
            values.remove(key);
        })
    }

    fn set_many(&self, entries: &[(&str, Option<String>)]) -> Result<(), Error> {
        self.update(|values| apply(values, entries))
    }
}
