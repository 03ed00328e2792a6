use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use super::snapshot::{self, JsonMap, LoadFailurePolicy, Snapshot};
use super::StoreConfig;
use crate::errors::StoreError;

/// Blocking JSON file-backed key-value store.
///
/// Same contract as [`super::JsonStore`], but every call runs the disk round
/// trip on the calling thread. Reads take `&mut self` because the first
/// access may load the file.
///
/// A malformed or unreadable file is an error by default
/// ([`LoadFailurePolicy::Strict`]), unlike the async store.
#[derive(Debug)]
pub struct BlockingJsonStore {
    snapshot: Snapshot,
    file_path: PathBuf,
    auto_save: bool,
    load_policy: LoadFailurePolicy,
}

impl BlockingJsonStore {
    pub fn new<P: Into<PathBuf>>(path: P, auto_save: bool) -> Self {
        Self {
            snapshot: Snapshot::default(),
            file_path: path.into(),
            auto_save,
            load_policy: LoadFailurePolicy::Strict,
        }
    }

    pub fn from_config(cfg: &StoreConfig) -> Self {
        let store = Self::new(cfg.filename.clone(), cfg.auto_save);
        match cfg.load_failure {
            Some(policy) => store.with_load_policy(policy),
            None => store,
        }
    }

    pub fn with_load_policy(mut self, policy: LoadFailurePolicy) -> Self {
        self.load_policy = policy;
        self
    }

    pub fn open<P: Into<PathBuf>>(path: P, auto_save: bool) -> Result<Self, StoreError> {
        let mut store = Self::new(path, auto_save);
        store.init()?;
        Ok(store)
    }

    pub fn filename(&self) -> &Path {
        &self.file_path
    }

    pub fn auto_save(&self) -> bool {
        self.auto_save
    }

    pub fn init(&mut self) -> Result<&mut Self, StoreError> {
        self.load(false)?;
        Ok(self)
    }

    pub fn reload(&mut self) -> Result<&mut Self, StoreError> {
        self.load(true)?;
        Ok(self)
    }

    #[instrument(skip(self), fields(path = %self.file_path.display()))]
    pub fn save(&mut self) -> Result<(), StoreError> {
        self.load(false)?;
        let data = self.snapshot.encode()?;
        if let Some(parent) = self.file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).ok();
        }
        fs::write(&self.file_path, data)
            .map_err(|source| StoreError::Write { path: self.file_path.clone(), source })?;
        debug!(entries = self.snapshot.len(), "store saved");
        Ok(())
    }

    pub fn get(&mut self, key: &str) -> Result<Option<&Value>, StoreError> {
        self.load(false)?;
        Ok(self.snapshot.get(key))
    }

    pub fn get_as<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get(key)? {
            Some(value) => T::deserialize(value)
                .map(Some)
                .map_err(|e| StoreError::decode(key, e)),
            None => Ok(None),
        }
    }

    pub fn contains(&mut self, key: &str) -> Result<bool, StoreError> {
        self.load(false)?;
        Ok(self.snapshot.contains(key))
    }

    pub fn list(&mut self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.load(false)?;
        Ok(self.snapshot.list(prefix))
    }

    pub fn len(&mut self) -> Result<usize, StoreError> {
        self.load(false)?;
        Ok(self.snapshot.len())
    }

    pub fn is_empty(&mut self) -> Result<bool, StoreError> {
        self.load(false)?;
        Ok(self.snapshot.is_empty())
    }

    /// Shared view of the whole mapping. Mutation goes through `set`,
    /// `set_all` or `update_all`.
    pub fn get_all(&mut self) -> Result<&JsonMap, StoreError> {
        self.load(false)?;
        Ok(self.snapshot.map())
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Result<&mut Self, StoreError> {
        self.load(false)?;
        self.snapshot.insert(key.into(), value);
        self.persist()
    }

    /// Insert only when `key` is free. Persists iff something was inserted.
    pub fn set_if_absent(&mut self, key: impl Into<String>, value: Value) -> Result<bool, StoreError> {
        self.load(false)?;
        let inserted = self.snapshot.insert_if_absent(key.into(), value);
        if inserted {
            self.persist()?;
        }
        Ok(inserted)
    }

    pub fn delete(&mut self, key: &str) -> Result<&mut Self, StoreError> {
        self.delete_multiple([key])
    }

    pub fn delete_multiple<I, K>(&mut self, keys: I) -> Result<&mut Self, StoreError>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        self.load(false)?;
        self.snapshot.remove_all(keys);
        self.persist()
    }

    pub fn empty(&mut self) -> Result<&mut Self, StoreError> {
        self.snapshot.clear();
        self.persist()
    }

    pub fn set_all(&mut self, map: JsonMap) -> Result<&mut Self, StoreError> {
        self.snapshot.replace(map);
        self.persist()
    }

    pub fn update_all<F>(&mut self, f: F) -> Result<&mut Self, StoreError>
    where
        F: FnOnce(&mut JsonMap),
    {
        self.load(false)?;
        f(self.snapshot.map_mut());
        self.persist()
    }

    fn persist(&mut self) -> Result<&mut Self, StoreError> {
        if self.auto_save {
            self.save()?;
        }
        Ok(self)
    }

    fn load(&mut self, force: bool) -> Result<(), StoreError> {
        if self.snapshot.is_loaded() && !force {
            return Ok(());
        }
        let read = fs::read(&self.file_path);
        let map = snapshot::resolve_load(&self.file_path, read, self.load_policy)?;
        debug!(path = %self.file_path.display(), entries = map.len(), "store loaded");
        self.snapshot.replace(map);
        Ok(())
    }
}
