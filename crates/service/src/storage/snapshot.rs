//! In-memory mirror of a store file, shared by the blocking and async stores.
//!
//! Everything here is synchronous and I/O free: the stores only decide when
//! to read bytes into a [`Snapshot`] and when to write its encoding back out.

use std::{io, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::errors::StoreError;

/// Root object of a store file. Enumeration follows insertion order.
pub type JsonMap = serde_json::Map<String, Value>;

/// How a store reacts when its file exists but cannot be read or parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadFailurePolicy {
    /// Propagate the failure and leave the snapshot as it was.
    Strict,
    /// Log the failure and continue from an empty mapping.
    Reset,
}

/// Loaded-or-not mapping plus the operations both store variants expose.
#[derive(Debug, Default)]
pub struct Snapshot {
    map: JsonMap,
    loaded: bool,
}

impl Snapshot {
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Replace contents wholesale and mark the snapshot as loaded.
    pub fn replace(&mut self, map: JsonMap) {
        self.map = map;
        self.loaded = true;
    }

    pub fn map(&self) -> &JsonMap {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut JsonMap {
        &mut self.map
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Insert or overwrite. An existing key keeps its enumeration position.
    pub fn insert(&mut self, key: String, value: Value) {
        self.map.insert(key, value);
    }

    /// Insert only when `key` is free. Returns whether the value went in.
    pub fn insert_if_absent(&mut self, key: String, value: Value) -> bool {
        if self.map.contains_key(&key) {
            return false;
        }
        self.map.insert(key, value);
        true
    }

    /// Remove every listed key, preserving the order of the survivors.
    pub fn remove_all<I, K>(&mut self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        for key in keys {
            self.map.shift_remove(key.as_ref());
        }
    }

    pub fn clear(&mut self) {
        self.replace(JsonMap::new());
    }

    /// Keys starting with `prefix`, in enumeration order.
    pub fn list(&self, prefix: &str) -> Vec<String> {
        self.map
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Serialize the full mapping as compact JSON.
    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(&self.map).map_err(StoreError::Encode)
    }
}

/// Turn the outcome of reading a store file into the mapping to install.
///
/// A missing file always yields an empty mapping. Unreadable or malformed
/// content is handled according to `policy`.
pub fn resolve_load(
    path: &Path,
    read: io::Result<Vec<u8>>,
    policy: LoadFailurePolicy,
) -> Result<JsonMap, StoreError> {
    let parsed = match read {
        Ok(bytes) => serde_json::from_slice::<JsonMap>(&bytes).map_err(|source| StoreError::Load {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(JsonMap::new()),
        Err(source) => Err(StoreError::Read { path: path.to_path_buf(), source }),
    };

    match (parsed, policy) {
        (Ok(map), _) => Ok(map),
        (Err(e), LoadFailurePolicy::Strict) => Err(e),
        (Err(e), LoadFailurePolicy::Reset) => {
            warn!(path = %path.display(), error = %e, "store file unusable, starting from an empty snapshot");
            Ok(JsonMap::new())
        }
    }
}
