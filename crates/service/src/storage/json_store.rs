use std::{path::{Path, PathBuf}, sync::Arc};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::{
    fs,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use tracing::{debug, instrument};

use super::snapshot::{self, JsonMap, LoadFailurePolicy, Snapshot};
use super::StoreConfig;
use crate::errors::StoreError;

/// Async JSON file-backed key-value store.
///
/// Clones share one snapshot. Mutations are applied under the write guard,
/// which is released before the file write starts, so readers never see a
/// half-applied change. Saves hold a read guard for the duration of the
/// write; two saves may still finish in either order and the last one wins.
///
/// The snapshot is loaded on `init` or on first use, and only re-read on
/// `reload`. Unreadable or malformed files reset to an empty mapping unless
/// the store is switched to [`LoadFailurePolicy::Strict`].
#[derive(Clone)]
pub struct JsonStore {
    inner: Arc<RwLock<Snapshot>>,
    file_path: PathBuf,
    auto_save: bool,
    load_policy: LoadFailurePolicy,
}

impl JsonStore {
    /// Create an unloaded store. Does not touch the disk.
    pub fn new<P: Into<PathBuf>>(path: P, auto_save: bool) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Snapshot::default())),
            file_path: path.into(),
            auto_save,
            load_policy: LoadFailurePolicy::Reset,
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

    /// Create and load in one step.
    pub async fn open<P: Into<PathBuf>>(path: P, auto_save: bool) -> Result<Arc<Self>, StoreError> {
        let store = Self::new(path, auto_save);
        store.init().await?;
        Ok(Arc::new(store))
    }

    pub fn filename(&self) -> &Path {
        &self.file_path
    }

    pub fn auto_save(&self) -> bool {
        self.auto_save
    }

    /// Load the snapshot unless it is already loaded.
    pub async fn init(&self) -> Result<&Self, StoreError> {
        let mut guard = self.inner.write().await;
        self.load_into(&mut guard, false).await?;
        Ok(self)
    }

    /// Re-read the file, discarding in-memory changes.
    pub async fn reload(&self) -> Result<&Self, StoreError> {
        let mut guard = self.inner.write().await;
        self.load_into(&mut guard, true).await?;
        Ok(self)
    }

    /// Overwrite the file with the full snapshot.
    #[instrument(skip(self), fields(path = %self.file_path.display()))]
    pub async fn save(&self) -> Result<(), StoreError> {
        let guard = self.loaded_read().await?;
        let data = guard.encode()?;
        if let Some(parent) = self.file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.ok();
        }
        fs::write(&self.file_path, data)
            .await
            .map_err(|source| StoreError::Write { path: self.file_path.clone(), source })?;
        debug!(entries = guard.len(), "store saved");
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let guard = self.loaded_read().await?;
        Ok(guard.get(key).cloned())
    }

    /// Typed read. `Ok(None)` when the key is absent.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StoreError::decode(key, e)),
            None => Ok(None),
        }
    }

    pub async fn contains(&self, key: &str) -> Result<bool, StoreError> {
        let guard = self.loaded_read().await?;
        Ok(guard.contains(key))
    }

    /// Keys starting with `prefix`, in insertion order.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let guard = self.loaded_read().await?;
        Ok(guard.list(prefix))
    }

    pub async fn len(&self) -> Result<usize, StoreError> {
        let guard = self.loaded_read().await?;
        Ok(guard.len())
    }

    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        let guard = self.loaded_read().await?;
        Ok(guard.is_empty())
    }

    /// Owned copy of the whole mapping; edits to it do not reach the store.
    pub async fn get_all(&self) -> Result<JsonMap, StoreError> {
        let guard = self.loaded_read().await?;
        Ok(guard.map().clone())
    }

    pub async fn set(&self, key: impl Into<String>, value: Value) -> Result<&Self, StoreError> {
        let key = key.into();
        self.mutate(|snap| snap.insert(key, value)).await?;
        Ok(self)
    }

    /// Check-and-insert under one write guard. Returns `false`, and persists
    /// nothing, when the key already exists.
    pub async fn set_if_absent(&self, key: impl Into<String>, value: Value) -> Result<bool, StoreError> {
        let inserted = self.loaded_write().await?.insert_if_absent(key.into(), value);
        if inserted {
            self.persist().await?;
        }
        Ok(inserted)
    }

    pub async fn delete(&self, key: &str) -> Result<&Self, StoreError> {
        self.delete_multiple([key]).await
    }

    /// Remove several keys with a single save.
    pub async fn delete_multiple<I, K>(&self, keys: I) -> Result<&Self, StoreError>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        self.mutate(|snap| snap.remove_all(keys)).await?;
        Ok(self)
    }

    /// Replace the mapping with an empty one. Does not read the file first.
    pub async fn empty(&self) -> Result<&Self, StoreError> {
        self.set_all(JsonMap::new()).await
    }

    /// Replace the mapping wholesale. Does not read the file first.
    pub async fn set_all(&self, map: JsonMap) -> Result<&Self, StoreError> {
        self.inner.write().await.replace(map);
        self.persist().await?;
        Ok(self)
    }

    /// Apply a bulk edit to the live mapping and persist.
    pub async fn update_all<F>(&self, f: F) -> Result<&Self, StoreError>
    where
        F: FnOnce(&mut JsonMap),
    {
        self.mutate(|snap| f(snap.map_mut())).await?;
        Ok(self)
    }

    async fn mutate<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Snapshot),
    {
        let mut guard = self.loaded_write().await?;
        f(&mut *guard);
        drop(guard);
        self.persist().await
    }

    async fn persist(&self) -> Result<(), StoreError> {
        if self.auto_save {
            self.save().await?;
        }
        Ok(())
    }

    async fn loaded_read(&self) -> Result<RwLockReadGuard<'_, Snapshot>, StoreError> {
        {
            let guard = self.inner.read().await;
            if guard.is_loaded() {
                return Ok(guard);
            }
        }
        let guard = self.loaded_write().await?;
        Ok(guard.downgrade())
    }

    async fn loaded_write(&self) -> Result<RwLockWriteGuard<'_, Snapshot>, StoreError> {
        let mut guard = self.inner.write().await;
        self.load_into(&mut guard, false).await?;
        Ok(guard)
    }

    #[instrument(skip(self, snap), fields(path = %self.file_path.display()))]
    async fn load_into(&self, snap: &mut Snapshot, force: bool) -> Result<(), StoreError> {
        if snap.is_loaded() && !force {
            return Ok(());
        }
        let read = fs::read(&self.file_path).await;
        let map = snapshot::resolve_load(&self.file_path, read, self.load_policy)?;
        debug!(entries = map.len(), "store loaded");
        snap.replace(map);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tmp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("json_store_{tag}_{}.json", uuid::Uuid::new_v4()))
    }

    async fn on_disk(path: &Path) -> Option<serde_json::Value> {
        let bytes = fs::read(path).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    #[tokio::test]
    async fn json_store_crud_persists() -> Result<(), anyhow::Error> {
        let tmp = tmp_path("crud");
        let store = JsonStore::open(&tmp, true).await?;

        // initially empty, and no file yet
        assert!(store.is_empty().await?);
        assert!(on_disk(&tmp).await.is_none());

        store.set("a", json!(1)).await?.set("b", json!({"nested": [1, 2]})).await?;
        assert_eq!(store.get("a").await?, Some(json!(1)));
        assert!(store.contains("b").await?);
        assert_eq!(store.get("missing").await?, None);

        store.delete("a").await?;
        let reloaded = JsonStore::open(&tmp, true).await?;
        assert_eq!(reloaded.list("").await?, vec!["b"]);
        assert_eq!(reloaded.get("b").await?, Some(json!({"nested": [1, 2]})));

        let _ = fs::remove_file(&tmp).await;
        Ok(())
    }

    #[tokio::test]
    async fn set_all_round_trips_through_a_fresh_load() -> Result<(), anyhow::Error> {
        let tmp = tmp_path("roundtrip");
        let store = JsonStore::new(&tmp, true);
        let mut map = JsonMap::new();
        map.insert("s".into(), json!("text"));
        map.insert("n".into(), json!(1.5));
        map.insert("o".into(), json!({"k": [true, null]}));
        store.set_all(map.clone()).await?;

        let fresh = JsonStore::new(&tmp, true);
        assert_eq!(fresh.get_all().await?, map);

        let _ = fs::remove_file(&tmp).await;
        Ok(())
    }

    #[tokio::test]
    async fn empty_is_idempotent() -> Result<(), anyhow::Error> {
        let tmp = tmp_path("empty");
        let store = JsonStore::open(&tmp, true).await?;
        store.set("x", json!(1)).await?;

        store.empty().await?;
        assert!(store.get_all().await?.is_empty());
        assert_eq!(on_disk(&tmp).await, Some(json!({})));
        store.empty().await?;
        assert!(store.get_all().await?.is_empty());
        assert_eq!(on_disk(&tmp).await, Some(json!({})));

        let _ = fs::remove_file(&tmp).await;
        Ok(())
    }

    #[tokio::test]
    async fn list_respects_prefix_and_insertion_order() -> Result<(), anyhow::Error> {
        let tmp = tmp_path("list");
        let store = JsonStore::open(&tmp, false).await?;
        store.set("a1", json!(1)).await?.set("a2", json!(2)).await?.set("b1", json!(3)).await?;
        assert_eq!(store.list("a").await?, vec!["a1", "a2"]);
        Ok(())
    }

    #[tokio::test]
    async fn deferred_persistence_waits_for_explicit_save() -> Result<(), anyhow::Error> {
        let tmp = tmp_path("deferred");
        let store = JsonStore::open(&tmp, false).await?;
        store.set("k", json!("v")).await?;
        assert!(on_disk(&tmp).await.is_none());

        store.save().await?;
        assert_eq!(on_disk(&tmp).await, Some(json!({"k": "v"})));

        let _ = fs::remove_file(&tmp).await;
        Ok(())
    }

    #[tokio::test]
    async fn delete_multiple_removes_all_listed_keys() -> Result<(), anyhow::Error> {
        let tmp = tmp_path("delmany");
        let store = JsonStore::open(&tmp, true).await?;
        store.set_all(serde_json::from_value(json!({"a": 1, "b": 2, "c": 3}))?).await?;
        store.delete_multiple(["a", "c", "absent"]).await?;
        assert_eq!(on_disk(&tmp).await, Some(json!({"b": 2})));

        let _ = fs::remove_file(&tmp).await;
        Ok(())
    }

    #[tokio::test]
    async fn get_all_returns_a_detached_copy() -> Result<(), anyhow::Error> {
        let store = JsonStore::new(tmp_path("copy"), false);
        store.set("k", json!(1)).await?;
        let mut copy = store.get_all().await?;
        copy.insert("sneaky".into(), json!(true));
        assert!(!store.contains("sneaky").await?);

        store.update_all(|m| { m.insert("bulk".into(), json!(2)); }).await?;
        assert_eq!(store.get("bulk").await?, Some(json!(2)));
        Ok(())
    }

    #[tokio::test]
    async fn reload_is_explicit() -> Result<(), anyhow::Error> {
        let tmp = tmp_path("reload");
        let store = JsonStore::open(&tmp, false).await?;
        fs::write(&tmp, br#"{"outside":1}"#).await?;

        // already loaded: init does not re-read
        store.init().await?;
        assert!(!store.contains("outside").await?);

        store.reload().await?;
        assert_eq!(store.get("outside").await?, Some(json!(1)));

        let _ = fs::remove_file(&tmp).await;
        Ok(())
    }

    #[tokio::test]
    async fn malformed_file_resets_by_default_and_fails_when_strict() -> Result<(), anyhow::Error> {
        let tmp = tmp_path("malformed");
        fs::write(&tmp, b"{oops").await?;

        let lenient = JsonStore::open(&tmp, false).await?;
        assert!(lenient.is_empty().await?);

        let strict = JsonStore::new(&tmp, false).with_load_policy(LoadFailurePolicy::Strict);
        let err = strict.init().await.err().expect("strict load must fail");
        assert!(matches!(err, StoreError::Load { .. }));
        assert_eq!(err.code(), 2001);

        // replacing the mapping does not need a readable file
        strict.set_all(JsonMap::new()).await?;
        assert!(strict.is_empty().await?);

        let _ = fs::remove_file(&tmp).await;
        Ok(())
    }

    #[tokio::test]
    async fn get_as_decodes_or_reports_shape_errors() -> Result<(), anyhow::Error> {
        let store = JsonStore::new(tmp_path("typed"), false);
        store.set("n", json!(7)).await?;
        assert_eq!(store.get_as::<u32>("n").await?, Some(7));
        assert_eq!(store.get_as::<u32>("none").await?, None);
        let err = store.get_as::<String>("n").await.err().expect("shape mismatch");
        assert!(matches!(err, StoreError::Decode { ref key, .. } if key == "n"));
        Ok(())
    }

    #[tokio::test]
    async fn set_if_absent_keeps_the_first_value() -> Result<(), anyhow::Error> {
        let tmp = tmp_path("absent");
        let store = JsonStore::open(&tmp, true).await?;
        assert!(store.set_if_absent("u", json!("first")).await?);
        assert!(!store.set_if_absent("u", json!("second")).await?);
        assert_eq!(on_disk(&tmp).await, Some(json!({"u": "first"})));

        let _ = fs::remove_file(&tmp).await;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn set_if_absent_admits_one_of_many_racers() -> Result<(), anyhow::Error> {
        let store = Arc::new(JsonStore::new(tmp_path("race"), false));
        let barrier = Arc::new(tokio::sync::Barrier::new(8));
        let mut tasks = Vec::new();
        for i in 0..8 {
            let (s, b) = (Arc::clone(&store), Arc::clone(&barrier));
            tasks.push(tokio::spawn(async move {
                b.wait().await;
                s.set_if_absent("key", json!(i)).await
            }));
        }
        let mut winners = 0;
        for t in tasks {
            if t.await?? {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        Ok(())
    }

    #[tokio::test]
    async fn write_failures_propagate() -> Result<(), anyhow::Error> {
        let dir = std::env::temp_dir().join(format!("json_store_dir_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).await?;

        // the unreadable "file" resets to empty, then the write itself fails
        let store = JsonStore::new(&dir, true);
        let err = store.set("k", json!(1)).await.err().expect("writing over a directory must fail");
        assert!(matches!(err, StoreError::Write { .. }));
        assert_eq!(err.code(), 2101);

        let _ = fs::remove_dir_all(&dir).await;
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_writers_never_lose_in_memory_updates() -> Result<(), anyhow::Error> {
        let tmp = tmp_path("concurrent");
        let store = JsonStore::open(&tmp, true).await?;
        let mut tasks = Vec::new();
        for i in 0..16 {
            let s = Arc::clone(&store);
            tasks.push(tokio::spawn(async move { s.set(format!("k{i}"), json!(i)).await.map(|_| ()) }));
        }
        for t in tasks {
            t.await??;
        }
        assert_eq!(store.len().await?, 16);
        store.save().await?;
        let fresh = JsonStore::new(&tmp, true);
        assert_eq!(fresh.len().await?, 16);

        let _ = fs::remove_file(&tmp).await;
        Ok(())
    }
}
