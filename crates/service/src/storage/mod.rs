//! File-backed JSON key-value stores.
//!
//! [`JsonStore`] (async, tokio) and [`BlockingJsonStore`] (std) share the
//! same contract and the same [`snapshot::Snapshot`] engine. Each instance
//! owns one file. Keys are a single flat namespace: if one instance also
//! serves as a user directory, application keys and usernames collide.
//!
//! **Single-process only.** Saves truncate and overwrite the file in place,
//! so two processes (or a crash mid-write) can leave it clobbered or
//! truncated.

pub mod blocking;
pub mod json_store;
pub mod snapshot;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use blocking::BlockingJsonStore;
pub use json_store::JsonStore;
pub use snapshot::{JsonMap, LoadFailurePolicy};

/// Construction parameters shared by both store variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_filename")]
    pub filename: PathBuf,
    #[serde(default = "default_auto_save")]
    pub auto_save: bool,
    /// Falls back to the variant's own default when unset.
    #[serde(default)]
    pub load_failure: Option<LoadFailurePolicy>,
}

fn default_filename() -> PathBuf { PathBuf::from("db.json") }
fn default_auto_save() -> bool { true }

impl Default for StoreConfig {
    fn default() -> Self {
        Self { filename: default_filename(), auto_save: default_auto_save(), load_failure: None }
    }
}
