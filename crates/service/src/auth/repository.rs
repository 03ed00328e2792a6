use async_trait::async_trait;
use serde_json::Value;

use super::domain::UserRecord;
use super::errors::AuthError;
use crate::errors::StoreError;
use crate::storage::{BlockingJsonStore, JsonStore};

/// Repository abstraction for the user directory (key = username).
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, AuthError>;
    /// Store `record` under its username unless that name is taken, and wait
    /// until the store has finished persisting it (per its auto-save
    /// setting). The check and the insert are one atomic step; `Ok(false)`
    /// means another record already holds the name.
    async fn insert_user(&self, record: &UserRecord) -> Result<bool, AuthError>;
}

/// Blocking counterpart of [`UserDirectory`].
pub trait BlockingUserDirectory {
    fn find_user(&mut self, username: &str) -> Result<Option<UserRecord>, AuthError>;
    /// Insert-if-absent, as in [`UserDirectory::insert_user`].
    fn insert_user(&mut self, record: &UserRecord) -> Result<bool, AuthError>;
}

fn decode_record(username: &str, value: Value) -> Result<UserRecord, AuthError> {
    serde_json::from_value(value).map_err(|e| AuthError::Corrupt {
        username: username.to_string(),
        reason: e.to_string(),
    })
}

fn encode_record(record: &UserRecord) -> Result<Value, AuthError> {
    serde_json::to_value(record).map_err(|e| AuthError::Store(StoreError::Encode(e)))
}

// A store used as a directory shares its key space with anything else kept
// in it; usernames are not namespaced.
#[async_trait]
impl UserDirectory for JsonStore {
    async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, AuthError> {
        match self.get(username).await? {
            Some(value) => decode_record(username, value).map(Some),
            None => Ok(None),
        }
    }

    async fn insert_user(&self, record: &UserRecord) -> Result<bool, AuthError> {
        let value = encode_record(record)?;
        Ok(self.set_if_absent(record.username.clone(), value).await?)
    }
}

impl BlockingUserDirectory for BlockingJsonStore {
    fn find_user(&mut self, username: &str) -> Result<Option<UserRecord>, AuthError> {
        match self.get(username)? {
            Some(value) => decode_record(username, value.clone()).map(Some),
            None => Ok(None),
        }
    }

    fn insert_user(&mut self, record: &UserRecord) -> Result<bool, AuthError> {
        let value = encode_record(record)?;
        Ok(self.set_if_absent(record.username.clone(), value)?)
    }
}

/// Simple in-memory mock directory for tests and doc examples
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn insert_absent(users: &mut HashMap<String, UserRecord>, record: &UserRecord) -> bool {
        if users.contains_key(&record.username) {
            return false;
        }
        users.insert(record.username.clone(), record.clone());
        true
    }

    #[derive(Default)]
    pub struct MockUserDirectory {
        users: Mutex<HashMap<String, UserRecord>>, // key: username
    }

    impl MockUserDirectory {
        /// Drop a record behind the auth service's back.
        pub fn remove_user(&self, username: &str) -> Option<UserRecord> {
            self.users.lock().unwrap().remove(username)
        }

        pub fn len(&self) -> usize {
            self.users.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    #[async_trait]
    impl UserDirectory for MockUserDirectory {
        async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, AuthError> {
            let users = self.users.lock().unwrap();
            Ok(users.get(username).cloned())
        }

        async fn insert_user(&self, record: &UserRecord) -> Result<bool, AuthError> {
            let mut users = self.users.lock().unwrap();
            Ok(insert_absent(&mut users, record))
        }
    }

    impl BlockingUserDirectory for MockUserDirectory {
        fn find_user(&mut self, username: &str) -> Result<Option<UserRecord>, AuthError> {
            Ok(self.users.get_mut().unwrap().get(username).cloned())
        }

        fn insert_user(&mut self, record: &UserRecord) -> Result<bool, AuthError> {
            Ok(insert_absent(self.users.get_mut().unwrap(), record))
        }
    }
}
