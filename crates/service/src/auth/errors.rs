use thiserror::Error;

use crate::errors::StoreError;

/// Failures of the auth workflows. Bad credentials and taken usernames are
/// not errors; they are [`super::domain::AuthOutcome`]s.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user directory unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("directory entry for {username:?} is not a user record: {reason}")]
    Corrupt { username: String, reason: String },
}

impl AuthError {
    /// Stable numeric code for external mapping/logging
    pub fn code(&self) -> u16 {
        match self {
            AuthError::Store(e) => e.code(),
            AuthError::Corrupt { .. } => 1201,
        }
    }
}
