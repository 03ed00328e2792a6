//! Service layer: file-backed JSON stores and the session auth flows built on them.
//! - `storage` owns the persistence contract (blocking and async variants).
//! - `auth` owns the Anonymous/Authenticated state machine and route guards.
//! - No HTTP types here; hosts adapt sessions and redirects themselves.

pub mod errors;
pub mod auth;
pub mod storage;

pub use errors::StoreError;
