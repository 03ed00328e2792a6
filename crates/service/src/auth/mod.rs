//! Auth module: session-based login, logout and registration over a user
//! directory (domain, repository, transition rules, service).
//!
//! Credentials are stored and compared in plaintext; see [`domain::UserRecord`].

pub mod domain;
pub mod errors;
mod flow;
pub mod repository;
pub mod service;

pub use domain::{AuthOutcome, AuthRoutes, Credentials, Guard, SessionState, UserRecord};
pub use errors::AuthError;
pub use service::{AuthService, BlockingAuthService};
