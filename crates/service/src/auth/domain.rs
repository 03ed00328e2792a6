use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted identity record, stored under its username.
///
/// Passwords are kept and compared as plaintext. Not suitable for any real
/// deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub password: String,
}

impl UserRecord {
    /// New record with a fresh identifier (UUID v4, simple form).
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Login / registration form body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }

    pub(crate) fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

/// Per-session authentication marker owned by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub user: Option<String>,
}

impl SessionState {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_user(username: impl Into<String>) -> Self {
        Self { user: Some(username.into()) }
    }
}

/// Result of an auth transition. Failures are outcomes too; each one maps
/// to a redirect target through [`AuthRoutes::target`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    LoggedIn,
    LoginRejected,
    Registered,
    /// Username taken: send the caller to log in instead.
    AlreadyExists,
    RegistrationRejected,
    LoggedOut,
}

impl AuthOutcome {
    /// True for the outcomes that leave the session signed in.
    pub fn is_authenticated(self) -> bool {
        matches!(self, AuthOutcome::LoggedIn | AuthOutcome::Registered)
    }
}

/// Verdict of a guard predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    Proceed,
    Blocked { redirect_to: String },
}

impl Guard {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Guard::Blocked { .. })
    }
}

/// Paths of the auth route surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthRoutes {
    pub login: String,
    pub login_submit: String,
    pub logout: String,
    pub register: String,
    pub register_submit: String,
    pub home: String,
}

impl Default for AuthRoutes {
    fn default() -> Self {
        Self {
            login: "/login".into(),
            login_submit: "/api/login".into(),
            logout: "/logout".into(),
            register: "/register".into(),
            register_submit: "/api/register".into(),
            home: "/".into(),
        }
    }
}

impl AuthRoutes {
    /// Where the caller goes after `outcome`.
    pub fn target(&self, outcome: AuthOutcome) -> &str {
        match outcome {
            AuthOutcome::LoggedIn | AuthOutcome::Registered => &self.home,
            AuthOutcome::LoginRejected | AuthOutcome::AlreadyExists | AuthOutcome::LoggedOut => &self.login,
            AuthOutcome::RegistrationRejected => &self.register,
        }
    }

    /// Every configured path, in declaration order.
    pub fn all(&self) -> [(&'static str, &str); 6] {
        [
            ("login", &self.login),
            ("login_submit", &self.login_submit),
            ("logout", &self.logout),
            ("register", &self.register),
            ("register_submit", &self.register_submit),
            ("home", &self.home),
        ]
    }
}
