use std::sync::Arc;

use tracing::{debug, info, instrument};

use super::domain::{AuthOutcome, AuthRoutes, Credentials, Guard, SessionState, UserRecord};
use super::errors::AuthError;
use super::flow::{self, RegisterStep};
use super::repository::{BlockingUserDirectory, UserDirectory};

/// Session-based auth over a user directory, independent of web framework.
///
/// The session is handed in on every call and the service keeps no
/// per-request state, so one instance can serve concurrent requests.
pub struct AuthService<R: UserDirectory> {
    repo: Arc<R>,
    routes: AuthRoutes,
}

impl<R: UserDirectory> AuthService<R> {
    pub fn new(repo: Arc<R>, routes: AuthRoutes) -> Self { Self { repo, routes } }

    pub fn routes(&self) -> &AuthRoutes { &self.routes }

    pub fn directory(&self) -> &Arc<R> { &self.repo }

    /// Redirect target for a transition outcome.
    pub fn target(&self, outcome: AuthOutcome) -> &str { self.routes.target(outcome) }

    /// Record of the session's user, if the session names one that still exists.
    pub async fn current_user(&self, session: &SessionState) -> Result<Option<UserRecord>, AuthError> {
        match flow::claimed_user(session) {
            Some(name) => self.repo.find_user(name).await,
            None => Ok(None),
        }
    }

    pub async fn is_authenticated(&self, session: &SessionState) -> Result<bool, AuthError> {
        let record = self.current_user(session).await?;
        Ok(flow::is_authenticated(session, record.as_ref()))
    }

    /// Check credentials and mark the session on success.
    ///
    /// # Examples
    /// ```
    /// use service::auth::{AuthService, repository::mock::MockUserDirectory};
    /// use service::auth::domain::{AuthOutcome, AuthRoutes, Credentials, SessionState};
    /// use std::sync::Arc;
    /// let svc = AuthService::new(Arc::new(MockUserDirectory::default()), AuthRoutes::default());
    /// let mut session = SessionState::anonymous();
    /// let out = tokio_test::block_on(svc.register(&mut session, Credentials::new("u", "pw"))).unwrap();
    /// assert_eq!(out, AuthOutcome::Registered);
    /// let mut fresh = SessionState::anonymous();
    /// let out = tokio_test::block_on(svc.login(&mut fresh, Credentials::new("u", "pw"))).unwrap();
    /// assert_eq!(out, AuthOutcome::LoggedIn);
    /// assert_eq!(fresh.user.as_deref(), Some("u"));
    /// ```
    #[instrument(skip(self, session, creds), fields(username = %creds.username))]
    pub async fn login(&self, session: &mut SessionState, creds: Credentials) -> Result<AuthOutcome, AuthError> {
        let record = self.repo.find_user(&creds.username).await?;
        let outcome = flow::login(session, &creds, record.as_ref());
        log_outcome(&creds.username, outcome);
        Ok(outcome)
    }

    /// Create the user if the name is free, then mark the session.
    ///
    /// The record is fully stored before the session changes, so a redirect
    /// issued from the outcome never races the write.
    #[instrument(skip(self, session, creds), fields(username = %creds.username))]
    pub async fn register(&self, session: &mut SessionState, creds: Credentials) -> Result<AuthOutcome, AuthError> {
        let existing = self.repo.find_user(&creds.username).await?;
        let outcome = match flow::plan_registration(&creds, existing.as_ref()) {
            RegisterStep::Create(record) => {
                let inserted = self.repo.insert_user(&record).await?;
                flow::complete_registration(session, &record, inserted)
            }
            RegisterStep::Stop(outcome) => outcome,
        };
        log_outcome(&creds.username, outcome);
        Ok(outcome)
    }

    pub fn logout(&self, session: &mut SessionState) -> AuthOutcome {
        let previous = session.user.clone();
        let outcome = flow::logout(session);
        if let Some(user) = previous {
            info!(username = %user, "user_logged_out");
        }
        outcome
    }

    /// Blocks anonymous sessions; default target is the login page.
    pub async fn require_auth(&self, session: &SessionState, redirect_to: Option<&str>) -> Result<Guard, AuthError> {
        let authenticated = self.is_authenticated(session).await?;
        Ok(flow::require_auth(authenticated, &self.routes, redirect_to))
    }

    /// Blocks authenticated sessions; default target is home.
    pub async fn require_unauth(&self, session: &SessionState, redirect_to: Option<&str>) -> Result<Guard, AuthError> {
        let authenticated = self.is_authenticated(session).await?;
        Ok(flow::require_unauth(authenticated, &self.routes, redirect_to))
    }
}

/// Blocking twin of [`AuthService`], owning its directory.
pub struct BlockingAuthService<R: BlockingUserDirectory> {
    repo: R,
    routes: AuthRoutes,
}

impl<R: BlockingUserDirectory> BlockingAuthService<R> {
    pub fn new(repo: R, routes: AuthRoutes) -> Self { Self { repo, routes } }

    pub fn routes(&self) -> &AuthRoutes { &self.routes }

    pub fn directory_mut(&mut self) -> &mut R { &mut self.repo }

    pub fn into_directory(self) -> R { self.repo }

    pub fn target(&self, outcome: AuthOutcome) -> &str { self.routes.target(outcome) }

    pub fn current_user(&mut self, session: &SessionState) -> Result<Option<UserRecord>, AuthError> {
        match flow::claimed_user(session) {
            Some(name) => self.repo.find_user(name),
            None => Ok(None),
        }
    }

    pub fn is_authenticated(&mut self, session: &SessionState) -> Result<bool, AuthError> {
        let record = self.current_user(session)?;
        Ok(flow::is_authenticated(session, record.as_ref()))
    }

    #[instrument(skip(self, session, creds), fields(username = %creds.username))]
    pub fn login(&mut self, session: &mut SessionState, creds: Credentials) -> Result<AuthOutcome, AuthError> {
        let record = self.repo.find_user(&creds.username)?;
        let outcome = flow::login(session, &creds, record.as_ref());
        log_outcome(&creds.username, outcome);
        Ok(outcome)
    }

    #[instrument(skip(self, session, creds), fields(username = %creds.username))]
    pub fn register(&mut self, session: &mut SessionState, creds: Credentials) -> Result<AuthOutcome, AuthError> {
        let existing = self.repo.find_user(&creds.username)?;
        let outcome = match flow::plan_registration(&creds, existing.as_ref()) {
            RegisterStep::Create(record) => {
                let inserted = self.repo.insert_user(&record)?;
                flow::complete_registration(session, &record, inserted)
            }
            RegisterStep::Stop(outcome) => outcome,
        };
        log_outcome(&creds.username, outcome);
        Ok(outcome)
    }

    pub fn logout(&mut self, session: &mut SessionState) -> AuthOutcome {
        if let Some(user) = session.user.as_deref() {
            info!(username = %user, "user_logged_out");
        }
        flow::logout(session)
    }

    pub fn require_auth(&mut self, session: &SessionState, redirect_to: Option<&str>) -> Result<Guard, AuthError> {
        let authenticated = self.is_authenticated(session)?;
        Ok(flow::require_auth(authenticated, &self.routes, redirect_to))
    }

    pub fn require_unauth(&mut self, session: &SessionState, redirect_to: Option<&str>) -> Result<Guard, AuthError> {
        let authenticated = self.is_authenticated(session)?;
        Ok(flow::require_unauth(authenticated, &self.routes, redirect_to))
    }
}

fn log_outcome(username: &str, outcome: AuthOutcome) {
    if !outcome.is_authenticated() {
        debug!(%username, ?outcome, "auth_rejected");
    } else if outcome == AuthOutcome::Registered {
        info!(%username, "user_registered");
    } else {
        info!(%username, "user_logged_in");
    }
}
