//! Transition rules shared by the async and blocking auth services.
//!
//! The services look records up; everything decided from those lookups
//! lives here so both variants walk the same state machine.

use super::domain::{AuthOutcome, AuthRoutes, Credentials, Guard, SessionState, UserRecord};

/// Username of the session's claimed user, if any.
pub(crate) fn claimed_user(session: &SessionState) -> Option<&str> {
    session.user.as_deref()
}

/// A session is authenticated only while its user still has a record.
pub(crate) fn is_authenticated(session: &SessionState, record: Option<&UserRecord>) -> bool {
    matches!((claimed_user(session), record), (Some(name), Some(r)) if r.username == name)
}

/// Plaintext, case-sensitive comparison.
///
/// Blank usernames or passwords are always rejected, even against a record
/// whose stored password is empty: registration never creates such a
/// record, so one can only come from editing the store directly.
pub(crate) fn login(session: &mut SessionState, creds: &Credentials, record: Option<&UserRecord>) -> AuthOutcome {
    match record {
        Some(r) if creds.is_complete() && r.password == creds.password => {
            session.user = Some(r.username.clone());
            AuthOutcome::LoggedIn
        }
        _ => AuthOutcome::LoginRejected,
    }
}

/// What a registration attempt should do before anything is written.
pub(crate) enum RegisterStep {
    Create(UserRecord),
    Stop(AuthOutcome),
}

pub(crate) fn plan_registration(creds: &Credentials, existing: Option<&UserRecord>) -> RegisterStep {
    if !creds.is_complete() {
        return RegisterStep::Stop(AuthOutcome::RegistrationRejected);
    }
    match existing {
        Some(_) => RegisterStep::Stop(AuthOutcome::AlreadyExists),
        None => RegisterStep::Create(UserRecord::new(creds.username.clone(), creds.password.clone())),
    }
}

/// Called once the insert has been attempted. Losing the insert race to
/// another registration is the same as finding the name taken.
pub(crate) fn complete_registration(session: &mut SessionState, record: &UserRecord, inserted: bool) -> AuthOutcome {
    if !inserted {
        return AuthOutcome::AlreadyExists;
    }
    session.user = Some(record.username.clone());
    AuthOutcome::Registered
}

pub(crate) fn logout(session: &mut SessionState) -> AuthOutcome {
    session.user = None;
    AuthOutcome::LoggedOut
}

pub(crate) fn require_auth(authenticated: bool, routes: &AuthRoutes, redirect_to: Option<&str>) -> Guard {
    if authenticated {
        Guard::Proceed
    } else {
        Guard::Blocked { redirect_to: redirect_to.unwrap_or(&routes.login).to_string() }
    }
}

pub(crate) fn require_unauth(authenticated: bool, routes: &AuthRoutes, redirect_to: Option<&str>) -> Guard {
    if authenticated {
        Guard::Blocked { redirect_to: redirect_to.unwrap_or(&routes.home).to_string() }
    } else {
        Guard::Proceed
    }
}
