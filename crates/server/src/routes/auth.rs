use std::sync::Arc;

use axum::{
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
    Extension, Form,
};
use service::auth::{AuthService, Credentials, Guard, SessionState};
use service::storage::JsonStore;

use crate::errors::AppError;
use crate::session::{Session, SessionRegistry};
use crate::views;

/// Shared handles passed to every handler.
#[derive(Clone)]
pub struct ServerState {
    pub auth: Arc<AuthService<JsonStore>>,
    pub sessions: SessionRegistry,
}

impl ServerState {
    pub fn new(auth: AuthService<JsonStore>) -> Self {
        Self { auth: Arc::new(auth), sessions: SessionRegistry::default() }
    }
}

fn blocked(guard: Guard) -> Option<Redirect> {
    match guard {
        Guard::Blocked { redirect_to } => Some(Redirect::to(&redirect_to)),
        Guard::Proceed => None,
    }
}

async fn unless_authenticated(state: &ServerState, session: &SessionState) -> Result<Option<Redirect>, AppError> {
    Ok(blocked(state.auth.require_unauth(session, None).await?))
}

async fn unless_anonymous(state: &ServerState, session: &SessionState) -> Result<Option<Redirect>, AppError> {
    Ok(blocked(state.auth.require_auth(session, None).await?))
}

pub async fn login_page(
    State(state): State<ServerState>,
    Extension(session): Extension<Session>,
) -> Result<Response, AppError> {
    let current = session.snapshot().await;
    if let Some(redirect) = unless_authenticated(&state, &current).await? {
        return Ok(redirect.into_response());
    }
    Ok(Html(views::login_page(state.auth.routes())).into_response())
}

pub async fn login_submit(
    State(state): State<ServerState>,
    Extension(session): Extension<Session>,
    Form(creds): Form<Credentials>,
) -> Result<Redirect, AppError> {
    let mut current = session.lock().await;
    if let Some(redirect) = unless_authenticated(&state, &current).await? {
        return Ok(redirect);
    }
    let outcome = state.auth.login(&mut current, creds).await?;
    Ok(Redirect::to(state.auth.target(outcome)))
}

pub async fn logout(
    State(state): State<ServerState>,
    Extension(session): Extension<Session>,
) -> Result<Redirect, AppError> {
    let mut current = session.lock().await;
    if let Some(redirect) = unless_anonymous(&state, &current).await? {
        return Ok(redirect);
    }
    let outcome = state.auth.logout(&mut current);
    Ok(Redirect::to(state.auth.target(outcome)))
}

pub async fn register_page(
    State(state): State<ServerState>,
    Extension(session): Extension<Session>,
) -> Result<Response, AppError> {
    let current = session.snapshot().await;
    if let Some(redirect) = unless_authenticated(&state, &current).await? {
        return Ok(redirect.into_response());
    }
    Ok(Html(views::register_page(state.auth.routes())).into_response())
}

pub async fn register_submit(
    State(state): State<ServerState>,
    Extension(session): Extension<Session>,
    Form(creds): Form<Credentials>,
) -> Result<Redirect, AppError> {
    let mut current = session.lock().await;
    if let Some(redirect) = unless_authenticated(&state, &current).await? {
        return Ok(redirect);
    }
    let outcome = state.auth.register(&mut current, creds).await?;
    Ok(Redirect::to(state.auth.target(outcome)))
}

pub async fn home(
    State(state): State<ServerState>,
    Extension(session): Extension<Session>,
) -> Result<Response, AppError> {
    let current = session.snapshot().await;
    if let Some(redirect) = unless_anonymous(&state, &current).await? {
        return Ok(redirect.into_response());
    }
    let user = state.auth.current_user(&current).await?;
    let name = user.map(|u| u.username).unwrap_or_default();
    Ok(Html(views::home_page(state.auth.routes(), &name)).into_response())
}
