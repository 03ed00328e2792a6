//! Cookie-keyed, in-process session storage.
//!
//! Each browser gets an opaque `sid` cookie mapping to a [`SessionState`]
//! held in memory. Only signed-in sessions are kept: a request without a
//! known id runs on a fresh, unregistered session, which is registered (and
//! its cookie issued) only if the request signs it in. Signing out drops the
//! entry and expires the cookie. Sessions do not survive a restart.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use service::auth::SessionState;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::debug;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "sid";

/// Handle to one session, attached to every request that passes the layer.
#[derive(Clone)]
pub struct Session {
    id: String,
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Exclusive access for the duration of a transition.
    pub async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state.lock().await.clone()
    }
}

/// What a request did to its session's registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    Unchanged,
    /// Signed in on an unregistered session: now registered.
    Issued,
    /// Signed out on a registered session: now dropped.
    Revoked,
}

#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<Mutex<SessionState>>>>>,
}

impl SessionRegistry {
    /// Registered session for `id`, or a fresh anonymous one under a new id.
    /// Fresh sessions are not stored until [`SessionRegistry::settle`] sees
    /// them signed in.
    pub async fn resolve(&self, id: Option<&str>) -> Session {
        if let Some(id) = id {
            let map = self.inner.read().await;
            if let Some(state) = map.get(id) {
                return Session { id: id.to_string(), state: Arc::clone(state) };
            }
        }
        Session {
            id: Uuid::new_v4().to_string(),
            state: Arc::new(Mutex::new(SessionState::anonymous())),
        }
    }

    /// Register or drop `session` according to its state after a request.
    pub async fn settle(&self, session: &Session) -> Settled {
        let signed_in = session.state.lock().await.user.is_some();
        let mut map = self.inner.write().await;
        match (signed_in, map.contains_key(&session.id)) {
            (true, false) => {
                map.insert(session.id.clone(), Arc::clone(&session.state));
                debug!(session = %session.id, "session registered");
                Settled::Issued
            }
            (false, true) => {
                map.remove(&session.id);
                debug!(session = %session.id, "session dropped");
                Settled::Revoked
            }
            _ => Settled::Unchanged,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn session_cookie(id: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, id);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_secure(false);
    cookie.set_same_site(SameSite::Lax);
    cookie
}

/// Middleware: attach a [`Session`] to the request, then issue or expire
/// the cookie when the request signed the session in or out.
pub async fn session_layer(
    State(sessions): State<SessionRegistry>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let presented = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let session = sessions.resolve(presented.as_deref()).await;
    req.extensions_mut().insert(session.clone());

    let response = next.run(req).await;
    match sessions.settle(&session).await {
        Settled::Issued => (jar.add(session_cookie(session.id)), response).into_response(),
        Settled::Revoked => {
            let mut expired = Cookie::from(SESSION_COOKIE);
            expired.set_path("/");
            (jar.remove(expired), response).into_response()
        }
        Settled::Unchanged => response,
    }
}
