use std::path::PathBuf;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use service::auth::AuthRoutes;
use service::storage::StoreConfig;
use tower::ServiceExt;
use uuid::Uuid;

use server::routes::build_router;
use server::ServerState;

fn temp_store() -> StoreConfig {
    let filename = std::env::temp_dir()
        .join(format!("jsonkv_auth_{}", Uuid::new_v4().simple()))
        .join("users.json");
    StoreConfig { filename, auto_save: true, load_failure: None }
}

async fn build_app(store: &StoreConfig, paths: AuthRoutes) -> anyhow::Result<(Router, ServerState)> {
    let state = server::build_state(store, paths).await?;
    Ok((build_router(state.clone()), state))
}

fn cleanup(store: &StoreConfig) {
    if let Some(dir) = store.filename.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

/// Minimal browser: remembers the session cookie between requests.
struct Client {
    app: Router,
    cookie: Option<String>,
}

impl Client {
    fn new(app: Router) -> Self {
        Self { app, cookie: None }
    }

    async fn send(&mut self, method: &str, uri: &str, form: Option<&str>) -> anyhow::Result<Response<Body>> {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(cookie) = &self.cookie {
            req = req.header(header::COOKIE, cookie);
        }
        let body = match form {
            Some(form) => {
                req = req.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
                Body::from(form.to_string())
            }
            None => Body::empty(),
        };
        let resp = self.app.clone().oneshot(req.body(body)?).await?;
        if let Some(set) = resp.headers().get(header::SET_COOKIE) {
            let pair = set.to_str()?.split(';').next().unwrap_or_default();
            // an expired cookie comes back with an empty value
            self.cookie = (!pair.ends_with('=')).then(|| pair.to_string());
        }
        Ok(resp)
    }

    async fn get(&mut self, uri: &str) -> anyhow::Result<Response<Body>> {
        self.send("GET", uri, None).await
    }

    async fn post(&mut self, uri: &str, form: &str) -> anyhow::Result<Response<Body>> {
        self.send("POST", uri, Some(form)).await
    }
}

fn location(resp: &Response<Body>) -> &str {
    assert_eq!(resp.status(), StatusCode::SEE_OTHER, "expected a redirect");
    resp.headers().get(header::LOCATION).and_then(|v| v.to_str().ok()).unwrap_or_default()
}

async fn body_text(resp: Response<Body>) -> anyhow::Result<String> {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await?;
    Ok(String::from_utf8(bytes.to_vec())?)
}

#[tokio::test]
async fn health_is_unguarded() -> anyhow::Result<()> {
    let store = temp_store();
    let (app, _) = build_app(&store, AuthRoutes::default()).await?;
    let resp = app.oneshot(Request::get("/health").body(Body::empty())?).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(body_text(resp).await?, r#"{"status":"ok"}"#);
    cleanup(&store);
    Ok(())
}

#[tokio::test]
async fn anonymous_visitor_is_sent_to_login() -> anyhow::Result<()> {
    let store = temp_store();
    let (app, _) = build_app(&store, AuthRoutes::default()).await?;
    let mut client = Client::new(app);

    let resp = client.get("/").await?;
    assert_eq!(location(&resp), "/login");
    assert!(resp.headers().get(header::SET_COOKIE).is_none());

    let resp = client.get("/login").await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get(header::SET_COOKIE).is_none());
    let html = body_text(resp).await?;
    assert!(html.contains("action=\"/api/login\""));

    let resp = client.get("/logout").await?;
    assert_eq!(location(&resp), "/login");
    cleanup(&store);
    Ok(())
}

#[tokio::test]
async fn register_login_logout_round() -> anyhow::Result<()> {
    let store = temp_store();
    let (app, _) = build_app(&store, AuthRoutes::default()).await?;
    let mut client = Client::new(app);

    let resp = client.post("/api/register", "username=alice&password=pw1").await?;
    assert_eq!(location(&resp), "/");
    let cookie = client.cookie.clone().unwrap_or_default();
    assert!(cookie.starts_with("sid="), "{cookie}");

    let resp = client.get("/").await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await?.contains("<strong>alice</strong>"));

    // authenticated users are bounced away from the guest pages
    assert_eq!(location(&client.get("/login").await?), "/");
    assert_eq!(location(&client.get("/register").await?), "/");
    assert_eq!(location(&client.post("/api/login", "username=alice&password=pw1").await?), "/");

    assert_eq!(location(&client.get("/logout").await?), "/login");
    assert_eq!(location(&client.get("/").await?), "/login");

    assert_eq!(location(&client.post("/api/login", "username=alice&password=nope").await?), "/login");
    assert_eq!(location(&client.get("/").await?), "/login");

    assert_eq!(location(&client.post("/api/login", "username=alice&password=pw1").await?), "/");
    assert_eq!(client.get("/").await?.status(), StatusCode::OK);

    let raw = std::fs::read(&store.filename)?;
    let saved: serde_json::Value = serde_json::from_slice(&raw)?;
    assert_eq!(saved["alice"]["username"], "alice");
    assert_eq!(saved["alice"]["password"], "pw1");
    assert_eq!(saved["alice"]["id"].as_str().map(str::len), Some(32));
    cleanup(&store);
    Ok(())
}

#[tokio::test]
async fn duplicate_registration_goes_back_to_login() -> anyhow::Result<()> {
    let store = temp_store();
    let (app, _) = build_app(&store, AuthRoutes::default()).await?;

    let mut first = Client::new(app.clone());
    assert_eq!(location(&first.post("/api/register", "username=carol&password=a").await?), "/");

    let mut second = Client::new(app);
    assert_eq!(location(&second.post("/api/register", "username=carol&password=b").await?), "/login");
    assert_eq!(location(&second.get("/").await?), "/login");

    assert_eq!(location(&second.post("/api/login", "username=carol&password=b").await?), "/login");
    assert_eq!(location(&second.post("/api/login", "username=carol&password=a").await?), "/");
    cleanup(&store);
    Ok(())
}

#[tokio::test]
async fn blank_credentials_are_rejected() -> anyhow::Result<()> {
    let store = temp_store();
    let (app, state) = build_app(&store, AuthRoutes::default()).await?;
    let mut client = Client::new(app);

    assert_eq!(location(&client.post("/api/register", "username=&password=x").await?), "/register");
    assert_eq!(location(&client.post("/api/login", "password=x").await?), "/login");
    assert!(state.auth.directory().is_empty().await?);
    cleanup(&store);
    Ok(())
}

#[tokio::test]
async fn deleted_user_loses_the_session() -> anyhow::Result<()> {
    let store = temp_store();
    let (app, state) = build_app(&store, AuthRoutes::default()).await?;
    let mut client = Client::new(app);

    assert_eq!(location(&client.post("/api/register", "username=bob&password=pw").await?), "/");
    assert_eq!(client.get("/").await?.status(), StatusCode::OK);

    state.auth.directory().delete("bob").await?;
    assert_eq!(location(&client.get("/").await?), "/login");
    assert_eq!(client.get("/login").await?.status(), StatusCode::OK);
    cleanup(&store);
    Ok(())
}

#[tokio::test]
async fn users_survive_a_restart() -> anyhow::Result<()> {
    let store = temp_store();
    {
        let (app, _) = build_app(&store, AuthRoutes::default()).await?;
        let mut client = Client::new(app);
        assert_eq!(location(&client.post("/api/register", "username=dave&password=pw").await?), "/");
    }

    let (app, _) = build_app(&store, AuthRoutes::default()).await?;
    let mut client = Client::new(app);
    assert_eq!(location(&client.get("/").await?), "/login");
    assert_eq!(location(&client.post("/api/login", "username=dave&password=pw").await?), "/");
    cleanup(&store);
    Ok(())
}

#[tokio::test]
async fn forged_cookie_gets_a_fresh_session() -> anyhow::Result<()> {
    let store = temp_store();
    let (app, state) = build_app(&store, AuthRoutes::default()).await?;
    let mut client = Client::new(app);
    client.cookie = Some("sid=not-a-session".into());

    assert_eq!(location(&client.get("/").await?), "/login");
    assert!(state.sessions.is_empty().await);

    assert_eq!(location(&client.post("/api/register", "username=gina&password=pw").await?), "/");
    let cookie = client.cookie.clone().unwrap_or_default();
    assert!(cookie.starts_with("sid="));
    assert_ne!(cookie, "sid=not-a-session");
    assert_eq!(state.sessions.len().await, 1);
    cleanup(&store);
    Ok(())
}

#[tokio::test]
async fn custom_paths_drive_routing_and_redirects() -> anyhow::Result<()> {
    let store = temp_store();
    let paths = AuthRoutes {
        login: "/signin".into(),
        login_submit: "/signin/submit".into(),
        logout: "/signout".into(),
        register: "/signup".into(),
        register_submit: "/signup/submit".into(),
        home: "/app".into(),
    };
    let (app, _) = build_app(&store, paths).await?;
    let mut client = Client::new(app);

    assert_eq!(location(&client.get("/app").await?), "/signin");
    let html = body_text(client.get("/signup").await?).await?;
    assert!(html.contains("action=\"/signup/submit\""));

    assert_eq!(location(&client.post("/signup/submit", "username=erin&password=pw").await?), "/app");
    assert_eq!(location(&client.get("/signin").await?), "/app");
    assert_eq!(location(&client.get("/signout").await?), "/signin");
    assert_eq!(client.get("/login").await?.status(), StatusCode::NOT_FOUND);
    cleanup(&store);
    Ok(())
}

#[tokio::test]
async fn missing_parent_directory_is_created() -> anyhow::Result<()> {
    let mut store = temp_store();
    let root: PathBuf = store.filename.parent().map(PathBuf::from).unwrap_or_default();
    store.filename = root.join("nested").join("deeper").join("users.json");
    let (app, _) = build_app(&store, AuthRoutes::default()).await?;
    let mut client = Client::new(app);

    assert_eq!(location(&client.post("/api/register", "username=frank&password=pw").await?), "/");
    assert!(store.filename.exists());
    let _ = std::fs::remove_dir_all(root);
    Ok(())
}

#[tokio::test]
async fn only_signed_in_sessions_are_kept() -> anyhow::Result<()> {
    let store = temp_store();
    let (app, state) = build_app(&store, AuthRoutes::default()).await?;

    for _ in 0..200 {
        let mut visitor = Client::new(app.clone());
        assert_eq!(location(&visitor.get("/").await?), "/login");
        assert_eq!(visitor.get("/register").await?.status(), StatusCode::OK);
        assert!(visitor.cookie.is_none());
    }
    assert!(state.sessions.is_empty().await);

    let mut client = Client::new(app);
    assert_eq!(location(&client.post("/api/register", "username=hank&password=pw").await?), "/");
    assert_eq!(state.sessions.len().await, 1);

    let resp = client.get("/logout").await?;
    assert_eq!(location(&resp), "/login");
    let expired = resp.headers().get(header::SET_COOKIE).and_then(|v| v.to_str().ok()).unwrap_or_default();
    assert!(expired.starts_with("sid=;"), "{expired}");
    assert!(client.cookie.is_none());
    assert!(state.sessions.is_empty().await);
    cleanup(&store);
    Ok(())
}

#[tokio::test]
async fn failed_directory_write_is_a_server_error() -> anyhow::Result<()> {
    let mut store = temp_store();
    let root: PathBuf = store.filename.parent().map(PathBuf::from).unwrap_or_default();
    // the "file" is a directory: loading resets to empty, every save fails
    store.filename = root.join("users.json");
    std::fs::create_dir_all(&store.filename)?;
    let (app, state) = build_app(&store, AuthRoutes::default()).await?;
    let mut client = Client::new(app);

    let resp = client.post("/api/register", "username=ivan&password=pw").await?;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(resp.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(body_text(resp).await?, "internal server error");
    assert!(state.sessions.is_empty().await);
    let _ = std::fs::remove_dir_all(root);
    Ok(())
}
