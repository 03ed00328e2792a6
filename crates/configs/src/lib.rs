use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use service::auth::AuthRoutes;
use service::storage::{LoadFailurePolicy, StoreConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_store")]
    pub store: StoreConfig,
    #[serde(default)]
    pub auth: AuthRoutes,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { server: ServerConfig::default(), store: default_store(), auth: AuthRoutes::default() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".into(), port: 8080, worker_threads: Some(4) }
    }
}

/// The user directory lives under `data/` unless configured otherwise.
fn default_store() -> StoreConfig {
    StoreConfig { filename: PathBuf::from("data/users.json"), ..StoreConfig::default() }
}

pub fn load_default() -> Result<AppConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    load_from_file(&path)
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

impl AppConfig {
    /// Config file when present, environment variables otherwise.
    pub fn load_and_validate() -> Result<Self> {
        let mut cfg = match load_default() {
            Ok(cfg) => cfg,
            Err(_) => Self::from_env(),
        };
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    /// Built from `SERVER_HOST`, `SERVER_PORT`, `TOKIO_WORKER_THREADS`,
    /// `STORE_FILE`, `STORE_AUTO_SAVE` and `STORE_LOAD_FAILURE`, with
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = AppConfig::default();
        if let Some(host) = get("SERVER_HOST") {
            cfg.server.host = host;
        }
        if let Some(port) = get("SERVER_PORT").and_then(|p| p.parse::<u16>().ok()) {
            cfg.server.port = port;
        }
        if let Some(w) = get("TOKIO_WORKER_THREADS").and_then(|v| v.parse::<usize>().ok()) {
            cfg.server.worker_threads = Some(w);
        }
        if let Some(file) = get("STORE_FILE") {
            cfg.store.filename = PathBuf::from(file);
        }
        if let Some(flag) = get("STORE_AUTO_SAVE").and_then(|v| parse_bool(&v)) {
            cfg.store.auto_save = flag;
        }
        if let Some(policy) = get("STORE_LOAD_FAILURE").and_then(|v| parse_policy(&v)) {
            cfg.store.load_failure = Some(policy);
        }
        cfg
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.server.normalize()?;
        validate_store(&self.store)?;
        validate_routes(&self.auth)?;
        Ok(())
    }
}

impl ServerConfig {
    fn normalize(&mut self) -> Result<()> {
        if self.host.trim().is_empty() {
            self.host = "127.0.0.1".to_string();
        }
        if self.port == 0 {
            return Err(anyhow!("server.port must be in 1..=65535"));
        }
        match self.worker_threads {
            Some(0) | None => self.worker_threads = Some(4),
            Some(_) => {}
        }
        Ok(())
    }
}

fn validate_store(store: &StoreConfig) -> Result<()> {
    if store.filename.as_os_str().is_empty() {
        return Err(anyhow!("store.filename must not be empty"));
    }
    Ok(())
}

/// Paths served outside the auth routes.
const RESERVED_PATHS: &[&str] = &["/health"];

fn validate_routes(routes: &AuthRoutes) -> Result<()> {
    let mut seen = HashSet::new();
    for (name, path) in routes.all() {
        if !path.starts_with('/') {
            return Err(anyhow!("auth.{name} must start with '/': {path:?}"));
        }
        if RESERVED_PATHS.contains(&path) {
            return Err(anyhow!("auth.{name} uses a reserved path: {path:?}"));
        }
        if !seen.insert(path) {
            return Err(anyhow!("auth.{name} duplicates another auth path: {path:?}"));
        }
    }
    Ok(())
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_policy(v: &str) -> Option<LoadFailurePolicy> {
    match v.trim().to_ascii_lowercase().as_str() {
        "strict" => Some(LoadFailurePolicy::Strict),
        "reset" => Some(LoadFailurePolicy::Reset),
        _ => None,
    }
}
