use crate::error::{AppResult, ParsePortSnafu};
use secrecy::{ExposeSecret, SecretString};
use snafu::ResultExt;
use std::{path::PathBuf, sync::Arc};

const DEFAULT_DATABASE_URL: &str = "postgres://localhost:5432/student_manager";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_ENVIRONMENT: &str = "development";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_STATIC_DIR: &str = "public";

#[derive(Clone, Debug)]
pub struct RuntimeConfiguration {
    db_config: Arc<DbConfig>,
    server_config: Arc<ServerConfig>,
}

impl RuntimeConfiguration {
    /// Reads the process environment (after `.env` has been loaded).
    pub fn new() -> AppResult<Self> {
        Self::from_lookup(|name| dotenvy::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let get = |name: &str, default: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let port = match lookup("PORT").filter(|v| !v.trim().is_empty()) {
            Some(port) => port.trim().parse::<u16>().context(ParsePortSnafu { original: port })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            db_config: Arc::new(DbConfig {
                url: SecretString::from(get("DATABASE_URL", DEFAULT_DATABASE_URL)),
            }),
            server_config: Arc::new(ServerConfig {
                host: get("HOST", DEFAULT_HOST),
                port,
                environment: get("APP_ENV", DEFAULT_ENVIRONMENT),
                log_dir: PathBuf::from(get("LOG_DIR", DEFAULT_LOG_DIR)),
                static_dir: PathBuf::from(get("STATIC_DIR", DEFAULT_STATIC_DIR)),
            }),
        })
    }

    pub fn db_config(&self) -> Arc<DbConfig> {
        self.db_config.clone()
    }

    pub fn server_config(&self) -> Arc<ServerConfig> {
        self.server_config.clone()
    }
}

#[derive(Debug)]
pub struct DbConfig {
    url: SecretString,
}

impl DbConfig {
    pub fn url(&self) -> &SecretString {
        &self.url
    }

    /// `memory://` swaps Postgres out for the in-process store.
    pub fn is_memory(&self) -> bool {
        self.url.expose_secret().starts_with("memory:")
    }
}

#[derive(Debug)]
pub struct ServerConfig {
    host: String,
    port: u16,
    environment: String,
    log_dir: PathBuf,
    static_dir: PathBuf,
}

impl ServerConfig {
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn log_dir(&self) -> &PathBuf {
        &self.log_dir
    }

    pub fn static_dir(&self) -> &PathBuf {
        &self.static_dir
    }
}
