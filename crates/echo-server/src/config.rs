use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use echo_chat::completion::DEFAULT_GEMINI_BASE_URL;

/// Server settings, read from the environment (and `.env`, if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub completion_timeout: Duration,
    pub frontend_url: String,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = var_or("ECHO_HOST", "0.0.0.0");
        let port: u16 = var_or("ECHO_PORT", "4002")
            .parse()
            .context("ECHO_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .context("ECHO_HOST must be an IP address")?;

        let jwt_ttl_hours: i64 = var_or("ECHO_JWT_TTL_HOURS", "24")
            .parse()
            .context("ECHO_JWT_TTL_HOURS must be a whole number")?;
        let timeout_secs: u64 = var_or("ECHO_COMPLETION_TIMEOUT_SECS", "30")
            .parse()
            .context("ECHO_COMPLETION_TIMEOUT_SECS must be a whole number")?;

        Ok(Self {
            addr,
            db_path: PathBuf::from(var_or("ECHO_DB_PATH", "wall-echo.db")),
            jwt_secret: var_or("ECHO_JWT_SECRET", "dev-secret-change-me"),
            jwt_ttl_hours,
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()),
            gemini_model: var_or("GEMINI_MODEL", "gemini-1.5-flash"),
            gemini_base_url: var_or("GEMINI_BASE_URL", DEFAULT_GEMINI_BASE_URL),
            completion_timeout: Duration::from_secs(timeout_secs),
            frontend_url: var_or("ECHO_FRONTEND_URL", "http://localhost:3000"),
        })
    }
}
