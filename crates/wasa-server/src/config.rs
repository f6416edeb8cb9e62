use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use chrono::Duration;
use tracing::warn;

const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";

/// Server settings, read from `WASA_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub upload_dir: PathBuf,
    pub token_ttl: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port = get("WASA_PORT", "3000");
        let port: u16 = port
            .parse()
            .with_context(|| format!("WASA_PORT must be a port number, got '{}'", port))?;

        let ttl_days = get("WASA_TOKEN_TTL_DAYS", "30");
        let ttl_days: i64 = ttl_days
            .parse()
            .ok()
            .filter(|days| *days > 0)
            .with_context(|| format!("WASA_TOKEN_TTL_DAYS must be a positive number, got '{}'", ttl_days))?;

        let jwt_secret = get("WASA_JWT_SECRET", DEFAULT_JWT_SECRET);
        if jwt_secret == DEFAULT_JWT_SECRET {
            warn!("WASA_JWT_SECRET is not set, using the development secret");
        }

        Ok(Self {
            host: get("WASA_HOST", "0.0.0.0"),
            port,
            db_path: PathBuf::from(get("WASA_DB_PATH", "wasa.db")),
            jwt_secret,
            upload_dir: PathBuf::from(get("WASA_UPLOAD_DIR", "./uploads")),
            token_ttl: Duration::days(ttl_days),
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("wasa.db"));
        assert_eq!(config.upload_dir, PathBuf::from("./uploads"));
        assert_eq!(config.token_ttl, Duration::days(30));
        assert_eq!(config.addr().unwrap().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn overrides_are_applied() {
        let config = config(&[
            ("WASA_HOST", "127.0.0.1"),
            ("WASA_PORT", "8080"),
            ("WASA_JWT_SECRET", "s3cret"),
            ("WASA_TOKEN_TTL_DAYS", "7"),
        ])
        .unwrap();
        assert_eq!(config.addr().unwrap().to_string(), "127.0.0.1:8080");
        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.token_ttl, Duration::days(7));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        assert!(config(&[("WASA_PORT", "http")]).is_err());
        assert!(config(&[("WASA_PORT", "70000")]).is_err());
        assert!(config(&[("WASA_TOKEN_TTL_DAYS", "0")]).is_err());
    }
}
