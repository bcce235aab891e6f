use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub max_page_size: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = get("CRUSH_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!(
                "CRUSH_JWT_SECRET is unset or still a placeholder; it must match the identity service's signing secret"
            );
        }

        let host = get("CRUSH_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("CRUSH_PORT")
            .unwrap_or_else(|| "8000".into())
            .parse()
            .context("CRUSH_PORT must be a port number")?;
        let db_path: PathBuf = get("CRUSH_DB_PATH")
            .unwrap_or_else(|| "crush.db".into())
            .into();
        let max_page_size: u32 = match get("CRUSH_FEED_MAX_LIMIT") {
            Some(raw) => raw
                .parse()
                .context("CRUSH_FEED_MAX_LIMIT must be a positive integer")?,
            None => DEFAULT_MAX_PAGE_SIZE,
        };
        if max_page_size == 0 {
            bail!("CRUSH_FEED_MAX_LIMIT must be at least 1");
        }

        Ok(Self {
            host,
            port,
            db_path,
            jwt_secret,
            max_page_size,
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
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let config = Config::from_lookup(lookup(&[("CRUSH_JWT_SECRET", "a-real-secret")])).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.db_path, PathBuf::from("crush.db"));
        assert_eq!(config.max_page_size, DEFAULT_MAX_PAGE_SIZE);
        assert_eq!(config.addr().unwrap().port(), 8000);
    }

    #[test]
    fn placeholder_secret_is_rejected() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("CRUSH_JWT_SECRET", "dev-secret-change-me")])).is_err());
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let base = ("CRUSH_JWT_SECRET", "a-real-secret");
        assert!(Config::from_lookup(lookup(&[base, ("CRUSH_PORT", "http")])).is_err());
        assert!(Config::from_lookup(lookup(&[base, ("CRUSH_FEED_MAX_LIMIT", "0")])).is_err());
    }
}
