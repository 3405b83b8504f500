use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use crate::session::SessionConfig;

/// Process configuration, read from the environment (after `.env`, if any).
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    pub db_max_connections: u32,
    pub session: SessionConfig,
    pub static_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let addr: SocketAddr = parse_or(&lookup, "APP_ADDR", SocketAddr::from(([0, 0, 0, 0], 4000)))?;
        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://snipshare.db".into());
        let db_max_connections: u32 = parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?;
        let lifetime_hours: u64 = parse_or(&lookup, "SESSION_LIFETIME_HOURS", 12)?;
        let secure: bool = parse_or(&lookup, "SESSION_SECURE", false)?;
        let static_dir = lookup("STATIC_DIR").unwrap_or_else(|| "./ui/static".into()).into();

        Ok(Self {
            addr,
            database_url,
            db_max_connections,
            session: SessionConfig {
                lifetime: Duration::from_secs(lifetime_hours.saturating_mul(60 * 60)),
                secure,
                ..SessionConfig::default()
            },
            static_dir,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("invalid {key}: `{raw}`")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.addr, "0.0.0.0:4000".parse().unwrap());
        assert_eq!(cfg.database_url, "sqlite://snipshare.db");
        assert_eq!(cfg.db_max_connections, 10);
        assert_eq!(cfg.session.lifetime, Duration::from_secs(12 * 3600));
        assert!(!cfg.session.secure);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[
            ("APP_ADDR", "127.0.0.1:8080"),
            ("SESSION_LIFETIME_HOURS", "1"),
            ("SESSION_SECURE", "true"),
            ("STATIC_DIR", "/srv/static"),
        ])
        .unwrap();
        assert_eq!(cfg.addr.port(), 8080);
        assert_eq!(cfg.session.lifetime, Duration::from_secs(3600));
        assert!(cfg.session.secure);
        assert_eq!(cfg.static_dir, PathBuf::from("/srv/static"));
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let err = config(&[("DB_MAX_CONNECTIONS", "lots")]).unwrap_err();
        assert!(err.to_string().contains("DB_MAX_CONNECTIONS"));
    }
}
