use std::{fmt::Display, str::FromStr};

use anyhow::{Context, Result, anyhow};

use super::config_model::{BackendServer, Cache, Database, DotEnvyConfig};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    load_from(|key| std::env::var(key).ok())
}

pub fn load_from<F>(lookup: F) -> Result<DotEnvyConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let backend_server = BackendServer {
        port: required(&lookup, "SERVER_PORT")?,
        body_limit: optional(&lookup, "SERVER_BODY_LIMIT", 1)?,
        timeout: optional(&lookup, "SERVER_TIMEOUT", 30)?,
        shutdown_grace: optional(&lookup, "SERVER_SHUTDOWN_GRACE", 30)?,
    };

    let database = Database {
        url: required(&lookup, "DATABASE_URL")?,
        max_connections: optional(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
    };

    let cache = Cache {
        url: required(&lookup, "REDIS_URL")?,
        ttl: optional(&lookup, "REDIS_TTL", 60)?,
    };

    Ok(DotEnvyConfig {
        backend_server,
        database,
        cache,
    })
}

fn required<F, T>(lookup: &F, key: &str) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let raw = lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("{key} is missing"))?;
    parse(key, &raw)
}

fn optional<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => parse(key, &raw),
        None => Ok(default),
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|err| anyhow!("{err}"))
        .with_context(|| format!("{key} is invalid"))
}
