use anyhow::{anyhow, Context, Result};
use common_auth::JwtConfig;
use std::env;

const DEFAULT_ACCEPT_URL: &str = "http://localhost:3000/invitations/accept";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
    pub invitation_accept_url: String,
    pub notify_webhook_url: Option<String>,
    pub notify_webhook_bearer: Option<String>,
    pub cors_allowed_origins: Vec<String>,
}

impl ServiceConfig {
    /// Defaults suitable for tests; the secret still has to be supplied.
    pub fn for_secret(secret: impl Into<String>) -> Self {
        Self {
            database_url: String::new(),
            host: "127.0.0.1".to_string(),
            port: 0,
            jwt: JwtConfig::new(secret),
            invitation_accept_url: DEFAULT_ACCEPT_URL.to_string(),
            notify_webhook_url: None,
            notify_webhook_bearer: None,
            cors_allowed_origins: Vec::new(),
        }
    }

    pub fn invitation_ttl_seconds(&self) -> i64 {
        self.jwt.invitation_ttl_seconds
    }
}

pub fn load_service_config() -> Result<ServiceConfig> {
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let secret = env::var("JWT_SECRET")
        .ok()
        .and_then(|value| normalize_optional(&value))
        .ok_or_else(|| anyhow!("JWT_SECRET must be set to a non-empty value"))?;

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = parse_env::<u16>("PORT")?.unwrap_or(8080);

    let access_ttl = parse_env::<i64>("ACCESS_TOKEN_TTL_SECONDS")?.unwrap_or(15 * 60);
    let refresh_days = parse_env::<i64>("REFRESH_TOKEN_TTL_DAYS")?.unwrap_or(365);
    let invitation_days = parse_env::<i64>("INVITATION_TTL_DAYS")?.unwrap_or(7);
    let leeway = parse_env::<u32>("JWT_LEEWAY_SECONDS")?.unwrap_or(0);

    if access_ttl <= 0 || refresh_days <= 0 || invitation_days <= 0 {
        return Err(anyhow!("token lifetimes must be positive"));
    }

    let jwt = JwtConfig::new(secret)
        .with_access_ttl(access_ttl)
        .with_refresh_ttl(refresh_days * 24 * 60 * 60)
        .with_invitation_ttl(invitation_days * 24 * 60 * 60)
        .with_leeway(leeway);

    let invitation_accept_url = env::var("INVITATION_ACCEPT_URL")
        .ok()
        .and_then(|value| normalize_optional(&value))
        .unwrap_or_else(|| DEFAULT_ACCEPT_URL.to_string());

    let notify_webhook_url = env::var("NOTIFY_WEBHOOK_URL")
        .ok()
        .and_then(|value| normalize_optional(&value));
    let notify_webhook_bearer = env::var("NOTIFY_WEBHOOK_BEARER")
        .ok()
        .and_then(|value| normalize_optional(&value));

    let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
        .ok()
        .map(|value| parse_origins(&value))
        .unwrap_or_else(default_origins);

    Ok(ServiceConfig {
        database_url,
        host,
        port,
        jwt,
        invitation_accept_url,
        notify_webhook_url,
        notify_webhook_bearer,
        cors_allowed_origins,
    })
}

fn parse_env<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => match normalize_optional(&value) {
            Some(trimmed) => trimmed
                .parse::<T>()
                .map(Some)
                .map_err(|err| anyhow!("Failed to parse {key}='{trimmed}': {err}")),
            None => Ok(None),
        },
        Err(_) => Ok(None),
    }
}

fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter_map(normalize_optional)
        .collect()
}

fn default_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
    ]
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
