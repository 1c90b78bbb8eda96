//! Process configuration, read from the environment (and `.env` when present).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use gatehouse_auth::TokenConfig;
use gatehouse_infra::jobs::RunnerConfig;

use crate::oauth::GoogleEndpoints;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("JWT_SECRET and JWT_REFRESH_SECRET must differ")]
    SharedSecret,
}

/// Google OAuth client registration.
#[derive(Clone, PartialEq, Eq)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
    pub endpoints: GoogleEndpoints,
}

impl fmt::Debug for GoogleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("callback_url", &self.callback_url)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub jwt_expiration: Duration,
    pub jwt_refresh_expiration: Duration,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub cache_ttl: Duration,
    pub google: Option<GoogleConfig>,
    pub jobs: RunnerConfig,
    pub hashing: HashingConfig,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("jwt_expiration", &self.jwt_expiration)
            .field("jwt_refresh_expiration", &self.jwt_refresh_expiration)
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("redis_url", &self.redis_url.as_ref().map(|_| "<set>"))
            .field("cache_ttl", &self.cache_ttl)
            .field("google", &self.google)
            .field("jobs", &self.jobs)
            .field("hashing", &self.hashing)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Read the process environment. Call `dotenv::dotenv()` first to pick up
    /// a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let jwt_refresh_secret =
            get("JWT_REFRESH_SECRET").ok_or(ConfigError::Missing("JWT_REFRESH_SECRET"))?;
        if jwt_secret == jwt_refresh_secret {
            return Err(ConfigError::SharedSecret);
        }

        let defaults = RunnerConfig::default();
        let jobs = RunnerConfig {
            process_every: Duration::from_secs(parse_or(
                get("JOBS_PROCESS_EVERY_SECS"),
                "JOBS_PROCESS_EVERY_SECS",
                defaults.process_every.as_secs(),
            )?),
            max_concurrency: positive(
                "JOBS_MAX_CONCURRENCY",
                get("JOBS_MAX_CONCURRENCY"),
                defaults.max_concurrency,
            )?,
            default_concurrency: positive(
                "JOBS_DEFAULT_CONCURRENCY",
                get("JOBS_DEFAULT_CONCURRENCY"),
                defaults.default_concurrency,
            )?,
            lock_lifetime: Duration::from_millis(parse_or(
                get("JOBS_LOCK_LIFETIME_MS"),
                "JOBS_LOCK_LIFETIME_MS",
                defaults.lock_lifetime.as_millis() as u64,
            )?),
        };

        let hash_defaults = HashingConfig::default();
        let hashing = HashingConfig {
            memory_kib: positive("ARGON2_MEMORY_KIB", get("ARGON2_MEMORY_KIB"), hash_defaults.memory_kib)?,
            iterations: positive("ARGON2_ITERATIONS", get("ARGON2_ITERATIONS"), hash_defaults.iterations)?,
            parallelism: positive("ARGON2_PARALLELISM", get("ARGON2_PARALLELISM"), hash_defaults.parallelism)?,
        };

        let google = match (
            get("GOOGLE_CLIENT_ID"),
            get("GOOGLE_CLIENT_SECRET"),
            get("GOOGLE_CALLBACK_URL"),
        ) {
            (Some(client_id), Some(client_secret), Some(callback_url)) => {
                let mut endpoints = GoogleEndpoints::default();
                if let Some(url) = get("GOOGLE_AUTH_URL") {
                    endpoints.auth_url = url;
                }
                if let Some(url) = get("GOOGLE_TOKEN_URL") {
                    endpoints.token_url = url;
                }
                if let Some(url) = get("GOOGLE_USERINFO_URL") {
                    endpoints.userinfo_url = url;
                }
                Some(GoogleConfig {
                    client_id,
                    client_secret,
                    callback_url,
                    endpoints,
                })
            }
            _ => None,
        };

        Ok(Self {
            port: parse_or(get("PORT"), "PORT", 3000)?,
            jwt_secret,
            jwt_refresh_secret,
            jwt_expiration: Duration::from_secs(positive(
                "JWT_EXPIRATION",
                get("JWT_EXPIRATION"),
                3600,
            )?),
            jwt_refresh_expiration: Duration::from_secs(positive(
                "JWT_REFRESH_EXPIRATION",
                get("JWT_REFRESH_EXPIRATION"),
                604_800,
            )?),
            database_url: get("DATABASE_URL"),
            redis_url: get("REDIS_URL"),
            cache_ttl: Duration::from_secs(parse_or(get("CACHE_TTL"), "CACHE_TTL", 3600)?),
            google,
            jobs,
            hashing,
        })
    }

    pub fn token_config(&self) -> TokenConfig {
        TokenConfig::new(self.jwt_secret.clone(), self.jwt_refresh_secret.clone())
            .with_access_ttl(self.jwt_expiration)
            .with_refresh_ttl(self.jwt_refresh_expiration)
    }
}

fn parse_or<T>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

fn positive<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default + fmt::Display,
    T::Err: fmt::Display,
{
    let value = parse_or(raw, key, default)?;
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
