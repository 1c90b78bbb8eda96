//! Service wiring: picks store/cache backends from config and assembles the
//! auth service and the job system.

use std::sync::Arc;

use anyhow::Context;

use gatehouse_auth::{
    Argon2PasswordHasher, AuthService, Cache, CredentialStore, JwtTokenIssuer, OAuthProvider,
    TokenIssuer,
};
use gatehouse_infra::jobs::{
    DeadLetterStore, InMemoryDeadLetterStore, InMemoryJobStore, JobRunner, RetryController,
    RetryPolicy, hello_world,
};
use gatehouse_infra::{InMemoryCache, InMemoryCredentialStore};

use crate::config::AppConfig;
use crate::oauth::GoogleOAuthProvider;

#[cfg(feature = "postgres")]
use gatehouse_infra::PostgresCredentialStore;
#[cfg(feature = "redis")]
use gatehouse_infra::RedisCache;

pub struct AppServices {
    pub auth: AuthService,
    pub tokens: Arc<dyn TokenIssuer>,
    pub jobs: JobRunner,
    pub retry: Arc<RetryController>,
    pub dead_letters: Arc<dyn DeadLetterStore>,
    pub oauth: Option<Arc<dyn OAuthProvider>>,
    #[cfg(feature = "postgres")]
    postgres: Option<PostgresCredentialStore>,
}

impl AppServices {
    /// Release backend connections. Called once the server and the job runner
    /// have stopped.
    pub async fn close(&self) {
        #[cfg(feature = "postgres")]
        if let Some(pg) = &self.postgres {
            pg.close().await;
            tracing::info!("postgres pool closed");
        }
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let tokens: Arc<dyn TokenIssuer> = Arc::new(
        JwtTokenIssuer::new(config.token_config()).context("invalid token configuration")?,
    );
    let hasher = Arc::new(
        Argon2PasswordHasher::with_params(
            config.hashing.memory_kib,
            config.hashing.iterations,
            config.hashing.parallelism,
        )
        .context("invalid argon2 parameters")?,
    );

    #[cfg(feature = "postgres")]
    let postgres = match &config.database_url {
        Some(url) => Some(connect_postgres(url).await?),
        None => None,
    };
    #[cfg(feature = "postgres")]
    let store: Arc<dyn CredentialStore> = match &postgres {
        Some(pg) => Arc::new(pg.clone()),
        None => Arc::new(InMemoryCredentialStore::new()),
    };
    #[cfg(not(feature = "postgres"))]
    let store: Arc<dyn CredentialStore> = {
        if config.database_url.is_some() {
            tracing::warn!("DATABASE_URL set but postgres feature not enabled, falling back to in-memory");
        }
        Arc::new(InMemoryCredentialStore::new())
    };
    let cache = build_cache(config).await?;

    let auth = AuthService::new(store, hasher, tokens.clone()).with_cache(cache, config.cache_ttl);

    let job_store = Arc::new(InMemoryJobStore::new());
    let dead_letters: Arc<dyn DeadLetterStore> = Arc::new(InMemoryDeadLetterStore::new());
    let jobs = JobRunner::new(job_store.clone(), config.jobs.clone());
    let retry = Arc::new(RetryController::new(
        job_store,
        dead_letters.clone(),
        RetryPolicy::default(),
    ));
    hello_world::register(&jobs, &retry).context("failed to schedule hello_world")?;

    let oauth = match &config.google {
        Some(google) => {
            let provider = GoogleOAuthProvider::new(google.clone())
                .context("invalid Google OAuth configuration")?;
            Some(Arc::new(provider) as Arc<dyn OAuthProvider>)
        }
        None => {
            tracing::info!("Google OAuth not configured; OAuth routes disabled");
            None
        }
    };

    Ok(AppServices {
        auth,
        tokens,
        jobs,
        retry,
        dead_letters,
        oauth,
        #[cfg(feature = "postgres")]
        postgres,
    })
}

#[cfg(feature = "postgres")]
async fn connect_postgres(url: &str) -> anyhow::Result<PostgresCredentialStore> {
    let pg = PostgresCredentialStore::connect(url)
        .await
        .context("failed to connect to postgres")?;
    pg.ensure_schema().await.context("failed to prepare users table")?;
    tracing::info!("using postgres credential store");
    Ok(pg)
}

async fn build_cache(config: &AppConfig) -> anyhow::Result<Arc<dyn Cache>> {
    match &config.redis_url {
        #[cfg(feature = "redis")]
        Some(url) => {
            let cache = RedisCache::connect(url)
                .await
                .context("failed to connect to redis")?;
            tracing::info!("using redis cache");
            Ok(Arc::new(cache))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            tracing::warn!("REDIS_URL set but redis feature not enabled, falling back to in-memory");
            Ok(Arc::new(InMemoryCache::new()))
        }
        None => Ok(Arc::new(InMemoryCache::new())),
    }
}
