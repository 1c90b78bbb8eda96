//! Auth service: sign-up, sign-in, profile and role mutation, user listing.
//!
//! Dependencies are injected as trait objects; the service itself holds no
//! cross-request state apart from a lazily computed decoy hash.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use gatehouse_core::{DomainError, DomainResult, UserId};

use crate::{
    Cache, CredentialStore, NewUser, OAuthProfile, Page, PasswordHasher, Role, TokenIssuer,
    TokenPair, User, UserPatch, UserSummary,
};

/// Cache key of the full `{name, email, role}` listing.
pub const ALL_USERS_CACHE_KEY: &str = "users:all";

/// Stored as the "password" of users created through OAuth. It is not a valid
/// hash, so password sign-in for these accounts always fails.
pub const OAUTH_PLACEHOLDER_PASSWORD: &str = "google_oauth_user";

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);
const INVALID_CREDENTIALS: &str = "Invalid email or password.";
const USER_NOT_FOUND: &str = "User not found.";
const DECOY_PASSWORD: &str = "decoy-password-for-unknown-accounts";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpInput {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateProfileInput {
    pub name: Option<String>,
    pub password: Option<String>,
}

pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<dyn TokenIssuer>,
    cache: Option<Arc<dyn Cache>>,
    cache_ttl: Duration,
    decoy_hash: Arc<OnceLock<String>>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<dyn TokenIssuer>,
    ) -> Self {
        Self {
            store,
            hasher,
            tokens,
            cache: None,
            cache_ttl: DEFAULT_CACHE_TTL,
            decoy_hash: Arc::new(OnceLock::new()),
        }
    }

    /// Serve `get_all_users` through a read-through cache.
    pub fn with_cache(mut self, cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        self.cache = Some(cache);
        self.cache_ttl = ttl;
        self
    }

    pub fn tokens(&self) -> &Arc<dyn TokenIssuer> {
        &self.tokens
    }

    pub async fn sign_up(&self, input: SignUpInput) -> DomainResult<User> {
        if self.store.find_by_email(&input.email).await?.is_some() {
            return Err(DomainError::conflict("User already exists."));
        }

        let password_hash = self.hash_password(input.password).await?;
        let user = self
            .store
            .insert(NewUser {
                name: input.name,
                email: input.email,
                password_hash,
                role: None,
            })
            .await?;

        self.invalidate_listing().await?;
        Ok(user)
    }

    /// Both failure causes (unknown email, wrong password) produce the same
    /// error. Accounts without a usable hash (unknown email, OAuth-only user)
    /// are verified against the decoy so every attempt costs one Argon2 run.
    pub async fn sign_in(&self, input: SignInInput) -> DomainResult<TokenPair> {
        let user = self.store.find_by_email(&input.email).await?;

        let (stored, genuine) = match &user {
            Some(u) if u.password_hash != OAUTH_PLACEHOLDER_PASSWORD => (u.password_hash.clone(), true),
            _ => (self.decoy_hash().await?, false),
        };
        let valid = genuine && self.verify_password(stored, input.password).await?;

        match user {
            Some(user) if valid => Ok(self.tokens.issue_pair(&user)?),
            _ => Err(DomainError::unauthorized(INVALID_CREDENTIALS)),
        }
    }

    /// Finds or creates the local user for an OAuth identity, then issues the
    /// token pair. First-time users get role USER and the placeholder password.
    pub async fn sign_in_with_oauth(&self, profile: OAuthProfile) -> DomainResult<TokenPair> {
        let email = profile
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| DomainError::unauthorized("No email associated with Google account."))?;

        let user = match self.store.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                let user = self
                    .store
                    .insert(NewUser {
                        name: profile.display_name,
                        email,
                        password_hash: OAUTH_PLACEHOLDER_PASSWORD.to_string(),
                        role: Some(Role::User),
                    })
                    .await?;
                self.invalidate_listing().await?;
                user
            }
        };

        Ok(self.tokens.issue_pair(&user)?)
    }

    pub async fn update_name_or_password(
        &self,
        user_id: UserId,
        input: UpdateProfileInput,
    ) -> DomainResult<User> {
        let mut patch = UserPatch {
            name: input.name.filter(|n| !n.is_empty()),
            ..Default::default()
        };
        if let Some(password) = input.password.filter(|p| !p.is_empty()) {
            patch.password_hash = Some(self.hash_password(password).await?);
        }

        let user = self
            .store
            .update_by_id(user_id, patch)
            .await?
            .ok_or_else(|| DomainError::not_found(USER_NOT_FOUND))?;

        self.invalidate_listing().await?;
        Ok(user)
    }

    /// Admin-only; the caller enforces that through the role gate.
    pub async fn update_role(&self, user_id: UserId, role: Role) -> DomainResult<User> {
        let patch = UserPatch {
            role: Some(role),
            ..Default::default()
        };
        let user = self
            .store
            .update_by_id(user_id, patch)
            .await?
            .ok_or_else(|| DomainError::not_found(USER_NOT_FOUND))?;

        self.invalidate_listing().await?;
        Ok(user)
    }

    pub async fn get_all_users(&self) -> DomainResult<Vec<UserSummary>> {
        let Some(cache) = &self.cache else {
            return Ok(self.store.list_all().await?);
        };

        if let Some(hit) = cache.get(ALL_USERS_CACHE_KEY).await? {
            let users: Vec<UserSummary> = serde_json::from_str(&hit)
                .map_err(|e| DomainError::internal(format!("corrupt cached listing: {e}")))?;
            return Ok(users);
        }

        let users = self.store.list_all().await?;
        let encoded = serde_json::to_string(&users)
            .map_err(|e| DomainError::internal(format!("listing serialization: {e}")))?;
        cache.set(ALL_USERS_CACHE_KEY, encoded, self.cache_ttl).await?;
        Ok(users)
    }

    /// `page` and `limit` are 1-based positive integers (validated upstream).
    pub async fn get_users_paginated(&self, page: u64, limit: u64) -> DomainResult<Page<UserSummary>> {
        let skip = page.saturating_sub(1).saturating_mul(limit);
        let (items, total) = self.store.list_paginated(skip, limit).await?;
        Ok(Page { items, total })
    }

    async fn invalidate_listing(&self) -> DomainResult<()> {
        if let Some(cache) = &self.cache {
            cache.invalidate(ALL_USERS_CACHE_KEY).await?;
        }
        Ok(())
    }

    async fn hash_password(&self, password: String) -> DomainResult<String> {
        let hasher = self.hasher.clone();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| DomainError::internal(format!("hashing task failed: {e}")))??;
        Ok(hash)
    }

    async fn verify_password(&self, stored: String, password: String) -> DomainResult<bool> {
        let hasher = self.hasher.clone();
        let valid = tokio::task::spawn_blocking(move || hasher.verify(&stored, &password))
            .await
            .map_err(|e| DomainError::internal(format!("verification task failed: {e}")))??;
        Ok(valid)
    }

    async fn decoy_hash(&self) -> DomainResult<String> {
        if let Some(hash) = self.decoy_hash.get() {
            return Ok(hash.clone());
        }
        let hash = self.hash_password(DECOY_PASSWORD.to_string()).await?;
        Ok(self.decoy_hash.get_or_init(|| hash).clone())
    }
}
