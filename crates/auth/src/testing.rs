//! Test doubles shared by this crate's unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use gatehouse_core::UserId;

use crate::{
    Argon2PasswordHasher, Cache, CacheError, CredentialStore, JwtTokenIssuer, NewUser, Role,
    StoreError, TokenConfig, User, UserPatch, UserSummary,
};

pub fn sample_user(email: &str, role: Role) -> User {
    let now = Utc::now();
    User {
        id: UserId::new(),
        name: "Sample".into(),
        email: email.into(),
        password_hash: "$argon2id$placeholder".into(),
        role,
        created_at: now,
        updated_at: now,
    }
}

/// Minimum-cost Argon2 so tests stay fast.
pub fn fast_hasher() -> Argon2PasswordHasher {
    Argon2PasswordHasher::with_params(8, 1, 1).unwrap()
}

pub fn issuer() -> JwtTokenIssuer {
    JwtTokenIssuer::new(TokenConfig::new("test-access-secret", "test-refresh-secret")).unwrap()
}

#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<Vec<User>>,
    fail_insert: Mutex<Option<StoreError>>,
    list_all_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn fail_next_insert(&self, err: StoreError) {
        *self.fail_insert.lock().unwrap() = Some(err);
    }

    pub fn list_all_calls(&self) -> usize {
        self.list_all_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        if let Some(err) = self.fail_insert.lock().unwrap().take() {
            return Err(err);
        }
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail(user.email));
        }
        let now = Utc::now();
        let record = User {
            id: UserId::new(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        users.push(record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn update_by_id(&self, id: UserId, patch: UserPatch) -> Result<Option<User>, StoreError> {
        let mut users = self.users.lock().unwrap();
        Ok(users.iter_mut().find(|u| u.id == id).map(|u| {
            patch.apply_to(u, Utc::now());
            u.clone()
        }))
    }

    async fn list_all(&self) -> Result<Vec<UserSummary>, StoreError> {
        self.list_all_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.users.lock().unwrap().iter().map(UserSummary::from).collect())
    }

    async fn list_paginated(
        &self,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<UserSummary>, u64), StoreError> {
        let users = self.users.lock().unwrap();
        let items = users
            .iter()
            .skip(skip as usize)
            .take(limit as usize)
            .map(UserSummary::from)
            .collect();
        Ok((items, users.len() as u64))
    }
}

/// TTL-less cache; expiry is exercised against the real backends.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String, _ttl: Duration) -> Result<(), CacheError> {
        self.entries.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn invalidate(&self, pattern: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap();
        match pattern.strip_suffix('*') {
            Some(prefix) => entries.retain(|k, _| !k.starts_with(prefix)),
            None => {
                entries.remove(pattern);
            }
        }
        Ok(())
    }
}
