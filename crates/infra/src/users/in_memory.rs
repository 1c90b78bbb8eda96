use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use gatehouse_auth::{CredentialStore, NewUser, StoreError, User, UserPatch, UserSummary};
use gatehouse_core::UserId;

#[derive(Debug, Default)]
struct Users {
    rows: Vec<User>,
    by_id: HashMap<UserId, usize>,
    by_email: HashMap<String, usize>,
}

/// In-memory credential store.
///
/// Intended for tests/dev. Each operation takes the lock once, so insert and
/// update are atomic with respect to each other.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    users: RwLock<Users>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Users>, StoreError> {
        self.users
            .read()
            .map_err(|_| StoreError::Backend("credential store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Users>, StoreError> {
        self.users
            .write()
            .map_err(|_| StoreError::Backend("credential store lock poisoned".into()))
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = self.write()?;
        if users.by_email.contains_key(&user.email) {
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

        let idx = users.rows.len();
        users.by_id.insert(record.id, idx);
        users.by_email.insert(record.email.clone(), idx);
        users.rows.push(record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let users = self.read()?;
        Ok(users.by_id.get(&id).map(|&idx| users.rows[idx].clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.read()?;
        Ok(users.by_email.get(email).map(|&idx| users.rows[idx].clone()))
    }

    async fn update_by_id(&self, id: UserId, patch: UserPatch) -> Result<Option<User>, StoreError> {
        let mut users = self.write()?;
        let Some(&idx) = users.by_id.get(&id) else {
            return Ok(None);
        };
        let record = &mut users.rows[idx];
        patch.apply_to(record, Utc::now());
        Ok(Some(record.clone()))
    }

    async fn list_all(&self) -> Result<Vec<UserSummary>, StoreError> {
        Ok(self.read()?.rows.iter().map(UserSummary::from).collect())
    }

    async fn list_paginated(
        &self,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<UserSummary>, u64), StoreError> {
        let users = self.read()?;
        let skip = usize::try_from(skip).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let items = users
            .rows
            .iter()
            .skip(skip)
            .take(limit)
            .map(UserSummary::from)
            .collect();
        Ok((items, users.rows.len() as u64))
    }
}
