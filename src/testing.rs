//! In-memory stand-ins for the database and mailer, used by unit tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::{
    repo::{StoreError, UserStore},
    repo_types::{NewUser, PendingReset, Role, User},
};
use crate::notify::{Notification, Notifier};
use crate::visibility::{RecordSource, Scoped, Visibility};

pub fn user_with_role(role: Role) -> User {
    User {
        id: Uuid::new_v4(),
        name: None,
        email: format!("{}@example.com", Uuid::new_v4().simple()),
        password_hash: String::new(),
        role,
        active: true,
        password_changed_at: None,
        password_reset_token_hash: None,
        password_reset_expires_at: None,
        created_at: OffsetDateTime::now_utc(),
    }
}

#[derive(Default)]
pub struct MemoryUsers {
    rows: Mutex<HashMap<Uuid, User>>,
    redeem_calls: AtomicUsize,
}

impl MemoryUsers {
    pub fn get(&self, id: Uuid) -> Option<User> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    /// How many times the store was asked to write a reset redemption.
    pub fn redeem_calls(&self) -> usize {
        self.redeem_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut User)) {
        if let Some(user) = self.rows.lock().unwrap().get_mut(&id) {
            f(user);
        }
    }
}

#[async_trait]
impl UserStore for MemoryUsers {
    async fn find_by_id(&self, id: Uuid, visibility: Visibility) -> anyhow::Result<Option<User>> {
        Ok(self.get(id).filter(|u| visibility.admits(u)))
    }

    async fn find_by_email(
        &self,
        email: &str,
        visibility: Visibility,
    ) -> anyhow::Result<Option<User>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email == email && visibility.admits(*u))
            .cloned())
    }

    async fn list(&self, visibility: Visibility) -> anyhow::Result<Vec<User>> {
        let mut users: Vec<User> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|u| visibility.admits(*u))
            .cloned()
            .collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn insert(&self, new: NewUser) -> Result<User, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.values().any(|u| u.email == new.email) {
            return Err(StoreError::DuplicateEmail);
        }
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            active: true,
            password_changed_at: None,
            password_reset_token_hash: None,
            password_reset_expires_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        rows.insert(user.id, user.clone());
        Ok(user)
    }

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        self.update(id, |u| {
            u.password_hash = password_hash.to_string();
            u.password_changed_at = Some(changed_at);
        });
        Ok(())
    }

    async fn set_reset(&self, id: Uuid, reset: Option<PendingReset>) -> anyhow::Result<()> {
        self.update(id, |u| match reset {
            Some(r) => {
                u.password_reset_token_hash = Some(r.token_hash);
                u.password_reset_expires_at = Some(r.expires_at);
            }
            None => {
                u.password_reset_token_hash = None;
                u.password_reset_expires_at = None;
            }
        });
        Ok(())
    }

    async fn find_by_reset(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|u| pending_reset_matches(u, token_hash, now))
            .cloned())
    }

    async fn redeem_reset(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> anyhow::Result<Option<User>> {
        self.redeem_calls.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.lock().unwrap();
        let Some(user) = rows
            .values_mut()
            .find(|u| pending_reset_matches(u, token_hash, now))
        else {
            return Ok(None);
        };
        user.password_hash = password_hash.to_string();
        user.password_changed_at = Some(now);
        user.password_reset_token_hash = None;
        user.password_reset_expires_at = None;
        Ok(Some(user.clone()))
    }

    async fn set_active(&self, id: Uuid, active: bool) -> anyhow::Result<()> {
        self.update(id, |u| u.active = active);
        Ok(())
    }
}

fn pending_reset_matches(user: &User, token_hash: &str, now: OffsetDateTime) -> bool {
    user.active
        && user.password_reset_token_hash.as_deref() == Some(token_hash)
        && user.password_reset_expires_at.is_some_and(|exp| exp > now)
}

pub trait Keyed {
    fn key(&self) -> Uuid;
}

pub struct MemorySource<T> {
    rows: Mutex<Vec<T>>,
}

impl<T> Default for MemorySource<T> {
    fn default() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }
}

impl<T> MemorySource<T> {
    pub fn new(rows: Vec<T>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }
}

#[async_trait]
impl<T> RecordSource<T> for MemorySource<T>
where
    T: Keyed + Scoped + Clone + Send + Sync,
{
    async fn fetch_by_id(&self, id: Uuid, visibility: Visibility) -> anyhow::Result<Option<T>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.key() == id && visibility.admits(*r))
            .cloned())
    }

    async fn fetch_all(&self, visibility: Visibility) -> anyhow::Result<Vec<T>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| visibility.admits(*r))
            .cloned()
            .collect())
    }
}

/// Keeps every notification it is handed; optionally fails instead.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("smtp relay unavailable");
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
