//! Who is acting. The session manager only needs the current user's id;
//! `LocalAuth` keeps a username sign-in with an expiry window on top of the
//! users table.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::db::models::UserId;
use crate::error::SessionError;
use crate::store::UserStore;

pub trait AuthContext: Send + Sync {
    fn current_user(&self) -> Option<UserId>;

    fn is_session_valid(&self) -> bool {
        self.current_user().is_some()
    }
}

/// Always signed in as the same user.
#[derive(Debug, Clone, Copy)]
pub struct StaticAuth(pub UserId);

impl AuthContext for StaticAuth {
    fn current_user(&self) -> Option<UserId> {
        Some(self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: UserId,
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

pub struct LocalAuth<U, C = SystemClock> {
    users: Arc<U>,
    clock: Arc<C>,
    ttl: TimeDelta,
    session: Mutex<Option<AuthSession>>,
}

impl<U: UserStore, C: Clock> LocalAuth<U, C> {
    pub fn new(users: Arc<U>, clock: Arc<C>, ttl: TimeDelta) -> Self {
        Self {
            users,
            clock,
            ttl,
            session: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<AuthSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn establish(&self, user_id: UserId, username: String) -> AuthSession {
        let session = AuthSession {
            user_id,
            username,
            expires_at: self.clock.now() + self.ttl,
        };
        *self.slot() = Some(session.clone());
        session
    }

    pub async fn sign_up(&self, username: &str) -> Result<AuthSession, SessionError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(SessionError::validation("username must not be empty"));
        }
        if self.users.find_user(username).await?.is_some() {
            return Err(SessionError::validation(format!(
                "username {} is already taken",
                username
            )));
        }
        let user = self.users.create_user(username).await?;
        info!("Signed up user {} (id={})", user.username, user.id);
        Ok(self.establish(user.id, user.username))
    }

    pub async fn sign_in(&self, username: &str) -> Result<AuthSession, SessionError> {
        let user = self
            .users
            .find_user(username.trim())
            .await?
            .ok_or_else(|| SessionError::Unauthorized(format!("unknown user {}", username)))?;
        debug!("Signed in user {}", user.id);
        Ok(self.establish(user.id, user.username))
    }

    pub fn sign_out(&self) {
        if let Some(session) = self.slot().take() {
            debug!("Signed out user {}", session.user_id);
        }
    }

    /// Extends a still-valid sign-in by the configured window.
    pub fn refresh(&self) -> Result<AuthSession, SessionError> {
        let now = self.clock.now();
        let mut slot = self.slot();
        match slot.as_mut() {
            Some(session) if session.expires_at > now => {
                session.expires_at = now + self.ttl;
                Ok(session.clone())
            }
            Some(_) => {
                *slot = None;
                Err(SessionError::Unauthorized("sign-in has expired".into()))
            }
            None => Err(SessionError::Unauthorized("not signed in".into())),
        }
    }

    pub fn session(&self) -> Option<AuthSession> {
        let now = self.clock.now();
        self.slot().clone().filter(|s| s.expires_at > now)
    }
}

impl<U: UserStore, C: Clock> AuthContext for LocalAuth<U, C> {
    fn current_user(&self) -> Option<UserId> {
        self.session().map(|s| s.user_id)
    }
}
