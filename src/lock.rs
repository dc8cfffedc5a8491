//! # Collaborative Lock Manager
//!
//! Single-writer access control per document id.
//!
//! Each document is either unlocked or locked by one holder until an
//! expiry time. Expiry is evaluated lazily: a lapsed lock stays recorded
//! until the next `acquire` or `refresh` for that document observes it.
//! There is no background sweep.
//!
//! ```
//! use chrono::Duration;
//! use easel::lock::LockManager;
//!
//! let mut locks = LockManager::default();
//! let token = locks.acquire("doc-1", "alice", Duration::minutes(5)).unwrap();
//! assert!(locks.acquire("doc-1", "bob", Duration::minutes(5)).is_err());
//! locks.release(&token);
//! assert!(locks.acquire("doc-1", "bob", Duration::minutes(5)).is_ok());
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::LockError;

/// Proof of write ownership of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockToken {
    pub doc_id: String,
    pub holder: String,
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Observable state of a document's lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Locked {
        holder: String,
        expires_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
struct Held {
    holder: String,
    token: Uuid,
    expires_at: DateTime<Utc>,
}

/// `now + ttl`, saturating at the latest representable time.
fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub struct LockManager {
    locks: HashMap<String, Held>,
    clock: Arc<dyn Clock>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl LockManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            locks: HashMap::new(),
            clock,
        }
    }

    /// Take the lock for `holder`.
    ///
    /// Succeeds when the document is unlocked, the current lock has expired,
    /// or `holder` already holds it (which renews it under a new token).
    pub fn acquire(
        &mut self,
        doc_id: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<LockToken, LockError> {
        let now = self.clock.now();
        if let Some(held) = self.locks.get(doc_id)
            && held.expires_at > now
            && held.holder != holder
        {
            debug!(doc_id, holder, current = %held.holder, "lock conflict");
            return Err(LockError::Conflict {
                doc_id: doc_id.to_string(),
                holder: held.holder.clone(),
                expires_at: held.expires_at,
            });
        }

        let held = Held {
            holder: holder.to_string(),
            token: Uuid::new_v4(),
            expires_at: expiry(now, ttl),
        };
        let token = LockToken {
            doc_id: doc_id.to_string(),
            holder: held.holder.clone(),
            token: held.token,
            expires_at: held.expires_at,
        };
        self.locks.insert(doc_id.to_string(), held);
        info!(doc_id, holder, expires_at = %token.expires_at, "lock acquired");
        Ok(token)
    }

    /// Extend a held lock to `now + ttl`.
    pub fn refresh(&mut self, token: &LockToken, ttl: Duration) -> Result<LockToken, LockError> {
        let now = self.clock.now();
        let doc_id = token.doc_id.as_str();
        let Some(held) = self.locks.get_mut(doc_id) else {
            return Err(LockError::Expired(doc_id.to_string()));
        };

        if held.expires_at <= now {
            let lapsed_holder = held.holder.clone();
            self.locks.remove(doc_id);
            debug!(doc_id, holder = %lapsed_holder, "lock lapsed before refresh");
            return Err(LockError::Expired(doc_id.to_string()));
        }
        if held.holder != token.holder {
            return Err(LockError::NotHolder(doc_id.to_string()));
        }

        held.expires_at = expiry(now, ttl);
        debug!(doc_id, holder = %held.holder, expires_at = %held.expires_at, "lock refreshed");
        Ok(LockToken {
            doc_id: doc_id.to_string(),
            holder: held.holder.clone(),
            token: held.token,
            expires_at: held.expires_at,
        })
    }

    /// Unlock if `token`'s holder holds the lock; otherwise do nothing.
    pub fn release(&mut self, token: &LockToken) {
        let doc_id = token.doc_id.as_str();
        if self
            .locks
            .get(doc_id)
            .is_some_and(|held| held.holder == token.holder)
        {
            self.locks.remove(doc_id);
            info!(doc_id, holder = %token.holder, "lock released");
        }
    }

    /// Check that `token` still grants write access, without changing state.
    pub fn verify(&self, token: &LockToken) -> Result<(), LockError> {
        let doc_id = token.doc_id.as_str();
        match self.locks.get(doc_id) {
            Some(held) if held.expires_at <= self.clock.now() => {
                Err(LockError::Expired(doc_id.to_string()))
            }
            Some(held) if held.holder == token.holder => Ok(()),
            Some(_) => Err(LockError::NotHolder(doc_id.to_string())),
            None => Err(LockError::Expired(doc_id.to_string())),
        }
    }

    /// Recorded state. A lapsed lock reads as `Locked` until an
    /// `acquire`/`refresh` observes its expiry.
    pub fn state(&self, doc_id: &str) -> LockState {
        match self.locks.get(doc_id) {
            Some(held) => LockState::Locked {
                holder: held.holder.clone(),
                expires_at: held.expires_at,
            },
            None => LockState::Unlocked,
        }
    }
}

// ============================================================================
// LOCK SERVICE
// ============================================================================

/// Lock operations as seen by sessions and persistence adapters.
///
/// May be backed by an in-process [`LockManager`] or a remote service; the
/// contract is the same either way.
#[async_trait]
pub trait LockService: Send + Sync {
    async fn acquire(&self, doc_id: &str, holder: &str, ttl: Duration)
    -> Result<LockToken, LockError>;
    async fn refresh(&self, token: &LockToken, ttl: Duration) -> Result<LockToken, LockError>;
    async fn release(&self, token: &LockToken);
    async fn verify(&self, token: &LockToken) -> Result<(), LockError>;
}

/// In-process lock service shared between sessions.
#[derive(Clone)]
pub struct LocalLockService {
    inner: Arc<Mutex<LockManager>>,
}

impl LocalLockService {
    pub fn new(manager: LockManager) -> Self {
        Self {
            inner: Arc::new(Mutex::new(manager)),
        }
    }

    pub async fn state(&self, doc_id: &str) -> LockState {
        self.inner.lock().await.state(doc_id)
    }
}

impl Default for LocalLockService {
    fn default() -> Self {
        Self::new(LockManager::default())
    }
}

#[async_trait]
impl LockService for LocalLockService {
    async fn acquire(
        &self,
        doc_id: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<LockToken, LockError> {
        self.inner.lock().await.acquire(doc_id, holder, ttl)
    }

    async fn refresh(&self, token: &LockToken, ttl: Duration) -> Result<LockToken, LockError> {
        self.inner.lock().await.refresh(token, ttl)
    }

    async fn release(&self, token: &LockToken) {
        self.inner.lock().await.release(token)
    }

    async fn verify(&self, token: &LockToken) -> Result<(), LockError> {
        self.inner.lock().await.verify(token)
    }
}
