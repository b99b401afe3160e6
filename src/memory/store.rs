//! Session State Store
//!
//! Sessions live in a map guarded by an `RwLock` that is only held for the
//! lookup. Each session sits behind its own FIFO `Mutex`, so work on one
//! session is serialized in arrival order while distinct sessions never
//! contend. A lease counts in-flight requests; the idle sweep skips any
//! session with a live lease.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::memory::session::{Message, Session, SessionSummary};
use crate::models::{Goal, Portfolio};
use crate::Result;

struct SessionSlot {
    session: Mutex<Session>,
    in_flight: AtomicUsize,
}

/// Keeps a session alive (un-evictable) for as long as it is held.
pub struct SessionLease {
    slot: Arc<SessionSlot>,
}

impl SessionLease {
    /// Wait for exclusive access. Waiters are served in arrival order.
    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.slot.session.lock().await
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.slot.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct SessionStore {
    slots: RwLock<HashMap<String, Arc<SessionSlot>>>,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Lease a session, creating it if absent.
    pub async fn lease(&self, session_id: &str) -> SessionLease {
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(session_id) {
                slot.in_flight.fetch_add(1, Ordering::SeqCst);
                return SessionLease { slot: slot.clone() };
            }
        }

        let mut slots = self.slots.write().await;
        let slot = slots
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!(session_id, "Creating session");
                Arc::new(SessionSlot {
                    session: Mutex::new(Session::new(session_id)),
                    in_flight: AtomicUsize::new(0),
                })
            })
            .clone();
        slot.in_flight.fetch_add(1, Ordering::SeqCst);
        SessionLease { slot }
    }

    /// Snapshot of a session, creating an empty one if absent.
    pub async fn get(&self, session_id: &str) -> Session {
        let lease = self.lease(session_id).await;
        let session = lease.lock().await;
        session.clone()
    }

    pub async fn append(&self, session_id: &str, message: Message) {
        let lease = self.lease(session_id).await;
        lease.lock().await.append(message);
    }

    /// Apply `update` to a copy of the portfolio and keep it only on success.
    pub async fn update_portfolio<F>(&self, session_id: &str, update: F) -> Result<Portfolio>
    where
        F: FnOnce(&mut Portfolio) -> Result<()>,
    {
        let lease = self.lease(session_id).await;
        let mut session = lease.lock().await;

        let mut portfolio = session.portfolio().clone();
        update(&mut portfolio)?;
        session.set_portfolio(portfolio.clone());
        Ok(portfolio)
    }

    pub async fn add_goal(&self, session_id: &str, goal: Goal) -> Vec<Goal> {
        let lease = self.lease(session_id).await;
        let mut session = lease.lock().await;
        session.add_goal(goal);
        session.goals().to_vec()
    }

    pub async fn remove_goal(&self, session_id: &str, index: usize) -> Result<Goal> {
        let lease = self.lease(session_id).await;
        let mut session = lease.lock().await;
        session.remove_goal(index)
    }

    pub async fn set_preference(&self, session_id: &str, key: &str, value: &str) {
        let lease = self.lease(session_id).await;
        lease.lock().await.set_preference(key, value);
    }

    /// Summary of an existing session. Does not create one.
    pub async fn summary(&self, session_id: &str) -> Option<SessionSummary> {
        let slot = {
            let slots = self.slots.read().await;
            let slot = slots.get(session_id)?.clone();
            slot.in_flight.fetch_add(1, Ordering::SeqCst);
            slot
        };
        let lease = SessionLease { slot };
        let summary = lease.lock().await.summary();
        Some(summary)
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.slots.read().await.contains_key(session_id)
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }

    /// Remove sessions idle for longer than the idle window. Sessions with a
    /// request in flight are never removed.
    pub async fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let mut slots = self.slots.write().await;
        let before = slots.len();

        slots.retain(|session_id, slot| {
            if slot.in_flight.load(Ordering::SeqCst) > 0 {
                return true;
            }
            let Ok(session) = slot.session.try_lock() else {
                return true;
            };
            let idle = now
                .signed_duration_since(session.last_active())
                .to_std()
                .map(|age| age > self.idle_timeout)
                .unwrap_or(false);
            if idle {
                debug!(session_id = %session_id, "Evicting idle session");
            }
            !idle
        });

        let evicted = before - slots.len();
        if evicted > 0 {
            info!(evicted, remaining = slots.len(), "Idle sessions evicted");
        }
        evicted
    }

    /// Run `evict_idle` every `interval` until the handle is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.evict_idle(Utc::now()).await;
            }
        })
    }
}
