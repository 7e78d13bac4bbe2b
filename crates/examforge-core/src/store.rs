//! In-memory profile and session stores.
//!
//! The durable-storage driver is an external collaborator; this module is
//! the boundary it plugs into. [`MemoryStore`] keeps live state and hands
//! out a serializable [`StoreSnapshot`] for whatever persistence sits
//! outside.
//!
//! Concurrency: profiles are per-user mutable state, so each is wrapped in
//! its own `tokio::sync::Mutex`: evaluations for the same user serialize,
//! different users proceed in parallel. Session begin/finish calls for one
//! user must happen under that user's profile lock.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::ExamError;
use crate::model::{SessionStatus, TestSession};
use crate::profile::PerformanceProfile;

/// Live in-memory store for profiles and sessions.
#[derive(Default)]
pub struct MemoryStore {
    profiles: RwLock<HashMap<String, Arc<Mutex<PerformanceProfile>>>>,
    sessions: RwLock<HashMap<Uuid, TestSession>>,
}

/// Serializable view of the whole store, for the external persistence
/// layer.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub profiles: Vec<PerformanceProfile>,
    pub sessions: Vec<TestSession>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let profiles = snapshot
            .profiles
            .into_iter()
            .map(|p| (p.user_id.clone(), Arc::new(Mutex::new(p))))
            .collect();
        let sessions = snapshot.sessions.into_iter().map(|s| (s.id, s)).collect();
        Self {
            profiles: RwLock::new(profiles),
            sessions: RwLock::new(sessions),
        }
    }

    /// The per-user profile handle, created lazily on first use. Callers
    /// lock the returned mutex for any read-modify-write.
    pub async fn profile(&self, user_id: &str) -> Arc<Mutex<PerformanceProfile>> {
        if let Some(existing) = self.profiles.read().await.get(user_id) {
            return Arc::clone(existing);
        }
        let mut profiles = self.profiles.write().await;
        Arc::clone(
            profiles
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(PerformanceProfile::new(user_id)))),
        )
    }

    pub async fn put_session(&self, session: TestSession) {
        self.sessions.write().await.insert(session.id, session);
    }

    pub async fn session(&self, id: Uuid) -> Result<TestSession, ExamError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(ExamError::SessionNotFound(id))
    }

    /// Fetch a session for scoring, rejecting one that was already
    /// evaluated. Call while holding the owning user's profile lock so two
    /// submissions for the same session serialize.
    pub async fn begin_evaluation(&self, id: Uuid) -> Result<TestSession, ExamError> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(&id).ok_or(ExamError::SessionNotFound(id))?;
        if session.status == SessionStatus::Evaluated {
            return Err(ExamError::SessionAlreadyEvaluated(id));
        }
        Ok(session.clone())
    }

    /// Write back an evaluated session.
    pub async fn finish_evaluation(&self, session: TestSession) {
        self.sessions.write().await.insert(session.id, session);
    }

    /// Serializable copy of everything currently held.
    pub async fn snapshot(&self) -> StoreSnapshot {
        let profiles = self.profiles.read().await;
        let mut profile_list = Vec::with_capacity(profiles.len());
        for handle in profiles.values() {
            profile_list.push(handle.lock().await.clone());
        }
        let sessions = self.sessions.read().await.values().cloned().collect();
        StoreSnapshot {
            profiles: profile_list,
            sessions,
        }
    }
}
