//! Monitor session registry.
//!
//! Owns all live monitor sessions and hands out numeric session ids.
//! Sessions stay registered after stopping so their retained buffers remain
//! queryable; `remove` drops a session entirely.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::Mutex;

use xcmon_core::prelude::*;
use xcmon_core::{Diagnostic, LogLine};
use xcmon_daemon::{MonitorHandle, MonitorSpec, MonitorStatus};

pub type SessionId = u64;

/// Summary of one registered session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub label: String,
    pub running: bool,
    pub errored: bool,
}

/// Registry of monitor sessions, keyed by id
#[derive(Debug, Default)]
pub struct MonitorRegistry {
    sessions: Mutex<HashMap<SessionId, MonitorHandle>>,
    next_id: AtomicU64,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start a monitor session and register it.
    pub async fn start(&self, spec: MonitorSpec) -> Result<SessionId> {
        let handle = MonitorHandle::start(spec)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut sessions = self.sessions.lock().await;
        sessions.insert(id, handle);
        info!("Registered monitor session {}", id);
        Ok(id)
    }

    /// Stop a session's subprocess. The session stays registered with its
    /// retained buffers.
    pub async fn stop(&self, id: SessionId) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let handle = sessions
            .get_mut(&id)
            .ok_or(Error::SessionNotFound { id })?;
        handle.stop().await;
        Ok(())
    }

    /// Stop and drop a session.
    pub async fn remove(&self, id: SessionId) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let mut handle = sessions
            .remove(&id)
            .ok_or(Error::SessionNotFound { id })?;
        handle.stop().await;
        Ok(())
    }

    /// Newest retained lines from one session.
    pub async fn recent(
        &self,
        id: SessionId,
        since: Option<DateTime<Local>>,
        count: usize,
    ) -> Result<Vec<LogLine>> {
        let sessions = self.sessions.lock().await;
        let handle = sessions.get(&id).ok_or(Error::SessionNotFound { id })?;
        Ok(handle.recent(since, count))
    }

    /// Newest diagnostics extracted by one session.
    pub async fn recent_diagnostics(
        &self,
        id: SessionId,
        count: usize,
    ) -> Result<Vec<Diagnostic>> {
        let sessions = self.sessions.lock().await;
        let handle = sessions.get(&id).ok_or(Error::SessionNotFound { id })?;
        Ok(handle.recent_diagnostics(count))
    }

    pub async fn status(&self, id: SessionId) -> Result<MonitorStatus> {
        let sessions = self.sessions.lock().await;
        let handle = sessions.get(&id).ok_or(Error::SessionNotFound { id })?;
        Ok(handle.status())
    }

    /// Summaries of all registered sessions, sorted by id.
    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.lock().await;
        let mut summaries: Vec<SessionSummary> = sessions
            .iter()
            .map(|(id, handle)| SessionSummary {
                id: *id,
                label: handle.label().to_string(),
                running: handle.status() == MonitorStatus::Running,
                errored: handle.status() == MonitorStatus::Error,
            })
            .collect();
        summaries.sort_by_key(|s| s.id);
        summaries
    }

    /// Newest diagnostics across all registered sessions, time-ordered.
    pub async fn all_recent_diagnostics(&self, count: usize) -> Vec<Diagnostic> {
        let sessions = self.sessions.lock().await;
        let mut diagnostics: Vec<Diagnostic> = sessions
            .values()
            .flat_map(|handle| handle.recent_diagnostics(count))
            .collect();
        diagnostics.sort_by_key(|d| d.timestamp);
        diagnostics.truncate(count);
        diagnostics
    }

    /// Stop every running session. Used at shutdown.
    pub async fn stop_all(&self) {
        let mut sessions = self.sessions.lock().await;
        for (id, handle) in sessions.iter_mut() {
            if handle.status() == MonitorStatus::Running {
                debug!("Stopping session {} at shutdown", id);
                handle.stop().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xcmon_core::SourceKind;

    fn sleeper_spec(label: &str) -> MonitorSpec {
        MonitorSpec {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "sleep 60".to_string()],
            label: label.to_string(),
            source_kind: SourceKind::Console,
            line_capacity: 8,
            diagnostic_capacity: 8,
        }
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let registry = MonitorRegistry::new();
        let id = registry.start(sleeper_spec("one")).await.expect("start");

        assert_eq!(registry.status(id).await.expect("status"), MonitorStatus::Running);

        registry.stop(id).await.expect("stop");
        assert_eq!(registry.status(id).await.expect("status"), MonitorStatus::Stopped);

        // Stopped sessions stay queryable.
        assert!(registry.recent(id, None, 10).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_session_id() {
        let registry = MonitorRegistry::new();
        let err = registry.stop(99).await.expect_err("must fail");
        assert!(matches!(err, Error::SessionNotFound { id: 99 }));
    }

    #[tokio::test]
    async fn test_remove_drops_session() {
        let registry = MonitorRegistry::new();
        let id = registry.start(sleeper_spec("gone")).await.expect("start");

        registry.remove(id).await.expect("remove");
        assert!(registry.recent(id, None, 10).await.is_err());
    }

    #[tokio::test]
    async fn test_ids_are_unique_and_listed() {
        let registry = MonitorRegistry::new();
        let a = registry.start(sleeper_spec("a")).await.expect("a");
        let b = registry.start(sleeper_spec("b")).await.expect("b");
        assert_ne!(a, b);

        let listed = registry.list().await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, a);
        assert_eq!(listed[1].id, b);
        assert!(listed.iter().all(|s| s.running));

        registry.stop_all().await;
        let listed = registry.list().await;
        assert!(listed.iter().all(|s| !s.running));
    }
}
