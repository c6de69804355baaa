//! Shared solver session with TTL-based renewal.
//!
//! One live session per process. All creation, expiry, and teardown is
//! serialized behind a single mutex; callers receive a shared client bound
//! to the current session.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::client::SolverClient;

struct ActiveSession {
    client: Arc<SolverClient>,
    created_at: Instant,
}

/// Owns the process-wide solver session.
pub struct SessionManager {
    solver_url: String,
    session_ttl: Duration,
    inner: Mutex<Option<ActiveSession>>,
}

impl SessionManager {
    pub fn new(solver_url: &str, session_ttl: Duration) -> Self {
        Self {
            solver_url: solver_url.to_string(),
            session_ttl,
            inner: Mutex::new(None),
        }
    }

    /// Get the current session-bound client, creating or replacing the
    /// session if absent or older than the TTL. Concurrent callers block
    /// while a replacement is in flight, so the solver sees at most one
    /// `sessions.create` per expiry.
    pub async fn acquire(&self) -> Result<Arc<SolverClient>> {
        let mut guard = self.inner.lock().await;

        if let Some(active) = guard.as_ref() {
            if active.created_at.elapsed() < self.session_ttl {
                return Ok(active.client.clone());
            }
            debug!("solver session expired, replacing");
            let _ = active.client.destroy_session().await;
            *guard = None;
        }

        let client = self.create_locked().await?;
        *guard = Some(ActiveSession {
            client: client.clone(),
            created_at: Instant::now(),
        });
        Ok(client)
    }

    /// Force teardown and recreation of the session. Used after ban-like
    /// responses observed by upper layers.
    pub async fn renew(&self) -> Result<Arc<SolverClient>> {
        let mut guard = self.inner.lock().await;
        if let Some(active) = guard.take() {
            let _ = active.client.destroy_session().await;
        }
        info!("renewing solver session");
        let client = self.create_locked().await?;
        *guard = Some(ActiveSession {
            client: client.clone(),
            created_at: Instant::now(),
        });
        Ok(client)
    }

    /// Destroy the session and release resources. Idempotent.
    pub async fn shutdown(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(active) = guard.take() {
            let _ = active.client.destroy_session().await;
            info!("solver session shut down");
        }
    }

    // Caller must hold the mutex. On failure nothing is cached, so the next
    // acquire retries from scratch.
    async fn create_locked(&self) -> Result<Arc<SolverClient>> {
        let client =
            Arc::new(SolverClient::new(&self.solver_url).context("creating solver client")?);
        client
            .create_session()
            .await
            .context("creating solver session")?;
        Ok(client)
    }
}
